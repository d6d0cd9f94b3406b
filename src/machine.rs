//! The interpreter: owns the current configuration, the context, the
//! pending internal queue, and the macrostep history; runs the
//! initialization algorithm, the transition algorithm, and the
//! run-to-completion loop.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::{Context, Event};
use crate::definition::Action;
use crate::error::ExmError;
use crate::statechart::{CompiledTransition, StateKind, Statechart, ROOT};
use crate::trace::{Macrostep, Microstep};

/// A running (or stopped) statechart machine. Created by [`Machine::init`],
/// evolved only through [`Machine::dispatch`].
#[derive(Debug, Clone)]
pub struct Machine {
    statechart: Arc<Statechart>,
    /// Exactly one branch (leaf-first, ending at `"root"`): this core does
    /// not implement orthogonal regions. The outer `Vec` exists to
    /// accommodate future parallelism without changing the type.
    configuration: Vec<Vec<String>>,
    running: bool,
    /// Newest macrostep at the front.
    macrosteps: VecDeque<Macrostep>,
    queue: VecDeque<Event>,
    context: Context,
    state_histories: IndexMap<String, Vec<String>>,
    next_timestamp: u64,
}

impl Machine {
    /// Runs the initialization algorithm: enters `root`'s initial chain,
    /// drains any internally raised events, and marks the machine running.
    pub fn init(statechart: Arc<Statechart>, context: Context) -> Result<Machine, ExmError> {
        let span = tracing::info_span!("exm::init");
        let _enter = span.enter();

        let entered = statechart.initial_chain(ROOT);
        let actions = statechart.entry_actions(&entered);
        let microstep = Microstep {
            transition: None,
            params: None,
            entered,
            exited: Vec::new(),
            actions,
        };

        let mut machine = Machine {
            statechart,
            configuration: vec![vec![ROOT.to_string()]],
            running: false,
            macrosteps: VecDeque::new(),
            queue: VecDeque::new(),
            context,
            state_histories: IndexMap::new(),
            next_timestamp: 0,
        };

        machine.push_macrostep(None);
        machine.running = true;
        machine.apply_microstep(microstep);
        machine.drain_internal()?;

        tracing::debug!(active = ?machine.active_states(), "machine initialized");
        Ok(machine)
    }

    /// Dispatches an external event, running it to completion (run-to-completion):
    /// one transition search against `event`, then draining whatever internal
    /// events that transition's actions raised, before returning control.
    pub fn dispatch(mut self, event: impl Into<Event>) -> Result<Machine, ExmError> {
        if !self.running {
            return Err(ExmError::NotRunning);
        }
        let event = event.into();
        let span = tracing::info_span!("exm::dispatch", event = event.name());
        let _enter = span.enter();

        self.push_macrostep(Some(event.name().to_string()));
        self.do_transition(event)?;
        self.drain_internal()?;
        Ok(self)
    }

    fn push_macrostep(&mut self, event_name: Option<String>) {
        let mut macrostep = Macrostep::new(self.next_timestamp);
        macrostep.event = event_name;
        self.next_timestamp += 1;
        self.macrosteps.push_front(macrostep);
    }

    /// Searches the active branch (leaf to root) for a transition on `event`,
    /// applies it if found, then strips the reserved params key.
    fn do_transition(&mut self, event: Event) -> Result<(), ExmError> {
        if event.name() == "done.state.root" {
            self.running = false;
            return Ok(());
        }

        match event.params() {
            Some(params) => self.context.put_params(params.clone()),
            None => {
                self.context.delete_params();
            }
        }

        let active_branch = self.configuration.first().cloned().unwrap_or_default();
        let mut selected: Option<CompiledTransition> = None;
        for state in &active_branch {
            let Some(transition) = self.statechart.transition_for(state, event.name()) else {
                continue;
            };
            let allowed = match &transition.guard {
                Some(guard) => guard.check(&self.context),
                None => true,
            };
            if allowed {
                selected = Some(transition.clone());
                break;
            }
            tracing::warn!(state = state.as_str(), event = event.name(), "guard blocked candidate transition");
        }

        match selected {
            None => {
                tracing::warn!(event = event.name(), "no transition fired for event");
            }
            Some(transition) => {
                let source = active_branch.first().cloned().unwrap_or_else(|| ROOT.to_string());
                let lcca = self.statechart.lcca(&source, &transition.target).unwrap_or_else(|| ROOT.to_string());
                let exiting = self.statechart.exiting_states(&source, &lcca);
                let entering = self.statechart.entering_states(&transition.target, &lcca);

                let mut actions = self.statechart.exit_actions(&exiting);
                if let Some(action) = &transition.action {
                    actions.push(action.clone());
                }
                actions.extend(self.statechart.entry_actions(&entering));

                tracing::debug!(
                    transition = transition.name.as_str(),
                    exited = ?exiting,
                    entered = ?entering,
                    "transition selected"
                );

                let microstep = Microstep {
                    params: event.params().cloned(),
                    transition: Some(transition),
                    entered: entering,
                    exited: exiting,
                    actions,
                };
                self.apply_microstep(microstep);
            }
        }

        self.context.delete_params();
        Ok(())
    }

    /// Applies one microstep: updates the configuration, saves history for
    /// any exited state that tracks it, appends the microstep to the current
    /// macrostep, folds its actions through the context, raises
    /// `done.state.<parent>` if the new leaf is final, and pulls any
    /// internally raised events into `queue`.
    fn apply_microstep(&mut self, microstep: Microstep) {
        let leaf = microstep
            .entered
            .last()
            .cloned()
            .expect("a microstep must enter at least one state");

        let old_branch = self.configuration.first().cloned().unwrap_or_default();
        for exited_name in &microstep.exited {
            let Some(node) = self.statechart.get(exited_name) else { continue };
            if !node.has_history {
                continue;
            }
            if let Some(pos) = old_branch.iter().position(|s| s == exited_name) {
                self.state_histories.insert(exited_name.clone(), old_branch[..pos].to_vec());
            }
        }

        let mut new_branch = vec![leaf.clone()];
        new_branch.extend(self.statechart.ancestors(&leaf));
        self.configuration = vec![new_branch];

        if let Some(macrostep) = self.macrosteps.front_mut() {
            macrostep.push(microstep);
        }

        let actions: Vec<Action> = self
            .macrosteps
            .front()
            .and_then(|m| m.microsteps.last())
            .map(|m| m.actions.clone())
            .unwrap_or_default();
        let mut ctx = std::mem::take(&mut self.context);
        for action in &actions {
            ctx = action.run(ctx);
        }
        self.context = ctx;

        if let Some(node) = self.statechart.get(&leaf) {
            if node.kind == StateKind::Final {
                if let Some(parent) = &node.parent {
                    self.context.raise_event(format!("done.state.{parent}"));
                }
            }
        }

        for event in self.context.take_queue() {
            self.queue.push_back(event);
        }
    }

    /// Drains the internal queue in FIFO order, running each event's
    /// transition to completion before popping the next, until the queue is
    /// empty or the machine stops (reaches the top-level final state).
    fn drain_internal(&mut self) -> Result<(), ExmError> {
        while let Some(event) = self.queue.pop_front() {
            self.do_transition(event)?;
            if !self.running {
                break;
            }
        }
        Ok(())
    }

    /// The most recently completed (or in-progress) macrostep.
    pub fn last_macrostep(&self) -> Option<&Macrostep> {
        self.macrosteps.front()
    }

    /// The microsteps run during the most recent macrostep, in order.
    pub fn last_microsteps(&self) -> &[Microstep] {
        self.macrosteps.front().map(|m| m.microsteps.as_slice()).unwrap_or(&[])
    }

    /// The event names of the transitions taken during the most recent
    /// macrostep, in order.
    pub fn last_transitions(&self) -> Vec<&str> {
        self.macrosteps
            .front()
            .map(|m| m.transitions.iter().map(|t| t.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// The active branch's state names, leaf first, ending at `"root"`.
    pub fn active_states(&self) -> &[String] {
        self.configuration.first().map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// `true` once `init` has completed and until the machine reaches the
    /// top-level final state.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The machine's current context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The full macrostep log, newest first.
    pub fn macrosteps(&self) -> &VecDeque<Macrostep> {
        &self.macrosteps
    }

    /// The compiled statechart this machine is running.
    pub fn statechart(&self) -> &Statechart {
        &self.statechart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Action, Definition, HistoryKind};
    use serde_json::json;

    fn set(key: &'static str, value: i64) -> Action {
        Action::new(move |mut ctx| {
            ctx.put(key, value);
            ctx
        })
    }

    fn raise(event: &'static str) -> Action {
        Action::new(move |mut ctx| {
            ctx.raise_event(event);
            ctx
        })
    }

    // S1: turn on.
    #[test]
    fn s1_init_enters_initial_leaf() {
        let def = Definition::composite("s1")
            .with_substate("s1", Definition::simple())
            .with_substate("s2", Definition::simple());
        let chart = Arc::new(Statechart::build(def).unwrap());
        let machine = Machine::init(chart, Context::new()).unwrap();

        assert_eq!(machine.active_states(), &["s1".to_string(), ROOT.to_string()]);
        assert!(machine.is_running());
        assert_eq!(machine.macrosteps().len(), 1);
    }

    // S2: entry that raises an internal event.
    #[test]
    fn s2_entry_action_raising_event_drains_within_one_macrostep() {
        let def = Definition::composite("s1")
            .with_substate("s1", Definition::simple().with_entry(raise("evt")).with_transition("evt", "s2"))
            .with_substate("s2", Definition::simple());
        let chart = Arc::new(Statechart::build(def).unwrap());
        let machine = Machine::init(chart, Context::new()).unwrap();

        assert_eq!(machine.active_states(), &["s2".to_string(), ROOT.to_string()]);
        assert_eq!(machine.macrosteps().len(), 1);
        assert_eq!(machine.last_macrostep().unwrap().microsteps.len(), 2);
    }

    // S3: change state back and forth, unknown event is a no-op.
    #[test]
    fn s3_dispatch_transitions_and_ignores_unknown_events() {
        let def = Definition::composite("s1")
            .with_substate("s1", Definition::simple().with_entry(set("foo", 1)).with_transition("e1", "s2"))
            .with_substate("s2", Definition::simple().with_entry(set("foo", 2)).with_transition("e2", "s1"));
        let chart = Arc::new(Statechart::build(def).unwrap());
        let mut ctx = Context::new();
        ctx.put("foo", 0);
        let machine = Machine::init(chart, ctx).unwrap();

        let machine = machine.dispatch("e1").unwrap();
        assert_eq!(machine.active_states(), &["s2".to_string(), ROOT.to_string()]);
        assert_eq!(machine.context().get("foo"), Some(&json!(2)));

        let machine = machine.dispatch("e2").unwrap();
        assert_eq!(machine.active_states(), &["s1".to_string(), ROOT.to_string()]);
        assert_eq!(machine.context().get("foo"), Some(&json!(1)));

        let before = machine.active_states().to_vec();
        let before_foo = machine.context().get("foo").cloned();
        let machine = machine.dispatch("unknown").unwrap();
        assert_eq!(machine.active_states(), before.as_slice());
        assert_eq!(machine.context().get("foo").cloned(), before_foo);
        assert!(machine.last_transitions().is_empty());
    }

    // S4: RTC chain of three internally raised events.
    #[test]
    fn s4_rtc_chain_runs_within_a_single_macrostep() {
        let def = Definition::composite("s1")
            .with_substate("s1", Definition::simple().with_entry(set("foo", 1)).with_transition("e1", "s2"))
            .with_substate("s2", Definition::simple().with_entry(raise("e2")).with_transition("e2", "s3"))
            .with_substate("s3", Definition::simple().with_entry(raise("e3")).with_transition("e3", "s4"))
            .with_substate("s4", Definition::simple().with_entry(set("foo", 4)));
        let chart = Arc::new(Statechart::build(def).unwrap());
        let mut ctx = Context::new();
        ctx.put("foo", 0);
        let machine = Machine::init(chart, ctx).unwrap();

        let machine = machine.dispatch("e1").unwrap();
        assert_eq!(machine.active_states(), &["s4".to_string(), ROOT.to_string()]);
        assert_eq!(machine.context().get("foo"), Some(&json!(4)));
        assert_eq!(machine.last_macrostep().unwrap().microsteps.len(), 3);
        assert_eq!(machine.last_transitions(), vec!["e1", "e2", "e3"]);
    }

    // S5: exit before transition action before entry.
    #[test]
    fn s5_action_ordering_is_exit_then_transition_then_entry() {
        let def = Definition::composite("s1")
            .with_substate(
                "s1",
                Definition::simple()
                    .with_entry(set("foo", 1))
                    .with_exit(set("bar", 1))
                    .with_transition(
                        "e1",
                        TransitionSpec::full("s2", None, Some(set("baz", 1))),
                    ),
            )
            .with_substate(
                "s2",
                Definition::simple()
                    .with_entry(set("foo", 2))
                    .with_exit(set("bar", 2))
                    .with_transition(
                        "e1",
                        TransitionSpec::full("s1", None, Some(set("baz", 2))),
                    ),
            );
        let chart = Arc::new(Statechart::build(def).unwrap());
        let mut ctx = Context::new();
        ctx.put("foo", 0);
        ctx.put("bar", 0);
        ctx.put("baz", 0);
        let machine = Machine::init(chart, ctx).unwrap();
        assert_eq!(machine.context().get("foo"), Some(&json!(1)));
        assert_eq!(machine.context().get("bar"), Some(&json!(0)));
        assert_eq!(machine.context().get("baz"), Some(&json!(0)));

        let machine = machine.dispatch("e1").unwrap();
        assert_eq!(machine.context().get("foo"), Some(&json!(2)));
        assert_eq!(machine.context().get("bar"), Some(&json!(1)));
        assert_eq!(machine.context().get("baz"), Some(&json!(1)));
    }

    // S6: top-level final stops the machine; further dispatch fails.
    #[test]
    fn s6_top_level_final_stops_the_machine() {
        let def = Definition::composite("s1")
            .with_substate(
                "s1",
                Definition::simple().with_entry(set("foo", 1)).with_transition("e1", "exit"),
            )
            .with_substate("exit", Definition::final_state().with_entry(set("bar", 2)));
        let chart = Arc::new(Statechart::build(def).unwrap());
        let mut ctx = Context::new();
        ctx.put("foo", 0);
        let machine = Machine::init(chart, ctx).unwrap();

        let machine = machine.dispatch("e1").unwrap();
        assert_eq!(machine.active_states(), &["exit".to_string(), ROOT.to_string()]);
        assert_eq!(machine.context().get("foo"), Some(&json!(1)));
        assert_eq!(machine.context().get("bar"), Some(&json!(2)));
        assert!(!machine.is_running());

        assert_eq!(machine.dispatch("e1").unwrap_err(), ExmError::NotRunning);
    }

    // S7: nested final propagates done.state.<parent>.
    #[test]
    fn s7_nested_final_propagates_done_state_event() {
        let def = Definition::composite("s1")
            .with_substate(
                "s1",
                Definition::composite("s11")
                    .with_substate("s11", Definition::simple().with_transition("e1", "exit"))
                    .with_substate("exit", Definition::final_state().with_entry(set("bar", 0))),
            )
            .with_substate("s2", Definition::simple().with_entry(set("foo", 2)))
            .with_transition("done.state.s1", "s2");
        let chart = Arc::new(Statechart::build(def).unwrap());
        let mut ctx = Context::new();
        ctx.put("foo", 11);
        let machine = Machine::init(chart, ctx).unwrap();
        assert_eq!(
            machine.active_states(),
            &["s11".to_string(), "s1".to_string(), ROOT.to_string()]
        );

        let machine = machine.dispatch("e1").unwrap();
        assert_eq!(machine.active_states(), &["s2".to_string(), ROOT.to_string()]);
        assert_eq!(machine.context().get("foo"), Some(&json!(2)));
        assert_eq!(machine.context().get("bar"), Some(&json!(0)));
        assert!(machine.is_running());
    }

    #[test]
    fn history_is_recorded_on_exit_but_initial_chain_does_not_resume_it() {
        let def = Definition::composite("p")
            .with_substate(
                "p",
                Definition::composite("a")
                    .with_substate("a", Definition::simple().with_transition("next", "b"))
                    .with_substate("b", Definition::simple().with_transition("leave", "z"))
                    .with_substate("h", Definition::history(HistoryKind::Shallow)),
            )
            .with_substate("z", Definition::simple().with_transition("back", "p"));
        let chart = Arc::new(Statechart::build(def).unwrap());
        let machine = Machine::init(chart, Context::new()).unwrap();
        assert!(machine.statechart().get("p").unwrap().has_history, "`h` is a child of `p`, so `p` carries the history marker");
        let machine = machine.dispatch("next").unwrap();
        assert_eq!(machine.active_states(), &["b".to_string(), "p".to_string(), ROOT.to_string()]);

        // `p` has a history marker (its child `h`), so exiting it on "leave"
        // below does save `p`'s sub-configuration into `state_histories` --
        // but `initial_chain` still doesn't consult it on the way back in.
        let machine = machine.dispatch("leave").unwrap();
        assert_eq!(machine.active_states(), &["z".to_string(), ROOT.to_string()]);
        let machine = machine.dispatch("back").unwrap();
        // Without resume, re-entering `p` always restores its plain initial chain ("a"),
        // never the previously active "b".
        assert_eq!(machine.active_states(), &["a".to_string(), "p".to_string(), ROOT.to_string()]);
    }
}
