//! The compiled, flat, addressable state graph and its graph queries.

use indexmap::{IndexMap, IndexSet};

use crate::definition::{Action, Definition, Guard, HistoryKind, TransitionSpec};
use crate::error::ExmError;

/// The name reserved for the top of the compiled graph.
pub const ROOT: &str = "root";

/// The kind of a compiled state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Simple,
    Composite,
    Final,
    ShallowHistory,
    DeepHistory,
}

/// A transition compiled onto a single state, keyed by event name.
#[derive(Debug, Clone)]
pub struct CompiledTransition {
    pub name: String,
    pub target: String,
    pub guard: Option<Guard>,
    pub action: Option<Action>,
}

/// Per-state metadata in the compiled graph.
#[derive(Debug, Clone)]
pub struct StateNode {
    pub name: String,
    pub kind: StateKind,
    pub parent: Option<String>,
    pub children: IndexSet<String>,
    pub initial: Option<String>,
    pub transitions: IndexMap<String, CompiledTransition>,
    pub entry: Option<Action>,
    pub exit: Option<Action>,
    pub has_history: bool,
}

/// The compiled statechart: a flat `name -> node` map derived from a
/// [`Definition`], immutable once built.
#[derive(Debug, Clone)]
pub struct Statechart {
    nodes: IndexMap<String, StateNode>,
}

impl Statechart {
    /// Compiles a `Definition` tree into a flat, validated `Statechart`.
    pub fn build(definition: Definition) -> Result<Statechart, ExmError> {
        let root_is_nonempty_composite =
            matches!(&definition, Definition::State { substates, .. } if !substates.is_empty());
        if !root_is_nonempty_composite {
            return Err(ExmError::InvalidDefinition);
        }

        let mut nodes = IndexMap::new();
        compile_node(ROOT.to_string(), None, definition, &mut nodes)?;

        let chart = Statechart { nodes };
        chart.validate_initials()?;
        chart.validate_transition_targets()?;
        Ok(chart)
    }

    fn validate_initials(&self) -> Result<(), ExmError> {
        for node in self.nodes.values() {
            if node.kind != StateKind::Composite {
                continue;
            }
            match &node.initial {
                None => return Err(ExmError::InvalidDefinition),
                Some(initial) => {
                    if !self.descendants(&node.name).contains(initial) {
                        return Err(ExmError::NotValidInitial {
                            initial: initial.clone(),
                            parent: node.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_transition_targets(&self) -> Result<(), ExmError> {
        for node in self.nodes.values() {
            for transition in node.transitions.values() {
                if !self.nodes.contains_key(&transition.target) {
                    return Err(ExmError::NotDefinedState { name: transition.target.clone() });
                }
            }
        }
        Ok(())
    }

    /// Looks up a compiled node by name.
    pub fn get(&self, name: &str) -> Option<&StateNode> {
        self.nodes.get(name)
    }

    /// The full compiled node map, in build order.
    pub fn nodes(&self) -> &IndexMap<String, StateNode> {
        &self.nodes
    }

    /// Ancestors of `name`, nearest parent first, ending at (and including) `"root"`.
    /// Empty for `"root"` itself.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut current = self.nodes.get(name).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            current = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            result.push(parent);
        }
        result
    }

    /// Ancestors of `name`, stopping before (not including) `until`.
    pub fn ancestors_until(&self, name: &str, until: &str) -> Vec<String> {
        self.ancestors(name).into_iter().take_while(|a| a != until).collect()
    }

    /// All transitive descendants of `name` (not including `name` itself).
    pub fn descendants(&self, name: &str) -> IndexSet<String> {
        let mut result = IndexSet::new();
        if let Some(node) = self.nodes.get(name) {
            let mut stack: Vec<String> = node.children.iter().cloned().collect();
            while let Some(child) = stack.pop() {
                if result.insert(child.clone()) {
                    if let Some(child_node) = self.nodes.get(&child) {
                        stack.extend(child_node.children.iter().cloned());
                    }
                }
            }
        }
        result
    }

    /// `[name, initial(name), initial(initial(name)), ...]`, stopping when a
    /// state has no `initial`. A history state is currently a leaf here (does
    /// not resume; see the design notes on history).
    pub fn initial_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        while let Some(next) = self.nodes.get(&current).and_then(|n| n.initial.clone()) {
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// The entry actions present on `states`, in the given order.
    pub fn entry_actions(&self, states: &[String]) -> Vec<Action> {
        states
            .iter()
            .filter_map(|s| self.nodes.get(s).and_then(|n| n.entry.clone()))
            .collect()
    }

    /// The exit actions present on `states`, in the given order.
    pub fn exit_actions(&self, states: &[String]) -> Vec<Action> {
        states
            .iter()
            .filter_map(|s| self.nodes.get(s).and_then(|n| n.exit.clone()))
            .collect()
    }

    /// The transition compiled directly onto `state` for `event`, if any.
    pub fn transition_for(&self, state: &str, event: &str) -> Option<&CompiledTransition> {
        self.nodes.get(state).and_then(|n| n.transitions.get(event))
    }

    /// The least common compound ancestor of `source` and `target`: the
    /// deepest state that has both as descendants. `None` if no such state
    /// exists (e.g. `source` is `"root"`).
    ///
    /// Walks `ancestors(source)` from nearest to farthest and returns the
    /// first one whose descendant set contains `target` — this naturally
    /// handles `source == target` (self-transitions), since the walk starts
    /// at `source`'s parent, never at `source` itself.
    pub fn lcca(&self, source: &str, target: &str) -> Option<String> {
        self.ancestors(source)
            .into_iter()
            .find(|ancestor| self.descendants(ancestor).contains(target))
    }

    /// States exited when transitioning from `source` with the given `lcca`:
    /// the source itself, then its ancestors up to (not including) the lcca.
    pub fn exiting_states(&self, source: &str, lcca: &str) -> Vec<String> {
        let mut result = vec![source.to_string()];
        result.extend(self.ancestors_until(source, lcca));
        result
    }

    /// States entered when transitioning to `target` with the given `lcca`:
    /// the ancestors of `target` up to (not including) the lcca, parent
    /// first, followed by `target`'s initial chain.
    pub fn entering_states(&self, target: &str, lcca: &str) -> Vec<String> {
        let mut result: Vec<String> = self.ancestors_until(target, lcca).into_iter().rev().collect();
        result.extend(self.initial_chain(target));
        result
    }
}

fn compile_node(
    name: String,
    parent: Option<String>,
    definition: Definition,
    nodes: &mut IndexMap<String, StateNode>,
) -> Result<(), ExmError> {
    if nodes.contains_key(&name) {
        return Err(ExmError::DuplicatedState { name });
    }

    match definition {
        Definition::State { initial, substates, transitions, entry, exit } => {
            let kind = if substates.is_empty() { StateKind::Simple } else { StateKind::Composite };
            let children: IndexSet<String> = substates.keys().cloned().collect();
            let compiled_transitions = compile_transitions(transitions);

            nodes.insert(
                name.clone(),
                StateNode {
                    name: name.clone(),
                    kind,
                    parent,
                    children: children.clone(),
                    initial,
                    transitions: compiled_transitions,
                    entry,
                    exit,
                    has_history: false,
                },
            );

            for (child_name, child_def) in substates {
                compile_node(child_name, Some(name.clone()), child_def, nodes)?;
            }

            let has_history = children.iter().any(|child| {
                matches!(
                    nodes.get(child).map(|n| n.kind),
                    Some(StateKind::ShallowHistory) | Some(StateKind::DeepHistory)
                )
            });
            if let Some(node) = nodes.get_mut(&name) {
                node.has_history = has_history;
            }

            Ok(())
        }
        Definition::Final { entry } => {
            nodes.insert(
                name.clone(),
                StateNode {
                    name,
                    kind: StateKind::Final,
                    parent,
                    children: IndexSet::new(),
                    initial: None,
                    transitions: IndexMap::new(),
                    entry,
                    exit: None,
                    has_history: false,
                },
            );
            Ok(())
        }
        Definition::History { kind } => {
            let kind = match kind {
                HistoryKind::Shallow => StateKind::ShallowHistory,
                HistoryKind::Deep => StateKind::DeepHistory,
            };
            nodes.insert(
                name.clone(),
                StateNode {
                    name,
                    kind,
                    parent,
                    children: IndexSet::new(),
                    initial: None,
                    transitions: IndexMap::new(),
                    entry: None,
                    exit: None,
                    has_history: false,
                },
            );
            Ok(())
        }
    }
}

fn compile_transitions(transitions: IndexMap<String, TransitionSpec>) -> IndexMap<String, CompiledTransition> {
    transitions
        .into_iter()
        .map(|(event, spec)| {
            let (target, guard, action) = match spec {
                TransitionSpec::Target(target) => (target, None, None),
                TransitionSpec::Full { target, guard, action } => (target, guard, action),
            };
            (event.clone(), CompiledTransition { name: event, target, guard, action })
        })
        .collect()
}
