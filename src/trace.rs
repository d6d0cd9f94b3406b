//! Value records produced by the interpreter: one [`Microstep`] per
//! transition taken, aggregated into one [`Macrostep`] per dispatched
//! external event (plus the internal events drained alongside it).

use serde_json::Value;

use crate::definition::Action;
use crate::statechart::CompiledTransition;

/// A single transition: an exit set, an optional transition action, and an
/// entry set, applied in that order. A microstep with no `transition` is the
/// machine's initial entry.
#[derive(Debug, Clone, Default)]
pub struct Microstep {
    pub transition: Option<CompiledTransition>,
    pub params: Option<Value>,
    pub entered: Vec<String>,
    pub exited: Vec<String>,
    pub actions: Vec<Action>,
}

/// The trace of one external event processed to quiescence: the initiating
/// event plus every microstep run while draining the internal queue.
#[derive(Debug, Clone)]
pub struct Macrostep {
    pub timestamp: u64,
    pub event: Option<String>,
    pub transitions: Vec<CompiledTransition>,
    pub entered: Vec<String>,
    pub exited: Vec<String>,
    pub actions: Vec<Action>,
    pub microsteps: Vec<Microstep>,
}

impl Macrostep {
    /// A fresh, empty macrostep, as seeded at `init` time or pushed at the
    /// start of each `dispatch`.
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            event: None,
            transitions: Vec::new(),
            entered: Vec::new(),
            exited: Vec::new(),
            actions: Vec::new(),
            microsteps: Vec::new(),
        }
    }

    /// Appends a microstep, folding its sets into this macrostep's aggregate
    /// `entered`/`exited`/`actions`/`transitions`.
    pub fn push(&mut self, microstep: Microstep) {
        if let Some(transition) = &microstep.transition {
            self.transitions.push(transition.clone());
        }
        self.entered.extend(microstep.entered.iter().cloned());
        self.exited.extend(microstep.exited.iter().cloned());
        self.actions.extend(microstep.actions.iter().cloned());
        self.microsteps.push(microstep);
    }
}
