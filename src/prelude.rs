//! Convenience re-export of the crate's common surface.

pub use crate::{
    context::{Context, Event},
    definition::{Action, Definition, Guard, HistoryKind, TransitionSpec},
    error::ExmError,
    machine::Machine,
    statechart::{CompiledTransition, StateKind, StateNode, Statechart, ROOT},
    trace::{Macrostep, Microstep},
};
