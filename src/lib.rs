//! `exm` is a hierarchical statechart interpreter following the Harel
//! statechart formalism, with semantics aligned to SCXML/SISMIC: a
//! `Definition` tree compiles into a flat `Statechart`, a `Machine` is
//! initialized from `(Statechart, Context)`, and each dispatched event runs
//! to completion — exiting, transitioning, entering, then draining any
//! internally raised events — before control returns to the caller.
//!
//! The core is pure and value-oriented: `Machine::init` and `Machine::dispatch`
//! each take ownership of their inputs and return a fresh `Machine`. Nothing
//! is shared between machines except the immutable, `Arc`-wrapped compiled
//! `Statechart`, which a caller may reuse across as many `Machine` instances
//! as they like.
//!
//! ```
//! use exm::prelude::*;
//!
//! let def = Definition::composite("off")
//!     .with_substate("off", Definition::simple().with_transition("flip", "on"))
//!     .with_substate("on", Definition::simple().with_transition("flip", "off"));
//!
//! let chart = std::sync::Arc::new(Statechart::build(def).unwrap());
//! let machine = Machine::init(chart, Context::new()).unwrap();
//! assert_eq!(machine.active_states(), &["off".to_string(), ROOT.to_string()]);
//!
//! let machine = machine.dispatch("flip").unwrap();
//! assert_eq!(machine.active_states(), &["on".to_string(), ROOT.to_string()]);
//! ```
//!
//! Regions, choice pseudostates, do-activities, and history-state *resume*
//! are explicit non-goals of this core (see the design notes on each
//! module); history is compiled and its exit configuration recorded, but
//! `Statechart::initial_chain` does not yet substitute it back in.

pub mod context;
pub mod definition;
pub mod error;
pub mod machine;
pub mod prelude;
pub mod statechart;
pub mod trace;

pub use context::{Context, Event};
pub use definition::{Action, Definition, Guard, HistoryKind, TransitionSpec};
pub use error::ExmError;
pub use machine::Machine;
pub use statechart::{CompiledTransition, StateKind, StateNode, Statechart, ROOT};
pub use trace::{Macrostep, Microstep};
