//! The author-facing statechart tree: [`Definition`], [`TransitionSpec`],
//! and the [`Action`]/[`Guard`] capability wrappers around pure functions of
//! the [`Context`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::Context;

/// A pure function `Context -> Context`, run as an entry, exit, or
/// transition action.
///
/// Wrapped in an `Arc` so a [`Definition`] (and the [`crate::statechart::Statechart`]
/// compiled from it) is cheaply `Clone` and safely shared across threads,
/// matching the teacher's `Guard` trait-object convention of identifying a
/// capability by a thin wrapper rather than generic parameters threaded
/// everywhere.
#[derive(Clone)]
pub struct Action(Arc<dyn Fn(Context) -> Context + Send + Sync>);

impl Action {
    /// Wraps a plain closure as an [`Action`].
    pub fn new(f: impl Fn(Context) -> Context + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Runs the action against `ctx`, producing the next context.
    pub fn run(&self, ctx: Context) -> Context {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// A pure predicate `&Context -> bool`, evaluated before a transition fires.
#[derive(Clone)]
pub struct Guard(Arc<dyn Fn(&Context) -> bool + Send + Sync>);

impl Guard {
    /// Wraps a plain closure as a [`Guard`].
    pub fn new(f: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Evaluates the guard against `ctx`.
    pub fn check(&self, ctx: &Context) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

/// A single outbound transition, keyed by event name on its source state.
#[derive(Debug, Clone)]
pub enum TransitionSpec {
    /// A bare target name; no guard, no action.
    Target(String),
    /// A fully specified transition.
    Full {
        target: String,
        guard: Option<Guard>,
        action: Option<Action>,
    },
}

impl TransitionSpec {
    pub fn target(&self) -> &str {
        match self {
            TransitionSpec::Target(target) => target,
            TransitionSpec::Full { target, .. } => target,
        }
    }

    /// A transition with a guard and no action.
    pub fn guarded(target: impl Into<String>, guard: Guard) -> Self {
        TransitionSpec::Full { target: target.into(), guard: Some(guard), action: None }
    }

    /// A fully specified transition.
    pub fn full(target: impl Into<String>, guard: Option<Guard>, action: Option<Action>) -> Self {
        TransitionSpec::Full { target: target.into(), guard, action }
    }
}

impl From<&str> for TransitionSpec {
    fn from(target: &str) -> Self {
        TransitionSpec::Target(target.to_string())
    }
}

impl From<String> for TransitionSpec {
    fn from(target: String) -> Self {
        TransitionSpec::Target(target)
    }
}

/// The kind of history a [`Definition::History`] pseudostate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// Remembers only the direct child that was active when last exited.
    Shallow,
    /// Remembers the full nested configuration that was active when last exited.
    Deep,
}

/// The author-facing statechart tree. A `State` with empty `substates` is a
/// simple (leaf) state; a `State` with one or more `substates` is composite.
/// A composite with empty `substates` is invalid (rejected at `build` time).
#[derive(Debug, Clone)]
pub enum Definition {
    State {
        initial: Option<String>,
        substates: IndexMap<String, Definition>,
        transitions: IndexMap<String, TransitionSpec>,
        entry: Option<Action>,
        exit: Option<Action>,
    },
    Final {
        entry: Option<Action>,
    },
    History {
        kind: HistoryKind,
    },
}

impl Definition {
    /// A simple (leaf) state with no substates.
    pub fn simple() -> Self {
        Definition::State {
            initial: None,
            substates: IndexMap::new(),
            transitions: IndexMap::new(),
            entry: None,
            exit: None,
        }
    }

    /// A composite state with the given initial substate name.
    pub fn composite(initial: impl Into<String>) -> Self {
        Definition::State {
            initial: Some(initial.into()),
            substates: IndexMap::new(),
            transitions: IndexMap::new(),
            entry: None,
            exit: None,
        }
    }

    /// A final state.
    pub fn final_state() -> Self {
        Definition::Final { entry: None }
    }

    /// A history pseudostate of the given kind.
    pub fn history(kind: HistoryKind) -> Self {
        Definition::History { kind }
    }

    /// Attaches an entry action. No-op on `History` (history pseudostates
    /// have no actions of their own).
    pub fn with_entry(mut self, action: Action) -> Self {
        match &mut self {
            Definition::State { entry, .. } | Definition::Final { entry } => {
                *entry = Some(action);
            }
            Definition::History { .. } => {}
        }
        self
    }

    /// Attaches an exit action. Only meaningful on `State`.
    pub fn with_exit(mut self, action: Action) -> Self {
        if let Definition::State { exit, .. } = &mut self {
            *exit = Some(action);
        }
        self
    }

    /// Adds a named substate. Only meaningful on `State`.
    pub fn with_substate(mut self, name: impl Into<String>, substate: Definition) -> Self {
        if let Definition::State { substates, .. } = &mut self {
            substates.insert(name.into(), substate);
        }
        self
    }

    /// Adds a transition for `event`. Only meaningful on `State`.
    pub fn with_transition(mut self, event: impl Into<String>, spec: impl Into<TransitionSpec>) -> Self {
        if let Definition::State { transitions, .. } = &mut self {
            transitions.insert(event.into(), spec.into());
        }
        self
    }
}
