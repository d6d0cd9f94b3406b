use thiserror::Error;

/// Errors raised while compiling a [`crate::definition::Definition`] into a
/// [`crate::statechart::Statechart`], or while driving a
/// [`crate::machine::Machine`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExmError {
    #[error("root definition must be a non-empty composite state")]
    InvalidDefinition,

    #[error("state `{parent}` declares initial `{initial}`, which is not one of its descendants")]
    NotValidInitial { initial: String, parent: String },

    #[error("transition references undefined state `{name}`")]
    NotDefinedState { name: String },

    #[error("state name `{name}` is declared more than once")]
    DuplicatedState { name: String },

    #[error("dispatch called on a machine that is not running")]
    NotRunning,
}
