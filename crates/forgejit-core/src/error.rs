//! Error types for function definitions

use thiserror::Error;

/// A function definition that cannot be lowered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Function name is empty
    #[error("function name must not be empty")]
    EmptyName,

    /// Function name collides with a symbol the backend reserves
    #[error("function name '{0}' uses the reserved prefix")]
    ReservedName(String),

    /// Two definitions share a name
    #[error("function '{0}' is defined more than once")]
    Duplicate(String),

    /// An expression or statement refers to a parameter that does not exist
    #[error("function '{function}': parameter {index} out of range ({arity} parameters)")]
    ParamOutOfRange {
        function: String,
        index: usize,
        arity: usize,
    },

    /// A load or store goes through a parameter that is not a handle
    #[error("function '{function}': parameter {index} is {kind:?}, expected a handle")]
    NotAHandle {
        function: String,
        index: usize,
        kind: crate::ArgKind,
    },

    /// Initializers and finalizers are called without arguments
    #[error("function '{0}': initializers and finalizers take no parameters")]
    LifecycleParams(String),
}
