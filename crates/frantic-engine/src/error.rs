//! Engine error types

use crate::task::TaskId;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of a task lifecycle callback
pub type TaskResult<T = ()> = Result<T, BuildFailure>;

/// Failures of the engine itself, raised before or outside task execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("The execution root '{root}' is not an ancestor of the execution task '{task}'")]
    RootNotAncestor { root: String, task: String },

    #[error("Unknown task handle: {id}")]
    UnknownTask { id: TaskId },

    #[error("Undefined property: {name}")]
    UndefinedProperty { name: String },

    #[error("Property substitution exceeded {limit} replacements")]
    SubstitutionLimit { limit: usize, partial: String },
}

/// A build failure raised by a task's `init`, `validate` or `execute` callback
///
/// The engine reports it through a task-exception event and carries on with the
/// rest of the execution stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildFailure {
    #[error("{message}")]
    Failed { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("I/O error while {context}: {message}")]
    Io { context: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl BuildFailure {
    /// Create a generic build failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an I/O failure with context
    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: error.to_string(),
        }
    }
}
