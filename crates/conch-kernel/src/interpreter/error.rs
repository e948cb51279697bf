//! Language-level errors.

use std::io;

use thiserror::Error;

use crate::parser::ReadError;
use crate::scheduler::ExitStatus;

/// Everything evaluation can fail with.
///
/// Errors unwind to the top-level driver, which reports them and moves on to
/// the next input unit. Bindings committed before the error stay committed.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unbound name: {0}")]
    UnboundName(String),

    #[error("{name}: expected {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("not callable: {0}")]
    NotCallable(String),

    #[error("{context}: expected {expected}, got {got}")]
    TypeMismatch {
        context: String,
        expected: String,
        got: String,
    },

    #[error("{name}: {message}")]
    ProcessSpawn {
        name: String,
        message: String,
        status: ExitStatus,
    },

    #[error("{path}: {message}")]
    RedirectionIo { path: String, message: String },

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Job(String),
}

impl EvalError {
    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        EvalError::WrongArity {
            name: name.into(),
            expected: expected.into(),
            got,
        }
    }

    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        EvalError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Exit status this error leaves in the last-status register.
    pub fn status(&self) -> ExitStatus {
        match self {
            EvalError::ProcessSpawn { status, .. } => *status,
            _ => ExitStatus::FAILURE,
        }
    }
}

impl From<ReadError> for EvalError {
    fn from(err: ReadError) -> Self {
        EvalError::Syntax(err.to_string())
    }
}

impl From<io::Error> for EvalError {
    fn from(err: io::Error) -> Self {
        EvalError::Io(err.to_string())
    }
}

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_errors_keep_their_status() {
        let err = EvalError::ProcessSpawn {
            name: "nope".into(),
            message: "command not found".into(),
            status: ExitStatus::NOT_FOUND,
        };
        assert_eq!(err.status().code(), 127);
        assert_eq!(err.to_string(), "nope: command not found");
        assert_eq!(EvalError::UnboundName("x".into()).status().code(), 1);
    }

    #[test]
    fn arity_message() {
        let err = EvalError::arity("define", "2", 3);
        assert_eq!(err.to_string(), "define: expected 2 argument(s), got 3");
    }
}
