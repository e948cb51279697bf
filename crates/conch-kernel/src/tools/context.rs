//! Execution context for builtins.

use std::sync::Arc;

use crate::interpreter::{Context, EvalError, EvalResult, Shell, Value};
use crate::scheduler::{ExitStatus, Io, JobId, Supervisor};

/// What a builtin call sees: the evaluation context it was applied in and
/// the receiver it was bound to, if it was reached as a member.
pub struct ExecContext<'a> {
    pub eval: &'a Context,
    pub receiver: Option<&'a Value>,
}

impl<'a> ExecContext<'a> {
    pub fn new(eval: &'a Context, receiver: Option<&'a Value>) -> Self {
        Self { eval, receiver }
    }

    pub fn io(&self) -> &Io {
        &self.eval.io
    }

    pub fn shell(&self) -> &Arc<Shell> {
        &self.eval.shell
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        self.eval.supervisor()
    }

    /// Write text to the task's stdout.
    pub async fn out(&self, text: &str) -> EvalResult<()> {
        self.eval.io.stdout.write_text(text).await.map_err(EvalError::from)
    }

    /// Report a command failure on stderr and return status 1.
    ///
    /// Failures of the command itself are statuses, not language errors, so
    /// `&&` and `||` can act on them.
    pub async fn fail(&self, name: &str, message: impl std::fmt::Display) -> EvalResult<Value> {
        let line = format!("{name}: {message}\n");
        if let Err(e) = self.eval.io.stderr.write_text(&line).await {
            tracing::debug!(error = %e, "stderr write failed");
        }
        Ok(Value::Status(ExitStatus::FAILURE))
    }

    /// Resolve a job argument: a job handle, `N` or `%N`. With none, the
    /// current job.
    pub fn job(&self, name: &str, arg: Option<&Value>) -> EvalResult<JobId> {
        let id = match arg {
            None => self.supervisor().current_job(),
            Some(Value::Job(id)) => Some(*id),
            Some(other) => {
                let text = other.to_string();
                let number = text.strip_prefix('%').unwrap_or(&text);
                number.parse().ok().map(JobId)
            }
        };
        let missing = || match arg {
            Some(arg) => EvalError::Job(format!("{name}: {arg}: no such job")),
            None => EvalError::Job(format!("{name}: no current job")),
        };
        let id = id.ok_or_else(missing)?;
        if self.supervisor().get(id).is_none() {
            return Err(missing());
        }
        Ok(id)
    }

    /// The receiver, which must be present for member builtins.
    pub fn receiver(&self, name: &str) -> EvalResult<&'a Value> {
        self.receiver
            .ok_or_else(|| EvalError::type_mismatch(name, "receiver", "none"))
    }
}
