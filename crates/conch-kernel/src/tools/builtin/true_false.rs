//! true/false: constant statuses.
//!
//! `true` yields status 0 and `false` status 1. Used with `&&`, `||` and as
//! `if` conditions: `if (false) a b`.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

/// True builtin: always succeeds.
pub struct True;

#[async_trait]
impl Builtin for True {
    fn name(&self) -> &str {
        "true"
    }

    async fn call(&self, _args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

/// False builtin: always fails with status 1.
pub struct False;

#[async_trait]
impl Builtin for False {
    fn name(&self) -> &str {
        "false"
    }

    async fn call(&self, _args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        Ok(Value::Status(ExitStatus::FAILURE))
    }
}
