//! status: Read or produce an exit status.
//!
//! `status` yields the last-status register as a status value. `status N`
//! yields status N, which makes it the way to end a script with a chosen
//! exit code. `status VALUE` yields the status VALUE would record.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

pub struct Status;

#[async_trait]
impl Builtin for Status {
    fn name(&self) -> &str {
        "status"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let status = match args.as_slice() {
            [] => ctx.supervisor().last_status(),
            [Value::Status(status)] => *status,
            [value] => match value.as_integer() {
                Some(code) => ExitStatus::from_code(code.clamp(0, 255) as i32),
                None => value.status(),
            },
            _ => return Err(EvalError::arity("status", "0 or 1", args.len())),
        };
        Ok(Value::Status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};

    #[tokio::test]
    async fn reads_the_register() {
        let h = Harness::new();
        h.ctx.supervisor().record_status(ExitStatus::from_code(7));
        let v = h.call(&Status, vec![]).await.unwrap();
        assert_eq!(v, Value::Status(ExitStatus::from_code(7)));
    }

    #[tokio::test]
    async fn makes_statuses() {
        let h = Harness::new();
        assert_eq!(h.call(&Status, words(&["3"])).await.unwrap().status().code(), 3);
        assert_eq!(
            h.call(&Status, vec![Value::Boolean(false)]).await.unwrap().status().code(),
            1
        );
        assert!(h.call(&Status, words(&["x"])).await.unwrap().status().success());
    }
}
