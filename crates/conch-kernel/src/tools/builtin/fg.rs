//! fg: Continue a job in the foreground.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::tools::{Builtin, ExecContext};

pub struct Fg;

#[async_trait]
impl Builtin for Fg {
    fn name(&self) -> &str {
        "fg"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        if args.len() > 1 {
            return Err(EvalError::arity("fg", "0 or 1", args.len()));
        }
        let id = ctx.job("fg", args.first())?;
        if let Some(info) = ctx.supervisor().get(id) {
            ctx.out(&format!("{}\n", info.command)).await?;
        }
        match ctx.supervisor().resume(id, true).await {
            Some(status) => Ok(Value::Status(status)),
            None => ctx.fail("fg", format!("%{id}: job has terminated")).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::Harness;

    #[tokio::test]
    async fn no_current_job() {
        let h = Harness::new();
        let err = h.call(&Fg, vec![]).await.unwrap_err();
        assert!(matches!(err, EvalError::Job(_)));
        assert_eq!(err.to_string(), "fg: no current job");
    }
}
