//! bg: Continue stopped jobs in the background.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

pub struct Bg;

#[async_trait]
impl Builtin for Bg {
    fn name(&self) -> &str {
        "bg"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let ids = if args.is_empty() {
            vec![ctx.job("bg", None)?]
        } else {
            args.iter()
                .map(|arg| ctx.job("bg", Some(arg)))
                .collect::<EvalResult<Vec<_>>>()?
        };
        for id in ids {
            let Some(info) = ctx.supervisor().get(id) else {
                continue;
            };
            if ctx.supervisor().resume(id, false).await.is_none() {
                return ctx.fail("bg", format!("%{id}: job has terminated")).await;
            }
            ctx.out(&format!("[{id}]+ {} &\n", info.command)).await?;
        }
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobEvent, JobState};
    use crate::tools::builtin::testing::Harness;

    #[tokio::test]
    async fn announces_the_resumed_job() {
        let h = Harness::new();
        let sup = h.ctx.supervisor();
        let id = sup.create_body_job("long work");

        let v = h.call(&Bg, vec![Value::atom(format!("%{id}"))]).await.unwrap();
        assert!(v.status().success());
        assert_eq!(h.out(), format!("[{id}]+ long work &\n"));
        assert_eq!(sup.get(id).map(|j| j.state), Some(JobState::Running));

        sup.signal(id, JobEvent::Kill);
    }
}
