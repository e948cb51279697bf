//! wait: Wait for jobs to finish.
//!
//! `wait JOB` waits for one job and yields its status. Bare `wait` waits for
//! every unfinished job and yields the status of the last one.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

pub struct Wait;

#[async_trait]
impl Builtin for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let sup = ctx.supervisor();
        let targets = if args.is_empty() {
            // Waiting on the job we run in would never return.
            sup.live_jobs()
                .into_iter()
                .filter(|id| Some(*id) != ctx.eval.job && !sup.is_foreground(*id))
                .collect()
        } else {
            args.iter()
                .map(|arg| ctx.job("wait", Some(arg)))
                .collect::<EvalResult<Vec<_>>>()?
        };

        let mut status = ExitStatus::SUCCESS;
        for id in targets {
            tracing::debug!(job = %id, "waiting");
            status = sup.wait_job(id).await.unwrap_or(ExitStatus::FAILURE);
        }
        Ok(Value::Status(status))
    }
}
