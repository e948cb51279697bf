//! jobs: List jobs.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

pub struct Jobs;

#[async_trait]
impl Builtin for Jobs {
    fn name(&self) -> &str {
        "jobs"
    }

    async fn call(&self, _args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let own = ctx.eval.job;
        let mut out = String::new();
        for info in ctx.supervisor().list() {
            // The job running this listing, and foreground pipelines, are
            // not background work.
            if Some(info.id) == own || info.foreground {
                continue;
            }
            out.push_str(&info.to_string());
            out.push('\n');
        }
        ctx.out(&out).await?;
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}
