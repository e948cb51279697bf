//! kill: Send a signal to jobs.
//!
//! `kill [-SIG] JOB...` where SIG is a name (`INT`, `SIGTERM`) or number.
//! The default is TERM. Every process of the job gets the signal; its
//! in-process tasks are cancelled by INT, HUP, TERM and KILL.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::scheduler::{ExitStatus, JobEvent};
use crate::tools::{Builtin, ExecContext};

pub struct Kill;

#[async_trait]
impl Builtin for Kill {
    fn name(&self) -> &str {
        "kill"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let (event, targets) = match args.split_first() {
            Some((first, rest)) if first.as_text().is_some_and(|t| t.starts_with('-')) => {
                let name = first.as_text().unwrap_or_default();
                match JobEvent::from_signal_name(name) {
                    Some(event) => (event, rest),
                    None => return ctx.fail("kill", format!("{name}: unknown signal")).await,
                }
            }
            _ => (JobEvent::Terminate, args.as_slice()),
        };
        if targets.is_empty() {
            return Err(EvalError::arity("kill", "at least 1 job", 0));
        }

        for target in targets {
            let id = ctx.job("kill", Some(target))?;
            tracing::debug!(job = %id, ?event, "kill");
            ctx.supervisor().signal(id, event.clone());
        }
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};
    use rstest::rstest;

    #[rstest]
    #[case::default(&[], 15)]
    #[case::by_name(&["-INT"], 2)]
    #[case::by_number(&["-9"], 9)]
    #[tokio::test]
    async fn cancels_in_process_work(#[case] flags: &[&str], #[case] signal: i32) {
        let h = Harness::new();
        let sup = h.ctx.supervisor();
        let id = sup.create_body_job("work");
        let mut cancel = sup.cancellation(id).unwrap();

        let mut args = words(flags);
        args.push(Value::Job(id));
        assert!(h.call(&Kill, args).await.unwrap().status().success());
        assert_eq!(crate::scheduler::cancelled(&mut cancel).await, signal);
    }

    #[tokio::test]
    async fn unknown_signal_fails() {
        let h = Harness::new();
        let id = h.ctx.supervisor().create_body_job("work");
        let args = vec![Value::atom("-BOGUS"), Value::Job(id)];
        assert_eq!(h.call(&Kill, args).await.unwrap().status().code(), 1);
        assert_eq!(h.err(), "kill: -BOGUS: unknown signal\n");
    }
}
