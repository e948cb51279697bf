//! Built-in commands for conch.
//!
//! These are always available and provide the core vocabulary of the
//! language: status words, arithmetic, list building, value I/O and job
//! control.

mod arith;
mod bg;
mod cd;
pub(crate) mod clone;
mod echo;
mod fg;
mod jobs;
mod kill;
mod list;
pub(crate) mod pipe;
mod pwd;
mod read;
mod status;
mod true_false;
mod wait;
mod write;

use std::sync::Arc;

use super::Builtin;

/// Every global builtin.
pub fn all() -> Vec<Arc<dyn Builtin>> {
    vec![
        Arc::new(true_false::True),
        Arc::new(true_false::False),
        Arc::new(echo::Echo),
        Arc::new(cd::Cd),
        Arc::new(pwd::Pwd),
        Arc::new(arith::Integer),
        Arc::new(arith::Arith::Add),
        Arc::new(arith::Arith::Sub),
        Arc::new(arith::Arith::Mul),
        Arc::new(arith::Arith::Div),
        Arc::new(arith::Arith::Mod),
        Arc::new(arith::Compare::Eq),
        Arc::new(arith::Compare::Lt),
        Arc::new(arith::Compare::Gt),
        Arc::new(arith::Not),
        Arc::new(list::List),
        Arc::new(status::Status),
        Arc::new(read::Read),
        Arc::new(write::Write),
        Arc::new(jobs::Jobs),
        Arc::new(wait::Wait),
        Arc::new(fg::Fg),
        Arc::new(bg::Bg),
        Arc::new(kill::Kill),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::interpreter::{Context, EvalResult, Shell, Value};
    use crate::scheduler::{Io, Sink, Source, Supervisor};
    use crate::tools::{Builtin, ExecContext};

    /// A context with captured output and no input.
    pub(crate) struct Harness {
        pub ctx: Context,
        pub out: Arc<Mutex<Vec<u8>>>,
        pub err: Arc<Mutex<Vec<u8>>>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::in_dir(&std::env::temp_dir())
        }

        pub fn in_dir(cwd: &Path) -> Self {
            let shell = Shell::new(Supervisor::new(None), cwd.to_path_buf(), 4);
            let (out_sink, out) = Sink::capture();
            let (err_sink, err) = Sink::capture();
            let io = Io {
                stdin: Source::Null,
                stdout: out_sink,
                stderr: err_sink,
            };
            Self {
                ctx: Context::new(shell, io),
                out,
                err,
            }
        }

        pub async fn call(&self, builtin: &dyn Builtin, args: Vec<Value>) -> EvalResult<Value> {
            builtin.call(args, &ExecContext::new(&self.ctx, None)).await
        }

        pub async fn call_on(
            &self,
            builtin: &dyn Builtin,
            receiver: &Value,
            args: Vec<Value>,
        ) -> EvalResult<Value> {
            builtin
                .call(args, &ExecContext::new(&self.ctx, Some(receiver)))
                .await
        }

        pub fn out(&self) -> String {
            String::from_utf8(self.out.lock().unwrap().clone()).unwrap()
        }

        pub fn err(&self) -> String {
            String::from_utf8(self.err.lock().unwrap().clone()).unwrap()
        }
    }

    pub(crate) fn words(words: &[&str]) -> Vec<Value> {
        words.iter().map(|w| Value::atom(*w)).collect()
    }
}
