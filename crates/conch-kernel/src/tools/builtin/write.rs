//! write: Write values to stdout.
//!
//! Each argument is one value. Into a pipe it travels as-is; into text
//! output it is printed in value syntax on its own line, so a reader on the
//! other side gets an equal value back.

use std::io::ErrorKind;

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

pub struct Write;

#[async_trait]
impl Builtin for Write {
    fn name(&self) -> &str {
        "write"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        for value in &args {
            match ctx.io().stdout.write_value(value).await {
                Ok(()) => {}
                // The reader went away; stop quietly like a process would.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    return Ok(Value::Status(ExitStatus::FAILURE));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Pipe, Sink};
    use crate::tools::builtin::testing::Harness;

    #[tokio::test]
    async fn text_output_uses_value_syntax() {
        let h = Harness::new();
        let args = vec![Value::string("two words"), Value::list(vec![Value::atom("a")])];
        h.call(&Write, args).await.unwrap();
        assert_eq!(h.out(), "\"two words\"\n(a)\n");
    }

    #[tokio::test]
    async fn pipes_carry_values_unchanged() {
        let mut h = Harness::new();
        let pipe = Pipe::queue(4);
        h.ctx.io.stdout = Sink::Pipe(pipe.clone());
        h.call(&Write, vec![Value::Integer(5)]).await.unwrap();
        assert_eq!(pipe.read_value().await.unwrap(), Some(Value::Integer(5)));
    }

    #[tokio::test]
    async fn closed_reader_fails_quietly() {
        let mut h = Harness::new();
        let pipe = Pipe::queue(4);
        pipe.close_reader().await;
        h.ctx.io.stdout = Sink::Pipe(pipe);
        let v = h.call(&Write, vec![Value::atom("x")]).await.unwrap();
        assert_eq!(v.status().code(), 1);
    }
}
