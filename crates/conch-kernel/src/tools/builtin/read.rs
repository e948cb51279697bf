//! read: Read one value from stdin.
//!
//! From a pipe the value arrives unchanged; from text input one line is
//! decoded with the value syntax. At end of input the result is nil.
//! `read -l` returns the raw line as a string instead.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::tools::{Builtin, ExecContext};

pub struct Read;

#[async_trait]
impl Builtin for Read {
    fn name(&self) -> &str {
        "read"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let stdin = &ctx.io().stdin;
        let value = match args.as_slice() {
            [] => stdin.read_value().await?,
            [flag] if flag.as_text() == Some("-l") => stdin.read_line().await?.map(Value::Str),
            _ => return Err(EvalError::arity("read", "0 or -l", args.len())),
        };
        Ok(value.unwrap_or(Value::Nil))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Pipe, Source};
    use crate::tools::builtin::testing::{words, Harness};

    #[tokio::test]
    async fn reads_values_from_a_pipe_then_nil() {
        let mut h = Harness::new();
        let pipe = Pipe::queue(4);
        let value = Value::list(vec![Value::atom("a"), Value::Integer(2)]);
        pipe.write_value(&value).await.unwrap();
        pipe.close_writer().await;
        h.ctx.io.stdin = Source::Pipe(pipe);

        assert_eq!(h.call(&Read, vec![]).await.unwrap(), value);
        assert_eq!(h.call(&Read, vec![]).await.unwrap(), Value::Nil);
    }

    #[tokio::test]
    async fn reads_raw_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in");
        std::fs::write(&path, "a (b\n").unwrap();
        let mut h = Harness::new();
        h.ctx.io.stdin = Source::open(&path).unwrap();
        assert_eq!(h.call(&Read, words(&["-l"])).await.unwrap(), Value::string("a (b"));
    }
}
