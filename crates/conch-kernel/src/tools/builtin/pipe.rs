//! Members of pipe values: `$p::read`, `$p::write`, `$p::close` and
//! `$p::reader-close`.
//!
//! `read` waits for a value and yields nil at EOF. `write` waits while the
//! pipe is full; `write -n` instead yields false when it would wait.
//! `close` ends the stream for the reader and yields true only the first
//! time. `reader-close` makes further writes fail.

use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::scheduler::{ExitStatus, Pipe};
use crate::tools::{Builtin, ExecContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMember {
    Read,
    Write,
    Close,
    ReaderClose,
}

/// The builtin behind a pipe member name.
pub(crate) fn member(name: &str) -> Option<Arc<dyn Builtin>> {
    let member = match name {
        "read" => PipeMember::Read,
        "write" => PipeMember::Write,
        "close" => PipeMember::Close,
        "reader-close" => PipeMember::ReaderClose,
        _ => return None,
    };
    Some(Arc::new(member))
}

fn receiver<'a>(name: &str, ctx: &ExecContext<'a>) -> EvalResult<&'a Pipe> {
    match ctx.receiver(name)? {
        Value::Pipe(pipe) => Ok(pipe),
        other => Err(EvalError::type_mismatch(name, "pipe", other.to_syntax())),
    }
}

#[async_trait]
impl Builtin for PipeMember {
    fn name(&self) -> &str {
        match self {
            PipeMember::Read => "read",
            PipeMember::Write => "write",
            PipeMember::Close => "close",
            PipeMember::ReaderClose => "reader-close",
        }
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let name = self.name();
        let pipe = receiver(name, ctx)?;
        match self {
            PipeMember::Read => {
                if !args.is_empty() {
                    return Err(EvalError::arity(name, "0", args.len()));
                }
                Ok(pipe.read_value().await?.unwrap_or(Value::Nil))
            }
            PipeMember::Write => write(pipe, args, ctx).await,
            PipeMember::Close => Ok(Value::Boolean(pipe.close_writer().await)),
            PipeMember::ReaderClose => Ok(Value::Boolean(pipe.close_reader().await)),
        }
    }
}

async fn write(pipe: &Pipe, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
    let (nonblocking, values) = match args.split_first() {
        Some((flag, rest)) if flag.as_text() == Some("-n") => (true, rest),
        _ => (false, args.as_slice()),
    };
    for value in values {
        let written = if nonblocking {
            pipe.try_write_value(value)
        } else {
            pipe.write_value(value).await
        };
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Value::Boolean(false)),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                return ctx.fail("write", format!("pipe {}: {e}", pipe.id())).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Value::Status(ExitStatus::SUCCESS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};
    use std::time::Duration;

    async fn call(h: &Harness, pipe: &Pipe, member: &str, args: Vec<Value>) -> Value {
        let builtin = super::member(member).unwrap();
        h.call_on(&*builtin, &Value::Pipe(pipe.clone()), args).await.unwrap()
    }

    #[tokio::test]
    async fn values_flow_in_order_until_close() {
        let h = Harness::new();
        let pipe = Pipe::queue(8);
        let list = Value::list(vec![Value::atom("a"), Value::string("b c")]);
        call(&h, &pipe, "write", vec![Value::Integer(1), list.clone()]).await;

        assert_eq!(call(&h, &pipe, "close", vec![]).await, Value::Boolean(true));
        assert_eq!(call(&h, &pipe, "close", vec![]).await, Value::Boolean(false));
        assert_eq!(call(&h, &pipe, "read", vec![]).await, Value::Integer(1));
        assert_eq!(call(&h, &pipe, "read", vec![]).await, list);
        assert_eq!(call(&h, &pipe, "read", vec![]).await, Value::Nil);
    }

    #[tokio::test]
    async fn nonblocking_write_reports_a_full_pipe() {
        let h = Harness::new();
        let pipe = Pipe::queue(1);
        let first = call(&h, &pipe, "write", words(&["-n", "a"])).await;
        assert!(first.status().success());
        assert_eq!(call(&h, &pipe, "write", words(&["-n", "b"])).await, Value::Boolean(false));
    }

    #[tokio::test]
    async fn blocking_write_waits_for_room() {
        let h = Harness::new();
        let pipe = Pipe::queue(1);
        call(&h, &pipe, "write", words(&["a"])).await;

        let pending = call(&h, &pipe, "write", words(&["b"]));
        tokio::pin!(pending);
        assert!(tokio::time::timeout(Duration::from_millis(30), &mut pending).await.is_err());

        assert_eq!(pipe.read_value().await.unwrap(), Some(Value::atom("a")));
        let done = tokio::time::timeout(Duration::from_secs(1), pending).await.unwrap();
        assert!(done.status().success());
    }

    #[tokio::test]
    async fn writing_after_reader_close_fails() {
        let h = Harness::new();
        let pipe = Pipe::queue(4);
        assert_eq!(call(&h, &pipe, "reader-close", vec![]).await, Value::Boolean(true));
        let v = call(&h, &pipe, "write", words(&["x"])).await;
        assert_eq!(v.status().code(), 1);
        assert!(h.err().starts_with("write: pipe "));
    }

    #[test]
    fn unknown_members() {
        assert!(member("flush").is_none());
    }
}
