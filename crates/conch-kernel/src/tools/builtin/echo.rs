//! echo: Print arguments to stdout.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

/// Echo builtin: prints its arguments separated by spaces.
pub struct Echo;

#[async_trait]
impl Builtin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let (newline, args) = match args.split_first() {
            Some((Value::Atom(flag), rest)) if flag == "-n" => (false, rest),
            _ => (true, &args[..]),
        };

        let mut output = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        if newline {
            output.push('\n');
        }

        if let Err(e) = ctx.io().stdout.write_text(&output).await {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(Value::Status(ExitStatus::FAILURE));
            }
            return Err(e.into());
        }
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};

    #[tokio::test]
    async fn test_echo_simple() {
        let h = Harness::new();
        let result = h.call(&Echo, words(&["hello", "world"])).await.unwrap();
        assert!(result.status().success());
        assert_eq!(h.out(), "hello world\n");
    }

    #[tokio::test]
    async fn test_echo_no_newline() {
        let h = Harness::new();
        h.call(&Echo, words(&["-n", "x"])).await.unwrap();
        assert_eq!(h.out(), "x");
    }

    #[tokio::test]
    async fn test_echo_prints_strings_raw_and_lists_as_syntax() {
        let h = Harness::new();
        let args = vec![
            Value::string("a b"),
            Value::list(vec![Value::atom("x"), Value::string("y z")]),
        ];
        h.call(&Echo, args).await.unwrap();
        assert_eq!(h.out(), "a b (x \"y z\")\n");
    }

    #[tokio::test]
    async fn test_echo_empty() {
        let h = Harness::new();
        h.call(&Echo, vec![]).await.unwrap();
        assert_eq!(h.out(), "\n");
    }
}
