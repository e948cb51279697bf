//! pwd: Print working directory.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

/// Pwd builtin: print the current working directory.
pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }

    async fn call(&self, _args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let cwd = ctx.shell().cwd();
        ctx.out(&format!("{}\n", cwd.display())).await?;
        Ok(Value::Status(ExitStatus::SUCCESS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::Harness;
    use std::path::Path;

    #[tokio::test]
    async fn test_pwd_prints_cwd() {
        let h = Harness::in_dir(Path::new("/tmp"));
        h.call(&Pwd, vec![]).await.unwrap();
        assert_eq!(h.out(), "/tmp\n");
    }
}
