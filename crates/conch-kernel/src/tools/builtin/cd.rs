//! cd: Change the working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::paths;
use crate::scheduler::ExitStatus;
use crate::tools::{Builtin, ExecContext};

/// Cd builtin: `cd DIR`, `cd` (home) or `cd -` (previous directory).
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    fn name(&self) -> &str {
        "cd"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let shell = ctx.shell();
        let (target, announce) = match args.as_slice() {
            [] => (paths::home_dir(), false),
            [dir] if dir.as_text() == Some("-") => match shell.previous_dir() {
                Some(prev) => (prev, true),
                None => return ctx.fail("cd", "no previous directory").await,
            },
            [dir] => (PathBuf::from(dir.to_string()), false),
            _ => return Err(EvalError::arity("cd", "0 or 1", args.len())),
        };

        match shell.chdir(Path::new(&target)) {
            Ok(now) => {
                tracing::debug!(cwd = %now.display(), "changed directory");
                if announce {
                    ctx.out(&format!("{}\n", now.display())).await?;
                }
                Ok(Value::Status(ExitStatus::SUCCESS))
            }
            Err(e) => ctx.fail("cd", format!("{}: {}", target.display(), e)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};

    #[tokio::test]
    async fn test_cd_into_subdir_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(base.join("sub")).unwrap();
        let h = Harness::in_dir(&base);

        let result = h.call(&Cd, words(&["sub"])).await.unwrap();
        assert!(result.status().success());
        assert_eq!(h.ctx.shell.cwd(), base.join("sub"));

        h.call(&Cd, words(&["-"])).await.unwrap();
        assert_eq!(h.ctx.shell.cwd(), base);
        assert_eq!(h.out(), format!("{}\n", base.display()));
    }

    #[tokio::test]
    async fn test_cd_missing_dir_fails_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::in_dir(dir.path());
        let result = h.call(&Cd, words(&["nope"])).await.unwrap();
        assert_eq!(result.status().code(), 1);
        assert!(h.err().starts_with("cd: nope: "), "{}", h.err());
        assert_eq!(h.ctx.shell.cwd(), dir.path());
    }

    #[tokio::test]
    async fn test_cd_dash_without_previous() {
        let h = Harness::new();
        let result = h.call(&Cd, words(&["-"])).await.unwrap();
        assert!(!result.status().success());
    }
}
