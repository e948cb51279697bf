//! Core builtin trait.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};

use super::context::ExecContext;

/// A command implemented in the shell itself.
///
/// Builtins are ordinary values: they live in the global environment (or
/// as object and pipe members), can be rebound, and run as internal tasks
/// when they appear in a pipeline.
#[async_trait]
pub trait Builtin: Send + Sync {
    /// Name the builtin is bound under.
    fn name(&self) -> &str;

    /// Run with already-evaluated arguments.
    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value>;
}
