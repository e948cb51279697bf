//! list: Build a list from its arguments.

use async_trait::async_trait;

use crate::interpreter::{EvalResult, Value};
use crate::tools::{Builtin, ExecContext};

pub struct List;

#[async_trait]
impl Builtin for List {
    fn name(&self) -> &str {
        "list"
    }

    async fn call(&self, args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        Ok(Value::list(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::Harness;

    #[tokio::test]
    async fn keeps_argument_order_and_nesting() {
        let h = Harness::new();
        let inner = Value::list(vec![Value::atom("b")]);
        let v = h.call(&List, vec![Value::atom("a"), inner.clone()]).await.unwrap();
        assert_eq!(v, Value::list(vec![Value::atom("a"), inner]));
        assert_eq!(h.call(&List, vec![]).await.unwrap().to_syntax(), "()");
    }
}
