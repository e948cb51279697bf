//! clone: Make a new object delegating to the receiver.
//!
//! Published on the root object, so every object answers `$o::clone`. The
//! clone starts with empty member tables; what it sets shadows the
//! prototype and never writes through to it.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::tools::{Builtin, ExecContext};

pub struct Clone;

#[async_trait]
impl Builtin for Clone {
    fn name(&self) -> &str {
        "clone"
    }

    async fn call(&self, args: Vec<Value>, ctx: &ExecContext<'_>) -> EvalResult<Value> {
        if !args.is_empty() {
            return Err(EvalError::arity("clone", "0", args.len()));
        }
        match ctx.receiver("clone")? {
            Value::Object(object) => Ok(Value::Object(object.clone_object())),
            other => Err(EvalError::type_mismatch("clone", "object", other.to_syntax())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{Access, Object};
    use crate::tools::builtin::testing::Harness;

    #[tokio::test]
    async fn clone_delegates_without_sharing() {
        let h = Harness::new();
        let proto = Object::new(None);
        proto.publish("x", Value::Integer(1));
        let receiver = Value::Object(proto.clone());

        let Value::Object(copy) = h.call_on(&Clone, &receiver, vec![]).await.unwrap() else {
            panic!("clone returned a non-object");
        };
        assert!(copy.prototype().is_some_and(|p| p.ptr_eq(&proto)));
        assert_eq!(copy.member("x", Access::Public), Some(Value::Integer(1)));

        copy.publish("x", Value::Integer(2));
        assert_eq!(proto.member("x", Access::Public), Some(Value::Integer(1)));
    }

    #[tokio::test]
    async fn needs_an_object_receiver() {
        let h = Harness::new();
        assert!(h.call(&Clone, vec![]).await.is_err());
        let err = h.call_on(&Clone, &Value::Integer(1), vec![]).await.unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }
}
