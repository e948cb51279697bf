//! Integer arithmetic and comparison.
//!
//! Words that spell integers are accepted wherever an integer is expected,
//! so `add 1 2` works without first converting with `integer`.

use async_trait::async_trait;

use crate::interpreter::{EvalError, EvalResult, Value};
use crate::tools::{Builtin, ExecContext};

fn integer(name: &str, value: &Value) -> EvalResult<i64> {
    value
        .as_integer()
        .ok_or_else(|| EvalError::type_mismatch(name, "integer", value.to_syntax()))
}

fn overflow(name: &str) -> EvalError {
    EvalError::type_mismatch(name, "result within 64 bits", "overflow")
}

/// `integer WORD`: convert to an integer value.
pub struct Integer;

#[async_trait]
impl Builtin for Integer {
    fn name(&self) -> &str {
        "integer"
    }

    async fn call(&self, args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        match args.as_slice() {
            [value] => integer("integer", value).map(Value::Integer),
            _ => Err(EvalError::arity("integer", "1", args.len())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Arith {
    fn apply(self, a: i64, b: i64) -> EvalResult<i64> {
        let name = self.word();
        if matches!(self, Arith::Div | Arith::Mod) && b == 0 {
            return Err(EvalError::type_mismatch(name, "non-zero divisor", "0"));
        }
        let result = match self {
            Arith::Add => a.checked_add(b),
            Arith::Sub => a.checked_sub(b),
            Arith::Mul => a.checked_mul(b),
            Arith::Div => a.checked_div(b),
            Arith::Mod => a.checked_rem(b),
        };
        result.ok_or_else(|| overflow(name))
    }

    fn word(self) -> &'static str {
        match self {
            Arith::Add => "add",
            Arith::Sub => "sub",
            Arith::Mul => "mul",
            Arith::Div => "div",
            Arith::Mod => "mod",
        }
    }
}

/// `add`, `mul`: fold over any number of arguments. `sub`, `div`, `mod`:
/// fold left from the first argument.
#[async_trait]
impl Builtin for Arith {
    fn name(&self) -> &str {
        self.word()
    }

    async fn call(&self, args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let name = self.word();
        let mut numbers = args.iter().map(|v| integer(name, v));
        let first = match (*self, numbers.next()) {
            (_, Some(first)) => first?,
            (Arith::Add, None) => 0,
            (Arith::Mul, None) => 1,
            (_, None) => return Err(EvalError::arity(name, "at least 1", 0)),
        };
        let mut acc = first;
        for n in numbers {
            acc = self.apply(acc, n?)?;
        }
        Ok(Value::Integer(acc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Lt,
    Gt,
}

/// `eq A B` compares any two values, numerically when both spell integers.
/// `lt`, `gt` compare integers.
#[async_trait]
impl Builtin for Compare {
    fn name(&self) -> &str {
        match self {
            Compare::Eq => "eq",
            Compare::Lt => "lt",
            Compare::Gt => "gt",
        }
    }

    async fn call(&self, args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        let name = self.name();
        let [a, b] = args.as_slice() else {
            return Err(EvalError::arity(name, "2", args.len()));
        };
        let result = match self {
            Compare::Eq => match (a.as_integer(), b.as_integer()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b || (a.as_text().is_some() && a.as_text() == b.as_text()),
            },
            Compare::Lt => integer(name, a)? < integer(name, b)?,
            Compare::Gt => integer(name, a)? > integer(name, b)?,
        };
        Ok(Value::Boolean(result))
    }
}

/// `not VALUE`: logical negation of truthiness.
pub struct Not;

#[async_trait]
impl Builtin for Not {
    fn name(&self) -> &str {
        "not"
    }

    async fn call(&self, args: Vec<Value>, _ctx: &ExecContext<'_>) -> EvalResult<Value> {
        match args.as_slice() {
            [value] => Ok(Value::Boolean(!value.is_truthy())),
            _ => Err(EvalError::arity("not", "1", args.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::testing::{words, Harness};
    use rstest::rstest;

    #[rstest]
    #[case::add(Arith::Add, &["1", "2", "3"], 6)]
    #[case::add_none(Arith::Add, &[], 0)]
    #[case::sub(Arith::Sub, &["10", "3", "2"], 5)]
    #[case::negative(Arith::Sub, &["1", "5"], -4)]
    #[case::mul(Arith::Mul, &["4", "-2"], -8)]
    #[case::div_truncates(Arith::Div, &["7", "2"], 3)]
    #[case::modulo(Arith::Mod, &["7", "3"], 1)]
    #[tokio::test]
    async fn arithmetic(#[case] op: Arith, #[case] args: &[&str], #[case] expected: i64) {
        let h = Harness::new();
        assert_eq!(h.call(&op, words(args)).await.unwrap(), Value::Integer(expected));
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        let h = Harness::new();
        let err = h.call(&Arith::Div, words(&["1", "0"])).await.unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn overflow_is_an_error() {
        let h = Harness::new();
        let args = vec![Value::Integer(i64::MAX), Value::Integer(1)];
        assert!(h.call(&Arith::Add, args).await.is_err());
    }

    #[tokio::test]
    async fn non_numbers_are_rejected() {
        let h = Harness::new();
        let err = h.call(&Arith::Add, words(&["1", "x"])).await.unwrap_err();
        assert_eq!(err.to_string(), "add: expected integer, got x");
    }

    #[rstest]
    #[case::numeric(Compare::Eq, vec![Value::Integer(3), Value::atom("3")], true)]
    #[case::atom_vs_string(Compare::Eq, vec![Value::atom("a"), Value::string("a")], true)]
    #[case::different(Compare::Eq, vec![Value::atom("a"), Value::atom("b")], false)]
    #[case::lists(Compare::Eq, vec![Value::list(vec![Value::atom("a")]), Value::list(vec![Value::atom("a")])], true)]
    #[case::lt(Compare::Lt, vec![Value::Integer(1), Value::Integer(2)], true)]
    #[case::gt(Compare::Gt, vec![Value::Integer(1), Value::Integer(2)], false)]
    #[tokio::test]
    async fn comparisons(#[case] op: Compare, #[case] args: Vec<Value>, #[case] expected: bool) {
        let h = Harness::new();
        assert_eq!(h.call(&op, args).await.unwrap(), Value::Boolean(expected));
    }

    #[tokio::test]
    async fn not_negates_truthiness() {
        let h = Harness::new();
        assert_eq!(h.call(&Not, vec![Value::Boolean(false)]).await.unwrap(), Value::Boolean(true));
        assert_eq!(h.call(&Not, vec![Value::atom("x")]).await.unwrap(), Value::Boolean(false));
    }
}
