//! Syntax tree produced by the reader.
//!
//! Every input unit is an ordinary list; shell operators are carried as
//! leading atoms (`|`, `&&`, `>` ...) so the evaluator sees one uniform shape.

mod types;

pub use types::{Node, Op};
