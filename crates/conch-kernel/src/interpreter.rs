//! Interpreter module for conch.
//!
//! This module provides evaluation of syntax trees, lexical scopes, the
//! prototype object model and the value type every expression reduces to.
//!
//! # Architecture
//!
//! The interpreter is built in layers:
//!
//! - **Value**: what evaluation produces, including objects, methods, pipes
//!   and job handles
//! - **Object**: private/public member tables with a prototype link
//! - **Scope**: parent-linked frames; method and object-body frames carry
//!   the object `$self` refers to
//! - **Evaluator**: special forms, application with a tail-call trampoline,
//!   and hand-off of command forms to the pipeline builder
//!
//! # Example
//!
//! ```
//! use conch_kernel::interpreter::{Object, Access, Value};
//!
//! let point = Object::new(None);
//! point.publish("x", Value::Integer(1));
//! let moved = point.clone_object();
//! moved.assign("x", Value::Integer(5), Access::Public);
//!
//! assert_eq!(point.lookup("x", Access::Public), Some(Value::Integer(1)));
//! assert_eq!(moved.lookup("x", Access::Public), Some(Value::Integer(5)));
//! ```

mod error;
mod eval;
mod forms;
mod object;
mod result;
mod scope;
mod shell;
mod value;

pub use error::{EvalError, EvalResult};
pub use eval::{apply, eval, eval_args, eval_tail, eval_word, EvalFuture, Tail};
pub use forms::is_special;
pub use object::{Access, Object};
pub use result::ExecResult;
pub use scope::{Env, Frame};
pub use shell::{Context, Shell};
pub use value::{BuiltinRef, Closure, Value};

pub(crate) use eval::is_external;
