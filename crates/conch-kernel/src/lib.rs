//! conch-kernel: the core of the conch shell.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes conch source using logos
//! - **Parser**: The reader, turning source into one list per input unit
//! - **AST**: The syntax node type the reader produces
//! - **Interpreter**: Evaluation, scopes, prototype objects and values
//! - **Scheduler**: Pipeline construction, pipes, jobs and process supervision
//! - **Tools**: The builtin commands
//! - **Kernel**: The facade hosts drive
//! - **Paths**: XDG path helpers

pub mod ast;
pub mod interpreter;
pub mod kernel;
pub mod lexer;
pub mod parser;
pub mod paths;
pub mod scheduler;
pub mod tools;

pub use interpreter::{EvalError, ExecResult, Value};
pub use kernel::{Kernel, KernelConfig};
pub use parser::ReadError;
pub use scheduler::{ExitStatus, JobInfo, ShutdownMode};
