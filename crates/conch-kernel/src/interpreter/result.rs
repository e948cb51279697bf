//! ExecResult: what the kernel hands back for one `execute` call.

use crate::scheduler::ExitStatus;

use super::value::Value;

/// The result of executing a chunk of source.
///
/// `out` and `err` hold captured output when the kernel captures; with
/// inherited terminal I/O they are empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    /// Last-status register after the final unit.
    pub status: ExitStatus,
    /// Value of the final unit.
    pub value: Value,
    pub out: String,
    pub err: String,
    /// The language error that stopped execution, if one did.
    pub error: Option<String>,
}

impl ExecResult {
    pub fn new(status: ExitStatus, value: Value) -> Self {
        Self {
            status,
            value,
            out: String::new(),
            err: String::new(),
            error: None,
        }
    }

    /// True if the status is success.
    pub fn ok(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> i32 {
        self.status.code()
    }
}

impl Default for ExecResult {
    fn default() -> Self {
        Self::new(ExitStatus::SUCCESS, Value::Nil)
    }
}
