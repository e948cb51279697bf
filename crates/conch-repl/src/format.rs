//! Output formatting for the REPL.
//!
//! Captured output comes first, then errors, then the value of the final
//! unit. Statuses and nil are not shown: a command's effect is its output,
//! and `$?` or `/status` reveal the status when wanted.

use conch_kernel::ast::Node;
use conch_kernel::{ExecResult, ExitStatus, JobInfo, ReadError, Value};

/// Text to show for a value, if any.
pub fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::Nil | Value::Status(_) => None,
        other => Some(other.to_syntax()),
    }
}

/// Format an ExecResult for display. `None` when there is nothing to show.
pub fn format_result(result: &ExecResult) -> Option<String> {
    let mut parts = Vec::new();
    if !result.out.is_empty() {
        parts.push(result.out.trim_end_matches('\n').to_string());
    }
    if !result.err.is_empty() {
        parts.push(result.err.trim_end_matches('\n').to_string());
    }
    if let Some(value) = format_value(&result.value) {
        parts.push(value);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// One line per job, as `jobs` prints them.
pub fn format_jobs(jobs: &[JobInfo]) -> String {
    if jobs.is_empty() {
        return "(no jobs)".to_string();
    }
    jobs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_status(status: ExitStatus) -> String {
    if status.success() {
        "✓ 0".to_string()
    } else {
        format!("✗ {status}")
    }
}

/// Reader output, one unit per line.
pub fn format_units(units: &Result<Vec<Node>, ReadError>) -> String {
    match units {
        Ok(units) => units
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => format!("Read error: {e}"),
    }
}

/// Process exit code for a final status: its low 8 bits.
pub fn exit_code(status: ExitStatus) -> u8 {
    (status.code() & 0xff) as u8
}
