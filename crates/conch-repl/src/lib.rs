//! conch REPL: Interactive front end and script runner.
//!
//! This crate handles:
//! - Meta-commands: `/help`, `/quit`, `/read`, `/jobs`, `/cwd`, `/status`
//! - Continuation lines while the reader reports incomplete input
//! - Command execution via the Kernel
//! - Job notices before each prompt
//! - Command history via rustyline

pub mod format;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use conch_kernel::parser::{read_all, ReadError};
use conch_kernel::{ExitStatus, Kernel, KernelConfig, ShutdownMode};

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = ". ";

/// What became of one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The input was handled; print the text, if any.
    Done(Option<String>),
    /// The input so far is incomplete; read another line.
    NeedMore,
    /// The user asked to leave.
    Exit,
}

/// REPL state: the kernel, its runtime and any partial input.
pub struct Repl {
    kernel: Kernel,
    runtime: Runtime,
    pending: String,
    show_syntax: bool,
}

impl Repl {
    /// A REPL for an interactive terminal session.
    pub fn new() -> Result<Self> {
        Self::with_config(KernelConfig::repl())
    }

    /// A REPL over a kernel with a custom configuration.
    pub fn with_config(config: KernelConfig) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        // The kernel's signal listener is spawned onto this runtime.
        let kernel = {
            let _guard = runtime.enter();
            Kernel::new(config).context("Failed to create kernel")?
        };
        Ok(Self {
            kernel,
            runtime,
            pending: String::new(),
            show_syntax: false,
        })
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// True while earlier lines are waiting for the rest of their unit.
    pub fn is_continuing(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Forget partial input, as after an interrupt at the prompt.
    pub fn cancel_pending(&mut self) {
        self.pending.clear();
    }

    /// Process a single line of input.
    pub fn process_line(&mut self, line: &str) -> Outcome {
        let trimmed = line.trim();

        if !self.is_continuing() {
            if trimmed.starts_with('/') {
                return self.handle_meta_command(trimmed);
            }
            if trimmed.is_empty() {
                return Outcome::Done(None);
            }
        }

        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);
        if let Err(ReadError::Incomplete) = self.kernel.check(&self.pending) {
            return Outcome::NeedMore;
        }
        let source = std::mem::take(&mut self.pending);

        if self.show_syntax {
            return Outcome::Done(Some(format::format_units(&read_all(&source))));
        }

        match self.runtime.block_on(self.kernel.execute(&source)) {
            Ok(result) => Outcome::Done(format::format_result(&result)),
            Err(e) => Outcome::Done(Some(format!("Error: {e:#}"))),
        }
    }

    /// Notices about background jobs that finished or stopped.
    pub fn notices(&self) -> Vec<String> {
        self.kernel.take_notices()
    }

    fn handle_meta_command(&mut self, cmd: &str) -> Outcome {
        let command = cmd.split_whitespace().next().unwrap_or("");
        let text = match command {
            "/quit" | "/q" | "/exit" => return Outcome::Exit,
            "/help" | "/h" | "/?" => HELP_TEXT.trim_end().to_string(),
            "/read" => {
                self.show_syntax = !self.show_syntax;
                format!("Reader mode: {}", if self.show_syntax { "ON" } else { "OFF" })
            }
            "/jobs" => format::format_jobs(&self.kernel.jobs()),
            "/cwd" => self.kernel.cwd().display().to_string(),
            "/status" | "/$?" => format::format_status(self.kernel.last_status()),
            _ => format!("Unknown command: {command}\nType /help for available commands."),
        };
        Outcome::Done(Some(text))
    }

    /// Stop tracking jobs and release the kernel. Returns the final status.
    pub fn finish(self, mode: ShutdownMode) -> Result<ExitStatus> {
        let status = self.kernel.last_status();
        self.runtime.block_on(self.kernel.shutdown(mode))?;
        Ok(status)
    }
}

const HELP_TEXT: &str = r#"conch: a shell with objects

Meta Commands:
  /help, /?         Show this help
  /quit, /q         Exit (end of input works too)
  /read             Toggle showing what the reader makes of input
  /jobs             List jobs
  /cwd              Show the working directory
  /status, /$?      Show the last status

Language:
  a b c             Run a command (builtin, method or program)
  define x: add 1 2 Bind x privately; `set x 5` updates it
  $x  $o::member    Look up a name or a member
  { s1; s2 }        Block; its value is the last statement's
  if c then [else]  Conditional
  method (a b) {..} A closure; the last call in its body is a tail call
  object { ... }    New object; `public name value` inside exposes members
  $o::clone         New object delegating to $o
  pipe [N|os]       A pipe value with read/write/close members
  a | b             Pipeline
  a && b, a || b    Run b on success / failure of a
  cmd > f, >> f, < f  Redirection
  cmd &             Run in the background
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create history directory: {}", e);
        }
    }
    if let Err(e) = rl.save_history(path) {
        tracing::warn!("Failed to save history: {}", e);
    }
}

fn load_history(rl: &mut Editor<(), DefaultHistory>, path: &Path) {
    if let Err(e) = rl.load_history(path) {
        // Expected on the first run.
        let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !is_not_found {
            tracing::warn!("Failed to load history: {}", e);
        }
    }
}

/// Run the interactive REPL. Returns the last status when input ends.
pub fn run() -> Result<ExitStatus> {
    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("Failed to create editor")?;
    let history_path: PathBuf = conch_kernel::paths::history_file();
    load_history(&mut rl, &history_path);

    let mut repl = Repl::new()?;

    loop {
        for notice in repl.notices() {
            eprintln!("{notice}");
        }
        let prompt = if repl.is_continuing() {
            CONTINUATION_PROMPT
        } else {
            PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = rl.add_history_entry(line.as_str()) {
                        tracing::warn!("Failed to add history entry: {}", e);
                    }
                }
                match repl.process_line(&line) {
                    Outcome::Done(Some(output)) => println!("{output}"),
                    Outcome::Done(None) | Outcome::NeedMore => {}
                    Outcome::Exit => break,
                }
            }
            Err(ReadlineError::Interrupted) => {
                repl.cancel_pending();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    repl.finish(ShutdownMode::Detach)
}

/// Run source text to completion, as for a script file or `-c`.
///
/// A language error stops the rest of the source; its status becomes the
/// result. Background jobs are waited for before returning.
pub fn run_source(source: &str, config: KernelConfig) -> Result<ExitStatus> {
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async {
        let kernel = Kernel::new(config).context("Failed to create kernel")?;
        let result = kernel.execute(source).await?;
        // Inherited output is already on the terminal; captured output is not.
        if !result.out.is_empty() {
            print!("{}", result.out);
        }
        if !result.err.is_empty() {
            eprint!("{}", result.err);
        }
        kernel.shutdown(ShutdownMode::Drain).await?;
        Ok(result.status)
    })
}

/// Read a script file. An unreadable file is treated as empty.
pub fn read_script(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read script, running nothing");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repl() -> Repl {
        Repl::with_config(KernelConfig::transient()).expect("Failed to create REPL")
    }

    #[test]
    fn incomplete_input_waits_for_more_lines() {
        let mut repl = repl();
        assert_eq!(repl.process_line("define f: method (x) {"), Outcome::NeedMore);
        assert!(repl.is_continuing());
        assert_eq!(repl.process_line("  echo $x"), Outcome::NeedMore);
        assert_eq!(repl.process_line("}"), Outcome::Done(None));
        assert!(!repl.is_continuing());
        assert_eq!(
            repl.process_line("f hi"),
            Outcome::Done(Some("hi".to_string()))
        );
    }

    #[test]
    fn cancel_drops_partial_input() {
        let mut repl = repl();
        assert_eq!(repl.process_line("echo (a"), Outcome::NeedMore);
        repl.cancel_pending();
        assert!(!repl.is_continuing());
    }

    #[test]
    fn meta_commands() {
        let mut repl = repl();
        assert_eq!(repl.process_line("/quit"), Outcome::Exit);
        let Outcome::Done(Some(help)) = repl.process_line("/help") else {
            panic!("no help text");
        };
        assert!(help.contains("/jobs"));
        assert_eq!(
            repl.process_line("/read"),
            Outcome::Done(Some("Reader mode: ON".to_string()))
        );
        assert_eq!(
            repl.process_line("a | b > f"),
            Outcome::Done(Some("(| a (> f b))".to_string()))
        );
        let Outcome::Done(Some(unknown)) = repl.process_line("/bogus") else {
            panic!("no output for unknown command");
        };
        assert!(unknown.starts_with("Unknown command: /bogus"));
    }

    #[test]
    fn values_are_shown_but_statuses_are_not() {
        let mut repl = repl();
        assert_eq!(
            repl.process_line("list a \"b c\""),
            Outcome::Done(Some("(a \"b c\")".to_string()))
        );
        assert_eq!(repl.process_line("true"), Outcome::Done(None));
    }

    #[test]
    fn finish_reports_last_status() {
        let mut repl = repl();
        repl.process_line("false");
        let status = repl.finish(ShutdownMode::Detach).expect("shutdown failed");
        assert_eq!(status.code(), 1);
    }

    #[test]
    fn unreadable_scripts_are_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_script(&dir.path().join("missing.conch")), "");
    }
}
