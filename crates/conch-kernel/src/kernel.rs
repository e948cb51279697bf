//! The Kernel: the embedding surface of conch.
//!
//! The Kernel owns one shell: its global environment, root object, working
//! directory and job supervisor. Hosts feed it source text and get back an
//! [`ExecResult`]; the REPL, the script runner and the tests all go through
//! here.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                        Kernel                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │    Reader    │─▶│  Evaluator   │─▶│  Pipeline  │  │
//! │  │   (units)    │  │ (env, objs)  │  │  builder   │  │
//! │  └──────────────┘  └──────────────┘  └─────┬──────┘  │
//! │  ┌──────────────────────────────────┐      │         │
//! │  │ Supervisor (jobs, $?, terminal)  │◀─────┘         │
//! │  └──────────────────────────────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use nix::sys::signal::Signal;
use tokio::task::JoinHandle;

use crate::interpreter::{eval, Context, EvalError, ExecResult, Shell, Value};
use crate::parser::{ReadError, Reader};
use crate::scheduler::{
    self, ExitStatus, Io, JobInfo, ShutdownMode, Sink, Source, Supervisor, Terminal,
    DEFAULT_CAPACITY,
};

/// Configuration for kernel initialization.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Name of this kernel, used in logs.
    pub name: String,

    /// Initial working directory.
    pub cwd: PathBuf,

    /// Interactive kernels let an interrupt with no foreground job abort
    /// the evaluation in progress.
    pub interactive: bool,

    /// Capture stdout and stderr into each [`ExecResult`] instead of
    /// inheriting the host's streams. Captured kernels read no stdin.
    pub capture_output: bool,

    /// Take the terminal and run jobs in their own process groups. Only
    /// honored when stdin is a terminal owned by this process group.
    pub job_control: bool,

    /// Capacity of in-process pipes.
    pub pipe_capacity: usize,
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::script()
    }
}

impl KernelConfig {
    /// Interactive use at a terminal.
    pub fn repl() -> Self {
        Self {
            name: "repl".to_string(),
            cwd: current_dir(),
            interactive: true,
            capture_output: false,
            job_control: std::io::stdin().is_terminal(),
            pipe_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Running a script file or `-c` source: inherited I/O, no terminal
    /// control.
    pub fn script() -> Self {
        Self {
            name: "script".to_string(),
            cwd: current_dir(),
            interactive: false,
            capture_output: false,
            job_control: false,
            pipe_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Captured output and no terminal, for embedding and tests.
    pub fn transient() -> Self {
        Self {
            name: "transient".to_string(),
            cwd: current_dir(),
            interactive: false,
            capture_output: true,
            job_control: false,
            pipe_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn with_job_control(mut self, job_control: bool) -> Self {
        self.job_control = job_control;
        self
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }
}

type Buffer = Arc<Mutex<Vec<u8>>>;

fn drain(buf: &Buffer) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()));
    String::from_utf8_lossy(&bytes).into_owned()
}

/// The Kernel: executes conch source.
pub struct Kernel {
    name: String,
    shell: Arc<Shell>,
    io: Io,
    captured: Option<(Buffer, Buffer)>,
    interactive: bool,
    /// Signal listener, present under job control.
    listener: Option<JoinHandle<()>>,
}

impl Kernel {
    /// Create a new kernel with the given configuration.
    ///
    /// Must be called inside a tokio runtime when job control is requested,
    /// since the signal listener is a task.
    pub fn new(config: KernelConfig) -> Result<Self> {
        let KernelConfig {
            name,
            cwd,
            interactive,
            capture_output,
            job_control,
            pipe_capacity,
        } = config;

        anyhow::ensure!(cwd.is_dir(), "working directory {} does not exist", cwd.display());
        let cwd = std::fs::canonicalize(&cwd)
            .with_context(|| format!("resolving working directory {}", cwd.display()))?;

        let terminal = if job_control { Terminal::acquire() } else { None };
        if job_control && terminal.is_none() {
            tracing::debug!(kernel = %name, "job control unavailable, running without it");
        }
        let supervisor = Supervisor::new(terminal);
        let listener = if supervisor.job_control() {
            let handle = scheduler::listen(Arc::clone(&supervisor))
                .context("installing shell signal handlers")?;
            Some(handle)
        } else {
            None
        };

        let (io, captured) = if capture_output {
            let (out_sink, out) = Sink::capture();
            let (err_sink, err) = Sink::capture();
            let io = Io {
                stdin: Source::Null,
                stdout: out_sink,
                stderr: err_sink,
            };
            (io, Some((out, err)))
        } else {
            (Io::inherit(), None)
        };

        let shell = Shell::new(supervisor, cwd, pipe_capacity);
        tracing::debug!(kernel = %name, cwd = %shell.cwd().display(), "kernel created");

        Ok(Self {
            name,
            shell,
            io,
            captured,
            interactive,
            listener,
        })
    }

    /// Create a transient kernel: captured output, no terminal.
    pub fn transient() -> Result<Self> {
        Self::new(KernelConfig::transient())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether jobs run under terminal job control.
    pub fn job_control(&self) -> bool {
        self.shell.supervisor.job_control()
    }

    /// Execute conch source.
    ///
    /// Units run in order. A language error is reported on stderr as
    /// `conch: MESSAGE`, leaves its status in the last-status register and
    /// stops the remaining units of this call. Bindings made by earlier
    /// units stay.
    #[tracing::instrument(level = "info", skip(self, input), fields(kernel = %self.name, input_len = input.len()))]
    pub async fn execute(&self, input: &str) -> Result<ExecResult> {
        let ctx = Context::new(Arc::clone(&self.shell), self.io.clone());
        let env = self.shell.globals.clone();
        let mut result = ExecResult::default();

        for unit in Reader::new(input) {
            let outcome = match unit {
                Ok(node) => {
                    tracing::trace!(unit = %node, "evaluating");
                    self.run_unit(eval(&node, &env, &ctx)).await
                }
                Err(e) => Err(EvalError::from(e)),
            };
            match outcome {
                Ok(value) => {
                    ctx.record(&value);
                    result.value = value;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "unit failed");
                    self.shell.supervisor.record_status(e.status());
                    self.io
                        .stderr
                        .write_text(&format!("conch: {e}\n"))
                        .await
                        .context("reporting error")?;
                    result.value = Value::Nil;
                    result.error = Some(e.to_string());
                    break;
                }
            }
        }

        result.status = self.shell.supervisor.last_status();
        if let Some((out, err)) = &self.captured {
            result.out = drain(out);
            result.err = drain(err);
        }
        Ok(result)
    }

    /// Evaluate one unit. Interactive kernels give up on it when an
    /// interrupt arrives with no foreground job to take it.
    async fn run_unit(
        &self,
        unit: impl std::future::Future<Output = Result<Value, EvalError>>,
    ) -> Result<Value, EvalError> {
        if !self.interactive {
            return unit.await;
        }
        tokio::select! {
            value = unit => value,
            () = self.shell.supervisor.interrupted() => {
                tracing::debug!("evaluation interrupted");
                Ok(Value::Status(ExitStatus::from_signal(Signal::SIGINT as i32)))
            }
        }
    }

    /// Check whether `source` is a complete input. Only
    /// [`ReadError::Incomplete`] asks for more lines; other errors are left
    /// for [`Kernel::execute`] to report.
    pub fn check(&self, source: &str) -> Result<(), ReadError> {
        match Reader::new(source).find_map(Result::err) {
            Some(ReadError::Incomplete) => Err(ReadError::Incomplete),
            _ => Ok(()),
        }
    }

    /// Status left by the most recent unit.
    pub fn last_status(&self) -> ExitStatus {
        self.shell.supervisor.last_status()
    }

    /// Job completion and stop notices accumulated since the last call.
    pub fn take_notices(&self) -> Vec<String> {
        self.shell.supervisor.take_notices()
    }

    /// Snapshot of the job table.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.shell.supervisor.list()
    }

    pub fn cwd(&self) -> PathBuf {
        self.shell.cwd()
    }

    /// Change the working directory, as `cd` would.
    pub fn set_cwd(&self, path: &Path) -> Result<PathBuf> {
        self.shell
            .chdir(path)
            .with_context(|| format!("cd {}", path.display()))
    }

    /// Look up a global binding.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.shell.globals.lookup_var(name)
    }

    /// Bind a global name.
    pub fn set_var(&self, name: &str, value: Value) {
        self.shell.globals.bind(name, value);
    }

    /// Terminal hangup: every job is sent HUP, stopped ones a CONT as well.
    pub fn hangup(&self) {
        self.shell.supervisor.hangup();
    }

    /// Drain or detach the remaining jobs and release the shell's state.
    pub async fn shutdown(self, mode: ShutdownMode) -> Result<()> {
        tracing::debug!(kernel = %self.name, ?mode, "kernel shutdown");
        self.shell.supervisor.shutdown(mode).await;
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        self.shell.teardown();
        Ok(())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("cwd", &self.shell.cwd())
            .field("job_control", &self.job_control())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel {
        Kernel::transient().expect("failed to create kernel")
    }

    #[tokio::test]
    async fn transient_kernel_captures() {
        let kernel = kernel();
        assert_eq!(kernel.name(), "transient");
        assert!(!kernel.job_control());
        let result = kernel.execute("echo hello").await.expect("execution failed");
        assert!(result.ok());
        assert_eq!(result.out, "hello\n");
        assert_eq!(result.err, "");
    }

    #[tokio::test]
    async fn units_run_in_order_and_accumulate_output() {
        let kernel = kernel();
        let result = kernel
            .execute("echo one\necho two; echo three")
            .await
            .expect("execution failed");
        assert_eq!(result.out, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn errors_stop_the_rest_of_the_input() {
        let kernel = kernel();
        let result = kernel
            .execute("define x 1\necho $missing\necho after")
            .await
            .expect("execution failed");
        assert_eq!(result.code(), 1);
        assert_eq!(result.out, "");
        assert_eq!(result.err, "conch: unbound name: missing\n");
        assert_eq!(result.error.as_deref(), Some("unbound name: missing"));
        // Work done before the error is kept.
        assert_eq!(kernel.get_var("x"), Some(Value::atom("1")));
    }

    #[tokio::test]
    async fn syntax_errors_are_reported() {
        let kernel = kernel();
        let result = kernel.execute("echo )").await.expect("execution failed");
        assert!(!result.ok());
        assert!(result.err.starts_with("conch: syntax error"), "{}", result.err);
    }

    #[tokio::test]
    async fn status_survives_between_calls() {
        let kernel = kernel();
        kernel.execute("false").await.expect("execution failed");
        assert_eq!(kernel.last_status().code(), 1);
        let result = kernel.execute("echo $?").await.expect("execution failed");
        assert_eq!(result.out, "1\n");
    }

    #[test]
    fn check_only_flags_incomplete_input() {
        let kernel = Kernel::new(KernelConfig::transient()).expect("failed to create kernel");
        assert_eq!(kernel.check("echo (a"), Err(ReadError::Incomplete));
        assert_eq!(kernel.check("a |"), Err(ReadError::Incomplete));
        assert_eq!(kernel.check("echo a"), Ok(()));
        assert_eq!(kernel.check("echo )"), Ok(()));
    }

    #[test]
    fn config_builders() {
        let config = KernelConfig::script()
            .with_name("t")
            .with_cwd("/tmp")
            .with_capture(true)
            .with_pipe_capacity(0);
        assert_eq!(config.name, "t");
        assert_eq!(config.cwd, PathBuf::from("/tmp"));
        assert!(config.capture_output);
        assert_eq!(config.pipe_capacity, 1);
        assert!(!KernelConfig::transient().job_control);
    }

    #[test]
    fn missing_cwd_is_rejected() {
        let config = KernelConfig::transient().with_cwd("/definitely/not/here");
        assert!(Kernel::new(config).is_err());
    }

    #[tokio::test]
    async fn shutdown_drains_background_jobs() {
        let kernel = kernel();
        let result = kernel.execute("echo bg &").await.expect("execution failed");
        assert!(matches!(result.value, Value::Job(_)));
        kernel.shutdown(ShutdownMode::Drain).await.expect("shutdown failed");
    }
}
