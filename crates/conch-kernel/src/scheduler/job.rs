//! Job state machine.
//!
//! A `Job` owns the records of its Tasks and moves through
//! `Pending → Running → {Stopped, Done}` only in response to [`JobEvent`]s.
//! The supervisor is the single place events are delivered from; this module
//! never touches processes itself.

use std::fmt;
use std::ops::Range;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::sync::watch;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exit status of a task or job: a numeric code plus the terminating signal, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitStatus {
    code: i32,
    signal: Option<i32>,
}

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus { code: 0, signal: None };
    pub const FAILURE: ExitStatus = ExitStatus { code: 1, signal: None };
    /// Executable not found.
    pub const NOT_FOUND: ExitStatus = ExitStatus { code: 127, signal: None };
    /// Executable found but not runnable.
    pub const NOT_EXECUTABLE: ExitStatus = ExitStatus { code: 126, signal: None };

    pub fn from_code(code: i32) -> Self {
        Self { code, signal: None }
    }

    /// A task terminated by `signal` reports `128 + signal`.
    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: 128 + signal,
            signal: Some(signal),
        }
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok { Self::SUCCESS } else { Self::FAILURE }
    }

    /// Status reported for a foreground job that was suspended.
    pub fn stopped() -> Self {
        Self::from_code(128 + Signal::SIGTSTP as i32)
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal.and_then(|s| Signal::try_from(s).ok()) {
            Some(signal) => write!(f, "{} ({})", self.code, signal),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

/// Lifecycle of one task inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Stopped,
    Exited(ExitStatus),
}

/// Everything that can happen to a job.
///
/// Task and body events come from reapers and internal task wrappers.
/// Control events come from the terminal, the signal listener, or the
/// `fg`/`bg`/`kill` builtins, and are translated into signals by the
/// supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    TaskSpawned { task: usize },
    TaskStopped { task: usize },
    TaskContinued { task: usize },
    TaskExited { task: usize, status: ExitStatus },
    /// The language-level body of a background job finished evaluating.
    BodyFinished { status: ExitStatus, error: Option<String> },
    /// The builder has launched every task of one pipeline.
    Launched,
    Interrupt,
    Suspend,
    Resume,
    Hangup,
    Terminate,
    Kill,
}

impl JobEvent {
    pub fn is_control(&self) -> bool {
        self.signal().is_some()
    }

    /// The signal a control event delivers to the job's processes.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            JobEvent::Interrupt => Some(Signal::SIGINT),
            JobEvent::Suspend => Some(Signal::SIGTSTP),
            JobEvent::Resume => Some(Signal::SIGCONT),
            JobEvent::Hangup => Some(Signal::SIGHUP),
            JobEvent::Terminate => Some(Signal::SIGTERM),
            JobEvent::Kill => Some(Signal::SIGKILL),
            _ => None,
        }
    }

    /// Control event for a signal name such as `INT`, `SIGTERM` or `9`.
    pub fn from_signal_name(name: &str) -> Option<JobEvent> {
        let upper = name.trim_start_matches('-').to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Some(match bare {
            "INT" | "2" => JobEvent::Interrupt,
            "TSTP" | "STOP" | "20" | "19" => JobEvent::Suspend,
            "CONT" | "18" => JobEvent::Resume,
            "HUP" | "1" => JobEvent::Hangup,
            "TERM" | "15" => JobEvent::Terminate,
            "KILL" | "9" => JobEvent::Kill,
            _ => return None,
        })
    }

    /// Control events that also cancel the job's in-process tasks.
    pub fn cancels(&self) -> bool {
        matches!(
            self,
            JobEvent::Interrupt | JobEvent::Hangup | JobEvent::Terminate | JobEvent::Kill
        )
    }
}

#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) name: String,
    pub(crate) pid: Option<Pid>,
    pub(crate) state: TaskState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// A plain pipeline: the job is its tasks.
    None,
    Running,
    Finished(ExitStatus),
}

/// Snapshot of a job for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub foreground: bool,
    pub status: Option<ExitStatus>,
    pub pids: Vec<i32>,
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.state, self.status) {
            (JobState::Done, Some(status)) if !status.success() => {
                write!(f, "[{}] Exit {}\t{}", self.id, status, self.command)
            }
            (state, _) => write!(f, "[{}] {}\t{}", self.id, state, self.command),
        }
    }
}

/// Processes a control event is delivered to.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SignalTargets {
    pub(crate) groups: Vec<Pid>,
    pub(crate) pids: Vec<Pid>,
}

/// One job: an ordered list of tasks plus an optional language-level body.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub foreground: bool,
    state: JobState,
    tasks: Vec<TaskRecord>,
    groups: Vec<Pid>,
    body: Body,
    /// Pipelines still being launched into this job. Holds it open so an
    /// early stage finishing cannot complete the job before later stages
    /// are added.
    launching: usize,
    status: Option<ExitStatus>,
    error: Option<String>,
    changed: watch::Sender<JobState>,
    /// Set to the signal number once the job is interrupted or killed.
    cancel: watch::Sender<Option<i32>>,
}

impl Job {
    /// A job that is just the tasks launched into it.
    pub fn pipeline(id: JobId, command: impl Into<String>, foreground: bool) -> Self {
        Self::new(id, command.into(), foreground, Body::None)
    }

    /// A background job whose body is evaluated by the language.
    pub fn with_body(id: JobId, command: impl Into<String>) -> Self {
        Self::new(id, command.into(), false, Body::Running)
    }

    fn new(id: JobId, command: String, foreground: bool, body: Body) -> Self {
        let state = if body == Body::Running {
            JobState::Running
        } else {
            JobState::Pending
        };
        Self {
            id,
            command,
            foreground,
            state,
            tasks: Vec::new(),
            groups: Vec::new(),
            body,
            launching: 0,
            status: None,
            error: None,
            changed: watch::channel(state).0,
            cancel: watch::channel(None).0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Final status, once the job is done.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.changed.subscribe()
    }

    pub(crate) fn cancellation(&self) -> watch::Receiver<Option<i32>> {
        self.cancel.subscribe()
    }

    pub(crate) fn add_task(&mut self, name: impl Into<String>) -> usize {
        self.tasks.push(TaskRecord {
            name: name.into(),
            pid: None,
            state: TaskState::Pending,
        });
        self.tasks.len() - 1
    }

    pub(crate) fn begin_launch(&mut self) {
        self.launching += 1;
        self.recompute();
        self.changed.send_replace(self.state);
    }

    pub(crate) fn set_pid(&mut self, task: usize, pid: Pid) {
        if let Some(record) = self.tasks.get_mut(task) {
            record.pid = Some(pid);
        }
    }

    pub(crate) fn add_group(&mut self, pgid: Pid) {
        if !self.groups.contains(&pgid) {
            self.groups.push(pgid);
        }
    }

    pub(crate) fn groups(&self) -> &[Pid] {
        &self.groups
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            command: self.command.clone(),
            state: self.state,
            foreground: self.foreground,
            status: self.status,
            pids: self
                .tasks
                .iter()
                .filter_map(|t| t.pid.map(|p| p.as_raw()))
                .collect(),
        }
    }

    /// Apply a task or body event and return the resulting state.
    ///
    /// Control events only flip task states here; the supervisor sends the
    /// actual signals.
    pub fn apply(&mut self, event: &JobEvent) -> JobState {
        if self.state == JobState::Done {
            return self.state;
        }
        match event {
            JobEvent::TaskSpawned { task } => self.set_task(*task, TaskState::Running),
            JobEvent::TaskStopped { task } => self.set_task(*task, TaskState::Stopped),
            JobEvent::TaskContinued { task } => self.set_task(*task, TaskState::Running),
            JobEvent::TaskExited { task, status } => {
                self.set_task(*task, TaskState::Exited(*status))
            }
            JobEvent::BodyFinished { status, error } => {
                self.body = Body::Finished(*status);
                if error.is_some() {
                    self.error = error.clone();
                }
            }
            JobEvent::Launched => self.launching = self.launching.saturating_sub(1),
            JobEvent::Resume => {
                for record in &mut self.tasks {
                    if record.state == TaskState::Stopped {
                        record.state = TaskState::Running;
                    }
                }
            }
            JobEvent::Interrupt
            | JobEvent::Suspend
            | JobEvent::Hangup
            | JobEvent::Terminate
            | JobEvent::Kill => {}
        }
        if let Some(signal) = event.signal().filter(|_| event.cancels()) {
            self.cancel.send_replace(Some(signal as i32));
        }
        self.recompute();
        self.changed.send_replace(self.state);
        self.state
    }

    fn set_task(&mut self, task: usize, state: TaskState) {
        if let Some(record) = self.tasks.get_mut(task) {
            // An exit is final; a late stop/continue report must not undo it.
            if !matches!(record.state, TaskState::Exited(_)) {
                tracing::trace!(job = %self.id, task = %record.name, ?state, "task state");
                record.state = state;
            }
        }
    }

    fn recompute(&mut self) {
        let running = self
            .tasks
            .iter()
            .any(|t| matches!(t.state, TaskState::Running | TaskState::Pending));
        let stopped = self.tasks.iter().any(|t| t.state == TaskState::Stopped);

        self.state = if stopped && !running {
            JobState::Stopped
        } else if running || self.body == Body::Running || self.launching > 0 {
            JobState::Running
        } else if self.tasks.is_empty() && self.body == Body::None {
            JobState::Pending
        } else {
            self.status = Some(match self.body {
                Body::Finished(status) => status,
                _ => self.last_task_status().unwrap_or_default(),
            });
            JobState::Done
        };
    }

    fn last_task_status(&self) -> Option<ExitStatus> {
        match self.tasks.last()?.state {
            TaskState::Exited(status) => Some(status),
            _ => None,
        }
    }

    /// Status of the last task in `range` once every task in it has exited.
    pub(crate) fn range_status(&self, range: Range<usize>) -> Option<ExitStatus> {
        let slice = self.tasks.get(range)?;
        let mut last = None;
        for record in slice {
            match record.state {
                TaskState::Exited(status) => last = Some(status),
                _ => return None,
            }
        }
        Some(last.unwrap_or_default())
    }

    /// True if any task in `range` is stopped and none is running.
    pub(crate) fn range_stopped(&self, range: Range<usize>) -> bool {
        let Some(slice) = self.tasks.get(range) else {
            return false;
        };
        slice.iter().any(|t| t.state == TaskState::Stopped)
            && !slice
                .iter()
                .any(|t| matches!(t.state, TaskState::Running | TaskState::Pending))
    }

    /// Live processes a control event should reach.
    pub(crate) fn signal_targets(&self) -> SignalTargets {
        let live: Vec<Pid> = self
            .tasks
            .iter()
            .filter(|t| !matches!(t.state, TaskState::Exited(_)))
            .filter_map(|t| t.pid)
            .collect();
        if live.is_empty() {
            return SignalTargets::default();
        }
        if self.groups.is_empty() {
            SignalTargets {
                groups: Vec::new(),
                pids: live,
            }
        } else {
            SignalTargets {
                groups: self.groups.clone(),
                pids: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(task: usize, code: i32) -> JobEvent {
        JobEvent::TaskExited {
            task,
            status: ExitStatus::from_code(code),
        }
    }

    fn pipeline_of(n: usize) -> Job {
        let mut job = Job::pipeline(JobId(1), "a | b", true);
        for i in 0..n {
            job.add_task(format!("t{i}"));
        }
        job
    }

    #[test]
    fn new_pipeline_is_pending() {
        let job = Job::pipeline(JobId(1), "true", true);
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.status(), None);
    }

    #[test]
    fn spawned_tasks_make_job_running() {
        let mut job = pipeline_of(2);
        assert_eq!(job.apply(&JobEvent::TaskSpawned { task: 0 }), JobState::Running);
        assert_eq!(job.apply(&JobEvent::TaskSpawned { task: 1 }), JobState::Running);
    }

    #[test]
    fn status_is_last_task_status() {
        let mut job = pipeline_of(2);
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        job.apply(&JobEvent::TaskSpawned { task: 1 });
        // Last task finishes first with success, first task fails later.
        assert_eq!(job.apply(&exited(1, 0)), JobState::Running);
        assert_eq!(job.apply(&exited(0, 3)), JobState::Done);
        assert_eq!(job.status(), Some(ExitStatus::SUCCESS));
    }

    #[test]
    fn stop_and_continue() {
        let mut job = pipeline_of(1);
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        assert_eq!(job.apply(&JobEvent::TaskStopped { task: 0 }), JobState::Stopped);
        assert_eq!(job.apply(&JobEvent::Resume), JobState::Running);
        assert_eq!(job.apply(&JobEvent::TaskStopped { task: 0 }), JobState::Stopped);
        assert_eq!(job.apply(&JobEvent::TaskContinued { task: 0 }), JobState::Running);
    }

    #[test]
    fn partially_stopped_pipeline_is_still_running() {
        let mut job = pipeline_of(2);
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        job.apply(&JobEvent::TaskSpawned { task: 1 });
        assert_eq!(job.apply(&JobEvent::TaskStopped { task: 0 }), JobState::Running);
        assert_eq!(job.apply(&JobEvent::TaskStopped { task: 1 }), JobState::Stopped);
    }

    #[test]
    fn done_is_terminal() {
        let mut job = pipeline_of(1);
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        job.apply(&exited(0, 0));
        assert_eq!(job.apply(&JobEvent::TaskStopped { task: 0 }), JobState::Done);
        assert_eq!(job.status(), Some(ExitStatus::SUCCESS));
    }

    #[test]
    fn body_job_waits_for_body_and_tasks() {
        let mut job = Job::with_body(JobId(2), "sleep 1 &");
        assert_eq!(job.state(), JobState::Running);
        let t = job.add_task("sleep");
        job.apply(&JobEvent::TaskSpawned { task: t });
        job.apply(&exited(t, 0));
        assert_eq!(job.state(), JobState::Running, "body still evaluating");
        job.apply(&JobEvent::BodyFinished {
            status: ExitStatus::from_code(4),
            error: Some("boom".into()),
        });
        assert_eq!(job.state(), JobState::Done);
        assert_eq!(job.status(), Some(ExitStatus::from_code(4)));
        assert_eq!(job.error(), Some("boom"));
    }

    #[test]
    fn launch_hold_keeps_job_open() {
        let mut job = Job::pipeline(JobId(1), "echo | cat", true);
        job.begin_launch();
        let first = job.add_task("echo");
        job.apply(&JobEvent::TaskSpawned { task: first });
        assert_eq!(job.apply(&exited(first, 0)), JobState::Running);
        let second = job.add_task("cat");
        job.apply(&JobEvent::TaskSpawned { task: second });
        assert_eq!(job.apply(&JobEvent::Launched), JobState::Running);
        assert_eq!(job.apply(&exited(second, 3)), JobState::Done);
        assert_eq!(job.status(), Some(ExitStatus::from_code(3)));
    }

    #[test]
    fn range_status_needs_every_task() {
        let mut job = pipeline_of(3);
        for t in 0..3 {
            job.apply(&JobEvent::TaskSpawned { task: t });
        }
        job.apply(&exited(1, 0));
        job.apply(&exited(2, 5));
        assert_eq!(job.range_status(1..3), Some(ExitStatus::from_code(5)));
        assert_eq!(job.range_status(0..3), None);
    }

    #[test]
    fn interrupt_requests_cancellation() {
        let mut job = pipeline_of(1);
        let cancel = job.cancellation();
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        assert_eq!(*cancel.borrow(), None);
        job.apply(&JobEvent::Interrupt);
        assert_eq!(*cancel.borrow(), Some(Signal::SIGINT as i32));
    }

    #[test]
    fn signal_targets_prefer_groups() {
        let mut job = pipeline_of(2);
        job.set_pid(0, Pid::from_raw(100));
        job.set_pid(1, Pid::from_raw(101));
        job.apply(&JobEvent::TaskSpawned { task: 0 });
        job.apply(&JobEvent::TaskSpawned { task: 1 });
        assert_eq!(job.signal_targets().pids.len(), 2);
        job.add_group(Pid::from_raw(100));
        assert_eq!(job.signal_targets().groups, vec![Pid::from_raw(100)]);
        job.apply(&exited(0, 0));
        job.apply(&exited(1, 0));
        assert_eq!(job.signal_targets(), SignalTargets::default());
    }

    #[test]
    fn signal_names() {
        assert_eq!(JobEvent::from_signal_name("-INT"), Some(JobEvent::Interrupt));
        assert_eq!(JobEvent::from_signal_name("SIGKILL"), Some(JobEvent::Kill));
        assert_eq!(JobEvent::from_signal_name("-9"), Some(JobEvent::Kill));
        assert_eq!(JobEvent::from_signal_name("bogus"), None);
    }

    #[test]
    fn exit_status_conventions() {
        assert!(ExitStatus::SUCCESS.success());
        assert!(!ExitStatus::from_signal(0).success());
        assert_eq!(ExitStatus::from_signal(9).code(), 137);
        assert_eq!(ExitStatus::stopped().code(), 148);
        assert_eq!(ExitStatus::NOT_FOUND.code(), 127);
    }
}
