//! Process supervisor.
//!
//! Owns the job table and the last-status register. Every change to a job
//! goes through [`Supervisor::deliver`], which takes the table lock, applies
//! the event to the job's state machine and forwards control events to the
//! job's processes as signals.
//!
//! ```text
//!  evaluator ──launch──▶ Supervisor ──spawn──▶ child processes
//!      ▲                    │  ▲                    │
//!      │ watch<JobState>    │  └──deliver(event)────┤ reaper threads
//!      └────────────────────┘                       │ (waitpid)
//! ```
//!
//! Reapers are plain OS threads, one per child, each blocking in `waitpid`
//! until its pid has been collected. They are started only after a whole
//! pipeline is spawned so a group leader cannot be reaped before the rest of
//! the pipeline has joined its process group.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::ops::Range;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::sync::{oneshot, watch, Notify};

use crate::interpreter::EvalError;

use super::io::{ChildIo, Io};
use super::job::{ExitStatus, Job, JobEvent, JobId, JobInfo, JobState, SignalTargets};
use super::terminal::Terminal;

/// What to do with background jobs when the shell goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every background job to finish.
    Drain,
    /// Stop tracking them and let them run on.
    Detach,
}

#[derive(Debug)]
struct JobTable {
    jobs: BTreeMap<JobId, Job>,
    next_id: u64,
    foreground: Option<JobId>,
    last_status: ExitStatus,
    notices: Vec<String>,
}

impl JobTable {
    fn allocate(&mut self) -> JobId {
        // Reuse small numbers once the table has emptied out.
        if self.jobs.is_empty() {
            self.next_id = 1;
        }
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Drop finished background jobs whose completion has been reported.
    fn prune(&mut self) {
        self.jobs
            .retain(|_, job| job.foreground || job.state() != JobState::Done);
    }
}

/// An external task that was spawned and still needs a reaper.
pub(crate) struct Spawned {
    task: usize,
    pid: Pid,
    io: ChildIo,
}

impl Spawned {
    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }
}

/// Shared job table plus the machinery that drives it.
pub struct Supervisor {
    table: Mutex<JobTable>,
    terminal: Option<Terminal>,
    /// Signalled when an interrupt arrives with no foreground job to take it.
    interrupted: Notify,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("job_control", &self.terminal.is_some())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor. With a terminal, jobs get their own process groups
    /// and the terminal follows the foreground job.
    pub fn new(terminal: Option<Terminal>) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(JobTable {
                jobs: BTreeMap::new(),
                next_id: 1,
                foreground: None,
                last_status: ExitStatus::SUCCESS,
                notices: Vec::new(),
            }),
            terminal,
            interrupted: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn job_control(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn last_status(&self) -> ExitStatus {
        self.lock().last_status
    }

    pub fn record_status(&self, status: ExitStatus) {
        self.lock().last_status = status;
    }

    /// Register a job made of the tasks later launched into it.
    pub fn create_job(&self, command: impl Into<String>, foreground: bool) -> JobId {
        let mut table = self.lock();
        let id = table.allocate();
        let job = Job::pipeline(id, command, foreground);
        tracing::debug!(job = %id, command = %job.command, foreground, "job created");
        table.jobs.insert(id, job);
        if foreground {
            table.foreground = Some(id);
        }
        id
    }

    /// Register a background job whose body is evaluated by the caller, who
    /// must report its end with [`Supervisor::finish_body`].
    pub fn create_body_job(&self, command: impl Into<String>) -> JobId {
        let mut table = self.lock();
        let id = table.allocate();
        let job = Job::with_body(id, command);
        tracing::debug!(job = %id, command = %job.command, "background job created");
        table.jobs.insert(id, job);
        id
    }

    /// Single entry point for every job state change.
    pub fn deliver(&self, id: JobId, event: JobEvent) -> Option<JobState> {
        let mut table = self.lock();
        let job = table.jobs.get_mut(&id)?;
        let before = job.state();

        if let Some(signal) = event.signal() {
            send_signal(&job.signal_targets(), signal, self.terminal.is_some());
        }
        let after = job.apply(&event);

        if before != after {
            tracing::debug!(job = %id, ?event, from = %before, to = %after, "job transition");
        } else {
            tracing::trace!(job = %id, ?event, state = %after, "job event");
        }

        if after == JobState::Done && before != JobState::Done && !job.foreground {
            let info = job.info();
            let error = job.error().map(str::to_string);
            if let Some(error) = error {
                tracing::warn!(job = %id, %error, "background job failed");
                table.notices.push(format!("[{}] {}", id, error));
            }
            table.notices.push(info.to_string());
        }
        Some(after)
    }

    /// Launch a task that runs in-process.
    ///
    /// The future's status becomes the task's exit status. The task is
    /// cancelled when the job is interrupted, hung up or killed.
    pub(crate) fn spawn_internal<F>(self: &Arc<Self>, id: JobId, name: &str, fut: F) -> usize
    where
        F: Future<Output = ExitStatus> + Send + 'static,
    {
        let (task, mut cancel) = {
            let mut table = self.lock();
            match table.jobs.get_mut(&id) {
                Some(job) => (job.add_task(name), job.cancellation()),
                None => return usize::MAX,
            }
        };
        self.deliver(id, JobEvent::TaskSpawned { task });

        let sup = Arc::clone(self);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = fut => status,
                signal = cancelled(&mut cancel) => ExitStatus::from_signal(signal),
            };
            sup.deliver(id, JobEvent::TaskExited { task, status });
        });
        task
    }

    /// Hold job `id` open while a pipeline is launched into it; released by
    /// [`Supervisor::end_launch`].
    pub(crate) fn begin_launch(&self, id: JobId) {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.begin_launch();
        }
    }

    pub(crate) fn end_launch(&self, id: JobId) {
        self.deliver(id, JobEvent::Launched);
    }

    /// Forget a foreground job that never got any tasks.
    pub(crate) fn abandon(&self, id: JobId) {
        let mut table = self.lock();
        if table.jobs.get(&id).is_some_and(|job| job.task_count() == 0) {
            table.jobs.remove(&id);
        }
        if table.foreground == Some(id) {
            table.foreground = None;
        }
    }

    /// Process group external tasks of job `id` join, once it has one.
    pub(crate) fn job_group(&self, id: JobId) -> Option<Pid> {
        self.lock().jobs.get(&id).and_then(|job| job.groups().first().copied())
    }

    /// True if job `id` currently owns the terminal.
    pub(crate) fn is_foreground(&self, id: JobId) -> bool {
        self.lock().foreground == Some(id)
    }

    /// Record a task that failed before it could start.
    pub(crate) fn fail_task(&self, id: JobId, name: &str, status: ExitStatus) -> usize {
        let task = match self.lock().jobs.get_mut(&id) {
            Some(job) => job.add_task(name),
            None => return usize::MAX,
        };
        self.deliver(id, JobEvent::TaskExited { task, status });
        task
    }

    /// Spawn an external command into job `id`.
    ///
    /// `group` is the process group to join; `None` makes this process the
    /// leader of a new group when job control is on. Spawn failures are not
    /// errors of the caller: the task is recorded as exited with 127 or 126
    /// and the [`EvalError::ProcessSpawn`] is written to the task's stderr.
    pub(crate) async fn spawn_external(
        &self,
        id: JobId,
        argv: &[String],
        io: &Io,
        cwd: &Path,
        group: Option<Pid>,
        foreground: bool,
    ) -> Option<Spawned> {
        let name = argv.first().map(String::as_str).unwrap_or_default();
        let child_io = match io.child_stdio() {
            Ok(child_io) => child_io,
            Err(e) => {
                let _ = io.stderr.write_text(&format!("{name}: {e}\n")).await;
                self.fail_task(id, name, ExitStatus::FAILURE);
                return None;
            }
        };
        let mut child_io = child_io;
        let Some((stdin, stdout, stderr)) = child_io.stdio.take() else {
            return None;
        };

        let mut cmd = std::process::Command::new(name);
        cmd.args(&argv[1..])
            .current_dir(cwd)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr);

        if self.terminal.is_some() {
            cmd.process_group(group.map_or(0, Pid::as_raw));
            if foreground && group.is_none() {
                Terminal::claim_in_child(&mut cmd);
            }
        }

        let spawned = cmd.spawn();
        // Dropping the command closes our copies of the child's pipe ends.
        drop(cmd);

        match spawned {
            Ok(child) => {
                let pid = Pid::from_raw(child.id() as i32);
                let task = {
                    let mut table = self.lock();
                    let Some(job) = table.jobs.get_mut(&id) else {
                        return None;
                    };
                    let task = job.add_task(name);
                    job.set_pid(task, pid);
                    if self.terminal.is_some() {
                        job.add_group(group.unwrap_or(pid));
                    }
                    task
                };
                self.deliver(id, JobEvent::TaskSpawned { task });
                tracing::debug!(job = %id, %pid, command = name, "spawned");

                if foreground && group.is_none() {
                    if let Some(terminal) = &self.terminal {
                        terminal.give_to(pid);
                    }
                }
                Some(Spawned { task, pid, io: child_io })
            }
            Err(e) => {
                let (status, message) = match e.kind() {
                    io::ErrorKind::NotFound => (ExitStatus::NOT_FOUND, "command not found".to_string()),
                    io::ErrorKind::PermissionDenied => {
                        (ExitStatus::NOT_EXECUTABLE, "permission denied".to_string())
                    }
                    _ => (ExitStatus::NOT_EXECUTABLE, e.to_string()),
                };
                tracing::debug!(job = %id, command = name, error = %e, "spawn failed");
                let err = EvalError::ProcessSpawn {
                    name: name.to_string(),
                    message,
                    status,
                };
                let _ = io.stderr.write_text(&format!("conch: {err}\n")).await;
                child_io.finish().await;
                self.fail_task(id, name, err.status());
                None
            }
        }
    }

    /// Start one reaper per spawned process.
    pub(crate) fn start_reapers(self: &Arc<Self>, id: JobId, spawned: Vec<Spawned>) {
        for Spawned { task, pid, io } in spawned {
            let (exit_tx, exit_rx) = oneshot::channel();
            let reaper = Reaper {
                sup: Arc::clone(self),
                id,
                task,
                pid,
                exit: exit_tx,
            };
            launch_reaper(reaper, |slot| {
                std::thread::Builder::new()
                    .name(format!("reap-{pid}"))
                    .spawn(move || slot.run())
                    .map(drop)
            });

            // Output bridges must drain before the task counts as exited.
            let sup = Arc::clone(self);
            tokio::spawn(async move {
                let status = exit_rx.await.unwrap_or(ExitStatus::FAILURE);
                io.finish().await;
                sup.deliver(id, JobEvent::TaskExited { task, status });
            });
        }
    }

    /// Wait until the tasks in `range` have all exited, or have stopped.
    ///
    /// Returns the status of the last task in the range, or `None` if they
    /// stopped first.
    pub(crate) async fn wait_tasks(&self, id: JobId, range: Range<usize>) -> Option<ExitStatus> {
        let Some(mut changes) = self.lock().jobs.get(&id).map(Job::subscribe) else {
            return Some(ExitStatus::FAILURE);
        };
        loop {
            {
                let table = self.lock();
                let Some(job) = table.jobs.get(&id) else {
                    return Some(ExitStatus::FAILURE);
                };
                if let Some(status) = job.range_status(range.clone()) {
                    return Some(status);
                }
                if job.range_stopped(range.clone()) {
                    return None;
                }
            }
            if changes.changed().await.is_err() {
                return Some(ExitStatus::FAILURE);
            }
        }
    }

    /// Wait on the tasks `range` of a foreground job.
    ///
    /// A job that stops is moved to the background and reports 148. A job
    /// that finishes is removed from the table.
    pub(crate) async fn wait_foreground(&self, id: JobId, range: Range<usize>) -> ExitStatus {
        let outcome = self.wait_tasks(id, range).await;
        if let Some(terminal) = &self.terminal {
            terminal.reclaim();
        }
        self.settle_foreground(id, outcome)
    }

    fn settle_foreground(&self, id: JobId, outcome: Option<ExitStatus>) -> ExitStatus {
        let mut table = self.lock();
        if table.foreground == Some(id) {
            table.foreground = None;
        }
        match outcome {
            Some(status) => {
                let done = table.jobs.get(&id).is_some_and(|j| j.state() == JobState::Done);
                if done {
                    table.jobs.remove(&id);
                } else if let Some(job) = table.jobs.get_mut(&id) {
                    // Finished tasks of a job that still has live ones, e.g. an
                    // internal stage that outlived its pipeline.
                    job.foreground = false;
                }
                status
            }
            None => {
                if let Some(job) = table.jobs.get_mut(&id) {
                    job.foreground = false;
                    let notice = format!("[{}]+ Stopped\t{}", id, job.command);
                    table.notices.push(notice);
                }
                ExitStatus::stopped()
            }
        }
    }

    /// Report the end of a background job's body.
    pub fn finish_body(&self, id: JobId, status: ExitStatus, error: Option<String>) {
        self.deliver(id, JobEvent::BodyFinished { status, error });
    }

    /// Wait for a job to finish and collect its status.
    pub async fn wait_job(&self, id: JobId) -> Option<ExitStatus> {
        let mut changes = self.lock().jobs.get(&id).map(Job::subscribe)?;
        loop {
            {
                let mut table = self.lock();
                let job = table.jobs.get(&id)?;
                if job.state() == JobState::Done {
                    let status = job.status();
                    table.jobs.remove(&id);
                    return status;
                }
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Continue a stopped job, in the foreground or the background.
    ///
    /// In the foreground this waits for the job like any other foreground
    /// job, so it may stop again.
    pub async fn resume(&self, id: JobId, foreground: bool) -> Option<ExitStatus> {
        let (groups, command, count) = {
            let mut table = self.lock();
            let job = table.jobs.get_mut(&id)?;
            job.foreground = foreground;
            let groups = job.signal_targets().groups;
            let command = job.command.clone();
            let count = job.task_count();
            if foreground {
                table.foreground = Some(id);
            }
            (groups, command, count)
        };
        tracing::debug!(job = %id, foreground, command = %command, "resuming");

        if foreground {
            if let (Some(terminal), Some(pgid)) = (&self.terminal, groups.first()) {
                terminal.give_to(*pgid);
            }
        }
        self.deliver(id, JobEvent::Resume)?;

        if !foreground {
            return Some(ExitStatus::SUCCESS);
        }
        let outcome = self.wait_tasks(id, 0..count).await;
        if let Some(terminal) = &self.terminal {
            terminal.reclaim();
        }
        // A body job is not done when its tasks are; wait for the body too.
        let outcome = match outcome {
            Some(_) => self.wait_job_state(id).await.or(outcome),
            None => None,
        };
        Some(self.settle_foreground(id, outcome))
    }

    async fn wait_job_state(&self, id: JobId) -> Option<ExitStatus> {
        let mut changes = self.lock().jobs.get(&id).map(Job::subscribe)?;
        loop {
            {
                let table = self.lock();
                let job = table.jobs.get(&id)?;
                match job.state() {
                    JobState::Done => return job.status(),
                    JobState::Stopped => return None,
                    _ => {}
                }
            }
            changes.changed().await.ok()?;
        }
    }

    /// Send a control event to the foreground job. With none running, an
    /// interrupt wakes whoever is waiting in [`Supervisor::interrupted`].
    pub fn signal_foreground(&self, event: JobEvent) {
        let foreground = self.lock().foreground;
        match foreground {
            Some(id) => {
                self.deliver(id, event);
            }
            None if event == JobEvent::Interrupt => self.interrupted.notify_waiters(),
            None => {}
        }
    }

    /// Resolves on the next interrupt that has no foreground job to go to.
    pub async fn interrupted(&self) {
        self.interrupted.notified().await;
    }

    /// Terminal hangup: every job gets SIGHUP, stopped ones a SIGCONT so they
    /// can act on it.
    pub fn hangup(&self) {
        let ids: Vec<JobId> = self.lock().jobs.keys().copied().collect();
        tracing::debug!(jobs = ids.len(), "hangup");
        for id in ids {
            self.deliver(id, JobEvent::Hangup);
            self.deliver(id, JobEvent::Resume);
        }
    }

    /// Snapshot of every job. Finished background jobs are reported once.
    pub fn list(&self) -> Vec<JobInfo> {
        let mut table = self.lock();
        let infos = table.jobs.values().map(Job::info).collect();
        table.notices.clear();
        table.prune();
        infos
    }

    pub fn get(&self, id: JobId) -> Option<JobInfo> {
        self.lock().jobs.get(&id).map(Job::info)
    }

    /// The job `fg`, `bg` and `wait` act on by default: the newest stopped
    /// job, else the newest one.
    pub fn current_job(&self) -> Option<JobId> {
        let table = self.lock();
        table
            .jobs
            .values()
            .rev()
            .find(|j| j.state() == JobState::Stopped)
            .or_else(|| table.jobs.values().next_back())
            .map(|j| j.id)
    }

    /// Deliver a control event to a job.
    pub fn signal(&self, id: JobId, event: JobEvent) -> Option<JobState> {
        self.deliver(id, event)
    }

    /// Completion and stop notices accumulated since the last call.
    pub fn take_notices(&self) -> Vec<String> {
        let mut table = self.lock();
        let notices = std::mem::take(&mut table.notices);
        table.prune();
        notices
    }

    /// Cancellation signal of a job's in-process work.
    pub(crate) fn cancellation(&self, id: JobId) -> Option<watch::Receiver<Option<i32>>> {
        self.lock().jobs.get(&id).map(Job::cancellation)
    }

    /// Number of tasks launched into a job so far.
    pub(crate) fn task_count(&self, id: JobId) -> usize {
        self.lock().jobs.get(&id).map_or(0, Job::task_count)
    }

    /// Ids of all jobs that have not finished.
    pub fn live_jobs(&self) -> Vec<JobId> {
        self.lock()
            .jobs
            .values()
            .filter(|j| j.state() != JobState::Done)
            .map(|j| j.id)
            .collect()
    }

    /// Drain or detach every remaining job.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let live = self.live_jobs();
        tracing::debug!(?mode, jobs = live.len(), "supervisor shutdown");
        match mode {
            ShutdownMode::Drain => {
                for id in live {
                    // A stopped job would never drain on its own.
                    if self.get(id).is_some_and(|j| j.state == JobState::Stopped) {
                        self.deliver(id, JobEvent::Resume);
                    }
                    self.wait_job(id).await;
                }
            }
            ShutdownMode::Detach => {
                let mut table = self.lock();
                table.jobs.clear();
                table.foreground = None;
            }
        }
    }
}

/// Resolves with the signal number once the job is cancelled.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<Option<i32>>) -> i32 {
    match cancel.wait_for(Option::is_some).await {
        Ok(signal) => signal.unwrap_or(Signal::SIGKILL as i32),
        // The job is gone from the table.
        Err(_) => Signal::SIGHUP as i32,
    }
}

fn send_signal(targets: &SignalTargets, signal: Signal, groups: bool) {
    if groups {
        for pgid in &targets.groups {
            if let Err(e) = killpg(*pgid, signal) {
                tracing::debug!(%pgid, ?signal, error = %e, "killpg failed");
            }
        }
    }
    if !groups || targets.groups.is_empty() {
        for pid in &targets.pids {
            if let Err(e) = kill(*pid, signal) {
                tracing::debug!(%pid, ?signal, error = %e, "kill failed");
            }
        }
    }
}

/// Collect one child, reporting stops and continues on the way.
/// Everything needed to collect one child.
struct Reaper {
    sup: Arc<Supervisor>,
    id: JobId,
    task: usize,
    pid: Pid,
    exit: oneshot::Sender<ExitStatus>,
}

/// A reaper handed to whichever thread ends up running it. Only the first
/// `run` does anything.
#[derive(Clone)]
struct ReaperSlot(Arc<Mutex<Option<Reaper>>>);

impl ReaperSlot {
    fn run(&self) {
        let reaper = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(Reaper { sup, id, task, pid, exit }) = reaper {
            reap(sup, id, task, pid, exit);
        }
    }
}

/// Run `reaper` on the thread `start` creates. When no thread can be
/// started the blocking pool runs it instead, so the child is still waited
/// on exactly once.
fn launch_reaper(reaper: Reaper, start: impl FnOnce(ReaperSlot) -> io::Result<()>) {
    let pid = reaper.pid;
    let slot = ReaperSlot(Arc::new(Mutex::new(Some(reaper))));
    if let Err(e) = start(slot.clone()) {
        tracing::warn!(%pid, error = %e, "failed to start reaper thread, using the blocking pool");
        tokio::task::spawn_blocking(move || slot.run());
    }
}

fn reap(sup: Arc<Supervisor>, id: JobId, task: usize, pid: Pid, exit: oneshot::Sender<ExitStatus>) {
    let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let status = loop {
        match waitpid(pid, Some(flags)) {
            Ok(WaitStatus::Exited(_, code)) => break ExitStatus::from_code(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => break ExitStatus::from_signal(signal as i32),
            Ok(WaitStatus::Stopped(_, signal)) => {
                tracing::debug!(job = %id, %pid, ?signal, "stopped");
                sup.deliver(id, JobEvent::TaskStopped { task });
            }
            Ok(WaitStatus::Continued(_)) => {
                tracing::debug!(job = %id, %pid, "continued");
                sup.deliver(id, JobEvent::TaskContinued { task });
            }
            Ok(_) => {}
            Err(Errno::EINTR) => {}
            Err(e) => {
                tracing::warn!(job = %id, %pid, error = %e, "waitpid failed");
                break ExitStatus::FAILURE;
            }
        }
    };
    tracing::debug!(job = %id, %pid, %status, "reaped");
    let _ = exit.send(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    async fn run(sup: &Arc<Supervisor>, words: &[&str], io: &Io) -> (JobId, ExitStatus) {
        let id = sup.create_job(words.join(" "), true);
        let cwd = std::env::current_dir().unwrap();
        let spawned = sup
            .spawn_external(id, &argv(words), io, &cwd, None, true)
            .await;
        sup.start_reapers(id, spawned.into_iter().collect());
        (id, sup.wait_foreground(id, 0..1).await)
    }

    #[tokio::test]
    async fn external_exit_status_is_reported() {
        let sup = Supervisor::new(None);
        let io = Io::inherit().with_stdout(super::super::io::Sink::Null);
        let (id, status) = run(&sup, &["sh", "-c", "exit 3"], &io).await;
        assert_eq!(status.code(), 3);
        assert!(sup.get(id).is_none(), "finished foreground jobs leave the table");
    }

    #[tokio::test]
    async fn child_is_reaped_without_a_reaper_thread() {
        let sup = Supervisor::new(None);
        let id = sup.create_job("sh -c exit 5", false);
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 5"])
            .spawn()
            .unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        let (exit_tx, exit_rx) = oneshot::channel();
        let reaper = Reaper {
            sup,
            id,
            task: 0,
            pid,
            exit: exit_tx,
        };
        launch_reaper(reaper, |_| Err(io::Error::other("no threads left")));

        let status = tokio::time::timeout(Duration::from_secs(5), exit_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), 5);
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[tokio::test]
    async fn missing_command_is_127() {
        let sup = Supervisor::new(None);
        let (sink, err) = super::super::io::Sink::capture();
        let io = Io {
            stdin: super::super::io::Source::Null,
            stdout: super::super::io::Sink::Null,
            stderr: sink,
        };
        let (_, status) = run(&sup, &["conch-no-such-command"], &io).await;
        assert_eq!(status, ExitStatus::NOT_FOUND);
        let err = String::from_utf8(err.lock().unwrap().clone()).unwrap();
        assert!(err.contains("command not found"), "{err}");
    }

    #[tokio::test]
    async fn suspended_foreground_job_moves_to_background() {
        let sup = Supervisor::new(None);
        let id = sup.create_job("sleep 5", true);
        let cwd = std::env::current_dir().unwrap();
        let spawned = sup
            .spawn_external(id, &argv(&["sleep", "5"]), &Io::inherit(), &cwd, None, true)
            .await;
        sup.start_reapers(id, spawned.into_iter().collect());

        let waiter = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.wait_foreground(id, 0..1).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        sup.deliver(id, JobEvent::Suspend);
        let status = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, ExitStatus::stopped());
        assert_eq!(sup.get(id).unwrap().state, JobState::Stopped);
        assert!(sup.take_notices()[0].contains("Stopped"));

        sup.deliver(id, JobEvent::Resume);
        sup.deliver(id, JobEvent::Kill);
        let status = tokio::time::timeout(Duration::from_secs(2), sup.wait_job(id))
            .await
            .unwrap();
        assert_eq!(status, Some(ExitStatus::from_signal(9)));
    }

    #[tokio::test]
    async fn interrupt_cancels_internal_tasks() {
        let sup = Supervisor::new(None);
        let id = sup.create_job("forever", true);
        sup.spawn_internal(id, "forever", std::future::pending::<ExitStatus>());
        let waiter = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.wait_foreground(id, 0..1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        sup.signal_foreground(JobEvent::Interrupt);
        let status = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), 130);
    }

    #[tokio::test]
    async fn background_completion_produces_notice() {
        let sup = Supervisor::new(None);
        let id = sup.create_body_job("true &");
        sup.finish_body(id, ExitStatus::SUCCESS, None);
        let notices = sup.take_notices();
        assert_eq!(notices, vec![format!("[{id}] Done\ttrue &")]);
        assert!(sup.get(id).is_none(), "reported jobs are pruned");
    }

    #[tokio::test]
    async fn drain_waits_for_background_jobs() {
        let sup = Supervisor::new(None);
        let id = sup.create_body_job("slow");
        {
            let sup = sup.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                sup.finish_body(id, ExitStatus::from_code(2), None);
            });
        }
        tokio::time::timeout(Duration::from_secs(1), sup.shutdown(ShutdownMode::Drain))
            .await
            .unwrap();
        assert!(sup.live_jobs().is_empty());
    }
}
