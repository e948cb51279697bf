//! Scheduler: jobs, pipes and the process supervisor.
//!
//! This module provides:
//! - **Pipes**: first-class channels, either an in-process value queue or
//!   an OS pipe, with the printable syntax as the text boundary.
//! - **Pipeline building**: command forms become tasks of a job, wired by
//!   pipes and redirections.
//! - **Supervision**: spawning, reaping, job state, foreground/background
//!   and terminal handling.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     run_pipeline                             │
//! │  ┌─────────┐   pipe     ┌─────────┐   pipe     ┌─────────┐   │
//! │  │ task 0  │──────────▶ │ task 1  │──────────▶ │ task 2  │   │
//! │  │ process │            │ internal│            │ process │   │
//! │  └─────────┘            └─────────┘            └─────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Supervisor                              │
//! │  jobs: BTreeMap<JobId, Job>   last status   notices          │
//! │  - deliver(JobId, JobEvent) → JobState                       │
//! │  - wait_foreground / wait_job / resume                       │
//! │  - reaper threads: waitpid → TaskExited                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod io;
mod job;
mod pipe;
mod pipeline;
mod queue;
mod supervisor;
mod terminal;

pub use io::{FileSource, Io, Sink, Source};
pub use job::{ExitStatus, Job, JobEvent, JobId, JobInfo, JobState, TaskState};
pub use pipe::Pipe;
pub use pipeline::run_pipeline;
pub use queue::{TrySendError, ValueQueue, DEFAULT_CAPACITY};
pub use supervisor::{ShutdownMode, Supervisor};
pub use terminal::{listen, Terminal};

pub(crate) use supervisor::cancelled;
