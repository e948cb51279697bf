//! Terminal ownership and shell signal handling for interactive job control.

use std::io::{self, IsTerminal};
use std::os::fd::BorrowedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::Arc;

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::unistd::{getpgrp, tcgetpgrp, tcsetpgrp, Pid};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use super::job::JobEvent;
use super::supervisor::Supervisor;

/// The controlling terminal, held by the shell between foreground jobs.
#[derive(Debug, Clone)]
pub struct Terminal {
    shell_pgid: Pid,
}

impl Terminal {
    /// Take charge of the terminal if stdin is one and the shell is in its
    /// foreground process group.
    pub fn acquire() -> Option<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        let shell_pgid = getpgrp();
        match tcgetpgrp(&stdin) {
            Ok(foreground) if foreground == shell_pgid => Some(Self { shell_pgid }),
            Ok(foreground) => {
                tracing::debug!(%foreground, %shell_pgid, "not the foreground process group");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "tcgetpgrp failed");
                None
            }
        }
    }

    /// Hand the terminal to process group `pgid`.
    pub fn give_to(&self, pgid: Pid) {
        if let Err(e) = with_ttou_blocked(|| tcsetpgrp(io::stdin(), pgid)) {
            tracing::debug!(%pgid, error = %e, "failed to give terminal");
        }
    }

    /// Take the terminal back for the shell.
    pub fn reclaim(&self) {
        if let Err(e) = with_ttou_blocked(|| tcsetpgrp(io::stdin(), self.shell_pgid)) {
            tracing::warn!("failed to reclaim terminal: {}", e);
        }
    }

    /// Make a group-leading child take the terminal before it execs, so it
    /// never runs in the background even briefly.
    pub(crate) fn claim_in_child(cmd: &mut Command) {
        // SAFETY: the hook runs between fork and exec and only makes
        // async-signal-safe calls: sigprocmask, getpgrp and tcsetpgrp on fd 0.
        unsafe {
            cmd.pre_exec(|| {
                let stdin = BorrowedFd::borrow_raw(0);
                let _ = with_ttou_blocked(|| tcsetpgrp(stdin, getpgrp()));
                Ok(())
            });
        }
    }
}

/// Changing the foreground group from a background process raises SIGTTOU.
fn with_ttou_blocked<T>(f: impl FnOnce() -> T) -> T {
    let mut set = SigSet::empty();
    set.add(Signal::SIGTTOU);
    let mut old = SigSet::empty();
    let blocked = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old)).is_ok();
    let out = f();
    if blocked {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&old), None);
    }
    out
}

/// Translate signals aimed at the shell into job events.
///
/// SIGINT and SIGTSTP go to the foreground job; SIGHUP hangs up every job.
pub fn listen(supervisor: Arc<Supervisor>) -> io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut suspend = signal(SignalKind::from_raw(Signal::SIGTSTP as i32))?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = interrupt.recv() => {
                    tracing::debug!("SIGINT");
                    supervisor.signal_foreground(JobEvent::Interrupt);
                }
                Some(()) = suspend.recv() => {
                    tracing::debug!("SIGTSTP");
                    supervisor.signal_foreground(JobEvent::Suspend);
                }
                Some(()) = hangup.recv() => {
                    tracing::debug!("SIGHUP");
                    supervisor.hangup();
                }
                else => break,
            }
        }
    }))
}
