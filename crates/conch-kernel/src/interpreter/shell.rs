//! Process-wide interpreter state shared by every evaluation.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::paths;
use crate::scheduler::{Io, JobId, Supervisor};
use crate::tools;

use super::object::Object;
use super::scope::{Env, Frame};
use super::value::Value;

#[derive(Debug)]
struct Dirs {
    cwd: PathBuf,
    previous: Option<PathBuf>,
}

/// Global environment, root object, working directory and supervisor.
#[derive(Debug)]
pub struct Shell {
    pub supervisor: Arc<Supervisor>,
    pub globals: Env,
    /// Prototype of every `object`.
    pub root: Object,
    pub pipe_capacity: usize,
    dirs: Mutex<Dirs>,
}

impl Shell {
    pub fn new(supervisor: Arc<Supervisor>, cwd: PathBuf, pipe_capacity: usize) -> Arc<Self> {
        let globals = Frame::global();
        tools::register_builtins(&globals);
        let root = Object::new(None);
        tools::register_root_members(&root);
        Arc::new(Self {
            supervisor,
            globals,
            root,
            pipe_capacity,
            dirs: Mutex::new(Dirs {
                cwd,
                previous: None,
            }),
        })
    }

    fn dirs(&self) -> std::sync::MutexGuard<'_, Dirs> {
        self.dirs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cwd(&self) -> PathBuf {
        self.dirs().cwd.clone()
    }

    pub fn previous_dir(&self) -> Option<PathBuf> {
        self.dirs().previous.clone()
    }

    /// Resolve `path` against the working directory, expanding a leading `~`.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = match path.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                paths::home_dir().join(rest.trim_start_matches('/'))
            }
            _ => PathBuf::from(path),
        };
        if expanded.is_absolute() {
            expanded
        } else {
            self.dirs().cwd.join(expanded)
        }
    }

    /// Change the working directory. Returns the new directory.
    pub fn chdir(&self, path: &Path) -> io::Result<PathBuf> {
        let target = self.resolve(&path.to_string_lossy());
        let target = std::fs::canonicalize(&target)?;
        if !target.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                "not a directory",
            ));
        }
        let mut dirs = self.dirs();
        let old = std::mem::replace(&mut dirs.cwd, target.clone());
        dirs.previous = Some(old);
        Ok(target)
    }

    /// Break reference cycles between globals, objects and closures.
    pub fn teardown(&self) {
        self.globals.clear();
        self.root.clear();
    }
}

/// Everything an evaluation step needs besides the syntax and environment.
#[derive(Clone, Debug)]
pub struct Context {
    pub shell: Arc<Shell>,
    pub io: Io,
    /// Background job this evaluation runs inside, if any.
    pub job: Option<JobId>,
}

impl Context {
    pub fn new(shell: Arc<Shell>, io: Io) -> Self {
        Self {
            shell,
            io,
            job: None,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.shell.supervisor
    }

    /// Foreground evaluation owns the last-status register; work inside a
    /// job does not touch it.
    pub fn record(&self, value: &Value) {
        if self.job.is_none() {
            self.shell.supervisor.record_status(value.status());
        }
    }

    pub fn with_io(&self, io: Io) -> Self {
        Self {
            shell: self.shell.clone(),
            io,
            job: self.job,
        }
    }

    pub fn in_job(&self, job: JobId) -> Self {
        Self {
            shell: self.shell.clone(),
            io: self.io.clone(),
            job: Some(job),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(cwd: &Path) -> Arc<Shell> {
        Shell::new(Supervisor::new(None), cwd.to_path_buf(), 8)
    }

    #[test]
    fn chdir_tracks_previous() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        let sh = shell(&base);
        let sub = sh.chdir(Path::new("sub")).unwrap();
        assert_eq!(sub, base.join("sub"));
        assert_eq!(sh.cwd(), base.join("sub"));
        assert_eq!(sh.previous_dir(), Some(base.clone()));
    }

    #[test]
    fn chdir_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), "x").unwrap();
        let sh = shell(dir.path());
        assert!(sh.chdir(Path::new("missing")).is_err());
        assert!(sh.chdir(Path::new("file")).is_err());
    }

    #[test]
    fn resolve_is_relative_to_cwd() {
        let sh = shell(Path::new("/tmp"));
        assert_eq!(sh.resolve("a/b"), PathBuf::from("/tmp/a/b"));
        assert_eq!(sh.resolve("/etc"), PathBuf::from("/etc"));
    }

    #[test]
    fn builtins_are_global_values() {
        let sh = shell(Path::new("/"));
        assert!(matches!(sh.globals.lookup("echo"), Some(Value::Builtin(_))));
        assert!(sh.root.lookup("clone", super::super::object::Access::Public).is_some());
    }
}
