//! Task input and output endpoints.
//!
//! Every task runs with an [`Io`]: one [`Source`] and two [`Sink`]s.
//! Internal tasks read and write through them directly. External tasks get
//! them converted into `Stdio` with [`Io::child_stdio`]; endpoints a child
//! cannot use as a file descriptor (captures and in-process pipes) are
//! bridged through an OS pipe by a small pump task.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe as unix_pipe;
use tokio::task::JoinHandle;

use super::pipe::Pipe;
use crate::interpreter::Value;

/// Where a task reads from.
#[derive(Clone, Debug)]
pub enum Source {
    /// The shell's own standard input.
    Inherit,
    Null,
    File(Arc<FileSource>),
    Pipe(Pipe),
}

/// Where a task writes to.
#[derive(Clone, Debug)]
pub enum Sink {
    Stdout,
    Stderr,
    Null,
    /// In-memory buffer, used by embedding hosts and tests.
    Capture(Arc<Mutex<Vec<u8>>>),
    File(Arc<FileSink>),
    Pipe(Pipe),
}

/// Input, output and error endpoints of one task.
#[derive(Clone, Debug)]
pub struct Io {
    pub stdin: Source,
    pub stdout: Sink,
    pub stderr: Sink,
}

impl Io {
    /// The shell's own terminal streams.
    pub fn inherit() -> Self {
        Self {
            stdin: Source::Inherit,
            stdout: Sink::Stdout,
            stderr: Sink::Stderr,
        }
    }

    /// Null input, output and error captured into the given buffers.
    pub fn captured(out: Arc<Mutex<Vec<u8>>>, err: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            stdin: Source::Null,
            stdout: Sink::Capture(out),
            stderr: Sink::Capture(err),
        }
    }

    pub fn with_stdin(mut self, stdin: Source) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_stdout(mut self, stdout: Sink) -> Self {
        self.stdout = stdout;
        self
    }

    /// Endpoints for a child process, plus the pump tasks bridging any
    /// endpoint that is not a plain file descriptor.
    pub(crate) fn child_stdio(&self) -> io::Result<ChildIo> {
        let mut child = ChildIo::default();
        let stdin = self.stdin.to_stdio(&mut child)?;
        let stdout = self.stdout.to_stdio(&mut child)?;
        let stderr = self.stderr.to_stdio(&mut child)?;
        child.stdio = Some((stdin, stdout, stderr));
        Ok(child)
    }
}

/// Child process endpoints and their bridges.
#[derive(Default)]
pub(crate) struct ChildIo {
    pub(crate) stdio: Option<(Stdio, Stdio, Stdio)>,
    /// Copy child output somewhere; must finish before the task is done.
    pub(crate) drains: Vec<JoinHandle<()>>,
    /// Feed child input; aborted once the task has exited.
    pub(crate) feeders: Vec<JoinHandle<()>>,
}

impl ChildIo {
    /// Wait for output pumps and stop input pumps.
    pub(crate) async fn finish(self) {
        for feeder in &self.feeders {
            feeder.abort();
        }
        for drain in self.drains {
            let _ = drain.await;
        }
    }
}

fn dup(fd: impl AsFd) -> io::Result<Stdio> {
    Ok(Stdio::from(fd.as_fd().try_clone_to_owned()?))
}

impl Source {
    /// Open `path` for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Source::File(Arc::new(FileSource::new(File::open(path)?))))
    }

    fn to_stdio(&self, child: &mut ChildIo) -> io::Result<Stdio> {
        match self {
            Source::Inherit => Ok(Stdio::inherit()),
            Source::Null => Ok(Stdio::null()),
            Source::File(f) => f.to_stdio(),
            Source::Pipe(pipe) => {
                if let Some(fd) = pipe.take_reader_fd() {
                    return Ok(Stdio::from(fd));
                }
                // In-process pipe: print each value as a line into an OS pipe.
                let (reader, writer) = io::pipe()?;
                let mut sender = unix_pipe::Sender::from_owned_fd(OwnedFd::from(writer))?;
                let pipe = pipe.clone();
                child.feeders.push(tokio::spawn(async move {
                    while let Ok(Some(line)) = pipe.read_line().await {
                        if sender.write_all(line.as_bytes()).await.is_err()
                            || sender.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                }));
                Ok(Stdio::from(OwnedFd::from(reader)))
            }
        }
    }

    /// Read the next line, without its newline. `None` at end of input.
    pub async fn read_line(&self) -> io::Result<Option<String>> {
        match self {
            Source::Inherit => {
                let mut stdin = shell_stdin().lock().await;
                read_line_from(&mut *stdin).await
            }
            Source::Null => Ok(None),
            Source::File(f) => f.read_line().await,
            Source::Pipe(p) => p.read_line().await,
        }
    }

    /// Read the next value. Text sources are decoded one line per value.
    pub async fn read_value(&self) -> io::Result<Option<Value>> {
        match self {
            Source::Pipe(p) => p.read_value().await,
            other => Ok(other.read_line().await?.map(|l| Value::from_line(&l))),
        }
    }
}

type SharedStdin = tokio::sync::Mutex<BufReader<tokio::io::Stdin>>;

fn shell_stdin() -> &'static SharedStdin {
    static STDIN: OnceLock<SharedStdin> = OnceLock::new();
    STDIN.get_or_init(|| tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())))
}

async fn read_line_from<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// A file opened by a `<` redirection.
///
/// The descriptor is handed to children as-is; internal readers switch it to
/// a buffered async reader on first use.
pub struct FileSource {
    file: Mutex<Option<File>>,
    reader: tokio::sync::Mutex<Option<BufReader<tokio::fs::File>>>,
}

impl FileSource {
    fn new(file: File) -> Self {
        Self {
            file: Mutex::new(Some(file)),
            reader: tokio::sync::Mutex::new(None),
        }
    }

    fn to_stdio(&self) -> io::Result<Stdio> {
        let guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(file) => dup(file),
            None => Err(io::Error::other("redirected input already consumed")),
        }
    }

    async fn read_line(&self) -> io::Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        if reader.is_none() {
            let file = self.file.lock().unwrap_or_else(|e| e.into_inner()).take();
            match file {
                Some(file) => *reader = Some(BufReader::new(tokio::fs::File::from_std(file))),
                None => return Ok(None),
            }
        }
        match reader.as_mut() {
            Some(reader) => read_line_from(reader).await,
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource").finish_non_exhaustive()
    }
}

/// A redirection target. Children get `fd`; the shell's own writes go
/// through the async handle so they never block a runtime worker.
pub struct FileSink {
    fd: OwnedFd,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl FileSink {
    fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            fd: file.as_fd().try_clone_to_owned()?,
            file: tokio::sync::Mutex::new(tokio::fs::File::from_std(file)),
        })
    }

    async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink").field("fd", &self.fd).finish_non_exhaustive()
    }
}

impl Sink {
    /// Create or truncate `path` for writing.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Sink::File(Arc::new(FileSink::new(File::create(path)?)?)))
    }

    /// Create `path` if needed and append to it.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Sink::File(Arc::new(FileSink::new(file)?)))
    }

    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (Sink::Capture(buf.clone()), buf)
    }

    fn to_stdio(&self, child: &mut ChildIo) -> io::Result<Stdio> {
        match self {
            Sink::Stdout => dup(io::stdout()),
            Sink::Stderr => dup(io::stderr()),
            Sink::Null => Ok(Stdio::null()),
            Sink::File(f) => dup(&f.fd),
            Sink::Capture(buf) => {
                let (reader, writer) = io::pipe()?;
                let mut receiver = unix_pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
                let buf = buf.clone();
                child.drains.push(tokio::spawn(async move {
                    let mut chunk = vec![0u8; 8192];
                    loop {
                        match receiver.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => buf
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .extend_from_slice(&chunk[..n]),
                        }
                    }
                }));
                Ok(Stdio::from(OwnedFd::from(writer)))
            }
            Sink::Pipe(pipe) => {
                if let Some(fd) = pipe.take_writer_fd() {
                    return Ok(Stdio::from(fd));
                }
                // In-process pipe: each line the child prints becomes a value.
                let (reader, writer) = io::pipe()?;
                let receiver = unix_pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
                let pipe = pipe.clone();
                child.drains.push(tokio::spawn(async move {
                    let mut lines = BufReader::new(receiver);
                    while let Ok(Some(line)) = read_line_from(&mut lines).await {
                        if pipe.write_value(&Value::from_line(&line)).await.is_err() {
                            break;
                        }
                    }
                }));
                Ok(Stdio::from(OwnedFd::from(writer)))
            }
        }
    }

    /// Write raw text.
    pub async fn write_text(&self, text: &str) -> io::Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(text.as_bytes()).await?;
                out.flush().await
            }
            Sink::Stderr => {
                let mut err = tokio::io::stderr();
                err.write_all(text.as_bytes()).await?;
                err.flush().await
            }
            Sink::Null => Ok(()),
            Sink::Capture(buf) => {
                buf.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(text.as_bytes());
                Ok(())
            }
            Sink::File(f) => f.write_all(text.as_bytes()).await,
            Sink::Pipe(p) => p.write_text(text).await,
        }
    }

    /// Write one value. Pipes carry it as-is; text sinks get its printable
    /// syntax on a line of its own.
    pub async fn write_value(&self, value: &Value) -> io::Result<()> {
        match self {
            Sink::Pipe(p) => p.write_value(value).await,
            other => {
                let mut line = value.to_syntax();
                line.push('\n');
                other.write_text(&line).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_collects_text() {
        let (sink, buf) = Sink::capture();
        sink.write_text("hello ").await.unwrap();
        sink.write_value(&Value::string("a b")).await.unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"hello \"a b\"\n");
    }

    #[tokio::test]
    async fn file_sinks_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        Sink::create(&path).unwrap().write_text("one\n").await.unwrap();
        Sink::append(&path).unwrap().write_text("two\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        Sink::create(&path).unwrap().write_text("three\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");
    }

    #[tokio::test]
    async fn file_source_reads_values_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in");
        std::fs::write(&path, "a\n(b \"c\")\n").unwrap();
        let src = Source::open(&path).unwrap();
        assert_eq!(src.read_value().await.unwrap(), Some(Value::atom("a")));
        assert_eq!(
            src.read_value().await.unwrap(),
            Some(Value::list(vec![Value::atom("b"), Value::string("c")]))
        );
        assert_eq!(src.read_value().await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_source_is_empty() {
        assert_eq!(Source::Null.read_line().await.unwrap(), None);
    }
}
