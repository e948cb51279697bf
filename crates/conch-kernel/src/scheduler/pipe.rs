//! First-class pipes.
//!
//! A [`Pipe`] is a cheap handle to one of two transports:
//!
//! - **Queue**: an in-process [`ValueQueue`] that carries values unchanged
//!   between language-level tasks. Text written to it is split into lines and
//!   each complete line is read back as a value.
//! - **Os**: a real pipe(2) pair, used whenever an external process sits on
//!   either end. Values cross it in their printable syntax, one per line.
//!
//! Closing the write end is the only EOF signal; every close after the first
//! is a no-op.

use std::io;
use std::io::{PipeReader, PipeWriter};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;

use super::queue::ValueQueue;
use crate::interpreter::Value;

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a pipe. Clones refer to the same channel.
#[derive(Clone)]
pub struct Pipe(Arc<PipeInner>);

struct PipeInner {
    id: u64,
    transport: Transport,
}

enum Transport {
    Queue(QueuePipe),
    Os(OsPipe),
}

struct QueuePipe {
    queue: ValueQueue,
    /// Text written without a trailing newline yet.
    partial: Mutex<String>,
}

struct OsPipe {
    reader: Mutex<Option<PipeReader>>,
    writer: Mutex<Option<PipeWriter>>,
    async_reader: tokio::sync::Mutex<Option<BufReader<pipe::Receiver>>>,
    async_writer: tokio::sync::Mutex<Option<pipe::Sender>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn closed_end(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("pipe {what} end is closed"))
}

impl Pipe {
    fn with_transport(transport: Transport) -> Self {
        Pipe(Arc::new(PipeInner {
            id: NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed),
            transport,
        }))
    }

    /// An in-process pipe holding at most `capacity` values.
    pub fn queue(capacity: usize) -> Self {
        Self::with_transport(Transport::Queue(QueuePipe {
            queue: ValueQueue::new(capacity),
            partial: Mutex::new(String::new()),
        }))
    }

    /// An OS-backed pipe.
    pub fn os() -> io::Result<Self> {
        let (reader, writer) = io::pipe()?;
        Ok(Self::with_transport(Transport::Os(OsPipe {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            async_reader: tokio::sync::Mutex::new(None),
            async_writer: tokio::sync::Mutex::new(None),
        })))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_os(&self) -> bool {
        matches!(self.0.transport, Transport::Os(_))
    }

    pub fn ptr_eq(&self, other: &Pipe) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Write one value, waiting while the transport is at capacity.
    pub async fn write_value(&self, value: &Value) -> io::Result<()> {
        match &self.0.transport {
            Transport::Queue(q) => q.queue.send(value.clone()).await,
            Transport::Os(os) => {
                let mut line = value.to_syntax();
                line.push('\n');
                os.write(line.as_bytes()).await
            }
        }
    }

    /// Write one value without waiting. Fails with `WouldBlock` when full.
    pub fn try_write_value(&self, value: &Value) -> io::Result<()> {
        match &self.0.transport {
            Transport::Queue(q) => match q.queue.try_send(value.clone()) {
                Ok(()) => Ok(()),
                Err(super::queue::TrySendError::Full(_)) => Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "pipe is at capacity",
                )),
                Err(super::queue::TrySendError::Closed(_)) => Err(closed_end("read")),
            },
            Transport::Os(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "non-blocking writes need an in-process pipe",
            )),
        }
    }

    /// Write raw text. On a queue pipe each completed line becomes a value.
    pub async fn write_text(&self, text: &str) -> io::Result<()> {
        match &self.0.transport {
            Transport::Queue(q) => {
                let lines = {
                    let mut partial = lock(&q.partial);
                    partial.push_str(text);
                    match partial.rfind('\n') {
                        Some(end) => {
                            let rest = partial.split_off(end + 1);
                            std::mem::replace(&mut *partial, rest)
                        }
                        None => return Ok(()),
                    }
                };
                for line in lines.lines() {
                    q.queue.send(Value::from_line(line)).await?;
                }
                Ok(())
            }
            Transport::Os(os) => os.write(text.as_bytes()).await,
        }
    }

    /// Read the next value, or `None` at EOF.
    pub async fn read_value(&self) -> io::Result<Option<Value>> {
        match &self.0.transport {
            Transport::Queue(q) => Ok(q.queue.recv().await),
            Transport::Os(os) => Ok(os.read_line().await?.map(|l| Value::from_line(&l))),
        }
    }

    /// Read the next line of text (without its newline), or `None` at EOF.
    pub async fn read_line(&self) -> io::Result<Option<String>> {
        match &self.0.transport {
            Transport::Queue(q) => Ok(q.queue.recv().await.map(|v| v.to_syntax())),
            Transport::Os(os) => os.read_line().await,
        }
    }

    /// Close the write end. Returns true only for the call that closed it.
    pub async fn close_writer(&self) -> bool {
        match &self.0.transport {
            Transport::Queue(q) => {
                let rest = std::mem::take(&mut *lock(&q.partial));
                if !rest.is_empty() && !q.queue.is_writer_closed() {
                    let _ = q.queue.send(Value::from_line(&rest)).await;
                }
                q.queue.close_writer()
            }
            Transport::Os(os) => {
                let std_end = lock(&os.writer).take().is_some();
                let async_end = os.async_writer.lock().await.take().is_some();
                std_end || async_end
            }
        }
    }

    /// Close the read end. Pending and future writes fail with `BrokenPipe`.
    pub async fn close_reader(&self) -> bool {
        match &self.0.transport {
            Transport::Queue(q) => q.queue.close_reader(),
            Transport::Os(os) => {
                let std_end = lock(&os.reader).take().is_some();
                let async_end = os.async_reader.lock().await.take().is_some();
                std_end || async_end
            }
        }
    }

    /// Hand the read end to a child process. `None` for queue pipes or if it
    /// was already handed out.
    pub(crate) fn take_reader_fd(&self) -> Option<OwnedFd> {
        match &self.0.transport {
            Transport::Os(os) => lock(&os.reader).take().map(OwnedFd::from),
            Transport::Queue(_) => None,
        }
    }

    /// Hand the write end to a child process.
    pub(crate) fn take_writer_fd(&self) -> Option<OwnedFd> {
        match &self.0.transport {
            Transport::Os(os) => lock(&os.writer).take().map(OwnedFd::from),
            Transport::Queue(_) => None,
        }
    }
}

impl OsPipe {
    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.async_writer.lock().await;
        if guard.is_none() {
            let writer = lock(&self.writer).take().ok_or_else(|| closed_end("write"))?;
            *guard = Some(pipe::Sender::from_owned_fd(OwnedFd::from(writer))?);
        }
        match guard.as_mut() {
            Some(sender) => sender.write_all(bytes).await,
            None => Err(closed_end("write")),
        }
    }

    async fn read_line(&self) -> io::Result<Option<String>> {
        let mut guard = self.async_reader.lock().await;
        if guard.is_none() {
            let reader = lock(&self.reader).take().ok_or_else(|| closed_end("read"))?;
            *guard = Some(BufReader::new(pipe::Receiver::from_owned_fd(
                OwnedFd::from(reader),
            )?));
        }
        let Some(reader) = guard.as_mut() else {
            return Err(closed_end("read"));
        };
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.0.transport {
            Transport::Queue(_) => "queue",
            Transport::Os(_) => "os",
        };
        f.debug_struct("Pipe")
            .field("id", &self.0.id)
            .field("transport", &kind)
            .finish()
    }
}
