//! Bounded value queue with backpressure for in-process pipes.
//!
//! ```text
//!   writers ──▶ [VecDeque<Value>] ──▶ readers
//!               ├── send waits while full
//!               ├── recv waits while empty
//!               ├── close_writer → readers drain, then None
//!               └── close_reader → writers get BrokenPipe
//! ```
//!
//! Both ends may be shared by any number of tasks, so wakers are kept in
//! lists rather than single slots. The lock is a `std::sync::Mutex`: critical
//! sections are a push or pop plus waker bookkeeping. Closed flags are atomics
//! so closing never has to wait on an async lock.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

use crate::interpreter::Value;

/// Default number of values buffered before writers block.
pub const DEFAULT_CAPACITY: usize = 64;

struct QueueState {
    items: VecDeque<Value>,
    capacity: usize,
    readers: Vec<Waker>,
    writers: Vec<Waker>,
}

impl QueueState {
    fn wake_readers(&mut self) {
        for waker in self.readers.drain(..) {
            waker.wake();
        }
    }

    fn wake_writers(&mut self) {
        for waker in self.writers.drain(..) {
            waker.wake();
        }
    }
}

/// FIFO of values shared between the tasks on either side of a pipe.
pub struct ValueQueue {
    state: Mutex<QueueState>,
    writer_closed: AtomicBool,
    reader_closed: AtomicBool,
}

impl ValueQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity: capacity.max(1),
                readers: Vec::new(),
                writers: Vec::new(),
            }),
            writer_closed: AtomicBool::new(false),
            reader_closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broken() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
    }

    /// Append a value, waiting while the queue is full.
    pub async fn send(&self, value: Value) -> io::Result<()> {
        let mut slot = Some(value);
        poll_fn(|cx| self.poll_send(cx, &mut slot)).await
    }

    fn poll_send(&self, cx: &mut Context<'_>, slot: &mut Option<Value>) -> Poll<io::Result<()>> {
        let mut state = self.lock();
        // Checked under the lock so a concurrent close cannot slip in between.
        if self.reader_closed.load(Ordering::Acquire) || self.writer_closed.load(Ordering::Acquire)
        {
            return Poll::Ready(Err(Self::broken()));
        }
        if state.items.len() < state.capacity {
            if let Some(value) = slot.take() {
                state.items.push_back(value);
            }
            state.wake_readers();
            Poll::Ready(Ok(()))
        } else {
            state.writers.push(cx.waker().clone());
            Poll::Pending
        }
    }

    /// Append a value without waiting; hands it back if the queue is full.
    pub fn try_send(&self, value: Value) -> Result<(), TrySendError> {
        let mut state = self.lock();
        if self.reader_closed.load(Ordering::Acquire) || self.writer_closed.load(Ordering::Acquire)
        {
            return Err(TrySendError::Closed(value));
        }
        if state.items.len() >= state.capacity {
            return Err(TrySendError::Full(value));
        }
        state.items.push_back(value);
        state.wake_readers();
        Ok(())
    }

    /// Take the next value, waiting while the queue is empty.
    ///
    /// Returns `None` once the writer side is closed and everything buffered
    /// has been taken.
    pub async fn recv(&self) -> Option<Value> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        let mut state = self.lock();
        if let Some(value) = state.items.pop_front() {
            state.wake_writers();
            return Poll::Ready(Some(value));
        }
        if self.writer_closed.load(Ordering::Acquire) || self.reader_closed.load(Ordering::Acquire)
        {
            return Poll::Ready(None);
        }
        state.readers.push(cx.waker().clone());
        Poll::Pending
    }

    /// Close the writing side. Returns true only for the call that closed it.
    pub fn close_writer(&self) -> bool {
        let mut state = self.lock();
        let first = !self.writer_closed.swap(true, Ordering::AcqRel);
        state.wake_readers();
        state.wake_writers();
        first
    }

    /// Close the reading side and discard anything buffered.
    pub fn close_reader(&self) -> bool {
        let mut state = self.lock();
        let first = !self.reader_closed.swap(true, Ordering::AcqRel);
        state.items.clear();
        state.wake_writers();
        state.wake_readers();
        first
    }

    pub fn is_writer_closed(&self) -> bool {
        self.writer_closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ValueQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueQueue")
            .field("len", &self.len())
            .field("writer_closed", &self.is_writer_closed())
            .finish()
    }
}

/// Why a non-blocking send did not happen.
#[derive(Debug)]
pub enum TrySendError {
    Full(Value),
    Closed(Value),
}
