//! I/O request record shared between a submitter and the worker
//!
//! The submitter builds a task, queues it, and then reads it only through
//! the atomic accessors until [`IoTask::is_ready`] returns true. The worker
//! publishes the outcome with a release store of the state, so an acquire
//! load observing a ready state also observes the byte count or error.

use crate::eventcount::EventCount;
use pkit_core::error::{KitError, KitResult};
use std::cell::UnsafeCell;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Built, never queued (or reset)
    Null = 0,
    Queued = 1,
    /// Completed, see `bytes_transferred`
    Ok = 2,
    /// Failed, see `error_code`
    Error = 3,
    /// Removed from its list by a cancel
    Canceled = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskState::Queued,
            2 => TaskState::Ok,
            3 => TaskState::Error,
            4 => TaskState::Canceled,
            _ => TaskState::Null,
        }
    }

    /// Ok, Error and Canceled are final
    #[inline]
    pub fn is_ready(self) -> bool {
        matches!(self, TaskState::Ok | TaskState::Error | TaskState::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Noop,
    Read,
    Write,
}

/// Offset value selecting the descriptor's current position
pub const CURRENT_POSITION: i64 = -1;

pub struct IoTask {
    state: AtomicU8,
    op: IoOp,
    fd: RawFd,
    /// Absolute offset, or [`CURRENT_POSITION`] for read/write
    offset: i64,
    buf: *mut u8,
    size: usize,
    transferred: AtomicUsize,
    error: AtomicI32,
    event: Option<NonNull<EventCount>>,
    /// Submitter-owned tag, never touched by the worker
    user_data: AtomicU64,
    /// Ring link, guarded by the owning list's lock
    next: UnsafeCell<Option<NonNull<IoTask>>>,
}

// Safety: the raw buffer and counter pointers are only dereferenced by the
// worker under the submission contract of `IoList::insert_last`
unsafe impl Send for IoTask {}
unsafe impl Sync for IoTask {}

impl IoTask {
    fn build(op: IoOp, fd: RawFd, buf: *mut u8, size: usize, offset: i64, event: Option<&EventCount>) -> Self {
        IoTask {
            state: AtomicU8::new(TaskState::Null as u8),
            op,
            fd,
            offset,
            buf,
            size,
            transferred: AtomicUsize::new(0),
            error: AtomicI32::new(0),
            event: event.map(NonNull::from),
            user_data: AtomicU64::new(0),
            next: UnsafeCell::new(None),
        }
    }

    /// Read into `buf` from `offset` (or the current position)
    pub fn new_read(fd: RawFd, buf: &mut [u8], offset: i64, event: Option<&EventCount>) -> Self {
        Self::build(IoOp::Read, fd, buf.as_mut_ptr(), buf.len(), offset, event)
    }

    /// Write `buf` at `offset` (or the current position)
    pub fn new_write(fd: RawFd, buf: &[u8], offset: i64, event: Option<&EventCount>) -> Self {
        Self::build(IoOp::Write, fd, buf.as_ptr() as *mut u8, buf.len(), offset, event)
    }

    /// A task that completes without I/O, useful as a queue barrier
    pub fn new_noop(event: Option<&EventCount>) -> Self {
        Self::build(IoOp::Noop, -1, std::ptr::null_mut(), 0, CURRENT_POSITION, event)
    }

    #[inline]
    pub fn op(&self) -> IoOp {
        self.op
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Bytes moved by a completed task
    #[inline]
    pub fn bytes_transferred(&self) -> usize {
        self.transferred.load(Ordering::Relaxed)
    }

    /// errno of a failed or canceled task, 0 otherwise
    #[inline]
    pub fn error_code(&self) -> i32 {
        self.error.load(Ordering::Relaxed)
    }

    /// Outcome once ready, `None` while pending
    pub fn result(&self) -> Option<KitResult<usize>> {
        match self.state() {
            TaskState::Ok => Some(Ok(self.bytes_transferred())),
            TaskState::Error | TaskState::Canceled => Some(Err(KitError::from_errno(self.error_code()))),
            TaskState::Null | TaskState::Queued => None,
        }
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_user_data(&self, v: u64) {
        self.user_data.store(v, Ordering::Relaxed);
    }

    /// Return a ready task to `Null` so it can be queued again
    pub fn reset(&mut self) {
        debug_assert!(self.state() != TaskState::Queued, "resetting a queued task");
        *self.state.get_mut() = TaskState::Null as u8;
        *self.transferred.get_mut() = 0;
        *self.error.get_mut() = 0;
        *self.next.get_mut() = None;
    }

    // ------------------------------------------------------------------
    // List and worker side
    // ------------------------------------------------------------------

    /// Move the task to `Queued`, returning the state it left
    ///
    /// Fails when the task is already queued, including by an earlier
    /// claim in the same batch.
    pub(crate) fn try_claim(&self) -> Result<TaskState, TaskState> {
        let mut cur = self.state.load(Ordering::Relaxed);
        loop {
            if cur == TaskState::Queued as u8 {
                return Err(TaskState::Queued);
            }
            match self.state.compare_exchange_weak(cur, TaskState::Queued as u8, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return Ok(TaskState::from_u8(cur)),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Undo a claim that was not followed by linking the task
    pub(crate) fn unclaim(&self, prev: TaskState) {
        self.state.store(prev as u8, Ordering::Relaxed);
    }

    /// Clear the outcome of a previous run on a freshly claimed task
    pub(crate) fn clear_outcome(&self) {
        self.transferred.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
    }

    /// # Safety
    ///
    /// Caller holds the owning list's lock or owns the task exclusively.
    #[inline]
    pub(crate) unsafe fn next(&self) -> Option<NonNull<IoTask>> {
        *self.next.get()
    }

    /// # Safety
    ///
    /// As for [`next`](Self::next).
    #[inline]
    pub(crate) unsafe fn set_next(&self, next: Option<NonNull<IoTask>>) {
        *self.next.get() = next;
    }

    #[inline]
    pub(crate) fn buf(&self) -> *mut u8 {
        self.buf
    }

    /// Publish a final state and post to the event counter
    ///
    /// The task may be freed by its owner as soon as the state store
    /// lands, so nothing is read from it afterwards.
    pub(crate) fn complete(&self, outcome: Result<usize, i32>) {
        let event = self.event;
        let state = match outcome {
            Ok(n) => {
                self.transferred.store(n, Ordering::Relaxed);
                TaskState::Ok
            }
            Err(errno) if errno == libc::ECANCELED => {
                self.error.store(errno, Ordering::Relaxed);
                TaskState::Canceled
            }
            Err(errno) => {
                self.error.store(errno, Ordering::Relaxed);
                TaskState::Error
            }
        };
        self.state.store(state as u8, Ordering::Release);

        if let Some(event) = event {
            // Safety: the counter outlives every task queued with it
            unsafe { event.as_ref() }.increment();
        }
    }
}

impl std::fmt::Debug for IoTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoTask")
            .field("state", &self.state())
            .field("op", &self.op)
            .field("fd", &self.fd)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("transferred", &self.bytes_transferred())
            .field("error", &self.error_code())
            .finish()
    }
}
