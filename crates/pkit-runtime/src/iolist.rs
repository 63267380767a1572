//! FIFO of I/O tasks shared by submitters and one worker
//!
//! Tasks form a circular singly linked ring through their own `next`
//! links; the list keeps only a pointer to the last task, whose `next` is
//! the head. All link updates happen under a [`SpinLock`], and the
//! critical sections are a few pointer writes long.

use crate::iotask::IoTask;
use crate::parking::Parking;
use pkit_core::error::{KitError, KitResult};
use pkit_core::spinlock::SpinLock;
use pkit_core::ktrace;
use std::ptr::NonNull;

struct Ring {
    last: Option<NonNull<IoTask>>,
    count: usize,
}

// Safety: the ring is only walked while holding the list lock
unsafe impl Send for Ring {}

pub struct IoList {
    ring: SpinLock<Ring>,
}

impl IoList {
    pub const fn new() -> Self {
        IoList {
            ring: SpinLock::new(Ring { last: None, count: 0 }),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().last.is_none()
    }

    /// Tail of the ring, `None` when empty
    pub fn last(&self) -> Option<NonNull<IoTask>> {
        self.ring.lock().last
    }

    /// Append `tasks` in order and mark them queued
    ///
    /// Wakes `resume` when the list goes from empty to non-empty. A task
    /// that is already queued, or appears twice in `tasks`, makes the whole
    /// call fail with `Invalid` before anything is linked.
    ///
    /// # Safety
    ///
    /// Every task, its buffer and its event counter must stay alive and
    /// unmoved until the task is observed ready. The buffer must not be
    /// accessed by anyone else meanwhile.
    pub unsafe fn insert_last(&self, tasks: &[&IoTask], resume: Option<&dyn Parking>) -> KitResult<()> {
        let (Some(first), Some(tail)) = (tasks.first(), tasks.last()) else {
            return Ok(());
        };
        let mut prev = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.try_claim() {
                Ok(state) => prev.push(state),
                Err(_) => {
                    for (claimed, state) in tasks.iter().zip(prev) {
                        claimed.unclaim(state);
                    }
                    return Err(KitError::Invalid);
                }
            }
        }

        // The tasks are now owned by this call, link them before taking the lock
        for pair in tasks.windows(2) {
            pair[0].set_next(Some(NonNull::from(pair[1])));
        }
        for task in tasks {
            task.clear_outcome();
        }
        let first = NonNull::from(*first);
        let tail = NonNull::from(*tail);

        let was_empty = {
            let mut ring = self.ring.lock();
            let was_empty = match ring.last {
                None => {
                    tail.as_ref().set_next(Some(first));
                    true
                }
                Some(last) => {
                    tail.as_ref().set_next(last.as_ref().next());
                    last.as_ref().set_next(Some(first));
                    false
                }
            };
            ring.last = Some(tail);
            ring.count += tasks.len();
            was_empty
        };

        if was_empty {
            if let Some(resume) = resume {
                resume.unpark();
            }
        }
        Ok(())
    }

    /// Detach the head task; `NoData` when empty
    pub fn try_remove_first(&self) -> KitResult<NonNull<IoTask>> {
        let mut ring = self.ring.lock();
        let last = ring.last.ok_or(KitError::NoData)?;

        // Safety: ring members are live while queued, links guarded by the lock
        unsafe {
            let head = last.as_ref().next().ok_or(KitError::Invalid)?;
            if head == last {
                ring.last = None;
            } else {
                last.as_ref().set_next(head.as_ref().next());
            }
            head.as_ref().set_next(None);
            ring.count -= 1;
            Ok(head)
        }
    }

    /// Cancel every queued task; returns how many were canceled
    ///
    /// Each task gets error `ECANCELED` and then state `Canceled`, and
    /// posts one increment to its event counter.
    pub fn cancel_all(&self) -> usize {
        let (last, count) = {
            let mut ring = self.ring.lock();
            let taken = (ring.last.take(), ring.count);
            ring.count = 0;
            taken
        };
        let Some(last) = last else { return 0 };

        // Safety: the detached ring is now exclusively ours
        unsafe {
            let mut next = last.as_ref().next();
            for _ in 0..count {
                let Some(task) = next else { break };
                let task = task.as_ref();
                next = task.next();
                task.set_next(None);
                task.complete(Err(libc::ECANCELED));
            }
        }
        ktrace!("iolist: canceled {} tasks", count);
        count
    }

    /// Cancel what is left and release the list
    pub fn free(self) -> usize {
        self.cancel_all()
    }
}

impl Default for IoList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IoList {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
