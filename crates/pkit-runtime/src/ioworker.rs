//! Dedicated thread draining an [`IoList`]
//!
//! The worker loops: stop requested, cancel what is queued and exit;
//! otherwise take the head task and run it, or park when the list is
//! empty. `insert_last` wakes it on the empty -> non-empty transition and
//! the park timeout bounds any missed wake.
//!
//! Read and write loop until the whole buffer moved, end of file, or an
//! error. `EINTR` retries; `EAGAIN` ends the task early as a success with
//! the bytes moved so far, possibly none.

use crate::config::RuntimeConfig;
use crate::iolist::IoList;
use crate::iotask::{IoOp, IoTask, CURRENT_POSITION};
use crate::parking::{new_parking, Parking};
use nix::errno::Errno;
use pkit_core::error::{KitError, KitResult};
use pkit_core::{kdebug, kerror, kinfo, ktrace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Shared {
    list: IoList,
    stop: AtomicBool,
    parking: Box<dyn Parking>,
}

pub struct IoWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    name: String,
}

impl IoWorker {
    /// Worker configured from defaults and the environment
    pub fn new() -> KitResult<Self> {
        Self::with_config(&RuntimeConfig::from_env())
    }

    pub fn with_config(config: &RuntimeConfig) -> KitResult<Self> {
        if let Err(e) = config.validate() {
            kerror!("io worker: {}", e);
            return Err(KitError::Invalid);
        }

        let shared = Arc::new(Shared {
            list: IoList::new(),
            stop: AtomicBool::new(false),
            parking: new_parking(),
        });

        let park_timeout = config.park_timeout;
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(config.worker_name.clone())
            .stack_size(config.worker_stack_size)
            .spawn(move || worker_loop(&thread_shared, park_timeout))?;

        kinfo!("io worker '{}' started", config.worker_name);
        Ok(IoWorker {
            shared,
            thread: Some(thread),
            name: config.worker_name.clone(),
        })
    }

    /// Queue `tasks` for this worker and wake it
    ///
    /// # Safety
    ///
    /// Same contract as [`IoList::insert_last`].
    pub unsafe fn submit(&self, tasks: &[&IoTask]) -> KitResult<()> {
        self.shared.list.insert_last(tasks, Some(&*self.shared.parking))
    }

    pub fn list(&self) -> &IoList {
        &self.shared.list
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the thread to cancel the queue and exit; does not wait
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.parking.unpark();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop, join the thread and cancel anything still queued
    pub fn free(mut self) -> KitResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> KitResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.request_stop();
        let joined = thread.join();
        // Tasks that raced in after the worker's final cancel
        self.shared.list.cancel_all();
        match joined {
            Ok(()) => {
                kinfo!("io worker '{}' stopped", self.name);
                Ok(())
            }
            Err(_) => {
                kerror!("io worker '{}' panicked", self.name);
                Err(KitError::Invalid)
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn worker_loop(shared: &Shared, park_timeout: Duration) {
    loop {
        if shared.stop.load(Ordering::Acquire) {
            let canceled = shared.list.cancel_all();
            kdebug!("io worker: stop requested, canceled {} tasks", canceled);
            return;
        }

        match shared.list.try_remove_first() {
            // Safety: queued tasks stay alive until observed ready
            Ok(task) => run_task(unsafe { task.as_ref() }),
            Err(_) => {
                shared.parking.park(Some(park_timeout));
            }
        }
    }
}

fn run_task(task: &IoTask) {
    let outcome = match task.op() {
        IoOp::Noop => Ok(0),
        IoOp::Read | IoOp::Write => transfer(task),
    };
    match outcome {
        Ok(n) => ktrace!("io task fd={} op={:?} moved {} bytes", task.fd(), task.op(), n),
        Err(errno) => kdebug!(
            "io task fd={} op={:?} failed: {}",
            task.fd(),
            task.op(),
            KitError::from_errno(errno)
        ),
    }
    task.complete(outcome);
}

/// Move the task's buffer, returning bytes moved or an errno
fn transfer(task: &IoTask) -> Result<usize, i32> {
    let (fd, buf, size, offset) = (task.fd(), task.buf(), task.size(), task.offset());
    if fd < 0 || (buf.is_null() && size > 0) || offset < CURRENT_POSITION {
        return Err(libc::EINVAL);
    }

    let mut done = 0usize;
    while done < size {
        // Safety: the submitter guarantees buf..buf+size stays valid
        let p = unsafe { buf.add(done) }.cast::<libc::c_void>();
        let len = size - done;
        let rc = if offset >= 0 {
            let pos = i64::try_from(done)
                .ok()
                .and_then(|d| offset.checked_add(d))
                .ok_or(libc::EINVAL)? as libc::off_t;
            match task.op() {
                IoOp::Read => unsafe { libc::pread(fd, p, len, pos) },
                _ => unsafe { libc::pwrite(fd, p, len, pos) },
            }
        } else {
            match task.op() {
                IoOp::Read => unsafe { libc::read(fd, p, len) },
                _ => unsafe { libc::write(fd, p, len) },
            }
        };

        if rc < 0 {
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::EAGAIN => break,
                e => return Err(e as i32),
            }
        }
        if rc == 0 {
            // End of file
            break;
        }
        done += rc as usize;
    }
    Ok(done)
}
