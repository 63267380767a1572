//! Linux futex parking
//!
//! Futex word semantics:
//! - 0 = no token, the parked thread may sleep
//! - 1 = token set
//!
//! `park` swaps the word to 0 and returns if a token was there, otherwise
//! it FUTEX_WAITs on 0. `unpark` swaps in 1 and issues a FUTEX_WAKE only
//! on the 0 -> 1 transition.

use super::Parking;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const EMPTY: u32 = 0;
const NOTIFIED: u32 = 1;

pub struct FutexParking {
    futex: AtomicU32,
}

impl FutexParking {
    pub fn new() -> Self {
        Self { futex: AtomicU32::new(EMPTY) }
    }

    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // ETIMEDOUT, EAGAIN (token raced in) and EINTR all just return;
        // the caller consults the word afterwards
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                EMPTY,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl Parking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(EMPTY, Ordering::Acquire) == NOTIFIED {
            return true;
        }
        self.futex_wait(timeout);
        self.futex.swap(EMPTY, Ordering::Acquire) == NOTIFIED
    }

    fn unpark(&self) {
        if self.futex.swap(NOTIFIED, Ordering::Release) == NOTIFIED {
            return;
        }
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}
