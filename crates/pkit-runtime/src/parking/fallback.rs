//! Condvar parking for platforms without futex

use super::Parking;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct FallbackParking {
    /// Wake token
    token: Mutex<bool>,
    condvar: Condvar,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self { token: Mutex::new(false), condvar: Condvar::new() }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A poisoned token is still a plain bool
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl Parking for FallbackParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock();
        while !*guard {
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.condvar
                        .wait_timeout(guard, deadline - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self.condvar.wait(guard).unwrap_or_else(|e| e.into_inner()),
            };
        }
        *guard = false;
        true
    }

    fn unpark(&self) {
        *self.lock() = true;
        self.condvar.notify_one();
    }
}
