//! Thread parking for the I/O worker
//!
//! A parker holds one wake token. `unpark` sets it; `park` consumes it,
//! sleeping first if it is not set yet. A wake that arrives before the
//! park is therefore never lost, and several wakes before one park
//! collapse into a single return.

use std::time::Duration;

/// Suspend/resume handle for one parked thread
pub trait Parking: Send + Sync {
    /// Sleep until the token is set or `timeout` elapses
    ///
    /// Returns `true` when a token was consumed. Callers re-check their
    /// condition either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Set the token and wake the parked thread, if any
    fn unpark(&self);
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

pub fn new_parking() -> Box<dyn Parking> {
    Box::new(PlatformParking::new())
}
