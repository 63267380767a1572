//! Error types shared by every pkit component
//!
//! Errors form one flat taxonomy that maps one-to-one onto POSIX errno
//! codes, so a value can cross an FFI or I/O boundary as a plain `i32`
//! and come back without losing its meaning.

use core::fmt;

/// Result type for pkit operations
pub type KitResult<T> = Result<T, KitError>;

/// Errors that can occur in pkit operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KitError {
    /// Malformed argument (EINVAL)
    Invalid,

    /// Allocator refusal or size overflow (ENOMEM)
    NoMemory,

    /// No element available (ENODATA)
    NoData,

    /// Key or node not found (ESRCH)
    NotFound,

    /// Duplicate key on insert (EEXIST)
    Exists,

    /// Operation canceled in place (ECANCELED)
    Canceled,

    /// Timed wait expired without an event (ETIME)
    Timeout,

    /// Any other errno propagated from the OS (EAGAIN, EPIPE, EIO, ...)
    Os(i32),
}

impl KitError {
    /// The POSIX errno value for this error
    pub fn errno(&self) -> i32 {
        match self {
            KitError::Invalid => libc::EINVAL,
            KitError::NoMemory => libc::ENOMEM,
            KitError::NoData => libc::ENODATA,
            KitError::NotFound => libc::ESRCH,
            KitError::Exists => libc::EEXIST,
            KitError::Canceled => libc::ECANCELED,
            KitError::Timeout => libc::ETIME,
            KitError::Os(code) => *code,
        }
    }

    /// Map an errno value back to an error
    ///
    /// Codes with a named variant collapse to it, everything else is `Os`.
    pub fn from_errno(code: i32) -> Self {
        match code {
            libc::EINVAL => KitError::Invalid,
            libc::ENOMEM => KitError::NoMemory,
            libc::ENODATA => KitError::NoData,
            libc::ESRCH => KitError::NotFound,
            libc::EEXIST => KitError::Exists,
            libc::ECANCELED => KitError::Canceled,
            libc::ETIME => KitError::Timeout,
            other => KitError::Os(other),
        }
    }

    /// Error from the calling thread's current errno
    pub fn last_os_error() -> Self {
        KitError::from_errno(nix::errno::Errno::last() as i32)
    }
}

impl fmt::Display for KitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KitError::Invalid => write!(f, "invalid argument"),
            KitError::NoMemory => write!(f, "out of memory"),
            KitError::NoData => write!(f, "no data available"),
            KitError::NotFound => write!(f, "no such entry"),
            KitError::Exists => write!(f, "entry already exists"),
            KitError::Canceled => write!(f, "operation canceled"),
            KitError::Timeout => write!(f, "timer expired"),
            KitError::Os(code) => {
                write!(f, "OS error: errno {} ({})", code, nix::errno::Errno::from_raw(*code).desc())
            }
        }
    }
}

impl std::error::Error for KitError {}

impl From<std::io::Error> for KitError {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error() {
            Some(code) => KitError::from_errno(code),
            None => KitError::Os(libc::EIO),
        }
    }
}

/// Keeps the first error of a multi-step teardown
///
/// Destructors continue past failures and surface only the first one.
#[derive(Debug, Default)]
pub struct FirstError(Option<KitError>);

impl FirstError {
    pub const fn new() -> Self {
        FirstError(None)
    }

    /// Record `err` unless an earlier error is already held
    #[inline]
    pub fn record(&mut self, err: KitError) {
        if self.0.is_none() {
            self.0 = Some(err);
        }
    }

    /// Record the error of `res`, if any
    #[inline]
    pub fn check<T>(&mut self, res: KitResult<T>) {
        if let Err(e) = res {
            self.record(e);
        }
    }

    pub fn into_result(self) -> KitResult<()> {
        match self.0 {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
