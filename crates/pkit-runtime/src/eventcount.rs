//! Saturating event counter with a pollable descriptor
//!
//! Many writers post increments; one reader waits for the count to become
//! non-zero and takes it with [`EventCount::reset`]. The descriptor from
//! [`EventCount::io_handle`] turns readable when the count leaves zero, so
//! it can sit in an external poll/epoll set next to other descriptors.
//!
//! Writers touch the descriptor only on the 0 -> non-zero transition. The
//! descriptor can stay readable after a reset (a spurious wakeup), but it
//! is never left unreadable while the count is non-zero.

use pkit_core::error::{KitError, KitResult};
use pkit_core::{ktrace, kwarn};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// eventfd: one descriptor for both ends
        struct Channel {
            fd: RawFd,
        }

        impl Channel {
            fn open() -> KitResult<Self> {
                let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
                if fd < 0 {
                    return Err(KitError::last_os_error());
                }
                Ok(Channel { fd })
            }

            #[inline]
            fn read_fd(&self) -> RawFd {
                self.fd
            }

            #[inline]
            fn write_fd(&self) -> RawFd {
                self.fd
            }

            fn signal_bytes() -> &'static [u8] {
                const ONE: [u8; 8] = 1u64.to_ne_bytes();
                &ONE
            }

            fn close(&mut self) {
                unsafe { libc::close(self.fd) };
            }
        }
    } else {
        /// Non-blocking pipe standing in for eventfd
        struct Channel {
            rd: RawFd,
            wr: RawFd,
        }

        impl Channel {
            fn open() -> KitResult<Self> {
                let mut fds = [-1 as RawFd; 2];
                if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
                    return Err(KitError::last_os_error());
                }
                let [rd, wr] = fds;
                for fd in fds {
                    unsafe {
                        let flags = libc::fcntl(fd, libc::F_GETFL);
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                        libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
                    }
                }
                Ok(Channel { rd, wr })
            }

            #[inline]
            fn read_fd(&self) -> RawFd {
                self.rd
            }

            #[inline]
            fn write_fd(&self) -> RawFd {
                self.wr
            }

            fn signal_bytes() -> &'static [u8] {
                &[1]
            }

            fn close(&mut self) {
                unsafe {
                    libc::close(self.rd);
                    libc::close(self.wr);
                }
            }
        }
    }
}

impl Channel {
    /// Make the read end readable
    fn signal(&self) {
        let bytes = Self::signal_bytes();
        let rc = unsafe { libc::write(self.write_fd(), bytes.as_ptr().cast(), bytes.len()) };
        if rc < 0 {
            let err = KitError::last_os_error();
            // EAGAIN: already readable
            if err != KitError::Os(libc::EAGAIN) {
                kwarn!("eventcount: signal failed: {}", err);
            }
        }
    }

    /// Consume pending readability
    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let rc = unsafe { libc::read(self.read_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if rc <= 0 {
                break;
            }
        }
    }
}

pub struct EventCount {
    count: AtomicU32,
    channel: Channel,
}

// Safety: the channel is only a pair of descriptors, written through syscalls
unsafe impl Send for EventCount {}
unsafe impl Sync for EventCount {}

impl EventCount {
    pub fn new() -> KitResult<Self> {
        Ok(EventCount {
            count: AtomicU32::new(0),
            channel: Channel::open()?,
        })
    }

    /// Add one, see [`add`](Self::add)
    #[inline]
    pub fn increment(&self) -> u32 {
        self.add(1)
    }

    /// Add `n`, clamping at `u32::MAX`; returns the value before the update
    pub fn add(&self, n: u32) -> u32 {
        let before = match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |v| Some(v.saturating_add(n)))
        {
            Ok(v) | Err(v) => v,
        };

        if before != u32::MAX && before.checked_add(n).is_none() {
            kwarn!("eventcount: saturated at u32::MAX, count is now lossy");
        }
        if before == 0 && n != 0 {
            ktrace!("eventcount: signal fd={}", self.channel.read_fd());
            self.channel.signal();
        }
        before
    }

    /// Take the current value and zero the counter
    ///
    /// `u32::MAX` means the count saturated and the true number of events
    /// must come from elsewhere.
    pub fn reset(&self) -> u32 {
        // Drain first: an add landing after the drain re-signals
        self.channel.drain();
        self.count.swap(0, Ordering::AcqRel)
    }

    /// Current value without consuming it
    #[inline]
    pub fn value(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Block until the count is non-zero
    ///
    /// `timeout_ms < 0` waits forever. Fails with `Timeout` when the time
    /// runs out first.
    pub fn wait(&self, timeout_ms: i32) -> KitResult<()> {
        let deadline = (timeout_ms >= 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));

        loop {
            if self.value() != 0 {
                return Ok(());
            }

            let remaining = match deadline {
                None => -1,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    // Round up so a sub-millisecond remainder still polls
                    left.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32
                }
            };

            let mut pfd = libc::pollfd {
                fd: self.channel.read_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let rc = unsafe { libc::poll(&mut pfd, 1, remaining) };
            if rc < 0 {
                let err = KitError::last_os_error();
                if err == KitError::Os(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }
            if rc == 0 {
                return if self.value() != 0 { Ok(()) } else { Err(KitError::Timeout) };
            }

            if self.value() != 0 {
                return Ok(());
            }
            // Stale readability left by a reset
            self.channel.drain();
        }
    }

    /// Descriptor that is readable while the count is non-zero
    #[inline]
    pub fn io_handle(&self) -> RawFd {
        self.channel.read_fd()
    }
}

impl Drop for EventCount {
    fn drop(&mut self) {
        self.channel.close();
    }
}
