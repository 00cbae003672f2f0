//! WakeupFd — eventfd-backed cross-thread notifier
//!
//! Readable by the owning reactor, writable by any thread. The counter
//! coalesces: any number of notifies before the owner drains collapse into
//! one readable event, which is fine because the owner drains all pending
//! work in a single pass.

use std::os::unix::io::RawFd;

use webd_core::error::{NetError, NetResult};
use webd_core::util::last_errno;
use webd_core::log_warn;

pub struct WakeupFd {
    fd: RawFd,
}

impl WakeupFd {
    /// Create a fresh eventfd (non-blocking, close-on-exec).
    pub fn new() -> NetResult<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(NetError::last_os());
        }
        Ok(Self { fd })
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Wake the owning reactor. Safe from any thread.
    ///
    /// `EAGAIN` means the counter is saturated, which implies a wakeup is
    /// already pending — that is success. A short write is logged;
    /// correctness does not depend on it because the signal only means
    /// "at least one pending item exists".
    pub fn notify(&self) {
        let one: u64 = 1;
        let n = unsafe {
            libc::write(
                self.fd,
                &one as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n < 0 {
            let errno = last_errno();
            if errno != libc::EAGAIN {
                log_warn!("wakeup: write failed (errno {})", errno);
            }
        } else if n as usize != std::mem::size_of::<u64>() {
            log_warn!("wakeup: wrote {} bytes instead of 8", n);
        }
    }

    /// Consume the pending counter. Called by the owning reactor when the
    /// fd polls readable.
    pub fn drain(&self) {
        let mut value: u64 = 0;
        let n = unsafe {
            libc::read(
                self.fd,
                &mut value as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n >= 0 && n as usize != std::mem::size_of::<u64>() {
            log_warn!("wakeup: read {} bytes instead of 8", n);
        }
    }
}

impl Drop for WakeupFd {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(fd: RawFd) -> bool {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n == 1 && (pfd.revents & libc::POLLIN) != 0
    }

    #[test]
    fn test_notify_then_drain() {
        let wake = WakeupFd::new().unwrap();
        assert!(!pending(wake.fd()));

        wake.notify();
        assert!(pending(wake.fd()));

        wake.drain();
        assert!(!pending(wake.fd()));
    }

    #[test]
    fn test_notifies_coalesce() {
        let wake = WakeupFd::new().unwrap();
        wake.notify();
        wake.notify();
        wake.notify();

        // One drain clears all of them.
        wake.drain();
        assert!(!pending(wake.fd()));
    }
}
