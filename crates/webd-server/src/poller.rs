//! Poller — epoll wrapper
//!
//! Owns one epoll instance. `wait` blocks up to the given timeout and
//! returns the ready `(fd, mask)` pairs; registration errors are logged
//! and tolerated because a single bad fd must never take down the loop.

use std::cell::RefCell;
use std::os::unix::io::RawFd;

use webd_core::error::{NetError, NetResult};
use webd_core::util::last_errno;
use webd_core::{log_error, log_warn};

/// Upper bound on events returned by a single wait.
const EVENTS_MAX: usize = 4096;

pub struct Poller {
    epfd: RawFd,
    events: RefCell<Vec<libc::epoll_event>>,
}

impl Poller {
    pub fn new() -> NetResult<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(NetError::last_os());
        }
        Ok(Self {
            epfd,
            events: RefCell::new(vec![
                libc::epoll_event { events: 0, u64: 0 };
                EVENTS_MAX
            ]),
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: u32) -> bool {
        let mut ev = libc::epoll_event {
            events: mask,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        ret == 0
    }

    /// Register `fd` with the given interest mask.
    pub fn add(&self, fd: RawFd, mask: u32) {
        if !self.ctl(libc::EPOLL_CTL_ADD, fd, mask) {
            log_error!("poller: add fd={} failed (errno {})", fd, last_errno());
        }
    }

    /// Change the interest mask of a registered fd.
    pub fn modify(&self, fd: RawFd, mask: u32) {
        if !self.ctl(libc::EPOLL_CTL_MOD, fd, mask) {
            log_error!("poller: mod fd={} failed (errno {})", fd, last_errno());
        }
    }

    /// Deregister `fd`.
    pub fn del(&self, fd: RawFd) {
        if !self.ctl(libc::EPOLL_CTL_DEL, fd, 0) {
            log_warn!("poller: del fd={} failed (errno {})", fd, last_errno());
        }
    }

    /// Wait up to `timeout_ms` for readiness. Returns the ready pairs;
    /// an empty vector on timeout. `EINTR` and other wait errors yield an
    /// empty result so the caller's loop just runs another iteration.
    pub fn wait(&self, timeout_ms: i32) -> Vec<(RawFd, u32)> {
        let mut events = self.events.borrow_mut();
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.as_mut_ptr(),
                EVENTS_MAX as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let errno = last_errno();
            if errno != libc::EINTR {
                log_error!("poller: epoll_wait failed (errno {})", errno);
            }
            return Vec::new();
        }
        let mut ready = Vec::with_capacity(n as usize);
        for i in 0..n as usize {
            let ev = events[i];
            ready.push((ev.u64 as RawFd, ev.events));
        }
        ready
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{EV_ET, EV_IN};

    fn eventfd() -> RawFd {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(fd >= 0);
        fd
    }

    #[test]
    fn test_wait_times_out_empty() {
        let poller = Poller::new().unwrap();
        let ready = poller.wait(0);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_add_and_wait_readable() {
        let poller = Poller::new().unwrap();
        let fd = eventfd();
        poller.add(fd, EV_IN | EV_ET);

        let one: u64 = 1;
        let n = unsafe {
            libc::write(fd, &one as *const u64 as *const libc::c_void, 8)
        };
        assert_eq!(n, 8);

        let ready = poller.wait(100);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, fd);
        assert_ne!(ready[0].1 & EV_IN, 0);

        poller.del(fd);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_modify_changes_interest() {
        let poller = Poller::new().unwrap();
        let fd = eventfd();
        poller.add(fd, 0);

        let one: u64 = 1;
        unsafe { libc::write(fd, &one as *const u64 as *const libc::c_void, 8) };

        // No interest bits: not reported.
        assert!(poller.wait(0).is_empty());

        poller.modify(fd, EV_IN);
        let ready = poller.wait(100);
        assert_eq!(ready.len(), 1);

        poller.del(fd);
        unsafe { libc::close(fd) };
    }
}
