//! Reactor — one event loop per thread
//!
//! Each reactor owns an epoll poller, an eventfd wakeup, a timer heap, and
//! the connections registered on its thread. One iteration of [`Reactor::run`]:
//!
//! 1. wait for readiness (bounded by the next timer deadline, 10 s cap)
//! 2. dispatch ready fds to their owners
//! 3. drain the cross-thread task queue (swap under the lock, run unlocked)
//! 4. sweep expired timers
//!
//! The struct splits in two. `Reactor` is thread-confined and holds the
//! `Rc`-based connection table; `ReactorShared` is the `Arc`-wrapped half a
//! [`ReactorHandle`] exposes to other threads: the pending task list under
//! a mutex, the quit flag, and the wakeup fd. Foreign threads never touch a
//! connection — they hand the owning reactor a closure instead.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use webd_core::clock::now_ms;
use webd_core::error::NetResult;
use webd_core::log_warn;

use crate::acceptor::Acceptor;
use crate::channel::Channel;
use crate::connection::Connection;
use crate::mask::{EV_ET, EV_IN};
use crate::poller::Poller;
use crate::timer::{TimerEntry, TimerHeap};
use crate::wakeup::WakeupFd;

/// Upper bound on one poll, milliseconds.
const POLL_WAIT_MS: u64 = 10_000;

/// A unit of work executed on the owning reactor's thread.
pub type Task = Box<dyn FnOnce(&Reactor) + Send + 'static>;

pub(crate) type ConnRef = Rc<RefCell<Connection>>;
pub(crate) type ConnTimer = TimerEntry<RefCell<Connection>>;

/// What a registered fd dispatches to.
#[derive(Clone)]
pub(crate) enum Registered {
    Acceptor(Rc<RefCell<Acceptor>>),
    Conn(ConnRef),
}

/// Cross-thread half of a reactor.
struct ReactorShared {
    owner: ThreadId,
    pending: Mutex<Vec<Task>>,
    quit: AtomicBool,
    draining: AtomicBool,
    wakeup: WakeupFd,
}

impl ReactorShared {
    #[inline]
    fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn queue(&self, task: Task) {
        {
            let mut pending = self.pending.lock().unwrap();
            pending.push(task);
        }
        // A foreign enqueue must interrupt the poll. An owner enqueue only
        // needs a wakeup while the drain pass is running, so the new task
        // is not left waiting out the next poll timeout.
        if !self.is_owner() || self.draining.load(Ordering::Acquire) {
            self.wakeup.notify();
        }
    }

    fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
        if !self.is_owner() {
            self.wakeup.notify();
        }
    }
}

/// Cloneable, `Send` handle to a reactor on another thread.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<ReactorShared>,
}

impl ReactorHandle {
    /// Enqueue a task for the owning reactor and wake it.
    pub fn queue(&self, task: Task) {
        self.shared.queue(task);
    }

    /// Ask the owning reactor to leave its loop.
    pub fn quit(&self) {
        self.shared.request_quit();
    }
}

pub struct Reactor {
    poller: Poller,
    shared: Arc<ReactorShared>,
    wakeup_ch: RefCell<Channel>,
    slots: RefCell<HashMap<RawFd, Registered>>,
    timers: RefCell<TimerHeap<RefCell<Connection>>>,
    looping: Cell<bool>,
}

impl Reactor {
    /// Build a reactor owned by the calling thread: poller, wakeup fd, and
    /// the wakeup registration (edge-triggered read interest, no timeout).
    pub fn new() -> NetResult<Self> {
        let poller = Poller::new()?;
        let wakeup = WakeupFd::new()?;

        let mut wakeup_ch = Channel::new(wakeup.fd());
        wakeup_ch.set_events(EV_IN | EV_ET);
        wakeup_ch.equal_and_update_last();
        poller.add(wakeup_ch.fd(), wakeup_ch.events());

        Ok(Self {
            poller,
            shared: Arc::new(ReactorShared {
                owner: thread::current().id(),
                pending: Mutex::new(Vec::new()),
                quit: AtomicBool::new(false),
                draining: AtomicBool::new(false),
                wakeup,
            }),
            wakeup_ch: RefCell::new(wakeup_ch),
            slots: RefCell::new(HashMap::new()),
            timers: RefCell::new(TimerHeap::new()),
            looping: Cell::new(false),
        })
    }

    /// Handle usable from any thread.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            shared: self.shared.clone(),
        }
    }

    #[inline]
    pub fn is_in_loop_thread(&self) -> bool {
        self.shared.is_owner()
    }

    /// Run `task` now when called on the owning thread, otherwise enqueue
    /// it for the next drain pass.
    pub fn run_in_loop(&self, task: Task) {
        if self.is_in_loop_thread() {
            task(self);
        } else {
            self.shared.queue(task);
        }
    }

    /// Enqueue unconditionally (FIFO, after the current dispatch pass).
    pub fn queue_in_loop(&self, task: Task) {
        self.shared.queue(task);
    }

    /// Ask the loop to exit. Safe from any thread.
    pub fn quit(&self) {
        self.shared.request_quit();
    }

    /// The event loop. Must be called on the owning thread, at most once
    /// at a time; runs until [`Reactor::quit`] is observed.
    pub fn run(&mut self) {
        assert!(!self.looping.get(), "reactor loop re-entered");
        assert!(
            self.is_in_loop_thread(),
            "reactor loop started off its owning thread"
        );
        self.looping.set(true);

        while !self.shared.quit.load(Ordering::Acquire) {
            let timeout = self.poll_timeout_ms();
            let ready = self.poller.wait(timeout);
            for (fd, revents) in ready {
                self.dispatch(fd, revents);
            }
            self.drain_pending();
            self.expire_timers();
        }

        self.looping.set(false);
    }

    /// Poll bound: the earliest timer deadline, capped at 10 s, floored at
    /// 1 ms so a just-passed deadline does not busy-spin.
    fn poll_timeout_ms(&self) -> i32 {
        match self.timers.borrow().next_deadline() {
            Some(when) => when.saturating_sub(now_ms()).clamp(1, POLL_WAIT_MS) as i32,
            None => POLL_WAIT_MS as i32,
        }
    }

    fn dispatch(&self, fd: RawFd, revents: u32) {
        if fd == self.shared.wakeup.fd() {
            self.shared.wakeup.drain();
            let mut ch = self.wakeup_ch.borrow_mut();
            ch.set_revents(revents);
            ch.set_events(EV_IN | EV_ET);
            self.update_channel(&mut ch);
            return;
        }

        let slot = self.slots.borrow().get(&fd).cloned();
        match slot {
            Some(Registered::Acceptor(acceptor)) => {
                acceptor.borrow_mut().handle_event(self, revents);
            }
            Some(Registered::Conn(conn)) => {
                conn.borrow_mut().handle_event(self, revents);
            }
            None => {
                log_warn!("reactor: ready event for unregistered fd {}", fd);
            }
        }
    }

    /// Swap the pending list out under the lock, run the tasks unlocked.
    fn drain_pending(&self) {
        self.shared.draining.store(true, Ordering::Release);
        let tasks: Vec<Task> = {
            let mut pending = self.shared.pending.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        for task in tasks {
            task(self);
        }
        self.shared.draining.store(false, Ordering::Release);
    }

    fn expire_timers(&self) {
        let expired = self.timers.borrow_mut().pop_expired(now_ms());
        for conn in expired {
            conn.borrow_mut().handle_close(self);
        }
    }

    // ── Registration plumbing (owner thread only) ────────────────────

    pub(crate) fn register(&self, fd: RawFd, slot: Registered) {
        self.slots.borrow_mut().insert(fd, slot);
    }

    /// Register the channel's current mask with the poller.
    pub(crate) fn add_channel(&self, ch: &mut Channel) {
        ch.equal_and_update_last();
        self.poller.add(ch.fd(), ch.events());
    }

    /// Push the channel's mask to the poller, skipping the syscall when it
    /// matches the last registration.
    pub(crate) fn update_channel(&self, ch: &mut Channel) {
        if !ch.equal_and_update_last() {
            self.poller.modify(ch.fd(), ch.events());
        }
    }

    /// Deregister a connection: poller first, then the table entry. The
    /// table held the last strong reference, so the connection (and its
    /// fd) is freed once the caller's borrow unwinds.
    pub(crate) fn remove_conn(&self, fd: RawFd) {
        self.poller.del(fd);
        self.slots.borrow_mut().remove(&fd);
    }

    /// Schedule a close deadline `timeout_ms` from now for `owner`.
    pub(crate) fn schedule(
        &self,
        timeout_ms: u64,
        owner: Weak<RefCell<Connection>>,
    ) -> Rc<ConnTimer> {
        self.timers
            .borrow_mut()
            .schedule(now_ms() + timeout_ms, owner)
    }

    #[cfg(test)]
    pub(crate) fn conn_count(&self) -> usize {
        self.slots.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn get_conn(&self, fd: RawFd) -> Option<ConnRef> {
        match self.slots.borrow().get(&fd) {
            Some(Registered::Conn(conn)) => Some(conn.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn spawn_reactor() -> (ReactorHandle, thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("reactor-test".into())
            .spawn(move || {
                let mut reactor = Reactor::new().unwrap();
                tx.send(reactor.handle()).unwrap();
                reactor.run();
            })
            .unwrap();
        (rx.recv().unwrap(), join)
    }

    #[test]
    fn test_tasks_run_fifo_on_owner_thread() {
        let (handle, join) = spawn_reactor();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            handle.queue(Box::new(move |_r| {
                log.lock().unwrap().push((i, thread::current().id()));
            }));
        }
        handle.quit();
        join.join().unwrap();

        let log = log.lock().unwrap();
        let order: Vec<u32> = log.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);

        // Every task ran on the reactor's thread, not ours.
        let me = thread::current().id();
        assert!(log.iter().all(|(_, tid)| *tid != me));
    }

    #[test]
    fn test_quit_from_foreign_thread_stops_loop() {
        let (handle, join) = spawn_reactor();
        handle.quit();
        join.join().unwrap();
    }

    #[test]
    fn test_task_sees_reactor_context() {
        let (handle, join) = spawn_reactor();
        let (tx, rx) = mpsc::channel();
        handle.queue(Box::new(move |r| {
            tx.send(r.is_in_loop_thread()).unwrap();
        }));
        assert!(rx.recv().unwrap());
        handle.quit();
        join.join().unwrap();
    }
}
