//! ReactorPool — one reactor per worker thread
//!
//! `start` spawns N named worker threads. Each builds its own [`Reactor`]
//! on its stack, publishes a handle through a condvar-guarded slot vector,
//! and enters `run()`. The caller blocks until every slot is filled, so a
//! returned pool only hands out live reactors.
//!
//! `next` round-robins over the workers; with zero workers it degrades to
//! the base (main) reactor so the whole server still runs single-reactor.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use webd_core::log_debug;

use crate::reactor::{Reactor, ReactorHandle};

pub struct ReactorPool {
    workers: Vec<ReactorHandle>,
    joins: Vec<JoinHandle<()>>,
    base: ReactorHandle,
    next: Cell<usize>,
}

impl ReactorPool {
    /// Spawn `num_workers` reactor threads and wait for all of them to
    /// publish their handles. `base` is the caller's own reactor, used as
    /// the degenerate target when `num_workers` is zero.
    pub fn start(num_workers: usize, base: ReactorHandle) -> Self {
        let slots: Arc<(Mutex<Vec<Option<ReactorHandle>>>, Condvar)> =
            Arc::new((Mutex::new(vec![None; num_workers]), Condvar::new()));

        let mut joins = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let slots = slots.clone();
            let join = thread::Builder::new()
                .name(format!("webd-worker-{}", i))
                .spawn(move || {
                    let mut reactor = Reactor::new()
                        .unwrap_or_else(|e| panic!("webd-worker-{}: reactor setup failed: {}", i, e));
                    {
                        let (lock, cond) = &*slots;
                        let mut vec = lock.lock().unwrap();
                        vec[i] = Some(reactor.handle());
                        cond.notify_all();
                    }
                    log_debug!("webd-worker-{}: loop running", i);
                    reactor.run();
                    log_debug!("webd-worker-{}: loop exited", i);
                })
                .expect("failed to spawn reactor worker thread");
            joins.push(join);
        }

        // Block until every worker has published its handle.
        let workers = {
            let (lock, cond) = &*slots;
            let mut vec = lock.lock().unwrap();
            while vec.iter().any(|slot| slot.is_none()) {
                vec = cond.wait(vec).unwrap();
            }
            vec.iter().map(|slot| slot.clone().unwrap()).collect()
        };

        Self {
            workers,
            joins,
            base,
            next: Cell::new(0),
        }
    }

    /// Next reactor in round-robin order; the base reactor when the pool
    /// has no workers.
    pub fn next(&self) -> ReactorHandle {
        if self.workers.is_empty() {
            return self.base.clone();
        }
        let i = self.next.get();
        self.next.set((i + 1) % self.workers.len());
        self.workers[i].clone()
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to quit, then join them.
    pub fn shutdown(&mut self) {
        for handle in &self.workers {
            handle.quit();
        }
        for join in self.joins.drain(..) {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn base_reactor() -> (ReactorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let join = thread::spawn(move || {
            let mut reactor = Reactor::new().unwrap();
            tx.send(reactor.handle()).unwrap();
            reactor.run();
        });
        (rx.recv().unwrap(), join)
    }

    #[test]
    fn test_start_publishes_all_workers() {
        let (base, base_join) = base_reactor();
        let mut pool = ReactorPool::start(3, base.clone());
        assert_eq!(pool.num_workers(), 3);

        // Each worker executes tasks on a distinct thread.
        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            let tx = tx.clone();
            pool.next().queue(Box::new(move |_r| {
                tx.send(thread::current().id()).unwrap();
            }));
        }
        let tids: std::collections::HashSet<_> = (0..3).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(tids.len(), 3);

        pool.shutdown();
        base.quit();
        base_join.join().unwrap();
    }

    #[test]
    fn test_zero_workers_degrades_to_base() {
        let (base, base_join) = base_reactor();
        let mut pool = ReactorPool::start(0, base.clone());
        assert_eq!(pool.num_workers(), 0);

        let (tx, rx) = mpsc::channel();
        pool.next().queue(Box::new(move |r| {
            tx.send(r.is_in_loop_thread()).unwrap();
        }));
        assert!(rx.recv().unwrap());

        pool.shutdown();
        base.quit();
        base_join.join().unwrap();
    }

    #[test]
    fn test_round_robin_wraps() {
        let (base, base_join) = base_reactor();
        let mut pool = ReactorPool::start(2, base.clone());

        // Four picks over two workers land two tasks on each.
        let (tx, rx) = mpsc::channel();
        for _ in 0..4 {
            let tx = tx.clone();
            pool.next().queue(Box::new(move |_r| {
                tx.send(thread::current().id()).unwrap();
            }));
        }
        let tids: Vec<_> = (0..4).map(|_| rx.recv().unwrap()).collect();
        let mut counts = std::collections::HashMap::new();
        for tid in tids {
            *counts.entry(tid).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 2);
        assert!(counts.values().all(|&c| c == 2));

        pool.shutdown();
        base.quit();
        base_join.join().unwrap();
    }
}
