//! Timer heap with lazy cancellation
//!
//! A min-heap keyed by expiry time in milliseconds. Cancellation only flips
//! a flag; the cancelled entry physically leaves the heap when it surfaces
//! at the top. This keeps cancel O(1) and gives a useful grace window: a
//! request arriving inside the old timeout reuses the still-alive owner
//! instead of paying a teardown and reallocation.
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1)
//! - Expire sweep: O(k log n) for k popped entries
//! - Next deadline: O(1)
//!
//! The heap holds weak references to its owners; an entry whose owner is
//! already gone is silently dropped when popped.

use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};

/// One scheduled deadline.
///
/// Shared between the heap (which pops it) and the owner (which may cancel
/// it). `deleted` marks logical cancellation; the owner reference is
/// cleared at the same time so a cancelled entry keeps nothing alive.
pub struct TimerEntry<T> {
    when: u64,
    seq: u64,
    deleted: Cell<bool>,
    owner: RefCell<Weak<T>>,
}

impl<T> TimerEntry<T> {
    /// Expiry time, milliseconds on the process clock.
    #[inline]
    pub fn when(&self) -> u64 {
        self.when
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    /// Logically cancel: flip the flag and drop the owner reference.
    /// The entry stays in its heap until it reaches the top.
    pub fn cancel(&self) {
        self.deleted.set(true);
        *self.owner.borrow_mut() = Weak::new();
    }
}

/// Heap wrapper providing min-heap ordering with a stable tie-break.
struct HeapSlot<T>(Rc<TimerEntry<T>>);

impl<T> PartialEq for HeapSlot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.when == other.0.when && self.0.seq == other.0.seq
    }
}

impl<T> Eq for HeapSlot<T> {}

impl<T> PartialOrd for HeapSlot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapSlot<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed for min-heap behavior: earliest deadline pops first,
        // insertion order breaks ties.
        match other.0.when.cmp(&self.0.when) {
            std::cmp::Ordering::Equal => other.0.seq.cmp(&self.0.seq),
            ord => ord,
        }
    }
}

/// Min-heap of timer entries owned by one reactor.
pub struct TimerHeap<T> {
    heap: BinaryHeap<HeapSlot<T>>,
    next_seq: u64,
}

impl<T> TimerHeap<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule a deadline for `owner`. Returns the entry so the owner can
    /// keep a weak link for later cancellation.
    pub fn schedule(&mut self, when: u64, owner: Weak<T>) -> Rc<TimerEntry<T>> {
        let entry = Rc::new(TimerEntry {
            when,
            seq: self.next_seq,
            deleted: Cell::new(false),
            owner: RefCell::new(owner),
        });
        self.next_seq += 1;
        self.heap.push(HeapSlot(entry.clone()));
        entry
    }

    /// Sweep the heap top: discard cancelled entries, pop entries whose
    /// deadline has passed, and return the owners that are still alive.
    pub fn pop_expired(&mut self, now: u64) -> Vec<Rc<T>> {
        let mut expired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.0.is_deleted() {
                self.heap.pop();
                continue;
            }
            if top.0.when > now {
                break;
            }
            let slot = self.heap.pop().unwrap();
            let owner = slot.0.owner.borrow().upgrade();
            if let Some(owner) = owner {
                expired.push(owner);
            }
        }
        expired
    }

    /// Earliest deadline in the heap, for bounding the poll timeout.
    ///
    /// May name a cancelled entry (the top is not cleaned eagerly); the
    /// cost is one early wakeup whose sweep then discards it.
    #[inline]
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|slot| slot.0.when)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for TimerHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
