//! Bounded per-worker pool of [`Task`] records.
//!
//! Allocation is a single atomic fetch-add modulo the capacity: no locking,
//! no resizing. The caller (the scheduler, on behalf of `create_task`) must
//! never have more than `capacity` live, unfinished tasks outstanding for a
//! given arena at once — reusing a slot while its previous occupant is still
//! referenced is undefined behavior at the logical level (the old task's
//! `TaskRef`s would silently start pointing at the new task).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::task::{Task, TaskBody, TaskRef};

pub struct Arena {
    slots: Box<[UnsafeCell<Task>]>,
    capacity: usize,
    allocated: AtomicUsize,
    worker: u32,
}

// Safety: every live task occupies a slot reserved by a unique `fetch_add`
// on `allocated`, so concurrent `allocate` calls never write the same slot
// at the same time. Once written, a `Task`'s own fields are all interior
// mutable (atomics / mutex), so shared `&Task` access from any thread is
// safe through the ordinary `Sync` contract of those fields.
unsafe impl Sync for Arena {}
unsafe impl Send for Arena {}

impl Arena {
    /// Create an arena of `capacity` pre-allocated, empty task slots for
    /// worker `worker`. `capacity` should be a power of two (not required,
    /// but matches the deque's sizing and keeps `allocated % capacity`
    /// cheap).
    pub fn new(worker: u32, capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be nonzero");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(Task::empty()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            capacity,
            allocated: AtomicUsize::new(0),
            worker,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocate and initialize the next task slot.
    pub fn allocate(&self, body: TaskBody, parent: Option<TaskRef>) -> TaskRef {
        let idx = self.allocated.fetch_add(1, Ordering::Relaxed) % self.capacity;
        // Safety: see the `Sync` justification above — this slot was just
        // reserved uniquely by the fetch-add.
        let task = unsafe { &*self.slots[idx].get() };
        task.reset(body, parent);
        TaskRef::new(self.worker, idx as u32)
    }

    /// Borrow the task at `slot`. Panics if `slot` is out of range, which
    /// would indicate a `TaskRef` constructed for the wrong arena.
    pub fn task(&self, slot: u32) -> &Task {
        // Safety: see the `Sync` justification above.
        unsafe { &*self.slots[slot as usize].get() }
    }

    /// Reset the allocation counter. Only safe to call once every task ever
    /// allocated from this arena has completed and is no longer referenced
    /// (e.g. at scheduler shutdown, or at a future quiescence barrier).
    pub fn reset(&self) {
        self.allocated.store(0, Ordering::Relaxed);
    }
}
