//! Chase-Lev work-stealing deque of [`TaskRef`]s.
//!
//! The owning worker pushes and pops from the bottom (LIFO); any other
//! worker may steal from the top (FIFO). Capacity is fixed at construction
//! time — callers are expected to size it alongside the arena so that a
//! single worker never has more live, unrun tasks than the deque can hold.
//!
//! Memory ordering follows the classic Chase-Lev / Arora-Blumofe-Plaxton
//! scheme: the owner's `bottom` store on push is a release; on pop it is a
//! relaxed store followed by a `SeqCst` fence before `top` is read; the
//! steal-side CAS on `top` is acq-rel.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicIsize, AtomicUsize, Ordering};

use crate::task::TaskRef;

/// Bounded single-owner, multi-thief deque of [`TaskRef`]s.
pub struct Deque {
    bottom: AtomicIsize,
    top: AtomicIsize,
    buffer: Box<[UnsafeCell<MaybeUninit<TaskRef>>]>,
    mask: usize,
    capacity: usize,
}

// Safety: all slot access is index-disjoint by construction (see module docs);
// `TaskRef` is `Copy` and carries no borrowed state.
unsafe impl Send for Deque {}
unsafe impl Sync for Deque {}

impl Deque {
    /// Create a new deque. `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "deque capacity must be a power of two");
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            bottom: AtomicIsize::new(0),
            top: AtomicIsize::new(0),
            buffer,
            mask: capacity - 1,
            capacity,
        }
    }

    #[inline]
    fn slot(&self, index: isize) -> &UnsafeCell<MaybeUninit<TaskRef>> {
        &self.buffer[(index as usize) & self.mask]
    }

    /// Number of live entries, `top..bottom`. Only approximate when called
    /// concurrently with a steal, but exact when called by the owner with no
    /// concurrent push/pop (e.g. right after construction).
    pub fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        (b - t).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a task onto the bottom of the deque. Called only by the owning
    /// worker. Silently drops (and returns `false`) if the deque is full —
    /// the caller is expected to log this as a resource-exhaustion event.
    pub fn push(&self, task: TaskRef) -> bool {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        if (b - t) as usize >= self.capacity {
            return false;
        }
        // Safety: `b` is owned exclusively by the pushing worker until the
        // release store below publishes it.
        unsafe {
            (*self.slot(b).get()).write(task);
        }
        self.bottom.store(b + 1, Ordering::Release);
        true
    }

    /// Pop a task from the bottom of the deque (LIFO). Called only by the
    /// owning worker.
    pub fn pop(&self) -> Option<TaskRef> {
        let b = self.bottom.load(Ordering::Relaxed);
        let new_b = b - 1;
        self.bottom.store(new_b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);

        if t > new_b {
            // Deque was already empty; restore bottom.
            self.bottom.store(t, Ordering::Relaxed);
            return None;
        }

        // Safety: index `new_b` was written by a prior push and has not been
        // stolen (t <= new_b implies it is still within [top, bottom)).
        let task = unsafe { (*self.slot(new_b).get()).assume_init_read() };

        if t == new_b {
            // Last element: race against stealers for it.
            let won = self
                .top
                .compare_exchange(t, t + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok();
            self.bottom.store(t + 1, Ordering::Relaxed);
            if won {
                Some(task)
            } else {
                None
            }
        } else {
            Some(task)
        }
    }

    /// Steal a task from the top of the deque (FIFO). Called by any worker
    /// other than the owner.
    pub fn steal(&self) -> Option<TaskRef> {
        let t = self.top.load(Ordering::Acquire);
        let b = self.bottom.load(Ordering::Acquire);
        if t >= b {
            return None;
        }

        // Safety: t < b means slot `t` holds a live, not-yet-stolen task;
        // the CAS below determines whether this read is the winning one.
        let task = unsafe { (*self.slot(t).get()).assume_init_read() };

        if self
            .top
            .compare_exchange(t, t + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Some(task)
        } else {
            // Lost the race; the value we read is not ours to return, and
            // since `TaskRef` is `Copy` there is nothing to forget.
            None
        }
    }
}
