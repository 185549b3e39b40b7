//! The task record: a callable body plus the bookkeeping needed for
//! parent/child completion propagation and continuations.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Maximum number of continuations a single task may carry.
pub const MAX_CONTINUATIONS: usize = 15;

/// A callable task body. Invoked with the [`TaskRef`] of the task it backs,
/// so a body can create children or continuations without capturing its own
/// identity up front.
pub type TaskBody = Box<dyn FnOnce(TaskRef) + Send + 'static>;

/// Non-owning reference to a task: an index into the owning worker's arena.
///
/// Back-references (parent links, continuations, the handles returned by
/// `create_task`) all use this rather than a raw pointer — the arena is the
/// sole owner of task storage, and a `TaskRef` is just a coordinate into it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskRef {
    worker: u32,
    slot: u32,
}

impl TaskRef {
    pub(crate) fn new(worker: u32, slot: u32) -> Self {
        Self { worker, slot }
    }

    pub(crate) fn worker(self) -> u32 {
        self.worker
    }

    pub(crate) fn slot(self) -> u32 {
        self.slot
    }

    fn pack(self) -> u64 {
        ((self.worker as u64) + 1) << 32 | self.slot as u64
    }

    fn unpack(bits: u64) -> Option<Self> {
        if bits == 0 {
            return None;
        }
        let worker = ((bits >> 32) - 1) as u32;
        let slot = bits as u32;
        Some(Self { worker, slot })
    }
}

/// The unit of schedulable work.
///
/// A `Task` lives inside a worker's [`crate::arena::Arena`] and is reused in
/// place once its slot is recycled, so construction happens via
/// [`Task::reset`] rather than `Task::new` — the surrounding storage is never
/// actually deallocated while the scheduler runs.
pub struct Task {
    body: Mutex<Option<TaskBody>>,
    parent: AtomicU64,
    unfinished: AtomicUsize,
    continuations: [AtomicU64; MAX_CONTINUATIONS],
    continuation_count: AtomicUsize,
}

impl Task {
    /// An empty, never-runnable placeholder used to pre-fill arena storage.
    pub(crate) fn empty() -> Self {
        Self {
            body: Mutex::new(None),
            parent: AtomicU64::new(0),
            unfinished: AtomicUsize::new(0),
            continuations: std::array::from_fn(|_| AtomicU64::new(0)),
            continuation_count: AtomicUsize::new(0),
        }
    }

    /// Reinitialize this slot for a freshly allocated task.
    ///
    /// Only ever called by the arena allocation path, which guarantees the
    /// slot being overwritten has no other live readers (the `max_tasks`
    /// contract documented on [`crate::arena::Arena`]).
    pub(crate) fn reset(&self, body: TaskBody, parent: Option<TaskRef>) {
        *self.body.lock().unwrap() = Some(body);
        let packed = parent.map(TaskRef::pack).unwrap_or(0);
        self.parent.store(packed, Ordering::Release);
        self.continuation_count.store(0, Ordering::Relaxed);
        for slot in &self.continuations {
            slot.store(0, Ordering::Relaxed);
        }
        self.unfinished.store(1, Ordering::Release);
    }

    pub fn parent(&self) -> Option<TaskRef> {
        TaskRef::unpack(self.parent.load(Ordering::Acquire))
    }

    /// Current value of the unfinished-work counter. Racy by nature (it is
    /// read for `wait` polling) — callers should not assume it is stable.
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.unfinished() == 0
    }

    /// Register a direct child: called by `create_task` before the child can
    /// possibly run.
    pub(crate) fn add_child(&self) {
        self.unfinished.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the unfinished counter. Returns `true` if this decrement
    /// brought the task to completion (the previous value was exactly 1).
    pub(crate) fn decrement(&self) -> bool {
        self.unfinished.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Reserve and fill the next continuation slot. Returns `false` (and
    /// logs/asserts at the call site) if the list is already full.
    pub(crate) fn push_continuation(&self, continuation: TaskRef) -> bool {
        let idx = self.continuation_count.fetch_add(1, Ordering::AcqRel);
        if idx >= MAX_CONTINUATIONS {
            // Overflow: undo the reservation so the counter doesn't grow
            // without bound across repeated misuse.
            self.continuation_count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        self.continuations[idx].store(continuation.pack(), Ordering::Release);
        true
    }

    /// Iterate the continuations attached before this task was run.
    ///
    /// By API contract (`add_continuation` must precede `run(ancestor)`),
    /// every entry up to `continuation_count` is fully written by the time
    /// the task can possibly reach completion, so no synchronization beyond
    /// the `Acquire` load of the count itself is needed.
    pub(crate) fn continuations(&self) -> impl Iterator<Item = TaskRef> + '_ {
        let n = self.continuation_count.load(Ordering::Acquire).min(MAX_CONTINUATIONS);
        (0..n).filter_map(move |i| TaskRef::unpack(self.continuations[i].load(Ordering::Acquire)))
    }

    /// Take the body out so it can be executed exactly once. Returns `None`
    /// if the task was already run (or never given a body).
    pub(crate) fn take_body(&self) -> Option<TaskBody> {
        self.body.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    #[test]
    fn task_ref_pack_roundtrip() {
        let r = TaskRef::new(3, 7);
        assert_eq!(TaskRef::unpack(r.pack()), Some(r));
    }

    #[test]
    fn empty_pack_is_reserved_for_none() {
        assert_eq!(TaskRef::unpack(0), None);
    }

    #[test]
    fn reset_initializes_counters() {
        let task = Task::empty();
        task.reset(Box::new(|_| {}), None);
        assert_eq!(task.unfinished(), 1);
        assert!(!task.is_complete());
        assert_eq!(task.continuations().count(), 0);
    }

    #[test]
    fn decrement_reports_completion_once() {
        let task = Task::empty();
        task.reset(Box::new(|_| {}), None);
        task.add_child();
        assert_eq!(task.unfinished(), 2);
        assert!(!task.decrement());
        assert!(task.decrement());
    }

    #[test]
    fn take_body_runs_exactly_once() {
        let counter = Arc::new(StdAtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let task = Task::empty();
        task.reset(
            Box::new(move |_| {
                c.fetch_add(1, Ordering::Relaxed);
            }),
            None,
        );

        let body = task.take_body().expect("body present");
        body(TaskRef::new(0, 0));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(task.take_body().is_none());
    }

    #[test]
    fn continuation_list_fills_in_order() {
        let task = Task::empty();
        task.reset(Box::new(|_| {}), None);
        for i in 0..MAX_CONTINUATIONS {
            assert!(task.push_continuation(TaskRef::new(0, i as u32)));
        }
        assert!(!task.push_continuation(TaskRef::new(0, 99)));

        let collected: Vec<_> = task.continuations().map(|t| t.slot()).collect();
        assert_eq!(collected, (0..MAX_CONTINUATIONS as u32).collect::<Vec<_>>());
    }
}
