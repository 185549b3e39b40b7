//! The scheduler facade: task creation, continuations, running, waiting, and
//! shutdown, wired on top of the per-worker [`Arena`]s and [`Deque`]s.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle, Thread};

use crate::arena::Arena;
use crate::config::SchedulerConfig;
use crate::deque::Deque;
use crate::logger::{Level, LogSink};
use crate::task::{Task, TaskBody, TaskRef};
use crate::worker::{self, current_worker};

/// Shared scheduler state, reachable from every worker thread via `Weak` and
/// from the public [`Scheduler`] handle(s) via `Arc`.
pub(crate) struct SchedulerInner {
    arenas: Vec<Arena>,
    deques: Vec<Deque>,
    /// Landing queue for tasks submitted by a thread that is not one of the
    /// pool's own workers. Each per-worker `Deque` is single-producer — only
    /// its owning worker may push or pop it — so an external caller cannot
    /// push onto one directly without racing the owner's own pops. Workers
    /// drain this after their local deque is empty and before stealing.
    injector: Mutex<VecDeque<TaskRef>>,
    pub(crate) shutdown: AtomicBool,
    worker_count: usize,
    logger: Arc<dyn LogSink>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    thread_handles: Mutex<Vec<Thread>>,
}

impl SchedulerInner {
    fn unpark_all(&self) {
        for t in self.thread_handles.lock().unwrap().iter() {
            t.unpark();
        }
    }

    /// The arena a caller allocates from: its own, if it is a worker; the
    /// designated external arena (0) otherwise. Safe for concurrent callers
    /// regardless — `Arena::allocate` reserves a slot with a single atomic
    /// fetch-add, unlike the per-worker deques.
    fn target_arena(&self, calling_worker: Option<u32>) -> u32 {
        calling_worker.unwrap_or(0)
    }

    fn task(&self, task_ref: TaskRef) -> &Task {
        self.arenas[task_ref.worker() as usize].task(task_ref.slot())
    }

    pub(crate) fn create_task(&self, body: TaskBody, parent: Option<TaskRef>) -> TaskRef {
        let worker = self.target_arena(current_worker());
        let task_ref = self.arenas[worker as usize].allocate(body, parent);
        // Must happen before the child can possibly run, so the parent can
        // never observe completion prematurely.
        if let Some(p) = parent {
            self.task(p).add_child();
        }
        task_ref
    }

    pub(crate) fn add_continuation(&self, ancestor: TaskRef, continuation: TaskRef) {
        if !self.task(ancestor).push_continuation(continuation) {
            self.logger
                .log(Level::Error, "continuation list full; continuation dropped");
            debug_assert!(false, "continuation list overflow for {ancestor:?}");
        }
    }

    pub(crate) fn run(&self, task_ref: TaskRef) {
        match current_worker() {
            // The owning worker is the only thread allowed to push onto its
            // own deque; this is always safe.
            Some(worker) => {
                if self.deques[worker as usize].push(task_ref) {
                    self.unpark_all();
                } else {
                    self.logger.log(Level::Warn, "deque full; task dropped");
                    debug_assert!(false, "deque overflow for worker {worker}");
                }
            }
            // A non-worker thread has no deque of its own to push onto, and
            // must not reach into a worker's single-producer deque — land
            // the task in the shared injector for any worker to drain.
            None => {
                self.injector.lock().unwrap().push_back(task_ref);
                self.unpark_all();
            }
        }
    }

    pub(crate) fn fetch_task(&self, calling_worker: Option<u32>) -> Option<TaskRef> {
        if let Some(id) = calling_worker {
            if let Some(t) = self.deques[id as usize].pop() {
                return Some(t);
            }
        }

        if let Some(t) = self.injector.lock().unwrap().pop_front() {
            return Some(t);
        }

        if self.worker_count <= 1 {
            return None;
        }

        const STEAL_ATTEMPTS: usize = 8;
        let start = worker::random_index(self.worker_count);
        let attempts = STEAL_ATTEMPTS.min(self.worker_count);
        for attempt in 0..attempts {
            let victim = (start + attempt) % self.worker_count;
            if Some(victim as u32) == calling_worker {
                continue;
            }
            if let Some(t) = self.deques[victim].steal() {
                return Some(t);
            }
        }
        None
    }

    pub(crate) fn execute(&self, task_ref: TaskRef) {
        let task = self.task(task_ref);
        if let Some(body) = task.take_body() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(task_ref)));
            if outcome.is_err() {
                self.logger
                    .log(Level::Warn, "task body panicked; task treated as complete");
            }
        }
    }

    pub(crate) fn finish(&self, task_ref: TaskRef) {
        let task = self.task(task_ref);
        if !task.decrement() {
            return;
        }

        let continuations: Vec<TaskRef> = task.continuations().collect();
        for continuation in continuations {
            self.run(continuation);
        }

        if let Some(parent) = task.parent() {
            self.finish(parent);
        }
    }
}

/// An M:N work-stealing task scheduler.
///
/// Owns a fixed pool of OS worker threads, each with its own task arena and
/// work-stealing deque. Cloning a [`Scheduler`] produces a new handle to the
/// same underlying pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build and start the worker pool described by `config`.
    ///
    /// Panics if the resolved worker count or `max_tasks_per_worker` is
    /// zero, or if `max_tasks_per_worker` is not a power of two — callers
    /// that need a recoverable check should call
    /// [`SchedulerConfig::validate`] first.
    pub fn new(config: SchedulerConfig) -> Self {
        let workers = config.resolved_workers();
        assert!(workers > 0, "scheduler requires at least one worker");
        if let Err(err) = config.validate() {
            panic!("invalid scheduler config: {err}");
        }

        let max_tasks = config.max_tasks_per_worker;
        let arenas = (0..workers).map(|id| Arena::new(id as u32, max_tasks)).collect();
        let deques = (0..workers).map(|_| Deque::new(max_tasks)).collect();

        let inner = Arc::new(SchedulerInner {
            arenas,
            deques,
            injector: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
            worker_count: workers,
            logger: config.logger,
            threads: Mutex::new(Vec::with_capacity(workers)),
            thread_handles: Mutex::new(Vec::with_capacity(workers)),
        });

        for id in 0..workers {
            // Workers hold only a `Weak` reference, upgraded once per loop
            // iteration. If they held a strong `Arc` instead, the pool could
            // never be auto-stopped on drop: the strong count would never
            // fall to 1 while any worker thread was alive, and worker
            // threads only exit *inside* `stop`, which is exactly what drop
            // is trying to trigger.
            let weak_inner = Arc::downgrade(&inner);
            let handle = thread::Builder::new()
                .name(format!("realm-scheduler-worker-{id}"))
                .spawn(move || worker::run(id as u32, weak_inner))
                .expect("failed to spawn scheduler worker thread");
            inner.thread_handles.lock().unwrap().push(handle.thread().clone());
            inner.threads.lock().unwrap().push(handle);
        }

        inner.logger.log(
            Level::Info,
            &format!("scheduler started: {workers} workers, {max_tasks} tasks/worker"),
        );

        Self { inner }
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Allocate a task from the current worker's arena (or the designated
    /// external arena, if called from outside the pool). If `parent` is
    /// `Some`, the parent's unfinished-work counter is incremented before
    /// this call returns.
    pub fn create_task<F>(&self, body: F, parent: Option<TaskRef>) -> TaskRef
    where
        F: FnOnce(TaskRef) + Send + 'static,
    {
        self.inner.create_task(Box::new(body), parent)
    }

    /// Attach `continuation` to `ancestor`. Must be called before
    /// `run(ancestor)` — continuations added after the ancestor starts
    /// running are a logged, debug-asserted misuse (see
    /// [`crate::task::MAX_CONTINUATIONS`] for the capacity this is bounded
    /// by instead).
    pub fn add_continuation(&self, ancestor: TaskRef, continuation: TaskRef) {
        self.inner.add_continuation(ancestor, continuation);
    }

    /// Enqueue `task` on the current worker's deque, or in the shared
    /// injector queue for non-worker callers (every worker drains the
    /// injector once its own deque runs dry).
    pub fn run(&self, task: TaskRef) {
        self.inner.run(task);
    }

    /// `true` once `task`'s unfinished-work counter has reached zero.
    pub fn is_complete(&self, task: TaskRef) -> bool {
        self.inner.task(task).is_complete()
    }

    /// Block the calling thread until `task` completes, participating in
    /// scheduling (fetching and executing other runnable tasks) rather than
    /// idly blocking — so this never deadlocks even when called from inside
    /// a task body awaiting its own children, including on a single-worker
    /// pool.
    pub fn wait(&self, task: TaskRef) {
        let calling_worker = current_worker();
        while !self.is_complete(task) {
            match self.inner.fetch_task(calling_worker) {
                Some(next) => {
                    self.inner.execute(next);
                    self.inner.finish(next);
                }
                None => thread::yield_now(),
            }
        }
    }

    /// Request shutdown and block until every worker thread has joined.
    /// Idempotent: a second call returns immediately.
    pub fn stop(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.unpark_all();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.inner.threads.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
        self.inner.logger.log(Level::Info, "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Worker threads hold only a `Weak` reference (see `Scheduler::new`),
        // so the strong count reflects outstanding `Scheduler` handles only
        // — it can actually reach 1, meaning this is the last handle to the
        // shared pool, and it is safe to stop and join the workers here.
        if Arc::strong_count(&self.inner) == 1 {
            self.stop();
        }
    }
}
