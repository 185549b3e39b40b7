//! Per-thread worker identity and main loop.
//!
//! Each worker thread publishes its id in thread-local storage so that code
//! running inside a task body — including nested `create_task`/`run`/`wait`
//! calls — can find "the current worker" without an explicit handle being
//! threaded through every call site.

use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::scheduler::SchedulerInner;
use std::sync::Weak;

thread_local! {
    static CURRENT_WORKER: Cell<Option<u32>> = const { Cell::new(None) };
    static RNG_STATE: Cell<u32> = const { Cell::new(0) };
}

/// The worker id of the calling thread, if it is one of the scheduler's own
/// worker threads.
pub fn current_worker() -> Option<u32> {
    CURRENT_WORKER.with(|c| c.get())
}

/// A small xorshift generator, seeded lazily per-thread from its own
/// thread-local address so distinct threads pick distinct steal orders
/// without needing a dependency on a full RNG crate.
fn next_u32() -> u32 {
    RNG_STATE.with(|cell| {
        let mut x = cell.get();
        if x == 0 {
            x = (&cell as *const Cell<u32> as usize as u32) | 1;
        }
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        cell.set(x);
        x
    })
}

/// A pseudo-random index in `0..bound`, used to pick a steal victim. Not
/// cryptographic; only needs to spread steal attempts across workers.
pub(crate) fn random_index(bound: usize) -> usize {
    if bound == 0 {
        0
    } else {
        (next_u32() as usize) % bound
    }
}

/// How long an idle worker parks before re-checking for work. Bounded so a
/// missed wake-up (a race between `park` and `unpark`) self-heals quickly
/// rather than stalling a task indefinitely.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// The body run on each spawned OS thread.
///
/// Takes only a `Weak` handle to the shared state: holding a strong `Arc`
/// here for the thread's whole lifetime would mean the pool could never be
/// auto-stopped by dropping the last [`crate::Scheduler`] handle, since the
/// strong count would never fall to 1 while any worker thread was alive.
/// Each iteration upgrades just long enough to check for work.
pub(crate) fn run(id: u32, weak_inner: Weak<SchedulerInner>) {
    CURRENT_WORKER.with(|c| c.set(Some(id)));

    loop {
        let Some(inner) = weak_inner.upgrade() else {
            return;
        };

        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }

        match inner.fetch_task(Some(id)) {
            Some(task_ref) => {
                inner.execute(task_ref);
                inner.finish(task_ref);
            }
            None => {
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                thread::park_timeout(PARK_TIMEOUT);
            }
        }
    }
}
