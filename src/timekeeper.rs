//! Time-based completion handles.
//!
//! A [`Timekeeper`] produces handles fulfilled after a duration. The
//! library consults the supplied timekeeper when one is given, and the
//! process-wide singleton otherwise; the singleton is installed lazily on
//! first use and can be replaced or shut down. After
//! [`shutdown_global`], time-based operations with no explicit
//! timekeeper fail with `NoTimekeeper`.

use crate::error::{Error, ErrorKind};
use crate::future::{make_semi_future_err, SemiFuture};
use crate::promise::Promise;
use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Produces handles fulfilled after a duration elapses.
pub trait Timekeeper: Send + Sync {
    /// Returns a handle fulfilled approximately `dur` after the call.
    fn after(&self, dur: Duration) -> SemiFuture<()>;
}

/// A shared handle to a timekeeper.
pub type TimekeeperRef = Arc<dyn Timekeeper>;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    promise: Promise<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

struct TimekeeperShared {
    queue: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    cv: Condvar,
    shutdown: AtomicBool,
    seq: AtomicU64,
}

/// A timekeeper backed by a dedicated worker thread and a deadline heap.
///
/// Pending timers whose timekeeper is dropped complete with a
/// broken-promise error.
pub struct ThreadTimekeeper {
    shared: Arc<TimekeeperShared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimekeeper {
    /// Spawns the worker thread and returns the timekeeper.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(TimekeeperShared {
            queue: Mutex::new(BinaryHeap::new()),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("fulcrum-timekeeper".into())
            .spawn(move || run_worker(&worker_shared))
            .expect("failed to spawn timekeeper thread");
        Self {
            shared,
            worker: Some(worker),
        }
    }
}

impl Default for ThreadTimekeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Timekeeper for ThreadTimekeeper {
    fn after(&self, dur: Duration) -> SemiFuture<()> {
        let mut promise = Promise::new();
        let handle = promise.semi_future();
        let entry = TimerEntry {
            deadline: Instant::now() + dur,
            seq: self.shared.seq.fetch_add(1, Ordering::Relaxed),
            promise,
        };
        tracing::trace!(delay_ms = dur.as_millis() as u64, "timer scheduled");
        let mut queue = self.shared.queue.lock();
        queue.push(Reverse(entry));
        drop(queue);
        self.shared.cv.notify_all();
        handle
    }
}

impl Drop for ThreadTimekeeper {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let guard = self.shared.queue.lock();
        self.shared.cv.notify_all();
        drop(guard);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(shared: &TimekeeperShared) {
    loop {
        let due = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                let now = Instant::now();
                let mut due = Vec::new();
                while queue.peek().is_some_and(|entry| entry.0.deadline <= now) {
                    let Reverse(entry) = queue.pop().expect("peeked entry vanished");
                    due.push(entry);
                }
                if !due.is_empty() {
                    break due;
                }
                match queue.peek() {
                    Some(Reverse(next)) => {
                        let deadline = next.deadline;
                        shared.cv.wait_until(&mut queue, deadline);
                    }
                    None => shared.cv.wait(&mut queue),
                }
            }
        };
        for entry in due {
            tracing::trace!("timer fired");
            entry.promise.set_value(());
        }
    }
}

enum GlobalSlot {
    Unset,
    Installed(TimekeeperRef),
    Shutdown,
}

static GLOBAL: Mutex<GlobalSlot> = Mutex::new(GlobalSlot::Unset);

/// Returns the process-wide timekeeper, installing a [`ThreadTimekeeper`]
/// on first use. Returns `None` after [`shutdown_global`].
pub fn global() -> Option<TimekeeperRef> {
    let mut slot = GLOBAL.lock();
    match &*slot {
        GlobalSlot::Installed(tk) => Some(Arc::clone(tk)),
        GlobalSlot::Shutdown => None,
        GlobalSlot::Unset => {
            let tk: TimekeeperRef = Arc::new(ThreadTimekeeper::new());
            *slot = GlobalSlot::Installed(Arc::clone(&tk));
            Some(tk)
        }
    }
}

/// Replaces the process-wide timekeeper.
pub fn set_global(tk: TimekeeperRef) {
    *GLOBAL.lock() = GlobalSlot::Installed(tk);
}

/// Shuts the process-wide timekeeper down. Later time-based operations
/// with no explicit timekeeper fail with `NoTimekeeper`.
pub fn shutdown_global() {
    *GLOBAL.lock() = GlobalSlot::Shutdown;
}

/// A handle fulfilled approximately `dur` from now, using the global
/// timekeeper.
#[must_use]
pub fn sleep(dur: Duration) -> SemiFuture<()> {
    match global() {
        Some(tk) => tk.after(dur),
        None => make_semi_future_err(Error::new(ErrorKind::NoTimekeeper)),
    }
}
