//! A queue-backed executor driven explicitly by a consumer thread.

use super::{DrivableExecutor, Executor, TimedDrivableExecutor, Work};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// An executor whose work runs only when somebody calls [`drive`].
///
/// Work is queued on submission; `drive` drains the queue on the calling
/// thread. This is the executor behind `wait_via`/`get_via` and the
/// deterministic executor used throughout the test suites.
///
/// [`drive`]: DrivableExecutor::drive
#[derive(Debug, Default)]
pub struct ManualExecutor {
    queue: SegQueue<Work>,
    wakeup: Mutex<()>,
    cv: Condvar,
}

impl ManualExecutor {
    /// Creates a new, empty manual executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued units of work.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Executor for ManualExecutor {
    fn add(&self, work: Work) {
        self.queue.push(work);
        let _guard = self.wakeup.lock();
        self.cv.notify_all();
    }
}

impl DrivableExecutor for ManualExecutor {
    fn drive(&self) {
        while let Some(work) = self.queue.pop() {
            work();
        }
    }
}

impl TimedDrivableExecutor for ManualExecutor {
    fn try_drive_until(&self, deadline: Instant) -> bool {
        let mut ran = false;
        loop {
            while let Some(work) = self.queue.pop() {
                work();
                ran = true;
            }
            if ran {
                return true;
            }
            let mut guard = self.wakeup.lock();
            if !self.queue.is_empty() {
                continue;
            }
            if self.cv.wait_until(&mut guard, deadline).timed_out() {
                return ran;
            }
        }
    }
}
