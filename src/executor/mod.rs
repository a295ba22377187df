//! Executor interfaces and the reference executors the library ships.
//!
//! An executor accepts units of work and runs each exactly once. The
//! library never creates threads for continuations itself: every
//! scheduled continuation is handed to an executor, and the executor
//! decides where it runs.
//!
//! - [`InlineExecutor`]: runs work immediately on the submitting thread
//! - [`QueuedInlineExecutor`]: runs work on the submitting thread through
//!   a per-thread FIFO, keeping recursive submissions iterative
//! - [`ManualExecutor`]: queues work until somebody drives it
//! - [`DeferredExecutor`]: single-slot staging area for unscheduled handles

pub mod deferred;
pub mod inline;
pub mod manual;

pub use deferred::DeferredExecutor;
pub use inline::{InlineExecutor, QueuedInlineExecutor};
pub use manual::ManualExecutor;

use std::sync::Arc;
use std::time::Instant;

/// A unit of work submitted to an executor.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Executor priority, a signed 8-bit hint.
pub type Priority = i8;

/// Lowest priority.
pub const LO_PRI: Priority = i8::MIN;
/// Default priority.
pub const MID_PRI: Priority = 0;
/// Highest priority.
pub const HI_PRI: Priority = i8::MAX;

/// An object that accepts units of work and runs each exactly once.
///
/// Implementations may run work synchronously, on a pool, or on an event
/// loop; the library only relies on the exactly-once contract.
pub trait Executor: Send + Sync {
    /// Submits a unit of work.
    fn add(&self, work: Work);

    /// Submits a unit of work with a priority hint.
    ///
    /// The default implementation ignores the hint.
    fn add_with_priority(&self, work: Work, priority: Priority) {
        let _ = priority;
        self.add(work);
    }
}

/// A shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;

/// An executor that can be driven by a consumer thread.
pub trait DrivableExecutor: Executor {
    /// Runs pending work until the queue empties once.
    fn drive(&self);
}

/// A drivable executor that can also park until a deadline.
pub trait TimedDrivableExecutor: DrivableExecutor {
    /// Runs pending work, waiting for new work up to `deadline`.
    ///
    /// Returns true if any work ran.
    fn try_drive_until(&self, deadline: Instant) -> bool;
}
