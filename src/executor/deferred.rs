//! Single-slot executor that stages work on an unscheduled handle.
//!
//! A [`DeferredExecutor`] holds at most one pending unit of work and at
//! most one downstream destination: either a real executor (attached when
//! the handle is scheduled with `via`) or a waiter's baton (installed by a
//! synchronous `wait`). State transitions use compare-exchange; the slots
//! sit behind small locks to tolerate the window between a transition and
//! the matching slot access.
//!
//! ```text
//!            add ┌──────────────┐ set_executor
//!         ┌─────►│ HasFunction  │◄─────────────┐
//!         │      └──────┬───────┘              │
//!   ┌─────┴───┐         │ set_executor   ┌─────┴────────┐
//!   │  Empty  │         └───────────────►│ HasExecutor  │──add──► pass-through
//!   └─┬─────┬─┘                          └──────────────┘
//!     │wait └──────detach──► Detached (work dropped on arrival)
//!     ▼
//!   HasBaton ──add──► HasFunction + post
//! ```
//!
//! Once an executor is attached the slot degenerates to a pass-through:
//! later submissions go straight to the destination executor. Running the
//! staged function inline first re-arms the slot as a pass-through to the
//! inline executor, so work the function submits reentrantly runs in
//! place instead of racing the slot's teardown.

use super::inline::InlineExecutor;
use super::{Executor, ExecutorRef, Priority, Work, MID_PRI};
use crate::sync::Baton;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EMPTY: u8 = 0;
const HAS_FUNCTION: u8 = 1;
const HAS_EXECUTOR: u8 = 2;
const HAS_BATON: u8 = 3;
const DETACHED: u8 = 4;

/// A single-slot staging executor for unscheduled handles.
///
/// Work added while no destination exists is parked in the slot. The
/// destination arrives later, either as a real executor or as a waiter
/// that runs the slot inline.
pub struct DeferredExecutor {
    state: AtomicU8,
    func: Mutex<Option<Work>>,
    executor: Mutex<Option<(ExecutorRef, Priority)>>,
    baton: Mutex<Option<Arc<Baton>>>,
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DeferredExecutor {
    /// Creates a new deferred executor in the empty state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(EMPTY),
            func: Mutex::new(None),
            executor: Mutex::new(None),
            baton: Mutex::new(None),
        })
    }

    /// Attaches a real executor.
    ///
    /// A staged function is submitted to `executor` at `priority`
    /// immediately; later submissions pass straight through at the same
    /// priority.
    pub fn set_executor(&self, executor: ExecutorRef, priority: Priority) {
        *self.executor.lock() = Some((Arc::clone(&executor), priority));
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                EMPTY | HAS_BATON => {
                    if self
                        .state
                        .compare_exchange(state, HAS_EXECUTOR, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                HAS_FUNCTION => {
                    if self
                        .state
                        .compare_exchange(state, HAS_EXECUTOR, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let work = self.func.lock().take().expect("staged work missing");
                        tracing::trace!(priority, "deferred executor draining staged work");
                        executor.add_with_priority(work, priority);
                        return;
                    }
                }
                HAS_EXECUTOR | DETACHED => return,
                _ => unreachable!("deferred executor in unknown state {state}"),
            }
        }
    }

    /// Parks the calling thread until work arrives.
    ///
    /// Returns immediately if work is already staged (or the slot is in a
    /// terminal state).
    pub fn wait(&self) {
        if let Some(baton) = self.install_baton() {
            baton.wait();
        }
    }

    /// Parks the calling thread until work arrives or `dur` elapses.
    ///
    /// Returns true if work is available.
    pub fn try_wait_for(&self, dur: Duration) -> bool {
        match self.install_baton() {
            Some(baton) => baton.try_wait_for(dur),
            None => true,
        }
    }

    /// Runs the staged function, if any, on the calling thread.
    ///
    /// The slot is first re-armed as a pass-through to the inline
    /// executor so that work submitted during the run also executes in
    /// place.
    pub fn run_pending_inline(&self) {
        *self.executor.lock() = Some((InlineExecutor::instance(), MID_PRI));
        let prev = self.state.swap(HAS_EXECUTOR, Ordering::AcqRel);
        if prev == HAS_FUNCTION {
            if let Some(work) = self.func.lock().take() {
                work();
            }
        }
    }

    /// Marks the slot detached: staged work is dropped, and work arriving
    /// later is dropped on arrival.
    pub fn detach(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                EMPTY | HAS_FUNCTION | HAS_BATON => {
                    if self
                        .state
                        .compare_exchange(state, DETACHED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        drop(self.func.lock().take());
                        return;
                    }
                }
                HAS_EXECUTOR | DETACHED => return,
                _ => unreachable!("deferred executor in unknown state {state}"),
            }
        }
    }

    fn install_baton(&self) -> Option<Arc<Baton>> {
        let baton = Arc::new(Baton::new());
        *self.baton.lock() = Some(Arc::clone(&baton));
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                EMPTY => {
                    if self
                        .state
                        .compare_exchange(EMPTY, HAS_BATON, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Some(baton);
                    }
                }
                // A previous timed wait left its baton behind; the slot
                // now points at ours.
                HAS_BATON => return Some(baton),
                HAS_FUNCTION | HAS_EXECUTOR | DETACHED => {
                    self.baton.lock().take();
                    return None;
                }
                _ => unreachable!("deferred executor in unknown state {state}"),
            }
        }
    }
}

impl Executor for DeferredExecutor {
    fn add(&self, work: Work) {
        let mut work = Some(work);
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                HAS_EXECUTOR => {
                    let (executor, priority) = self
                        .executor
                        .lock()
                        .clone()
                        .expect("executor slot empty in HasExecutor");
                    executor.add_with_priority(work.take().expect("work consumed twice"), priority);
                    return;
                }
                DETACHED => {
                    // Nobody will ever schedule this; drop it.
                    drop(work.take());
                    return;
                }
                EMPTY | HAS_BATON => {
                    *self.func.lock() = work.take();
                    if self
                        .state
                        .compare_exchange(state, HAS_FUNCTION, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if state == HAS_BATON {
                            if let Some(baton) = self.baton.lock().as_ref() {
                                baton.post();
                            }
                        }
                        return;
                    }
                    // Lost a race with set_executor/detach; reclaim and retry.
                    work = self.func.lock().take();
                    if work.is_none() {
                        return;
                    }
                }
                HAS_FUNCTION => panic!("deferred executor already holds a work item"),
                _ => unreachable!("deferred executor in unknown state {state}"),
            }
        }
    }
}
