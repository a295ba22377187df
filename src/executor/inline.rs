//! Executors that run work on the submitting thread.

use super::{Executor, ExecutorRef, Work};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::OnceLock;

/// An executor that runs each unit of work immediately, inline on the
/// thread that submitted it.
///
/// This is the default when a scheduled operation is requested on a
/// handle that has no real executor.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    /// Returns the process-wide instance.
    pub fn instance() -> ExecutorRef {
        static INSTANCE: OnceLock<ExecutorRef> = OnceLock::new();
        INSTANCE.get_or_init(|| std::sync::Arc::new(Self)).clone()
    }
}

impl Executor for InlineExecutor {
    fn add(&self, work: Work) {
        work();
    }
}

thread_local! {
    static QUEUE: RefCell<VecDeque<Work>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// An inline executor with a per-thread FIFO.
///
/// Work submitted while other work is running is queued and run after
/// the current item returns, so recursive submission chains execute
/// iteratively instead of growing the stack. Submission order is
/// preserved per thread.
#[derive(Debug, Default)]
pub struct QueuedInlineExecutor;

impl QueuedInlineExecutor {
    /// Returns the process-wide instance.
    pub fn instance() -> ExecutorRef {
        static INSTANCE: OnceLock<ExecutorRef> = OnceLock::new();
        INSTANCE.get_or_init(|| std::sync::Arc::new(Self)).clone()
    }
}

impl Executor for QueuedInlineExecutor {
    fn add(&self, work: Work) {
        QUEUE.with(|q| q.borrow_mut().push_back(work));
        if DRAINING.with(Cell::get) {
            return;
        }
        DRAINING.with(|d| d.set(true));
        loop {
            let next = QUEUE.with(|q| q.borrow_mut().pop_front());
            match next {
                Some(w) => w(),
                None => break,
            }
        }
        DRAINING.with(|d| d.set(false));
    }
}
