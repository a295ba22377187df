//! The shared state machine binding a producer, a consumer callback, and
//! an executor.
//!
//! Every promise/future pair shares exactly one [`Core`]. The producer
//! writes a result exactly once; the consumer installs a callback at most
//! once. Whichever side arrives second arms the core and dispatches:
//!
//! ```text
//!              set_result                set_callback
//!   Start ───────────────► OnlyResult ───────────────► Armed ──► Done
//!     │                                                  ▲
//!     └───────────────► OnlyCallback ────────────────────┘
//!        set_callback               set_result
//! ```
//!
//! Transitions happen on an atomic state word with acquire/release
//! ordering, so the result written before arming is visible to the
//! thread that observes the armed state. The result, callback, executor
//! and interrupt slots sit behind small locks; each is touched at most a
//! handful of times per core lifetime.
//!
//! Neither handle holds a back-reference to the other: the two `Arc`
//! clones the handles own are the producer and consumer retentions, and
//! the core is freed when the second one is released.

use crate::error::{Error, ErrorKind};
use crate::executor::{ExecutorRef, Priority};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A continuation installed by the consumer side.
pub(crate) type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// An interrupt handler installed by the producer side.
///
/// Shared so a downstream core can inherit its upstream's handler.
pub(crate) type InterruptHandler = Arc<dyn Fn(Error) + Send + Sync + 'static>;

const START: u8 = 0;
const ONLY_RESULT: u8 = 1;
const ONLY_CALLBACK: u8 = 2;
const ARMED: u8 = 3;
const DONE: u8 = 4;

enum InterruptState {
    Clear,
    Handler(InterruptHandler),
    Raised(Error),
}

/// The state shared by one producer handle and one consumer handle.
pub(crate) struct Core<T> {
    state: AtomicU8,
    result: Mutex<Option<Result<T>>>,
    callback: Mutex<Option<Callback<T>>>,
    executor: Mutex<Option<(ExecutorRef, Priority)>>,
    interrupt: Mutex<InterruptState>,
}

impl<T> std::fmt::Debug for Core<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Core<T> {
    /// Creates a core in the Start state.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(START),
            result: Mutex::new(None),
            callback: Mutex::new(None),
            executor: Mutex::new(None),
            interrupt: Mutex::new(InterruptState::Clear),
        })
    }

    /// Creates a core already fulfilled with `result`.
    pub(crate) fn with_result(result: Result<T>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ONLY_RESULT),
            result: Mutex::new(Some(result)),
            callback: Mutex::new(None),
            executor: Mutex::new(None),
            interrupt: Mutex::new(InterruptState::Clear),
        })
    }

    /// Writes the result. Arms and dispatches if a callback is waiting.
    ///
    /// # Panics
    ///
    /// Panics if a result was already written.
    pub(crate) fn set_result(&self, result: Result<T>) {
        *self.result.lock() = Some(result);
        let transition = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| match s {
            START => Some(ONLY_RESULT),
            ONLY_CALLBACK => Some(ARMED),
            _ => None,
        });
        match transition {
            Ok(ONLY_CALLBACK) => self.dispatch(),
            Ok(_) => {}
            Err(state) => panic!("result already set on this core (state {state})"),
        }
    }

    /// Installs the callback. Arms and dispatches if a result is waiting.
    ///
    /// # Panics
    ///
    /// Panics if a callback was already installed.
    pub(crate) fn set_callback(&self, callback: Callback<T>) {
        *self.callback.lock() = Some(callback);
        let transition = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| match s {
            START => Some(ONLY_CALLBACK),
            ONLY_RESULT => Some(ARMED),
            _ => None,
        });
        match transition {
            Ok(ONLY_RESULT) => self.dispatch(),
            Ok(_) => {}
            Err(state) => panic!("callback already installed on this core (state {state})"),
        }
    }

    /// Updates the executor slot used by the dispatch rule.
    pub(crate) fn set_executor(&self, executor: ExecutorRef, priority: Priority) {
        *self.executor.lock() = Some((executor, priority));
    }

    /// Returns the bound executor, if any.
    pub(crate) fn executor(&self) -> Option<(ExecutorRef, Priority)> {
        self.executor.lock().clone()
    }

    /// Returns true if a result has been written.
    pub(crate) fn has_result(&self) -> bool {
        matches!(
            self.state.load(Ordering::Acquire),
            ONLY_RESULT | ARMED | DONE
        )
    }

    /// Returns true if a result is waiting with no callback to claim it.
    pub(crate) fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == ONLY_RESULT
    }

    /// Consumer-side take of a pending result, for the `get` path where
    /// no callback was ever installed.
    pub(crate) fn try_take_result(&self) -> Option<Result<T>> {
        if self
            .state
            .compare_exchange(ONLY_RESULT, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return self.result.lock().take();
        }
        None
    }

    /// Signals an interrupt toward the producer.
    ///
    /// The first interrupt wins; it is delivered to the handler if one is
    /// installed, and parked for the next handler otherwise.
    pub(crate) fn raise(&self, err: Error) {
        let mut interrupt = self.interrupt.lock();
        match &*interrupt {
            InterruptState::Handler(handler) => {
                let handler = Arc::clone(handler);
                drop(interrupt);
                handler(err);
            }
            InterruptState::Clear => {
                *interrupt = InterruptState::Raised(err);
            }
            InterruptState::Raised(_) => {}
        }
    }

    /// Installs the interrupt handler, delivering a parked interrupt
    /// immediately.
    pub(crate) fn set_interrupt_handler(&self, handler: InterruptHandler) {
        let mut interrupt = self.interrupt.lock();
        let previous = std::mem::replace(
            &mut *interrupt,
            InterruptState::Handler(Arc::clone(&handler)),
        );
        drop(interrupt);
        if let InterruptState::Raised(err) = previous {
            handler(err);
        }
    }

    /// Returns the installed interrupt handler for inheritance by a
    /// downstream core.
    pub(crate) fn interrupt_handler(&self) -> Option<InterruptHandler> {
        match &*self.interrupt.lock() {
            InterruptState::Handler(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    /// Adopts an upstream handler without triggering parked-interrupt
    /// delivery (a fresh downstream core has none).
    pub(crate) fn adopt_interrupt_handler(&self, handler: Option<InterruptHandler>) {
        if let Some(handler) = handler {
            self.set_interrupt_handler(handler);
        }
    }

    /// Armed → Done: hand the callback and result to the executor, or
    /// run them inline when no executor is bound.
    fn dispatch(&self) {
        let callback = self.callback.lock().take().expect("armed core lost its callback");
        let result = self.result.lock().take().expect("armed core lost its result");
        let executor = self.executor.lock().clone();
        self.state.store(DONE, Ordering::Release);
        match executor {
            Some((executor, priority)) => {
                tracing::trace!(priority, "core dispatching callback to executor");
                executor.add_with_priority(Box::new(move || callback(result)), priority);
            }
            None => {
                tracing::trace!("core dispatching callback inline");
                callback(result);
            }
        }
    }
}

/// Creates a producer/consumer contract: the write side and the shared
/// core the read side wraps.
pub(crate) fn contract<T: Send + 'static>() -> (Fulfiller<T>, Arc<Core<T>>) {
    let core = Core::new();
    (
        Fulfiller {
            core: Some(Arc::clone(&core)),
        },
        core,
    )
}

/// The crate-internal write side of a core.
///
/// Continuation closures own one of these for their downstream core.
/// Dropping it unfulfilled (for example when an executor discards queued
/// work) latches a broken-promise error downstream.
pub(crate) struct Fulfiller<T: Send + 'static> {
    core: Option<Arc<Core<T>>>,
}

impl<T: Send + 'static> Fulfiller<T> {
    pub(crate) fn fulfill(mut self, result: Result<T>) {
        if let Some(core) = self.core.take() {
            core.set_result(result);
        }
    }
}

impl<T: Send + 'static> Drop for Fulfiller<T> {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            core.set_result(Err(Error::new(ErrorKind::BrokenPromise)));
        }
    }
}
