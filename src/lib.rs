//! Fulcrum: promise/future rendezvous primitives with executor-dispatched
//! continuations.
//!
//! # Overview
//!
//! A [`Promise`] and its consumer handle share a single core: a small
//! state machine that mediates the producer's result, the consumer's
//! callback, and the executor the callback runs on. The consumer side
//! comes in two shapes: a [`SemiFuture`] has no executor and can only
//! stage work locally, while a [`Future`] is bound to an executor and
//! carries the full continuation surface (`then`, `on_error`, `within`,
//! and friends).
//!
//! # Core Guarantees
//!
//! - **Exactly-once hand-off**: a result is written once, a callback is
//!   installed at most once, and the callback is invoked exactly once
//!   iff both happened
//! - **No dangling consumers**: a producer dropped without fulfilling
//!   latches a broken-promise error instead of leaving waiters hanging
//! - **Executor discipline**: continuations installed through a
//!   scheduled handle always run on that handle's executor; unscheduled
//!   handles stage work in a deferred slot until an executor arrives
//! - **Cooperative cancellation**: `raise` carries an error upstream to
//!   the producer's interrupt handler; nothing is forcibly terminated
//!
//! # Module Structure
//!
//! - [`error`]: the error kinds surfaced by handles
//! - [`promise`]: the producer handle
//! - [`future`]: the consumer handles and `make_*` constructors
//! - [`executor`]: executor traits, inline/manual/deferred executors
//! - [`collect`]: composition combinators (`collect_all`, `window`, ...)
//! - [`timekeeper`]: time-based completions and the global timekeeper
//! - [`sync`]: the one-shot signal behind the blocking bridges
//!
//! # Example
//!
//! ```
//! use fulcrum::{collect_all, make_future, make_semi_future};
//!
//! let doubled = make_future(21).then_value(|x| x * 2).get().unwrap();
//! assert_eq!(doubled, 42);
//!
//! let all = collect_all(vec![make_semi_future(1), make_semi_future(2)])
//!     .get()
//!     .unwrap();
//! assert_eq!(all.len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod collect;
mod core;
pub mod error;
pub mod executor;
pub mod future;
pub mod promise;
pub mod sync;
pub mod timekeeper;

pub use collect::{
    collect, collect_all, collect_all2, collect_any, collect_any_without_error, collect_n, map,
    reduce, reduce_try, times, unordered_reduce, when, while_do, will_equal, window, window_n,
    window_on,
};
pub use error::{Error, ErrorKind, Result};
pub use executor::{
    DeferredExecutor, DrivableExecutor, Executor, ExecutorRef, InlineExecutor, ManualExecutor,
    Priority, QueuedInlineExecutor, TimedDrivableExecutor, Work, HI_PRI, LO_PRI, MID_PRI,
};
pub use future::{
    make_future, make_future_err, make_future_try, make_future_with, make_semi_future,
    make_semi_future_err, make_semi_future_try, make_semi_future_with, via, Future, SemiFuture,
};
pub use promise::Promise;
pub use sync::Baton;
pub use timekeeper::{sleep, ThreadTimekeeper, Timekeeper, TimekeeperRef};
