//! The consumer handle types and their constructors.
//!
//! A [`SemiFuture`] is the read side of a promise/future pair with no
//! executor attached; a [`Future`] is the same handle bound to an
//! executor. The `make_*` constructors build already-fulfilled handles;
//! [`via`] runs a thunk on an executor and hands back the handle for its
//! return value.

pub mod scheduled;
pub mod semi;

pub use scheduled::Future;
pub use semi::SemiFuture;

use crate::core::Core;
use crate::error::Error;
use crate::executor::{ExecutorRef, InlineExecutor};
use crate::Result;

/// An unscheduled handle already fulfilled with `value`.
#[must_use]
pub fn make_semi_future<T: Send + 'static>(value: T) -> SemiFuture<T> {
    make_semi_future_try(Ok(value))
}

/// An unscheduled handle already fulfilled with `err`.
#[must_use]
pub fn make_semi_future_err<T: Send + 'static>(err: Error) -> SemiFuture<T> {
    make_semi_future_try(Err(err))
}

/// An unscheduled handle already fulfilled with `result`.
#[must_use]
pub fn make_semi_future_try<T: Send + 'static>(result: Result<T>) -> SemiFuture<T> {
    SemiFuture::from_core(Core::with_result(result))
}

/// Runs `f` immediately and packages its result into an unscheduled
/// handle.
#[must_use]
pub fn make_semi_future_with<T, F>(f: F) -> SemiFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T>,
{
    make_semi_future_try(f())
}

/// A handle on the inline executor, already fulfilled with `value`.
#[must_use]
pub fn make_future<T: Send + 'static>(value: T) -> Future<T> {
    make_future_try(Ok(value))
}

/// A handle on the inline executor, already fulfilled with `err`.
#[must_use]
pub fn make_future_err<T: Send + 'static>(err: Error) -> Future<T> {
    make_future_try(Err(err))
}

/// A handle on the inline executor, already fulfilled with `result`.
#[must_use]
pub fn make_future_try<T: Send + 'static>(result: Result<T>) -> Future<T> {
    make_semi_future_try(result).via(InlineExecutor::instance())
}

/// Runs `f` immediately and packages its result into a handle on the
/// inline executor.
#[must_use]
pub fn make_future_with<T, F>(f: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T>,
{
    make_future_try(f())
}

/// Runs `thunk` on `executor` and returns the handle for its result.
#[must_use]
pub fn via<T, F>(executor: ExecutorRef, thunk: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    make_semi_future(())
        .via(executor)
        .then(move |_| Ok(thunk()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::executor::ManualExecutor;
    use std::sync::Arc;

    #[test]
    fn make_future_round_trips_value() {
        assert_eq!(make_future(7).get().expect("value missing"), 7);
    }

    #[test]
    fn make_future_err_round_trips_error() {
        let err = make_future_err::<i32>(Error::user("bad"))
            .get()
            .expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.context(), Some("bad"));
    }

    #[test]
    fn make_future_with_packages_thunk_outcome() {
        let n = make_future_with(|| Ok(6)).get().expect("value missing");
        assert_eq!(n, 6);
        let err = make_future_with::<i32, _>(|| Err(Error::user("no")))
            .get()
            .expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[test]
    fn via_runs_thunk_on_executor() {
        let ex = Arc::new(ManualExecutor::new());
        let fut = via(ex.clone(), || 40 + 2);
        assert!(!fut.is_ready());
        let n = fut.get_via(&*ex).expect("value missing");
        assert_eq!(n, 42);
    }
}
