//! The scheduled consumer handle.

use crate::core::{contract, Core, Fulfiller};
use crate::error::{Error, ErrorKind};
use crate::executor::{DrivableExecutor, ExecutorRef, Priority, TimedDrivableExecutor};
use crate::future::{make_semi_future_try, SemiFuture};
use crate::sync::Baton;
use crate::timekeeper::TimekeeperRef;
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// The read side of a promise/future pair, bound to an executor.
///
/// Every continuation installed through this handle is dispatched on the
/// bound executor. Continuation methods consume `self` and return a new
/// handle on the same executor, so chains read top to bottom:
///
/// ```
/// use fulcrum::make_future;
///
/// let n = make_future(3)
///     .then_value(|x| x + 1)
///     .then_value(|x| x * 2)
///     .get()
///     .unwrap();
/// assert_eq!(n, 8);
/// ```
pub struct Future<T: Send + 'static> {
    core: Option<Arc<Core<T>>>,
    executor: ExecutorRef,
    priority: Priority,
}

impl<T: Send + 'static> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("core", &self.core)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_parts(core: Arc<Core<T>>, executor: ExecutorRef, priority: Priority) -> Self {
        Self {
            core: Some(core),
            executor,
            priority,
        }
    }

    fn take_core_or_invalid(&mut self) -> Arc<Core<T>> {
        self.core
            .take()
            .unwrap_or_else(|| Core::with_result(Err(Error::new(ErrorKind::Invalid))))
    }

    /// Returns the executor continuations run on.
    #[must_use]
    pub fn executor(&self) -> &ExecutorRef {
        &self.executor
    }

    /// Returns true if a result is waiting to be taken.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.core.as_ref().is_some_and(|c| c.is_ready())
    }

    /// Rebinds the handle to a different executor.
    #[must_use]
    pub fn via(mut self, executor: ExecutorRef) -> Future<T> {
        let core = self.take_core_or_invalid();
        core.set_executor(Arc::clone(&executor), self.priority);
        Future::from_parts(core, executor, self.priority)
    }

    /// Demotes to an unscheduled handle.
    ///
    /// The executor stays bound to the core, so the handle can be
    /// promoted back with [`SemiFuture::into_future`].
    #[must_use]
    pub fn semi(mut self) -> SemiFuture<T> {
        let core = self.take_core_or_invalid();
        core.set_executor(Arc::clone(&self.executor), self.priority);
        SemiFuture::from_core(core)
    }

    /// Installs a continuation over the full result.
    #[must_use]
    pub fn then<U, F>(mut self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let core = self.take_core_or_invalid();
        let executor = Arc::clone(&self.executor);
        let priority = self.priority;
        let (tx, next) = contract::<U>();
        next.adopt_interrupt_handler(core.interrupt_handler());
        core.set_executor(Arc::clone(&executor), priority);
        core.set_callback(Box::new(move |r| tx.fulfill(f(r))));
        Future::from_parts(next, executor, priority)
    }

    /// Installs a continuation over the value; errors pass through.
    #[must_use]
    pub fn then_value<U, F>(self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |r| r.map(f))
    }

    /// Installs a continuation that itself returns a handle; the inner
    /// result is chained to the returned handle without blocking.
    ///
    /// An unscheduled inner handle is adapted to this handle's executor.
    #[must_use]
    pub fn then_future<U, F>(mut self, f: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> SemiFuture<U> + Send + 'static,
    {
        let core = self.take_core_or_invalid();
        let executor = Arc::clone(&self.executor);
        let priority = self.priority;
        let (tx, next) = contract::<U>();
        next.adopt_interrupt_handler(core.interrupt_handler());
        core.set_executor(Arc::clone(&executor), priority);
        let chain_executor = Arc::clone(&executor);
        core.set_callback(Box::new(move |r| {
            let inner = f(r).bind_to(&chain_executor);
            inner.set_callback(Box::new(move |r2| tx.fulfill(r2)));
        }));
        Future::from_parts(next, executor, priority)
    }

    /// Recovers from an error; values pass through untouched.
    ///
    /// Return `Err` from `f` to decline recovery and forward an error.
    #[must_use]
    pub fn on_error<F>(self, f: F) -> Future<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.then(move |r| match r {
            Ok(v) => Ok(v),
            Err(e) => f(e),
        })
    }

    /// Recovers from an error with a handle-returning continuation; the
    /// executor carries through to the returned handle.
    #[must_use]
    pub fn then_error<F>(self, f: F) -> Future<T>
    where
        F: FnOnce(Error) -> SemiFuture<T> + Send + 'static,
    {
        self.then_future(move |r| match r {
            Ok(v) => make_semi_future_try(Ok(v)),
            Err(e) => f(e),
        })
    }

    /// Runs `f` for its side effect and forwards the result unchanged.
    #[must_use]
    pub fn ensure<F>(self, f: F) -> Future<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then(move |r| {
            f();
            r
        })
    }

    /// Keeps the value only if `pred` holds; otherwise the handle
    /// completes with `PredicateDoesNotObtain`.
    #[must_use]
    pub fn filter<F>(self, pred: F) -> Future<T>
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        self.then(move |r| match r {
            Ok(v) if pred(&v) => Ok(v),
            Ok(_) => Err(Error::new(ErrorKind::PredicateDoesNotObtain)),
            Err(e) => Err(e),
        })
    }

    /// Completes with the upstream result if it arrives within `dur`,
    /// and with `Timeout` otherwise. Uses the global timekeeper.
    #[must_use]
    pub fn within(self, dur: Duration) -> Future<T> {
        self.within_err(dur, Error::new(ErrorKind::Timeout))
    }

    /// Like [`within`], completing with `err` on expiry.
    ///
    /// [`within`]: Future::within
    #[must_use]
    pub fn within_err(self, dur: Duration, err: Error) -> Future<T> {
        match crate::timekeeper::global() {
            Some(tk) => self.within_with(dur, err, &tk),
            None => {
                let executor = Arc::clone(&self.executor);
                let priority = self.priority;
                Future::from_parts(
                    Core::with_result(Err(Error::new(ErrorKind::NoTimekeeper))),
                    executor,
                    priority,
                )
            }
        }
    }

    /// Like [`within`], using `tk` to time the deadline.
    ///
    /// Whichever of the upstream result and the timer completes first
    /// wins an atomic token and writes downstream; the loser is told to
    /// stand down through the interrupt path.
    ///
    /// [`within`]: Future::within
    #[must_use]
    pub fn within_with(mut self, dur: Duration, err: Error, tk: &TimekeeperRef) -> Future<T> {
        let core = self.take_core_or_invalid();
        let executor = Arc::clone(&self.executor);
        let priority = self.priority;
        let (tx, next) = contract::<T>();
        let ctx = Arc::new(WithinContext {
            token: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            upstream: Arc::downgrade(&core),
        });

        let upstream_ctx = Arc::clone(&ctx);
        core.set_executor(Arc::clone(&executor), priority);
        core.set_callback(Box::new(move |r| {
            if !upstream_ctx
                .token
                .swap(true, std::sync::atomic::Ordering::AcqRel)
            {
                if let Some(tx) = upstream_ctx.tx.lock().take() {
                    tx.fulfill(r);
                }
            }
        }));

        // The timer holds the context weakly so it can be freed as soon
        // as the upstream path resolves first.
        let timer_ctx = Arc::downgrade(&ctx);
        let timer = tk.after(dur).prepare_for_attach();
        timer.set_callback(Box::new(move |fired: Result<()>| {
            let Some(ctx) = timer_ctx.upgrade() else { return };
            if fired.is_ok()
                && !ctx.token.swap(true, std::sync::atomic::Ordering::AcqRel)
            {
                if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(Err(err));
                }
                if let Some(upstream) = ctx.upstream.upgrade() {
                    upstream.raise(Error::new(ErrorKind::Timeout));
                }
            }
        }));

        // A late raise on the downstream handle still reaches the
        // original producer.
        let raise_ctx = Arc::downgrade(&ctx);
        next.set_interrupt_handler(Arc::new(move |e| {
            if let Some(ctx) = raise_ctx.upgrade() {
                if let Some(upstream) = ctx.upstream.upgrade() {
                    upstream.raise(e);
                }
            }
        }));

        Future::from_parts(next, executor, priority)
    }

    /// Completes with the upstream result, but no earlier than `dur`
    /// from now. Uses the global timekeeper.
    #[must_use]
    pub fn delayed(self, dur: Duration) -> Future<T> {
        match crate::timekeeper::global() {
            Some(tk) => self.delayed_with(dur, &tk),
            None => {
                let executor = Arc::clone(&self.executor);
                let priority = self.priority;
                Future::from_parts(
                    Core::with_result(Err(Error::new(ErrorKind::NoTimekeeper))),
                    executor,
                    priority,
                )
            }
        }
    }

    /// Completes with the upstream result, but no earlier than `dur`
    /// from now, using `tk`.
    #[must_use]
    pub fn delayed_with(mut self, dur: Duration, tk: &TimekeeperRef) -> Future<T> {
        let executor = Arc::clone(&self.executor);
        let priority = self.priority;
        let core = self.take_core_or_invalid();
        core.set_executor(Arc::clone(&executor), priority);
        SemiFuture::from_core(core)
            .delayed_with(dur, tk)
            .via_with_priority(executor, priority)
    }

    /// Signals an interrupt toward the producer.
    pub fn raise(&self, err: Error) {
        if let Some(core) = &self.core {
            core.raise(err);
        }
    }

    /// Blocks until the core is fulfilled.
    pub fn wait(&mut self) {
        let Some(core) = self.core.take() else { return };
        if core.is_ready() {
            self.core = Some(core);
            return;
        }
        let (tx, next) = contract::<T>();
        let baton = Arc::new(Baton::new());
        let b2 = Arc::clone(&baton);
        core.set_callback(Box::new(move |r| {
            tx.fulfill(r);
            b2.post();
        }));
        self.core = Some(next);
        baton.wait();
    }

    /// Blocks until the core is fulfilled or `dur` elapses.
    ///
    /// Returns true if the result is available.
    pub fn wait_for(&mut self, dur: Duration) -> bool {
        let Some(core) = self.core.take() else {
            return true;
        };
        if core.is_ready() {
            self.core = Some(core);
            return true;
        }
        let (tx, next) = contract::<T>();
        let baton = Arc::new(Baton::new());
        let b2 = Arc::clone(&baton);
        core.set_callback(Box::new(move |r| {
            tx.fulfill(r);
            b2.post();
        }));
        self.core = Some(next);
        baton.try_wait_for(dur)
    }

    /// Drives `drivable` on the calling thread until the core is
    /// fulfilled.
    pub fn wait_via<E>(&mut self, drivable: &E)
    where
        E: DrivableExecutor + ?Sized,
    {
        let Some(core) = self.core.take() else { return };
        if core.is_ready() {
            self.core = Some(core);
            return;
        }
        let (tx, next) = contract::<T>();
        core.set_callback(Box::new(move |r| tx.fulfill(r)));
        while !next.is_ready() {
            drivable.drive();
            std::thread::yield_now();
        }
        self.core = Some(next);
    }

    /// Drives `drivable` until the core is fulfilled or `dur` elapses.
    ///
    /// Returns true if the result is available.
    pub fn wait_via_for<E>(&mut self, drivable: &E, dur: Duration) -> bool
    where
        E: TimedDrivableExecutor + ?Sized,
    {
        let deadline = Instant::now() + dur;
        let Some(core) = self.core.take() else {
            return true;
        };
        if core.is_ready() {
            self.core = Some(core);
            return true;
        }
        let (tx, next) = contract::<T>();
        core.set_callback(Box::new(move |r| tx.fulfill(r)));
        let ready = loop {
            if next.is_ready() {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            drivable.try_drive_until(deadline);
        };
        self.core = Some(next);
        ready
    }

    /// Blocks until fulfilled and returns the result.
    #[must_use = "the result of the computation is returned, not stored"]
    pub fn get(mut self) -> Result<T> {
        self.wait();
        self.take_ready()
    }

    /// Blocks up to `dur` and returns the result, or `Timeout`.
    pub fn get_for(mut self, dur: Duration) -> Result<T> {
        if self.wait_for(dur) {
            self.take_ready()
        } else {
            Err(Error::new(ErrorKind::Timeout))
        }
    }

    /// Drives `drivable` until fulfilled and returns the result.
    pub fn get_via<E>(mut self, drivable: &E) -> Result<T>
    where
        E: DrivableExecutor + ?Sized,
    {
        self.wait_via(drivable);
        self.take_ready()
    }

    /// Drives `drivable` up to `dur` and returns the result, or
    /// `Timeout`.
    pub fn get_via_for<E>(mut self, drivable: &E, dur: Duration) -> Result<T>
    where
        E: TimedDrivableExecutor + ?Sized,
    {
        if self.wait_via_for(drivable, dur) {
            self.take_ready()
        } else {
            Err(Error::new(ErrorKind::Timeout))
        }
    }

    fn take_ready(&mut self) -> Result<T> {
        match self.core.take() {
            Some(core) => core
                .try_take_result()
                .unwrap_or_else(|| Err(Error::new(ErrorKind::Invalid))),
            None => Err(Error::new(ErrorKind::Invalid)),
        }
    }
}

impl<T: Send + 'static> Future<Future<T>> {
    /// Collapses one layer of nesting.
    #[must_use]
    pub fn unwrap(self) -> Future<T> {
        self.then_future(|r| match r {
            Ok(inner) => inner.semi(),
            Err(e) => make_semi_future_try(Err(e)),
        })
    }
}

impl<T: Send + 'static> Future<SemiFuture<T>> {
    /// Collapses one layer of nesting, adapting the inner unscheduled
    /// handle to this handle's executor.
    #[must_use]
    pub fn unwrap(self) -> Future<T> {
        self.then_future(|r| match r {
            Ok(inner) => inner,
            Err(e) => make_semi_future_try(Err(e)),
        })
    }
}

struct WithinContext<T: Send + 'static> {
    token: AtomicBool,
    tx: Mutex<Option<Fulfiller<T>>>,
    upstream: Weak<Core<T>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InlineExecutor, ManualExecutor};
    use crate::future::{make_future, make_future_err, make_semi_future};
    use crate::Promise;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn then_chain_applies_in_order() {
        let n = make_future(3)
            .then_value(|x| x + 1)
            .then_value(|x| x * 2)
            .get()
            .expect("value missing");
        assert_eq!(n, 8);
    }

    #[test]
    fn error_short_circuits_later_stages() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r2 = Arc::clone(&ran);
        let result = make_future(3)
            .then(|_: Result<i32>| -> Result<i32> { Err(Error::user("e")) })
            .then_value(move |x| {
                r2.fetch_add(1, Ordering::SeqCst);
                x + 1
            })
            .get();
        let err = result.expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.context(), Some("e"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn on_error_recovers() {
        let n = make_future(3)
            .then(|_: Result<i32>| -> Result<i32> { Err(Error::user("e")) })
            .on_error(|_| Ok(42))
            .get()
            .expect("recovery failed");
        assert_eq!(n, 42);
    }

    #[test]
    fn on_error_passes_values_through() {
        let n = make_future(5).on_error(|_| Ok(0)).get().expect("value missing");
        assert_eq!(n, 5);
    }

    #[test]
    fn on_error_can_decline() {
        let err = make_future_err::<i32>(Error::new(ErrorKind::Timeout))
            .on_error(|e| {
                if e.is_timeout() {
                    Err(e)
                } else {
                    Ok(0)
                }
            })
            .get()
            .expect_err("expected error to pass through");
        assert!(err.is_timeout());
    }

    #[test]
    fn then_error_recovers_asynchronously() {
        let n = make_future_err::<i32>(Error::user("boom"))
            .then_error(|_| make_semi_future(7))
            .get()
            .expect("recovery failed");
        assert_eq!(n, 7);
    }

    #[test]
    fn then_future_chains_inner_handle() {
        let n = make_future(2)
            .then_future(|r| {
                let x = r.expect("value missing");
                make_semi_future(x * 10)
            })
            .get()
            .expect("value missing");
        assert_eq!(n, 20);
    }

    #[test]
    fn then_future_chains_unfulfilled_inner_handle() {
        let mut inner_promise = Promise::new();
        let inner = inner_promise.semi_future();
        let fut = make_future(1).then_future(move |_| inner);
        inner_promise.set_value(33);
        assert_eq!(fut.get().expect("value missing"), 33);
    }

    #[test]
    fn ensure_runs_on_value_and_error() {
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        let n = make_future(1)
            .ensure(move || {
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .get()
            .expect("value missing");
        assert_eq!(n, 1);
        let c2 = Arc::clone(&count);
        let err = make_future_err::<i32>(Error::user("x"))
            .ensure(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            })
            .get()
            .expect_err("expected error");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn filter_rejects_with_predicate_error() {
        let err = make_future(3)
            .filter(|x| *x > 10)
            .get()
            .expect_err("expected rejection");
        assert_eq!(err.kind(), ErrorKind::PredicateDoesNotObtain);
    }

    #[test]
    fn filter_keeps_matching_value() {
        let n = make_future(30).filter(|x| *x > 10).get().expect("value missing");
        assert_eq!(n, 30);
    }

    #[test]
    fn unwrap_collapses_nested_future() {
        let nested: Future<Future<i32>> =
            make_future(1).then_value(|x| make_future(x + 1));
        assert_eq!(nested.unwrap().get().expect("value missing"), 2);
    }

    #[test]
    fn unwrap_collapses_nested_semi_future() {
        let nested: Future<SemiFuture<i32>> =
            make_future(1).then_value(|x| make_semi_future(x + 9));
        assert_eq!(nested.unwrap().get().expect("value missing"), 10);
    }

    #[test]
    fn continuations_run_on_the_bound_executor() {
        let ex = Arc::new(ManualExecutor::new());
        let mut promise = Promise::new();
        let mut fut = promise
            .semi_future()
            .via(ex.clone())
            .then_value(|x: i32| x * 2);
        promise.set_value(4);
        // The continuation is queued, not run inline.
        assert!(!fut.is_ready());
        ex.drive();
        assert!(fut.wait_for(Duration::from_secs(1)));
        assert_eq!(fut.get().expect("value missing"), 8);
    }

    #[test]
    fn wait_via_pumps_the_drivable() {
        let ex = Arc::new(ManualExecutor::new());
        let mut promise = Promise::new();
        let fut = promise
            .semi_future()
            .via(ex.clone())
            .then_value(|x: i32| x + 1);
        promise.set_value(1);
        let n = fut.get_via(&*ex).expect("value missing");
        assert_eq!(n, 2);
    }

    #[test]
    fn get_via_for_times_out() {
        let ex = Arc::new(ManualExecutor::new());
        let mut promise = Promise::<i32>::new();
        let fut = promise.semi_future().via(ex.clone());
        let err = fut
            .get_via_for(&*ex, Duration::from_millis(20))
            .expect_err("expected timeout");
        assert!(err.is_timeout());
        promise.set_value(0);
    }

    #[test]
    fn raise_reaches_inherited_handler_through_then() {
        let seen = Arc::new(Mutex::new(None));
        let mut promise = Promise::<i32>::new();
        let s2 = Arc::clone(&seen);
        promise.set_interrupt_handler(move |e| {
            *s2.lock() = Some(e.kind());
        });
        let fut = promise
            .semi_future()
            .via(InlineExecutor::instance())
            .then_value(|x| x + 1);
        fut.raise(Error::new(ErrorKind::Timeout));
        assert_eq!(*seen.lock(), Some(ErrorKind::Timeout));
        promise.set_value(0);
    }
}
