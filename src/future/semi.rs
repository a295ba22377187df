//! The unscheduled consumer handle.

use crate::core::{contract, Core, Fulfiller};
use crate::error::{Error, ErrorKind};
use crate::executor::{DeferredExecutor, ExecutorRef, InlineExecutor, Priority, MID_PRI};
use crate::future::Future;
use crate::sync::Baton;
use crate::timekeeper::TimekeeperRef;
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The read side of a promise/future pair, with no executor attached.
///
/// An unscheduled handle cannot run continuations — attach an executor
/// with [`via`] to get a [`Future`], or stage work locally with
/// [`defer`]: deferred work is parked in a [`DeferredExecutor`] and runs
/// once a real executor arrives (or inline, under a synchronous
/// [`wait`]).
///
/// Handles are single-owner: every combinator consumes `self`, and a
/// moved-from handle cannot be touched again.
///
/// [`via`]: SemiFuture::via
/// [`defer`]: SemiFuture::defer
/// [`wait`]: SemiFuture::wait
#[derive(Debug)]
pub struct SemiFuture<T: Send + 'static> {
    core: Option<Arc<Core<T>>>,
    deferred: Option<Arc<DeferredExecutor>>,
}

impl<T: Send + 'static> SemiFuture<T> {
    pub(crate) fn from_core(core: Arc<Core<T>>) -> Self {
        Self {
            core: Some(core),
            deferred: None,
        }
    }

    pub(crate) fn from_parts(core: Arc<Core<T>>, deferred: Option<Arc<DeferredExecutor>>) -> Self {
        Self {
            core: Some(core),
            deferred,
        }
    }

    /// Consumes the handle for direct callback attachment, first wiring
    /// any staged deferral to the inline executor so a pending chain
    /// completes on the producer's thread.
    pub(crate) fn prepare_for_attach(mut self) -> Arc<Core<T>> {
        if let Some(deferred) = self.deferred.take() {
            deferred.set_executor(InlineExecutor::instance(), MID_PRI);
        }
        self.take_core_or_invalid()
    }

    /// Consumes the handle for callback attachment, routing its
    /// continuation through `executor`.
    pub(crate) fn bind_to(mut self, executor: &ExecutorRef) -> Arc<Core<T>> {
        match self.deferred.take() {
            Some(deferred) => {
                deferred.set_executor(Arc::clone(executor), MID_PRI);
                self.take_core_or_invalid()
            }
            None => {
                let core = self.take_core_or_invalid();
                core.set_executor(Arc::clone(executor), MID_PRI);
                core
            }
        }
    }

    fn take_core_or_invalid(&mut self) -> Arc<Core<T>> {
        self.core
            .take()
            .unwrap_or_else(|| Core::with_result(Err(Error::new(ErrorKind::Invalid))))
    }

    /// Returns true if a result is waiting to be taken.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.core.as_ref().is_some_and(|c| c.is_ready())
    }

    /// Attaches an executor, producing a scheduled handle.
    ///
    /// Work staged by earlier [`defer`] calls is handed to `executor`.
    ///
    /// [`defer`]: SemiFuture::defer
    #[must_use]
    pub fn via(self, executor: ExecutorRef) -> Future<T> {
        self.via_with_priority(executor, MID_PRI)
    }

    /// Attaches an executor with a priority hint.
    #[must_use]
    pub fn via_with_priority(mut self, executor: ExecutorRef, priority: Priority) -> Future<T> {
        let core = match self.deferred.take() {
            Some(deferred) => {
                let core = self.take_core_or_invalid();
                deferred.set_executor(Arc::clone(&executor), priority);
                core
            }
            None => {
                let core = self.take_core_or_invalid();
                core.set_executor(Arc::clone(&executor), priority);
                core
            }
        };
        Future::from_parts(core, executor, priority)
    }

    /// Converts into a scheduled handle without supplying an executor.
    ///
    /// Succeeds only when an executor is already bound to the underlying
    /// core (for example a handle demoted from a [`Future`] with
    /// [`Future::semi`]).
    ///
    /// # Errors
    ///
    /// `NoExecutor` if no executor is bound; `Invalid` if the handle was
    /// already consumed. The handle is consumed either way.
    pub fn into_future(mut self) -> Result<Future<T>> {
        if let Some(deferred) = self.deferred.take() {
            deferred.detach();
        }
        let core = self.core.take().ok_or_else(|| Error::new(ErrorKind::Invalid))?;
        match core.executor() {
            Some((executor, priority)) => Ok(Future::from_parts(core, executor, priority)),
            None => Err(Error::new(ErrorKind::NoExecutor)),
        }
    }

    /// Stages a continuation locally; it runs on whatever executor is
    /// eventually attached with [`via`], or inline under [`wait`].
    ///
    /// [`via`]: SemiFuture::via
    /// [`wait`]: SemiFuture::wait
    #[must_use]
    pub fn defer<U, F>(mut self, f: F) -> SemiFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let deferred = self.deferred.take().unwrap_or_else(DeferredExecutor::new);
        let core = self.take_core_or_invalid();
        let (tx, next) = contract::<U>();
        next.adopt_interrupt_handler(core.interrupt_handler());
        let as_executor: ExecutorRef = Arc::clone(&deferred) as ExecutorRef;
        core.set_executor(as_executor, MID_PRI);
        core.set_callback(Box::new(move |r| tx.fulfill(f(r))));
        SemiFuture::from_parts(next, Some(deferred))
    }

    /// [`defer`] sugar that unpacks the value; errors pass through.
    ///
    /// [`defer`]: SemiFuture::defer
    #[must_use]
    pub fn defer_value<U, F>(self, f: F) -> SemiFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.defer(move |r| r.map(f))
    }

    /// [`defer`] sugar that unpacks the error; values pass through.
    ///
    /// [`defer`]: SemiFuture::defer
    #[must_use]
    pub fn defer_error<F>(self, f: F) -> SemiFuture<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.defer(move |r| match r {
            Ok(v) => Ok(v),
            Err(e) => f(e),
        })
    }

    /// Blocks until the core is fulfilled.
    ///
    /// Staged deferred work runs inline on this thread once the upstream
    /// result arrives. After `wait` the handle is still unscheduled, but
    /// its core holds the final result.
    pub fn wait(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            deferred.wait();
            deferred.run_pending_inline();
            return;
        }
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
    /// Returns true if the result is available. On timeout the handle
    /// stays valid and can be waited again.
    pub fn wait_for(&mut self, dur: Duration) -> bool {
        if let Some(deferred) = self.deferred.take() {
            if deferred.try_wait_for(dur) {
                deferred.run_pending_inline();
                return true;
            }
            self.deferred = Some(deferred);
            return false;
        }
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

    fn take_ready(&mut self) -> Result<T> {
        match self.core.take() {
            Some(core) => core
                .try_take_result()
                .unwrap_or_else(|| Err(Error::new(ErrorKind::Invalid))),
            None => Err(Error::new(ErrorKind::Invalid)),
        }
    }

    /// Completes with this handle's result, but no earlier than `dur`
    /// from now, using the global timekeeper.
    #[must_use]
    pub fn delayed(self, dur: Duration) -> SemiFuture<T> {
        match crate::timekeeper::global() {
            Some(tk) => self.delayed_with(dur, &tk),
            None => SemiFuture::from_core(Core::with_result(Err(Error::new(
                ErrorKind::NoTimekeeper,
            )))),
        }
    }

    /// Completes with this handle's result, but no earlier than `dur`
    /// from now, using `tk`.
    #[must_use]
    pub fn delayed_with(self, dur: Duration, tk: &TimekeeperRef) -> SemiFuture<T> {
        let core = self.prepare_for_attach();
        let (tx, out) = contract::<T>();
        let ctx = Arc::new(DelayContext {
            remaining: AtomicUsize::new(2),
            slot: Mutex::new(None),
            tx: Mutex::new(Some(tx)),
        });
        let upstream_ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| {
            *upstream_ctx.slot.lock() = Some(r);
            delay_step(&upstream_ctx);
        }));
        let timer = tk.after(dur).prepare_for_attach();
        let timer_ctx = Arc::clone(&ctx);
        timer.set_callback(Box::new(move |_| delay_step(&timer_ctx)));
        SemiFuture::from_core(out)
    }

    /// Signals an interrupt toward the producer.
    pub fn raise(&self, err: Error) {
        if let Some(core) = &self.core {
            core.raise(err);
        }
    }
}

struct DelayContext<T: Send + 'static> {
    remaining: AtomicUsize,
    slot: Mutex<Option<Result<T>>>,
    tx: Mutex<Option<Fulfiller<T>>>,
}

fn delay_step<T: Send + 'static>(ctx: &Arc<DelayContext<T>>) {
    if ctx.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        let result = ctx
            .slot
            .lock()
            .take()
            .expect("delayed handle completed without a result");
        if let Some(tx) = ctx.tx.lock().take() {
            tx.fulfill(result);
        }
    }
}

impl<T: Send + 'static> Drop for SemiFuture<T> {
    fn drop(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            deferred.detach();
        }
    }
}

impl<T: Send + 'static> From<Future<T>> for SemiFuture<T> {
    fn from(f: Future<T>) -> Self {
        f.semi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DrivableExecutor, ManualExecutor};
    use crate::future::{make_semi_future, make_semi_future_err};
    use crate::Promise;

    #[test]
    fn ready_value_gets_immediately() {
        let sf = make_semi_future(5);
        assert!(sf.is_ready());
        assert_eq!(sf.get().expect("value missing"), 5);
    }

    #[test]
    fn deferred_work_runs_on_attached_executor() {
        let ran_on_executor = Arc::new(AtomicUsize::new(0));
        let mut promise = Promise::new();
        let r2 = Arc::clone(&ran_on_executor);
        let sf = promise
            .semi_future()
            .defer_value(move |x: i32| {
                r2.fetch_add(1, Ordering::SeqCst);
                x * 2
            });
        promise.set_value(21);
        // Nothing runs until an executor arrives.
        assert_eq!(ran_on_executor.load(Ordering::SeqCst), 0);
        let ex = Arc::new(ManualExecutor::new());
        let mut fut = sf.via(ex.clone());
        assert_eq!(ran_on_executor.load(Ordering::SeqCst), 0);
        ex.drive();
        assert_eq!(ran_on_executor.load(Ordering::SeqCst), 1);
        fut.wait();
        assert_eq!(fut.get().expect("value missing"), 42);
    }

    #[test]
    fn wait_drives_deferred_work_inline() {
        let mut promise = Promise::new();
        let mut sf = promise.semi_future().defer_value(|x: i32| x + 1);
        promise.set_value(1);
        sf.wait();
        assert_eq!(sf.get().expect("value missing"), 2);
    }

    #[test]
    fn deferred_chain_runs_in_order() {
        let mut promise = Promise::new();
        let sf = promise
            .semi_future()
            .defer_value(|x: i32| x + 1)
            .defer_value(|x| x * 10);
        promise.set_value(3);
        assert_eq!(sf.get().expect("value missing"), 40);
    }

    #[test]
    fn defer_error_recovers() {
        let sf = make_semi_future_err::<i32>(Error::user("boom")).defer_error(|_| Ok(7));
        assert_eq!(sf.get().expect("value missing"), 7);
    }

    #[test]
    fn get_for_times_out_without_producer_activity() {
        let mut promise = Promise::<i32>::new();
        let sf = promise.semi_future();
        let err = sf.get_for(Duration::from_millis(20)).expect_err("expected timeout");
        assert!(err.is_timeout());
        promise.set_value(0);
    }

    #[test]
    fn wait_for_can_be_retried_after_timeout() {
        let mut promise = Promise::new();
        let mut sf = promise.semi_future();
        assert!(!sf.wait_for(Duration::from_millis(10)));
        promise.set_value(11);
        assert!(sf.wait_for(Duration::from_millis(1000)));
        assert_eq!(sf.get().expect("value missing"), 11);
    }

    #[test]
    fn wait_from_another_thread() {
        let mut promise = Promise::new();
        let sf = promise.semi_future();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            promise.set_value(99);
        });
        assert_eq!(sf.get().expect("value missing"), 99);
        t.join().expect("producer panicked");
    }

    #[test]
    fn into_future_without_executor_fails() {
        let sf = make_semi_future(1);
        let err = sf.into_future().expect_err("expected NoExecutor");
        assert_eq!(err.kind(), ErrorKind::NoExecutor);
    }

    #[test]
    fn into_future_after_demotion_succeeds() {
        let fut = make_semi_future(1).via(InlineExecutor::instance());
        let sf = fut.semi();
        let fut = sf.into_future().expect("executor should be bound");
        assert_eq!(fut.get().expect("value missing"), 1);
    }

    #[test]
    fn dropping_deferred_handle_discards_work() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut promise = Promise::new();
        let r2 = Arc::clone(&ran);
        let sf = promise.semi_future().defer_value(move |x: i32| {
            r2.fetch_add(1, Ordering::SeqCst);
            x
        });
        drop(sf);
        promise.set_value(1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
