//! The producer handle: the write side of a shared core.

use crate::core::{Core, InterruptHandler};
use crate::error::{Error, ErrorKind};
use crate::future::SemiFuture;
use crate::Result;
use std::sync::Arc;

/// The write side of a promise/future pair.
///
/// A promise fulfills its core exactly once, via [`set_value`],
/// [`set_error`] or [`set_result`] — each consumes the promise. Dropping
/// a promise that never fulfilled latches a broken-promise error so the
/// consumer is never left hanging.
///
/// [`set_value`]: Promise::set_value
/// [`set_error`]: Promise::set_error
/// [`set_result`]: Promise::set_result
///
/// # Example
///
/// ```
/// use fulcrum::Promise;
///
/// let mut promise = Promise::new();
/// let future = promise.semi_future();
/// promise.set_value(7);
/// assert_eq!(future.get().unwrap(), 7);
/// ```
#[derive(Debug)]
pub struct Promise<T: Send + 'static> {
    core: Arc<Core<T>>,
    retrieved: bool,
    fulfilled: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an unfulfilled promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Core::new(),
            retrieved: false,
            fulfilled: false,
        }
    }

    /// Returns the read side as an unscheduled handle.
    ///
    /// # Panics
    ///
    /// Panics if the read side was already retrieved.
    pub fn semi_future(&mut self) -> SemiFuture<T> {
        assert!(
            !self.retrieved,
            "the consumer handle was already retrieved from this promise"
        );
        self.retrieved = true;
        SemiFuture::from_core(Arc::clone(&self.core))
    }

    /// Returns the read side as a handle scheduled on the inline
    /// executor.
    ///
    /// # Panics
    ///
    /// Panics if the read side was already retrieved.
    pub fn future(&mut self) -> crate::future::Future<T> {
        self.semi_future()
            .via(crate::executor::InlineExecutor::instance())
    }

    /// Fulfills with a value.
    pub fn set_value(self, value: T) {
        self.set_result(Ok(value));
    }

    /// Fulfills with an error.
    pub fn set_error(self, err: Error) {
        self.set_result(Err(err));
    }

    /// Fulfills with a result.
    pub fn set_result(mut self, result: Result<T>) {
        tracing::trace!(ok = result.is_ok(), "promise fulfilled");
        self.fulfilled = true;
        self.core.set_result(result);
    }

    /// Installs the handler invoked when the consumer raises an
    /// interrupt. A pending interrupt is delivered immediately.
    pub fn set_interrupt_handler(&self, handler: impl Fn(Error) + Send + Sync + 'static) {
        let handler: InterruptHandler = Arc::new(handler);
        self.core.set_interrupt_handler(handler);
    }

    /// Returns true if this promise has been fulfilled.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled || self.core.has_result()
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            tracing::trace!("promise dropped unfulfilled");
            self.core
                .set_result(Err(Error::new(ErrorKind::BrokenPromise)));
        }
    }
}
