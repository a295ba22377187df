//! Error types and error handling strategy for fulcrum.
//!
//! This module defines the error surface of the library. Error handling
//! follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Library-originated failures carry a distinct [`ErrorKind`]
//! - User failures travel as [`ErrorKind::User`] with the original error
//!   preserved in the source chain

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation on a moved-from or never-populated handle.
    Invalid,
    /// A scheduled operation was requested with no executor available.
    NoExecutor,
    /// A timed operation was requested with no timekeeper available.
    NoTimekeeper,
    /// A timed wait or `within` deadline elapsed.
    Timeout,
    /// `filter` rejected the value.
    PredicateDoesNotObtain,
    /// `collect_n` was given fewer inputs (or fewer successes) than requested.
    NotEnoughFutures,
    /// The producer handle was destroyed without fulfilling.
    BrokenPromise,
    /// A user-provided error.
    User,
}

impl ErrorKind {
    /// Returns a short static description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::NoExecutor => "NoExecutor",
            Self::NoTimekeeper => "NoTimekeeper",
            Self::Timeout => "Timeout",
            Self::PredicateDoesNotObtain => "PredicateDoesNotObtain",
            Self::NotEnoughFutures => "NotEnoughFutures",
            Self::BrokenPromise => "BrokenPromise",
            Self::User => "User",
        }
    }
}

/// The error type carried by fulfilled-with-error handles.
///
/// An `Error` is an opaque container: an [`ErrorKind`], optional context
/// text, and an optional source chain holding the original error object.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates a user error from a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(msg)
    }

    /// Creates a user error wrapping an arbitrary error object.
    #[must_use]
    pub fn wrap(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context text, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns true if this error is a timeout condition.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if this error is a broken promise.
    #[must_use]
    pub const fn is_broken_promise(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenPromise)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized Result type for fulcrum operations.
///
/// This is the tagged value a fulfilled handle carries: `Ok(T)` for a
/// value, `Err(Error)` for an error.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        let err = Error::new(ErrorKind::BrokenPromise);
        assert_eq!(err.to_string(), "BrokenPromise");
    }

    #[test]
    fn display_with_context() {
        let err = Error::new(ErrorKind::Timeout).with_context("wait expired");
        assert_eq!(err.to_string(), "Timeout: wait expired");
    }

    #[test]
    fn user_error_carries_message() {
        let err = Error::user("boom");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.context(), Some("boom"));
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::wrap(Underlying).with_context("outer");
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn predicates_match_kind() {
        assert!(Error::new(ErrorKind::Timeout).is_timeout());
        assert!(!Error::new(ErrorKind::Timeout).is_broken_promise());
        assert!(Error::new(ErrorKind::BrokenPromise).is_broken_promise());
    }
}
