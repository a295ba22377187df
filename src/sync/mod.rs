//! Synchronous signaling primitives.

pub mod baton;

pub use baton::Baton;
