//! Behavior after the global timekeeper is shut down.
//!
//! Lives in its own binary: shutting the process-wide timekeeper down
//! would race any sibling test that relies on it.

mod common;

use fulcrum::timekeeper::{self, shutdown_global};
use fulcrum::{make_future, ErrorKind, Promise};
use std::time::Duration;

#[test]
fn time_operations_fail_without_a_timekeeper() {
    common::init_test_logging();
    shutdown_global();

    let err = timekeeper::sleep(Duration::from_millis(1))
        .get()
        .expect_err("expected NoTimekeeper");
    assert_eq!(err.kind(), ErrorKind::NoTimekeeper);

    let err = make_future(1)
        .within(Duration::from_millis(1))
        .get()
        .expect_err("expected NoTimekeeper");
    assert_eq!(err.kind(), ErrorKind::NoTimekeeper);

    let err = make_future(1)
        .delayed(Duration::from_millis(1))
        .get()
        .expect_err("expected NoTimekeeper");
    assert_eq!(err.kind(), ErrorKind::NoTimekeeper);

    let mut promise = Promise::<i32>::new();
    let err = promise
        .semi_future()
        .delayed(Duration::from_millis(1))
        .get()
        .expect_err("expected NoTimekeeper");
    assert_eq!(err.kind(), ErrorKind::NoTimekeeper);
    promise.set_value(0);
}
