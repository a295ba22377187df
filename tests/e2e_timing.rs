//! End-to-end timing behavior: within, delayed, sleep.

mod common;

use fulcrum::timekeeper::{self, ThreadTimekeeper, TimekeeperRef};
use fulcrum::{make_future, ErrorKind, InlineExecutor, Promise};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn within_times_out_an_unfulfilled_producer() {
    common::init_test_logging();
    let mut promise = Promise::<i32>::new();
    let started = Instant::now();
    let err = promise
        .semi_future()
        .via(InlineExecutor::instance())
        .within(Duration::from_millis(10))
        .get()
        .expect_err("expected timeout");
    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(10));
    promise.set_value(0);
}

#[test]
fn within_passes_a_fast_result_through() {
    common::init_test_logging();
    let n = make_future(5)
        .within(Duration::from_secs(30))
        .get()
        .expect("value missing");
    assert_eq!(n, 5);
}

#[test]
fn within_signals_the_producer_when_the_timer_wins() {
    common::init_test_logging();
    let mut promise = Promise::<i32>::new();
    let raised = Arc::new(AtomicUsize::new(0));
    let r2 = Arc::clone(&raised);
    promise.set_interrupt_handler(move |e| {
        assert_eq!(e.kind(), ErrorKind::Timeout);
        r2.fetch_add(1, Ordering::SeqCst);
    });
    let err = promise
        .semi_future()
        .via(InlineExecutor::instance())
        .within(Duration::from_millis(10))
        .get()
        .expect_err("expected timeout");
    assert!(err.is_timeout());
    assert_eq!(raised.load(Ordering::SeqCst), 1);
    promise.set_value(0);
}

#[test]
fn within_with_custom_error_reports_it() {
    common::init_test_logging();
    let mut promise = Promise::<i32>::new();
    let tk: TimekeeperRef = Arc::new(ThreadTimekeeper::new());
    let err = promise
        .semi_future()
        .via(InlineExecutor::instance())
        .within_with(
            Duration::from_millis(10),
            fulcrum::Error::user("deadline blown"),
            &tk,
        )
        .get()
        .expect_err("expected the custom error");
    assert_eq!(err.kind(), ErrorKind::User);
    assert_eq!(err.context(), Some("deadline blown"));
    promise.set_value(0);
}

#[test]
fn delayed_holds_a_ready_result_until_the_duration_passes() {
    common::init_test_logging();
    let started = Instant::now();
    let n = make_future(9)
        .delayed(Duration::from_millis(25))
        .get()
        .expect("value missing");
    assert_eq!(n, 9);
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[test]
fn delayed_semi_future_keeps_its_result() {
    common::init_test_logging();
    let started = Instant::now();
    let n = fulcrum::make_semi_future(3)
        .delayed(Duration::from_millis(15))
        .get()
        .expect("value missing");
    assert_eq!(n, 3);
    assert!(started.elapsed() >= Duration::from_millis(15));
}

#[test]
fn sleep_completes_after_the_duration() {
    common::init_test_logging();
    let started = Instant::now();
    timekeeper::sleep(Duration::from_millis(20))
        .get()
        .expect("sleep failed");
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn slow_producer_still_wins_a_generous_within() {
    common::init_test_logging();
    let mut promise = Promise::new();
    let fut = promise
        .semi_future()
        .via(InlineExecutor::instance())
        .within(Duration::from_secs(30));
    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        promise.set_value(77);
    });
    assert_eq!(fut.get().expect("value missing"), 77);
    producer.join().expect("producer panicked");
}
