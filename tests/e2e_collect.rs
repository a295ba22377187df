//! End-to-end combinator behavior, including the ordering properties.

mod common;

use fulcrum::{
    collect, collect_all, collect_n, make_semi_future, make_semi_future_err, window_n, Error,
    Promise, SemiFuture,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn collect_all_reports_mixed_results_in_input_order() {
    common::init_test_logging();
    let combined = collect_all(vec![
        make_semi_future(1),
        make_semi_future_err(Error::user("err")),
        make_semi_future(3),
    ]);
    let results = combined.get().expect("collect_all never fails");
    assert_eq!(results.len(), 3);
    assert_eq!(*results[0].as_ref().expect("value missing"), 1);
    assert!(results[1].is_err());
    assert_eq!(*results[2].as_ref().expect("value missing"), 3);
}

#[test]
fn collect_all_handles_producers_on_many_threads() {
    common::init_test_logging();
    let mut promises = Vec::new();
    let mut inputs = Vec::new();
    for _ in 0..8 {
        let mut p = Promise::new();
        inputs.push(p.semi_future());
        promises.push(p);
    }
    let combined = collect_all(inputs);
    let workers: Vec<_> = promises
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis((8 - i as u64) % 4));
                p.set_value(i);
            })
        })
        .collect();
    let results = combined.get().expect("collect_all never fails");
    for w in workers {
        w.join().expect("worker panicked");
    }
    for (i, r) in results.into_iter().enumerate() {
        assert_eq!(r.expect("value missing"), i);
    }
}

#[test]
fn collect_surfaces_the_earliest_completing_error() {
    common::init_test_logging();
    let mut p1 = Promise::<i32>::new();
    let mut p2 = Promise::<i32>::new();
    let mut p3 = Promise::<i32>::new();
    let combined = collect(vec![p1.semi_future(), p2.semi_future(), p3.semi_future()]);
    p3.set_error(Error::user("lost the race first"));
    p1.set_value(1);
    p2.set_error(Error::user("too late"));
    let err = combined.get().expect_err("expected error");
    assert_eq!(err.context(), Some("lost the race first"));
}

#[test]
fn collect_n_shortfall_is_not_enough_futures() {
    common::init_test_logging();
    let err = collect_n(vec![make_semi_future(1), make_semi_future(2)], 5)
        .get()
        .expect_err("expected NotEnoughFutures");
    assert_eq!(err.kind(), fulcrum::ErrorKind::NotEnoughFutures);
}

#[test]
fn window_of_four_bounds_concurrency_over_ten_inputs() {
    common::init_test_logging();
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let live2 = Arc::clone(&live);
    let peak2 = Arc::clone(&peak);
    let outputs = window_n(
        10,
        move |i| {
            let now = live2.fetch_add(1, Ordering::SeqCst) + 1;
            peak2.fetch_max(now, Ordering::SeqCst);
            let live3 = Arc::clone(&live2);
            let mut promise = Promise::new();
            let handle = promise.semi_future();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                promise.set_value(i);
            });
            handle.defer_value(move |v| {
                live3.fetch_sub(1, Ordering::SeqCst);
                v
            })
        },
        4,
    );
    let values: Vec<usize> = outputs
        .into_iter()
        .map(|sf| sf.get().expect("value missing"))
        .collect();
    assert_eq!(values, (0..10).collect::<Vec<_>>());
    let observed_peak = peak.load(Ordering::SeqCst);
    assert!(observed_peak <= 4, "observed concurrency {observed_peak} > 4");
    assert!(observed_peak >= 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// collect_all reports inputs in input order no matter the
    /// completion order.
    #[test]
    fn collect_all_order_is_input_order(
        values in prop::collection::vec(any::<i32>(), 1..12),
        seed in any::<u64>(),
    ) {
        let mut promises = Vec::new();
        let mut inputs: Vec<SemiFuture<i32>> = Vec::new();
        for _ in &values {
            let mut p = Promise::new();
            inputs.push(p.semi_future());
            promises.push(Some(p));
        }
        let combined = collect_all(inputs);

        // Complete in an order derived from the seed.
        let n = values.len();
        let mut order: Vec<usize> = (0..n).collect();
        let mut state = seed;
        for i in (1..n).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let j = (state >> 33) as usize % (i + 1);
            order.swap(i, j);
        }
        for idx in order {
            let p = promises[idx].take().expect("promise reused");
            p.set_value(values[idx]);
        }

        let results = combined.get().expect("collect_all never fails");
        prop_assert_eq!(results.len(), n);
        for (i, r) in results.into_iter().enumerate() {
            prop_assert_eq!(r.expect("value missing"), values[i]);
        }
    }
}
