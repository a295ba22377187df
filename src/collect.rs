//! Composition combinators over collections of handles.
//!
//! All combinators here follow one pattern: allocate a shared context,
//! attach a per-input callback that writes into the context, and fulfill
//! the combined handle from whichever callback completes the contract.
//! Contexts coordinate with atomic counters and single-writer flags, so
//! inputs may complete concurrently on any thread.
//!
//! Every combinator returns unscheduled handles; attach an executor with
//! `via` before chaining scheduled continuations. A [`Future`] input
//! converts with [`Future::semi`] or `From`.
//!
//! [`Future`]: crate::future::Future
//! [`Future::semi`]: crate::future::Future::semi

use crate::core::{contract, Core, Fulfiller};
use crate::error::{Error, ErrorKind};
use crate::executor::{ExecutorRef, QueuedInlineExecutor};
use crate::future::{make_semi_future, SemiFuture};
use crate::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// collect_all

struct CollectAllContext<T: Send + 'static> {
    slots: Mutex<Vec<Option<Result<T>>>>,
    remaining: AtomicUsize,
    tx: Mutex<Option<Fulfiller<Vec<Result<T>>>>>,
}

/// Completes with every input's result, in input order, once all inputs
/// have completed. Never fails itself.
#[must_use]
pub fn collect_all<T, I>(inputs: I) -> SemiFuture<Vec<Result<T>>>
where
    T: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    let n = cores.len();
    if n == 0 {
        return make_semi_future(Vec::new());
    }
    let (tx, out) = contract();
    let ctx = Arc::new(CollectAllContext {
        slots: Mutex::new((0..n).map(|_| None).collect()),
        remaining: AtomicUsize::new(n),
        tx: Mutex::new(Some(tx)),
    });
    for (i, core) in cores.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| {
            ctx.slots.lock()[i] = Some(r);
            if ctx.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let results = ctx
                    .slots
                    .lock()
                    .iter_mut()
                    .map(|slot| slot.take().expect("input completed without a result"))
                    .collect();
                if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(Ok(results));
                }
            }
        }));
    }
    SemiFuture::from_core(out)
}

struct CollectAll2Context<A: Send + 'static, B: Send + 'static> {
    left: Mutex<Option<Result<A>>>,
    right: Mutex<Option<Result<B>>>,
    remaining: AtomicUsize,
    tx: Mutex<Option<Fulfiller<(Result<A>, Result<B>)>>>,
}

impl<A: Send + 'static, B: Send + 'static> CollectAll2Context<A, B> {
    fn step(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let left = self.left.lock().take().expect("left input incomplete");
            let right = self.right.lock().take().expect("right input incomplete");
            if let Some(tx) = self.tx.lock().take() {
                tx.fulfill(Ok((left, right)));
            }
        }
    }
}

/// Completes with both results once both inputs, of possibly different
/// types, have completed. Never fails itself.
#[must_use]
pub fn collect_all2<A, B>(
    a: SemiFuture<A>,
    b: SemiFuture<B>,
) -> SemiFuture<(Result<A>, Result<B>)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let a = a.prepare_for_attach();
    let b = b.prepare_for_attach();
    let (tx, out) = contract();
    let ctx = Arc::new(CollectAll2Context {
        left: Mutex::new(None),
        right: Mutex::new(None),
        remaining: AtomicUsize::new(2),
        tx: Mutex::new(Some(tx)),
    });
    let left_ctx = Arc::clone(&ctx);
    a.set_callback(Box::new(move |r| {
        *left_ctx.left.lock() = Some(r);
        left_ctx.step();
    }));
    let right_ctx = Arc::clone(&ctx);
    b.set_callback(Box::new(move |r| {
        *right_ctx.right.lock() = Some(r);
        right_ctx.step();
    }));
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// collect

struct CollectContext<T: Send + 'static> {
    values: Mutex<Vec<Option<T>>>,
    errored: AtomicBool,
    remaining: AtomicUsize,
    tx: Mutex<Option<Fulfiller<Vec<T>>>>,
}

/// Completes with every input's value, in input order, on all-success —
/// or with the earliest-completing error. Once an error is latched the
/// remaining results are dropped.
#[must_use]
pub fn collect<T, I>(inputs: I) -> SemiFuture<Vec<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    let n = cores.len();
    if n == 0 {
        return make_semi_future(Vec::new());
    }
    let (tx, out) = contract();
    let ctx = Arc::new(CollectContext {
        values: Mutex::new((0..n).map(|_| None).collect()),
        errored: AtomicBool::new(false),
        remaining: AtomicUsize::new(n),
        tx: Mutex::new(Some(tx)),
    });
    for (i, core) in cores.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| {
            match r {
                Ok(v) => {
                    ctx.values.lock()[i] = Some(v);
                }
                Err(e) => {
                    if !ctx.errored.swap(true, Ordering::AcqRel) {
                        if let Some(tx) = ctx.tx.lock().take() {
                            tx.fulfill(Err(e));
                        }
                    }
                }
            }
            if ctx.remaining.fetch_sub(1, Ordering::AcqRel) == 1
                && !ctx.errored.load(Ordering::Acquire)
            {
                let values = ctx
                    .values
                    .lock()
                    .iter_mut()
                    .map(|slot| slot.take().expect("input completed without a value"))
                    .collect();
                if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(Ok(values));
                }
            }
        }));
    }
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// collect_any

struct CollectAnyContext<T: Send + 'static> {
    done: AtomicBool,
    tx: Mutex<Option<Fulfiller<(usize, Result<T>)>>>,
}

/// Completes with `(index, result)` of the first input to complete.
#[must_use]
pub fn collect_any<T, I>(inputs: I) -> SemiFuture<(usize, Result<T>)>
where
    T: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    let (tx, out) = contract();
    let ctx = Arc::new(CollectAnyContext {
        done: AtomicBool::new(false),
        tx: Mutex::new(Some(tx)),
    });
    for (i, core) in cores.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| {
            if !ctx.done.swap(true, Ordering::AcqRel) {
                if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(Ok((i, r)));
                }
            }
        }));
    }
    SemiFuture::from_core(out)
}

struct CollectAnyValueContext<T: Send + 'static> {
    done: AtomicBool,
    settled: AtomicUsize,
    total: usize,
    tx: Mutex<Option<Fulfiller<(usize, T)>>>,
}

/// Completes with `(index, value)` of the first input to complete with a
/// value. If every input fails, completes with the last error.
#[must_use]
pub fn collect_any_without_error<T, I>(inputs: I) -> SemiFuture<(usize, T)>
where
    T: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    let total = cores.len();
    let (tx, out) = contract();
    let ctx = Arc::new(CollectAnyValueContext {
        done: AtomicBool::new(false),
        settled: AtomicUsize::new(0),
        total,
        tx: Mutex::new(Some(tx)),
    });
    for (i, core) in cores.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| match r {
            Ok(v) => {
                if ctx.done.swap(true, Ordering::AcqRel) {
                    ctx.settled.fetch_add(1, Ordering::AcqRel);
                } else if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(Ok((i, v)));
                }
            }
            Err(e) => {
                // The counter can only reach the total when no input won,
                // so the promise is still unfulfilled here.
                if ctx.settled.fetch_add(1, Ordering::AcqRel) + 1 == ctx.total {
                    if let Some(tx) = ctx.tx.lock().take() {
                        tx.fulfill(Err(e));
                    }
                }
            }
        }));
    }
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// collect_n

struct CollectNState<T> {
    picked: Vec<(usize, T)>,
    completed: usize,
    done: bool,
}

struct CollectNContext<T: Send + 'static> {
    state: Mutex<CollectNState<T>>,
    total: usize,
    wanted: usize,
    tx: Mutex<Option<Fulfiller<Vec<(usize, T)>>>>,
}

/// Completes with the first `n` successful results as `(index, value)`
/// pairs in completion order.
///
/// Fails with `NotEnoughFutures` when fewer than `n` inputs exist, or
/// when every input has completed with fewer than `n` successes.
#[must_use]
pub fn collect_n<T, I>(inputs: I, n: usize) -> SemiFuture<Vec<(usize, T)>>
where
    T: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    let total = cores.len();
    if n == 0 {
        return make_semi_future(Vec::new());
    }
    if total < n {
        return crate::future::make_semi_future_try(Err(Error::new(
            ErrorKind::NotEnoughFutures,
        )
        .with_context(format!("{total} inputs for collect_n of {n}"))));
    }
    let (tx, out) = contract();
    let ctx = Arc::new(CollectNContext {
        state: Mutex::new(CollectNState {
            picked: Vec::with_capacity(n),
            completed: 0,
            done: false,
        }),
        total,
        wanted: n,
        tx: Mutex::new(Some(tx)),
    });
    for (i, core) in cores.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |r| {
            let outcome = {
                let mut state = ctx.state.lock();
                state.completed += 1;
                if let Ok(v) = r {
                    if !state.done && state.picked.len() < ctx.wanted {
                        state.picked.push((i, v));
                    }
                }
                if !state.done && state.picked.len() == ctx.wanted {
                    state.done = true;
                    Some(Ok(std::mem::take(&mut state.picked)))
                } else if !state.done && state.completed == ctx.total {
                    state.done = true;
                    Some(Err(Error::new(ErrorKind::NotEnoughFutures).with_context(
                        format!("only {} of {} inputs succeeded", state.picked.len(), ctx.wanted),
                    )))
                } else {
                    None
                }
            };
            if let Some(result) = outcome {
                if let Some(tx) = ctx.tx.lock().take() {
                    tx.fulfill(result);
                }
            }
        }));
    }
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// reduce

/// Sequential left fold: each step runs once the previous accumulator
/// and the next input are both available. The first error
/// short-circuits.
#[must_use]
pub fn reduce<T, A, I, F>(inputs: I, init: A, f: F) -> SemiFuture<A>
where
    T: Send + 'static,
    A: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
    F: FnMut(A, T) -> A + Send + 'static,
{
    let f = Arc::new(Mutex::new(f));
    let mut acc = make_semi_future(init);
    for input in inputs {
        let f = Arc::clone(&f);
        let acc_core = acc.prepare_for_attach();
        let input_core = input.prepare_for_attach();
        let (tx, next) = contract::<A>();
        acc_core.set_callback(Box::new(move |ra| match ra {
            Err(e) => tx.fulfill(Err(e)),
            Ok(a) => input_core.set_callback(Box::new(move |rt| match rt {
                Err(e) => tx.fulfill(Err(e)),
                Ok(t) => {
                    let next_acc = (&mut *f.lock())(a, t);
                    tx.fulfill(Ok(next_acc));
                }
            })),
        }));
        acc = SemiFuture::from_core(next);
    }
    acc
}

/// Like [`reduce`], but the step function sees each input's full result
/// and decides how errors fold.
#[must_use]
pub fn reduce_try<T, A, I, F>(inputs: I, init: A, f: F) -> SemiFuture<A>
where
    T: Send + 'static,
    A: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
    F: FnMut(A, Result<T>) -> Result<A> + Send + 'static,
{
    let f = Arc::new(Mutex::new(f));
    let mut acc = make_semi_future(init);
    for input in inputs {
        let f = Arc::clone(&f);
        let acc_core = acc.prepare_for_attach();
        let input_core = input.prepare_for_attach();
        let (tx, next) = contract::<A>();
        acc_core.set_callback(Box::new(move |ra| match ra {
            Err(e) => tx.fulfill(Err(e)),
            Ok(a) => input_core.set_callback(Box::new(move |rt| {
                let folded = (&mut *f.lock())(a, rt);
                tx.fulfill(folded);
            })),
        }));
        acc = SemiFuture::from_core(next);
    }
    acc
}

struct UnorderedReduceContext<A: Send + 'static, F> {
    memo: Mutex<Option<Arc<Core<A>>>>,
    func: Mutex<F>,
    remaining: AtomicUsize,
    tx: Mutex<Option<Fulfiller<A>>>,
}

/// Applies `f` in completion order rather than input order. Each
/// completion chains a new step after the current accumulator; the first
/// error (in completion order) poisons the chain and surfaces.
#[must_use]
pub fn unordered_reduce<T, A, I, F>(inputs: I, init: A, f: F) -> SemiFuture<A>
where
    T: Send + 'static,
    A: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
    F: FnMut(A, T) -> A + Send + 'static,
{
    let cores: Vec<_> = inputs.into_iter().map(SemiFuture::prepare_for_attach).collect();
    if cores.is_empty() {
        return make_semi_future(init);
    }
    let (tx, out) = contract::<A>();
    let ctx = Arc::new(UnorderedReduceContext {
        memo: Mutex::new(Some(Core::with_result(Ok(init)))),
        func: Mutex::new(f),
        remaining: AtomicUsize::new(cores.len()),
        tx: Mutex::new(Some(tx)),
    });
    for core in cores {
        let ctx = Arc::clone(&ctx);
        core.set_callback(Box::new(move |rt| {
            let (chain_tx, next) = contract::<A>();
            let prev = {
                let mut memo = ctx.memo.lock();
                std::mem::replace(&mut *memo, Some(Arc::clone(&next)))
                    .expect("accumulator chain broken")
            };
            let step_ctx = Arc::clone(&ctx);
            prev.set_callback(Box::new(move |ra| {
                let folded = match (ra, rt) {
                    (Err(e), _) | (Ok(_), Err(e)) => Err(e),
                    (Ok(a), Ok(t)) => Ok((&mut *step_ctx.func.lock())(a, t)),
                };
                chain_tx.fulfill(folded);
            }));
            if ctx.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let last = ctx.memo.lock().take().expect("accumulator chain broken");
                let tx = ctx.tx.lock().take().expect("combined result already fulfilled");
                last.set_callback(Box::new(move |r| tx.fulfill(r)));
            }
        }));
    }
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// window

struct WindowContext<In, U: Send + 'static> {
    next_index: AtomicUsize,
    len: usize,
    source: Box<dyn Fn(usize) -> In + Send + Sync>,
    func: Box<dyn Fn(In) -> SemiFuture<U> + Send + Sync>,
    outputs: Vec<Mutex<Option<Fulfiller<U>>>>,
    executor: ExecutorRef,
}

fn window_spawn<In: Send + 'static, U: Send + 'static>(ctx: Arc<WindowContext<In, U>>) {
    let i = ctx.next_index.fetch_add(1, Ordering::Relaxed);
    if i >= ctx.len {
        return;
    }
    let input = (ctx.source)(i);
    let core = (ctx.func)(input).prepare_for_attach();
    let spawn_ctx = Arc::clone(&ctx);
    core.set_callback(Box::new(move |r| {
        let executor = Arc::clone(&spawn_ctx.executor);
        executor.add(Box::new(move || {
            if let Some(tx) = spawn_ctx.outputs[i].lock().take() {
                tx.fulfill(r);
            }
            window_spawn(spawn_ctx);
        }));
    }));
}

fn window_impl<In, U>(
    executor: ExecutorRef,
    len: usize,
    source: Box<dyn Fn(usize) -> In + Send + Sync>,
    func: Box<dyn Fn(In) -> SemiFuture<U> + Send + Sync>,
    n: usize,
) -> Vec<SemiFuture<U>>
where
    In: Send + 'static,
    U: Send + 'static,
{
    assert!(n > 0, "window width must be positive");
    let mut results = Vec::with_capacity(len);
    let mut outputs = Vec::with_capacity(len);
    for _ in 0..len {
        let (tx, core) = contract::<U>();
        results.push(SemiFuture::from_core(core));
        outputs.push(Mutex::new(Some(tx)));
    }
    let ctx = Arc::new(WindowContext {
        next_index: AtomicUsize::new(0),
        len,
        source,
        func,
        outputs,
        executor: Arc::clone(&executor),
    });
    for _ in 0..n.min(len) {
        let spawn_ctx = Arc::clone(&ctx);
        executor.add(Box::new(move || window_spawn(spawn_ctx)));
    }
    results
}

/// Runs `func` over `inputs` with at most `n` invocations in flight;
/// when one finishes the next input is dispatched. Returns one handle
/// per input, in input order.
///
/// Spawns are trampolined through the queued-inline executor, so ready
/// results cannot recurse the stack.
#[must_use]
pub fn window<In, U, F>(inputs: Vec<In>, func: F, n: usize) -> Vec<SemiFuture<U>>
where
    In: Send + 'static,
    U: Send + 'static,
    F: Fn(In) -> SemiFuture<U> + Send + Sync + 'static,
{
    window_on(QueuedInlineExecutor::instance(), inputs, func, n)
}

/// [`window`] with dispatch on a caller-supplied executor.
#[must_use]
pub fn window_on<In, U, F>(
    executor: ExecutorRef,
    inputs: Vec<In>,
    func: F,
    n: usize,
) -> Vec<SemiFuture<U>>
where
    In: Send + 'static,
    U: Send + 'static,
    F: Fn(In) -> SemiFuture<U> + Send + Sync + 'static,
{
    let slots: Vec<Mutex<Option<In>>> = inputs.into_iter().map(|x| Mutex::new(Some(x))).collect();
    let len = slots.len();
    window_impl(
        executor,
        len,
        Box::new(move |i| slots[i].lock().take().expect("window input consumed twice")),
        Box::new(func),
        n,
    )
}

/// Windows over the counter `0..times` without materializing a
/// collection.
#[must_use]
pub fn window_n<U, F>(times: usize, func: F, n: usize) -> Vec<SemiFuture<U>>
where
    U: Send + 'static,
    F: Fn(usize) -> SemiFuture<U> + Send + Sync + 'static,
{
    window_impl(
        QueuedInlineExecutor::instance(),
        times,
        Box::new(|i| i),
        Box::new(func),
        n,
    )
}

// ---------------------------------------------------------------------------
// map / will_equal

/// Composes `f` over each input, returning one handle per input.
#[must_use]
pub fn map<T, U, I, F>(inputs: I, f: F) -> Vec<SemiFuture<U>>
where
    T: Send + 'static,
    U: Send + 'static,
    I: IntoIterator<Item = SemiFuture<T>>,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let f = Arc::new(f);
    inputs
        .into_iter()
        .map(|input| {
            let f = Arc::clone(&f);
            let core = input.prepare_for_attach();
            let (tx, out) = contract::<U>();
            core.set_callback(Box::new(move |r| tx.fulfill(r.map(|v| f(v)))));
            SemiFuture::from_core(out)
        })
        .collect()
}

/// Completes with true iff both inputs complete with values that compare
/// equal.
#[must_use]
pub fn will_equal<T>(a: SemiFuture<T>, b: SemiFuture<T>) -> SemiFuture<bool>
where
    T: PartialEq + Send + 'static,
{
    let core = collect_all2(a, b).prepare_for_attach();
    let (tx, out) = contract::<bool>();
    core.set_callback(Box::new(move |r| {
        let equal = matches!(r, Ok((Ok(ref x), Ok(ref y))) if x == y);
        tx.fulfill(Ok(equal));
    }));
    SemiFuture::from_core(out)
}

// ---------------------------------------------------------------------------
// control flow

/// Runs `thunk` if `cond` holds, and completes immediately otherwise.
#[must_use]
pub fn when<F>(cond: bool, thunk: F) -> SemiFuture<()>
where
    F: FnOnce() -> SemiFuture<()>,
{
    if cond {
        thunk()
    } else {
        make_semi_future(())
    }
}

fn while_step<P, F>(pred: Arc<P>, thunk: Arc<F>, tx: Fulfiller<()>)
where
    P: Fn() -> bool + Send + Sync + 'static,
    F: Fn() -> SemiFuture<()> + Send + Sync + 'static,
{
    // Each iteration goes through the queued-inline executor so long
    // chains of ready thunks unwind iteratively.
    QueuedInlineExecutor::instance().add(Box::new(move || {
        if !pred() {
            tx.fulfill(Ok(()));
            return;
        }
        let core = thunk().prepare_for_attach();
        core.set_callback(Box::new(move |r| match r {
            Err(e) => tx.fulfill(Err(e)),
            Ok(()) => while_step(pred, thunk, tx),
        }));
    }));
}

/// Repeatedly evaluates `pred` and, while it holds, runs `thunk`,
/// chaining the next iteration after each completion. An error from
/// `thunk` ends the loop and surfaces.
#[must_use]
pub fn while_do<P, F>(pred: P, thunk: F) -> SemiFuture<()>
where
    P: Fn() -> bool + Send + Sync + 'static,
    F: Fn() -> SemiFuture<()> + Send + Sync + 'static,
{
    let (tx, out) = contract::<()>();
    while_step(Arc::new(pred), Arc::new(thunk), tx);
    SemiFuture::from_core(out)
}

/// Runs `thunk` `n` times in sequence.
#[must_use]
pub fn times<F>(n: usize, thunk: F) -> SemiFuture<()>
where
    F: Fn() -> SemiFuture<()> + Send + Sync + 'static,
{
    let count = AtomicUsize::new(0);
    while_do(move || count.fetch_add(1, Ordering::AcqRel) < n, thunk)
}
