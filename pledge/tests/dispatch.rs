mod common;

use pledge::dispatch::{current_context, enter_context};
use pledge::{CompletionSource, EventLoop, LoopThread, Outcome};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn test_foreign_context_continuation_is_posted() {
    let event_loop = EventLoop::new();
    let source = CompletionSource::<u32>::new();
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    source.operation().register(
        move |operation, synchronously| {
            *slot.lock() = Some((operation.result().unwrap(), synchronously));
        },
        Some(event_loop.handle()),
    );

    source.complete(Outcome::Completed(5), true).unwrap();

    assert!(seen.lock().is_none(), "Posted continuation waits for the loop");
    assert_eq!(event_loop.pending(), 1);

    assert_eq!(event_loop.run_pending(), 1);
    assert_eq!(*seen.lock(), Some((5, false)), "Posted runs are never synchronous");
}

#[test]
fn test_same_context_continuation_runs_inline() {
    let event_loop = EventLoop::new();
    let source = CompletionSource::<u32>::new();
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    source.operation().register(
        move |_, synchronously| *slot.lock() = Some(synchronously),
        Some(event_loop.handle()),
    );

    event_loop.enter(|| source.complete(Outcome::Completed(1), true).unwrap());

    assert_eq!(*seen.lock(), Some(true));
    assert_eq!(event_loop.pending(), 0);
}

#[test]
fn test_on_completed_captures_current_context() {
    let event_loop = EventLoop::new();
    let source = CompletionSource::<()>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    event_loop.enter(|| {
        assert_eq!(current_context(), Some(event_loop.handle()));

        source.operation().on_completed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });

    assert!(current_context().is_none(), "Previous context restored");

    let producer = source.clone();
    thread::spawn(move || producer.set_result(()).unwrap())
        .join()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    event_loop.run_until_complete(&source.operation());
    event_loop.run_pending();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enter_context_nests_and_restores() {
    let outer = EventLoop::new();
    let inner = EventLoop::new();

    enter_context(outer.handle(), || {
        inner.enter(|| assert_eq!(current_context(), Some(inner.handle())));
        assert_eq!(current_context(), Some(outer.handle()));
    });

    assert!(current_context().is_none());
    assert_ne!(outer.handle(), inner.handle());
}

#[test]
fn test_posted_continuations_keep_order() {
    let event_loop = EventLoop::new();
    let source = CompletionSource::<()>::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..4 {
        let order = order.clone();
        source
            .operation()
            .register(move |_, _| order.lock().push(n), Some(event_loop.handle()));
    }

    source.set_result(()).unwrap();
    event_loop.run_pending();

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_loop_thread_affinity() {
    common::init_tracing();

    let worker = LoopThread::spawn("pledge-test-loop").unwrap();
    let source = CompletionSource::<u32>::new();
    let ran_on = Arc::new(Mutex::new(None));
    let done = CompletionSource::<()>::new();

    let slot = ran_on.clone();
    let signal = done.clone();
    source.operation().register(
        move |_, synchronously| {
            *slot.lock() = Some((thread::current().id(), synchronously));
            signal.set_result(()).unwrap();
        },
        Some(worker.handle()),
    );

    source.set_result(1).unwrap();
    done.operation().wait_timeout(common::PATIENCE).unwrap();

    assert_eq!(*ran_on.lock(), Some((worker.thread_id(), false)));
}

#[test]
fn test_panicking_job_does_not_stop_the_loop() {
    common::init_tracing();

    let event_loop = EventLoop::new();
    let source = CompletionSource::<()>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    source
        .operation()
        .register(|_, _| panic!("job failure"), Some(event_loop.handle()));

    let counter = calls.clone();
    source.operation().register(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        Some(event_loop.handle()),
    );

    source.set_result(()).unwrap();

    assert_eq!(event_loop.run_pending(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
