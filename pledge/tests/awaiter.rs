mod common;

use common::block_on;
use pledge::{CompletionSource, EventLoop, Operation};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn test_await_completed_operation() {
    let operation = Operation::from_result(8u64);
    assert_eq!(block_on(operation).unwrap(), 8);
}

#[test]
fn test_await_resumes_after_completion_on_another_thread() {
    let source = CompletionSource::<String>::new();
    let operation = source.operation();

    let producer = source.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.set_result("ready".into()).unwrap();
    });

    assert_eq!(block_on(operation).unwrap(), "ready");
    handle.join().unwrap();
}

#[test]
fn test_await_surfaces_fault_and_cancellation() {
    let faulted = Operation::<u32>::from_fault("exploded");
    let error = block_on(faulted).unwrap_err();
    assert_eq!(error.cause().unwrap().to_string(), "exploded");

    let canceled = Operation::<u32>::from_canceled();
    assert!(block_on(canceled).unwrap_err().is_canceled());
}

#[test]
fn test_await_inside_async_block() {
    let first = CompletionSource::<u32>::new();
    let second = CompletionSource::<u32>::new();

    let (a, b) = (first.operation(), second.operation());
    let producer = (first.clone(), second.clone());

    let handle = thread::spawn(move || {
        producer.0.set_result(2).unwrap();
        thread::sleep(Duration::from_millis(10));
        producer.1.set_result(3).unwrap();
    });

    let sum = block_on(async move { a.await.unwrap() + b.await.unwrap() });
    assert_eq!(sum, 5);

    handle.join().unwrap();
}

#[test]
fn test_awaiter_protocol() {
    let source = CompletionSource::<u32>::new();
    let awaiter = source.operation().awaiter();
    assert!(!awaiter.is_done());

    let resumed = Arc::new(AtomicUsize::new(0));
    let counter = resumed.clone();
    awaiter.register_resumption(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    source.set_result(6).unwrap();
    assert_eq!(resumed.load(Ordering::SeqCst), 1);

    let awaiter = source.operation().awaiter();
    assert!(awaiter.is_done());
    assert_eq!(awaiter.outcome().unwrap(), 6);
}

#[test]
fn test_resumption_returns_to_captured_context() {
    let event_loop = EventLoop::new();
    let source = CompletionSource::<u32>::new();
    let resumed = Arc::new(AtomicUsize::new(0));

    let counter = resumed.clone();
    event_loop.enter(|| {
        source.operation().awaiter().register_resumption(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    });

    source.set_result(1).unwrap();
    assert_eq!(resumed.load(Ordering::SeqCst), 0, "Resumption is posted to the loop");

    event_loop.run_pending();
    assert_eq!(resumed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropped_future_does_not_disturb_completion() {
    use std::future::{Future, IntoFuture};
    use std::pin::pin;
    use std::task::{Context, Poll, Waker};

    let source = CompletionSource::<u32>::new();

    {
        let mut future = pin!(source.operation().into_future());
        let mut cx = Context::from_waker(Waker::noop());
        assert!(matches!(future.as_mut().poll(&mut cx), Poll::Pending));
        assert!(matches!(future.as_mut().poll(&mut cx), Poll::Pending));
    }

    let later = Arc::new(AtomicUsize::new(0));
    let counter = later.clone();
    let token = source.operation().register(
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        None,
    );

    source.set_result(1).unwrap();
    assert!(token.is_some());
    assert_eq!(later.load(Ordering::SeqCst), 1);
}
