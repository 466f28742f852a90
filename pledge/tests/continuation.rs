mod common;

use pledge::{CompletionSource, Operation, OperationError, Outcome, Panicked, Status};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_continuations_run_in_registration_order() {
    let source = CompletionSource::<u32>::new();
    let operation = source.operation();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..5 {
        let order = order.clone();
        operation.register(move |_, _| order.lock().push(n), None);
    }

    assert!(order.lock().is_empty(), "Nothing runs before completion");

    source.set_result(1).unwrap();
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_continuation_sees_completing_flag() {
    let source = CompletionSource::<u32>::new();
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    source.operation().register(
        move |operation, synchronously| {
            *slot.lock() = Some((operation.result().unwrap(), synchronously));
        },
        None,
    );

    source.complete(Outcome::Completed(11), true).unwrap();
    assert_eq!(*seen.lock(), Some((11, true)));
}

#[test]
fn test_late_registration_runs_inline() {
    let operation = Operation::from_result(3u32);
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    let token = operation.register(
        move |operation, synchronously| {
            *slot.lock() = Some((operation.result().unwrap(), synchronously));
        },
        None,
    );

    assert!(token.is_none(), "Inline continuations have no token");
    assert_eq!(*seen.lock(), Some((3, true)));
}

#[test]
fn test_late_registration_on_canceled_operation_runs_inline() {
    let operation = Operation::<u32>::from_canceled();
    let seen = Arc::new(Mutex::new(None));

    let slot = seen.clone();
    let token = operation.register(
        move |operation, synchronously| {
            *slot.lock() = Some((operation.status(), synchronously));
        },
        None,
    );

    assert!(token.is_none(), "Inline continuations have no token");
    assert_eq!(
        *seen.lock(),
        Some((Status::Canceled, true)),
        "Callback must run before register returns"
    );
}

#[test]
fn test_try_add_completion_callback_reports_inline_run() {
    let pending = CompletionSource::<()>::new();
    assert!(!pending.operation().core().try_add_completion_callback(|_, _| {}, None));

    let done = Operation::completed();
    assert!(done.core().try_add_completion_callback(|_, _| {}, None));
}

#[test]
fn test_unregistered_continuation_never_runs() {
    let source = CompletionSource::<()>::new();
    let operation = source.operation();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let token = operation
        .register(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }, None)
        .unwrap();

    assert!(operation.unregister(token));
    assert!(!operation.unregister(token), "Second removal finds nothing");

    source.set_result(()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_each_continuation_runs_exactly_once() {
    let source = CompletionSource::<()>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let counter = calls.clone();
        source.operation().register(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }, None);
    }

    source.set_result(()).unwrap();
    source.try_set_canceled();

    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[test]
fn test_panicking_continuation_is_contained() {
    common::init_tracing();

    let source = CompletionSource::<()>::new();
    let reached = Arc::new(AtomicUsize::new(0));

    source.operation().register(|_, _| panic!("continuation failure"), None);

    let counter = reached.clone();
    source.operation().register(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    }, None);

    source.set_result(()).unwrap();

    assert_eq!(reached.load(Ordering::SeqCst), 1, "Later continuations still run");
    assert!(source.operation().is_completed_successfully());
}

#[test]
fn test_continue_with_runs_on_any_outcome() {
    let source = CompletionSource::<u32>::new();
    let status = source
        .operation()
        .continue_with(|antecedent| antecedent.status().to_string());

    source.set_fault("broken").unwrap();
    assert_eq!(status.result().unwrap(), "faulted");
}

#[test]
fn test_continue_with_captures_panics() {
    let source = CompletionSource::<u32>::new();
    let dependent = source
        .operation()
        .continue_with(|_| -> u32 { panic!("bad callback") });

    source.set_result(1).unwrap();

    let fault = dependent.fault().unwrap().unwrap();
    let panicked = fault.cause().unwrap().downcast_ref::<Panicked>().unwrap();
    assert_eq!(panicked.message(), "bad callback");
}

#[test]
fn test_then_chains_successes() {
    let source = CompletionSource::<u32>::new();
    let doubled = source
        .operation()
        .then(|value| Ok::<_, OperationError>(value * 2))
        .then(|value| Ok::<_, OperationError>(format!("{value}")));

    source.set_result(21).unwrap();
    assert_eq!(doubled.result().unwrap(), "42");
}

#[test]
fn test_then_forwards_faults_and_cancellation() {
    let calls = Arc::new(AtomicUsize::new(0));

    let faulted = CompletionSource::<u32>::new();
    let counter = calls.clone();
    let chained = faulted.operation().then(move |value| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, OperationError>(value)
    });
    faulted.set_fault("upstream").unwrap();

    assert!(chained.is_faulted());
    assert_eq!(chained.fault().unwrap().unwrap().cause().unwrap().to_string(), "upstream");

    let canceled = CompletionSource::<u32>::new();
    let counter = calls.clone();
    let chained = canceled.operation().then(move |value| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, OperationError>(value)
    });
    canceled.set_canceled().unwrap();

    assert!(chained.is_canceled());
    assert_eq!(calls.load(Ordering::SeqCst), 0, "Callback must not run");
}

#[test]
fn test_then_error_faults_dependent() {
    let dependent = Operation::from_result(1u32).then(|_| Err::<u32, _>("rejected"));

    assert!(dependent.is_faulted());
    assert!(dependent.completed_synchronously());
}
