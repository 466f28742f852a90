use pledge::{CompletionSource, Outcome, OperationError, Status};

#[test]
fn test_producer_lifecycle() {
    let source = CompletionSource::<&'static str>::new();
    let operation = source.operation();

    source.set_scheduled().unwrap();
    assert_eq!(operation.status(), Status::Scheduled);

    source.set_running().unwrap();
    assert_eq!(operation.status(), Status::Running);

    source.set_result("done").unwrap();
    assert_eq!(operation.status(), Status::RanToCompletion);
    assert_eq!(operation.result().unwrap(), "done");
}

#[test]
fn test_running_may_skip_scheduled() {
    let source = CompletionSource::<()>::new();

    assert!(source.try_set_running());
    assert!(!source.try_set_scheduled(), "Cannot go back to scheduled");
    assert_eq!(source.operation().status(), Status::Running);
}

#[test]
fn test_invalid_transition_reports_both_statuses() {
    let source = CompletionSource::<u8>::new();
    source.set_canceled().unwrap();

    match source.set_result(1) {
        Err(OperationError::InvalidState { attempted, current }) => {
            assert_eq!(attempted, Status::RanToCompletion);
            assert_eq!(current, Status::Canceled);
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    match source.set_running() {
        Err(OperationError::InvalidState { attempted, current }) => {
            assert_eq!(attempted, Status::Running);
            assert_eq!(current, Status::Canceled);
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn test_try_setters_never_fail_loudly() {
    let source = CompletionSource::<u8>::new();

    assert!(source.try_set_result(1));
    assert!(!source.try_set_result(2));
    assert!(!source.try_set_fault("late"));
    assert!(!source.try_set_canceled());
    assert!(!source.try_set_running());

    assert_eq!(source.operation().result().unwrap(), 1, "First result must stick");
}

#[test]
fn test_explicit_completion_records_synchronous_flag() {
    let sync = CompletionSource::<u8>::new();
    sync.complete(Outcome::Completed(4), true).unwrap();
    assert!(sync.operation().completed_synchronously());

    let deferred = CompletionSource::<u8>::new();
    deferred.set_result(4).unwrap();
    assert!(!deferred.operation().completed_synchronously());
}

#[test]
fn test_typed_outcome() {
    let source = CompletionSource::<Vec<u8>>::new();
    source.set_result(vec![1, 2, 3]).unwrap();

    match source.operation().outcome().unwrap() {
        Outcome::Completed(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
        other => panic!("unexpected outcome {other:?}"),
    }

    let canceled = CompletionSource::<Vec<u8>>::new();
    canceled.set_canceled().unwrap();
    assert_eq!(
        canceled.operation().outcome().unwrap().status(),
        Status::Canceled
    );
}

#[test]
fn test_status_display_names() {
    assert_eq!(Status::Created.to_string(), "created");
    assert_eq!(Status::RanToCompletion.to_string(), "ran-to-completion");
    assert!(Status::Faulted.is_terminal());
    assert!(!Status::Running.is_terminal());
}
