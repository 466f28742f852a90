use pledge::combinator::{when_all, when_all_erased};
use pledge::{AggregateError, CompletionSource, Operation, Status};

use std::thread;

#[test]
fn test_results_in_input_order() {
    let sources: Vec<_> = (0..3).map(|_| CompletionSource::<u32>::new()).collect();
    let all = when_all(sources.iter().map(CompletionSource::operation));

    sources[2].set_result(30).unwrap();
    sources[0].set_result(10).unwrap();
    assert!(!all.is_completed(), "Waits for every child");

    sources[1].set_result(20).unwrap();
    assert_eq!(all.result().unwrap(), vec![10, 20, 30]);
    assert!(!all.completed_synchronously());
}

#[test]
fn test_already_completed_children_complete_synchronously() {
    let all = when_all([Operation::from_result(1), Operation::from_result(2)]);

    assert!(all.completed_synchronously());
    assert_eq!(all.result().unwrap(), vec![1, 2]);
}

#[test]
fn test_empty_input_completes_immediately() {
    let all = when_all(Vec::<Operation<u8>>::new());

    assert!(all.completed_synchronously());
    assert!(all.result().unwrap().is_empty());
}

#[test]
fn test_faults_are_aggregated_in_input_order() {
    let sources: Vec<_> = (0..3).map(|_| CompletionSource::<u32>::new()).collect();
    let all = when_all(sources.iter().map(CompletionSource::operation));

    sources[2].set_fault("third").unwrap();
    sources[1].set_result(2).unwrap();
    sources[0].set_fault("first").unwrap();

    assert_eq!(all.status(), Status::Faulted);

    let fault = all.fault().unwrap().unwrap();
    let aggregate = fault
        .cause()
        .unwrap()
        .downcast_ref::<AggregateError>()
        .unwrap();

    let messages: Vec<_> = aggregate.causes().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["first", "third"]);
}

#[test]
fn test_cancellation_wins_over_faults() {
    let sources: Vec<_> = (0..3).map(|_| CompletionSource::<u32>::new()).collect();
    let all = when_all(sources.iter().map(CompletionSource::operation));

    sources[0].set_fault("broken").unwrap();
    sources[1].set_canceled().unwrap();
    assert!(!all.is_completed(), "Still waits for the last child");

    sources[2].set_result(3).unwrap();
    assert!(all.is_canceled());
}

#[test]
fn test_heterogeneous_children() {
    let number = CompletionSource::<u32>::new();
    let text = CompletionSource::<String>::new();

    let all = when_all_erased([number.operation().core().clone(), text.operation().core().clone()]);

    number.set_result(4).unwrap();
    text.set_result("four".into()).unwrap();

    assert!(all.is_completed_successfully());
    assert_eq!(number.operation().result().unwrap(), 4);
    assert_eq!(text.operation().result().unwrap(), "four");
}

#[test]
fn test_children_completing_concurrently() {
    const CHILDREN: usize = 32;

    let sources: Vec<_> = (0..CHILDREN).map(|_| CompletionSource::<usize>::new()).collect();
    let all = when_all(sources.iter().map(CompletionSource::operation));

    let handles: Vec<_> = sources
        .iter()
        .cloned()
        .enumerate()
        .map(|(n, source)| thread::spawn(move || source.set_result(n).unwrap()))
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(all.result().unwrap(), (0..CHILDREN).collect::<Vec<_>>());
}
