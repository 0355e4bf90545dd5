//! Ordering and completion scenarios.

use dagrun::testing::{assert_ran_after, assert_states, TaskFactory};
use dagrun::{FailurePolicy, FnTask, GraphError, Runner, Task, TaskState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_independent_tasks_all_complete() {
    let factory = TaskFactory::new();
    let tasks: Vec<Arc<dyn Task>> = (0..3)
        .map(|_| factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort))
        .collect();

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add(tasks.clone());

    runner.start().await.unwrap();

    assert_states(TaskState::Done, &tasks);
}

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let factory = TaskFactory::new();
    let a = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);
    let b = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);
    let c = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add([a.clone(), b.clone(), c.clone()]);
    runner
        .add_dependency(&[a.clone(), b.clone(), c.clone()])
        .unwrap();

    runner.start().await.unwrap();

    assert_ran_after(&b, &a);
    assert_ran_after(&c, &b);
    assert_states(TaskState::Done, &[a, b, c]);
}

#[tokio::test]
async fn test_complex_graph_respects_every_edge() {
    // {1->4, 2->4, 3->5, 1->6, 4->6, 5->6, 5->7, 6->8, 6->9, 7->9}
    let factory = TaskFactory::new();
    let sleeps_ms = [1u64, 2, 1, 3, 1, 1, 1, 1, 1];
    let tasks: Vec<Arc<dyn Task>> = sleeps_ms
        .iter()
        .map(|&ms| factory.sleep_task(Duration::from_millis(ms), FailurePolicy::Abort))
        .collect();
    let t = |n: usize| tasks[n - 1].clone();

    let edges = [
        (1, 4),
        (2, 4),
        (3, 5),
        (1, 6),
        (4, 6),
        (5, 6),
        (5, 7),
        (6, 8),
        (6, 9),
        (7, 9),
    ];

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add(tasks.clone());
    for (from, to) in edges {
        runner.add_dependency(&[t(from), t(to)]).unwrap();
    }

    runner.start().await.unwrap();

    for (from, to) in edges {
        assert_ran_after(&t(to), &t(from));
    }
    assert_states(TaskState::Done, &tasks);
}

// Complete binary dependency tree:
// 0 -> 1,2
// 1 -> 3,4
// 2 -> 5,6
// ...
#[tokio::test]
async fn test_binary_dependency_tree_completes() {
    let num_tasks = 1023; // 2^10 - 1
    let factory = TaskFactory::new();
    let tasks: Vec<Arc<dyn Task>> = (0..num_tasks)
        .map(|_| factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort))
        .collect();

    let mut runner = Runner::new(Duration::from_secs(10));
    runner.add(tasks.clone());

    for layer in 0..9 {
        // each of the 2^layer tasks in this layer feeds two in the next
        let width = 1usize << layer;
        for j in 0..width {
            let parent = width - 1 + j;
            let left = 2 * width + 2 * j - 1;
            let right = left + 1;
            runner
                .add_dependency(&[tasks[parent].clone(), tasks[left].clone()])
                .unwrap();
            runner
                .add_dependency(&[tasks[parent].clone(), tasks[right].clone()])
                .unwrap();
        }
    }

    runner.start().await.unwrap();

    assert_states(TaskState::Done, &tasks);
}

#[tokio::test]
async fn test_each_task_dispatched_exactly_once() {
    // Diamond: 1 -> 2, 1 -> 3, 2 -> 4, 3 -> 4.
    let invocations: Vec<Arc<AtomicU32>> = (0..4).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let tasks: Vec<Arc<dyn Task>> = invocations
        .iter()
        .enumerate()
        .map(|(i, counter)| {
            let counter = Arc::clone(counter);
            FnTask::builder(i as u64 + 1)
                .body(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    }
                })
                .build() as Arc<dyn Task>
        })
        .collect();

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add(tasks.clone());
    runner
        .add_dependency(&[tasks[0].clone(), tasks[1].clone(), tasks[3].clone()])
        .unwrap();
    runner
        .add_dependency(&[tasks[0].clone(), tasks[2].clone(), tasks[3].clone()])
        .unwrap();

    runner.start().await.unwrap();

    for counter in &invocations {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_add_dependency_with_uninstalled_task_has_no_effect() {
    let factory = TaskFactory::new();
    let installed = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);
    let missing = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add([installed.clone()]);

    let err = runner
        .add_dependency(&[installed.clone(), missing.clone()])
        .unwrap_err();
    assert!(matches!(err, GraphError::NotInstalled(id) if id == missing.id()));

    // The failed call left the graph untouched: the run proceeds as if the
    // dependency was never mentioned.
    runner.start().await.unwrap();
    assert_eq!(installed.state(), TaskState::Done);
    assert_eq!(missing.state(), TaskState::New);
}

#[tokio::test]
async fn test_remove_dependency_unblocks_successor() {
    let factory = TaskFactory::new();
    let a = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Continue);
    let blocker = factory.failing_task(Duration::from_millis(1), FailurePolicy::Continue);
    let b = factory.sleep_task(Duration::from_millis(1), FailurePolicy::Abort);

    let mut runner = Runner::new(Duration::from_secs(1));
    runner.add([a.clone(), blocker.clone(), b.clone()]);
    runner.add_dependency(&[a.clone(), b.clone()]).unwrap();
    runner.add_dependency(&[blocker.clone(), b.clone()]).unwrap();

    // Without this removal, `blocker`'s Continue failure would keep `b`
    // blocked forever.
    runner
        .remove_dependency(&[blocker.clone(), b.clone()])
        .unwrap();

    runner.start().await.unwrap();

    assert_eq!(b.state(), TaskState::Done);
    assert_ran_after(&b, &a);
}
