//! Initialization, shared handles and snapshots.

use super::{logged, recording, run_log, settle};
use queryqueue::{FnListener, Lane, QueryQueue, QueueError, QueueEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn init_requires_a_runtime() {
    let queue = QueryQueue::builder().build();
    let err = queue.init().unwrap_err();
    assert_eq!(err, QueueError::RuntimeUnavailable);
    assert!(err.is_uninitialized());

    let log = run_log();
    assert_eq!(
        queue.submit(recording(&log, 1)),
        Err(QueueError::Uninitialized)
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_init_neither_resets_nor_duplicates() {
    let log = run_log();
    let queue = QueryQueue::builder()
        .max_capacity(2)
        .replenish_delay(Duration::from_secs(1))
        .build();
    queue.init().unwrap();

    for id in 1..=3 {
        queue.submit(recording(&log, id)).unwrap();
    }
    queue.init().unwrap();
    queue.init().unwrap();

    let stats = queue.stats();
    assert_eq!(stats.available_slots, 0);
    assert_eq!(stats.overflow_len, 1);

    // A duplicated scheduler would promote and replenish twice per deadline.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(logged(&log), vec![1, 2, 3]);
    assert_eq!(queue.available_slots(), 1);
}

#[tokio::test(start_paused = true)]
async fn clones_share_one_pool() {
    let log = run_log();
    let queue = QueryQueue::builder().max_capacity(3).build();
    let other = queue.clone();

    queue.init().unwrap();
    assert!(other.is_initialized());

    queue.submit(recording(&log, 1)).unwrap();
    other.submit(recording(&log, 2)).unwrap();
    assert_eq!(queue.available_slots(), 1);
    assert_eq!(other.stats(), queue.stats());

    settle().await;
    assert_eq!(logged(&log), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn queue_keeps_running_after_the_submitting_task_ends() {
    let log = run_log();
    let queue = QueryQueue::builder()
        .max_capacity(1)
        .replenish_delay(Duration::from_millis(100))
        .build();
    queue.init().unwrap();

    let handle = queue.clone();
    let task_log = Arc::clone(&log);
    tokio::spawn(async move {
        for id in 1..=3 {
            handle.submit(recording(&task_log, id)).unwrap();
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(logged(&log), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn listener_sees_events_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let log = run_log();

    let queue = QueryQueue::builder()
        .name("tournaments")
        .max_capacity(1)
        .replenish_delay(Duration::from_secs(1))
        .event_listener(FnListener::new(move |event: &QueueEvent| {
            let label = match event {
                QueueEvent::Admitted { lane, .. } => format!("admitted:{}", lane.as_str()),
                QueueEvent::AtCapacity { .. } => "at_capacity".to_string(),
                QueueEvent::Drained { .. } => "drained".to_string(),
                QueueEvent::Promoted { count, .. } => format!("promoted:{}", count),
                QueueEvent::Replenished { .. } => "replenished".to_string(),
                QueueEvent::AttemptFailed { .. } => "attempt_failed".to_string(),
                QueueEvent::Succeeded { .. } => "succeeded".to_string(),
                QueueEvent::Abandoned { .. } => "abandoned".to_string(),
            };
            s.lock().unwrap().push(label);
        }))
        .build();
    queue.init().unwrap();

    queue.submit(recording(&log, 1)).unwrap();
    queue.submit(recording(&log, 2)).unwrap();
    tokio::time::sleep(Duration::from_millis(1600)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "admitted:primary",
            "at_capacity",
            "admitted:overflow",
            "succeeded",
            "replenished",
            "promoted:1",
            "succeeded",
            "drained",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn events_carry_the_queue_name() {
    use queryqueue::ControllerEvent;

    let names = Arc::new(Mutex::new(Vec::new()));
    let n = Arc::clone(&names);
    let queue = QueryQueue::builder()
        .name("leagues")
        .event_listener(FnListener::new(move |event: &QueueEvent| {
            n.lock().unwrap().push(event.controller_name().to_string());
        }))
        .build();
    queue.init().unwrap();
    assert_eq!(queue.name(), "leagues");

    let log = run_log();
    queue.submit(recording(&log, 1)).unwrap();
    settle().await;

    let names = names.lock().unwrap();
    assert!(!names.is_empty());
    assert!(names.iter().all(|name| name == "leagues"));
}

#[tokio::test(start_paused = true)]
async fn stats_serialize_for_health_endpoints() {
    let log = run_log();
    let queue = QueryQueue::builder().max_capacity(2).build();
    queue.init().unwrap();
    for id in 1..=3 {
        queue.submit(recording(&log, id)).unwrap();
    }

    let json = serde_json::to_value(queue.stats()).unwrap();
    assert_eq!(json["max_capacity"], 2);
    assert_eq!(json["available_slots"], 0);
    assert_eq!(json["overflow_len"], 1);

    assert_eq!(serde_json::to_value(Lane::Overflow).unwrap(), "overflow");
}
