//! QueryQueue metrics regression tests

use super::helpers::*;
use queryqueue::{QueryQueue, operation_fn};
use serial_test::serial;
use std::time::Duration;

fn succeed() -> impl queryqueue::Operation {
    operation_fn(|| async { Ok::<_, std::io::Error>(()) })
}

#[tokio::test(start_paused = true)]
#[serial]
async fn admission_metrics_exist() {
    init_recorder();

    let queue = QueryQueue::builder()
        .name("metrics_admission")
        .max_capacity(1)
        .replenish_delay(Duration::from_secs(1))
        .build();
    queue.init().unwrap();

    queue.submit(succeed()).unwrap();
    queue.submit(succeed()).unwrap();

    assert_counter_exists("queryqueue_operations_admitted_total");
    assert_metric_has_label(
        "queryqueue_operations_admitted_total",
        "queue",
        "metrics_admission",
    );
    assert_metric_has_label("queryqueue_operations_admitted_total", "lane", "primary");
    assert_metric_has_label("queryqueue_operations_admitted_total", "lane", "overflow");

    assert_gauge_exists("queryqueue_available_slots");
    assert_gauge_exists("queryqueue_primary_length");
    assert_gauge_exists("queryqueue_overflow_length");
    assert_metric_has_label("queryqueue_overflow_length", "queue", "metrics_admission");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn promotion_metrics_exist() {
    init_recorder();

    let queue = QueryQueue::builder()
        .name("metrics_promotion")
        .max_capacity(1)
        .replenish_delay(Duration::from_millis(200))
        .promotion_interval(Duration::from_millis(100))
        .build();
    queue.init().unwrap();

    for _ in 0..3 {
        queue.submit(succeed()).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_counter_exists("queryqueue_operations_promoted_total");
    assert_metric_has_label(
        "queryqueue_operations_promoted_total",
        "queue",
        "metrics_promotion",
    );
}

#[tokio::test(start_paused = true)]
#[serial]
async fn attempt_metrics_track_result() {
    init_recorder();

    let queue = QueryQueue::builder().name("metrics_attempts").build();
    queue.init().unwrap();

    queue.submit(succeed()).unwrap();
    queue
        .submit(operation_fn(|| async { Err::<(), _>("bad gateway") }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot_names: Vec<_> = get_metrics_snapshot()
        .into_iter()
        .map(|(k, _, _, _)| k.key().name().to_string())
        .collect();
    assert!(snapshot_names.iter().any(|n| n == "queryqueue_attempts_total"));
    assert!(
        snapshot_names
            .iter()
            .any(|n| n == "queryqueue_operations_abandoned_total")
    );
}

#[tokio::test(start_paused = true)]
#[serial]
async fn attempt_counts_match_retry_bound() {
    init_recorder();

    let queue = QueryQueue::builder().name("metrics_retry_bound").build();
    queue.init().unwrap();

    queue
        .submit(operation_fn(|| async { Err::<(), _>("bad gateway") }))
        .unwrap();
    queue.submit(succeed()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = get_metrics_snapshot();
    let failures = counter_value(
        &snapshot,
        "queryqueue_attempts_total",
        "metrics_retry_bound",
        Some(("result", "failure")),
    );
    let successes = counter_value(
        &snapshot,
        "queryqueue_attempts_total",
        "metrics_retry_bound",
        Some(("result", "success")),
    );
    let abandoned = counter_value(
        &snapshot,
        "queryqueue_operations_abandoned_total",
        "metrics_retry_bound",
        None,
    );
    assert_eq!(failures, 3);
    assert_eq!(successes, 1);
    assert_eq!(abandoned, 1);

    assert_metric_has_label("queryqueue_attempts_total", "result", "failure");
    assert_metric_has_label("queryqueue_attempts_total", "result", "success");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn listener_panic_metric_exists() {
    init_recorder();

    let queue = QueryQueue::builder()
        .name("metrics_listener_panics")
        .on_admitted(|_| panic!("callback failure"))
        .build();
    queue.init().unwrap();
    queue.submit(succeed()).unwrap();

    assert_counter_exists("queryqueue_listener_panics_total");
    assert_metric_has_label(
        "queryqueue_listener_panics_total",
        "queue",
        "metrics_listener_panics",
    );
    assert_eq!(queue.listener_panics(), 1);
}
