//! QueryQueue stress tests

use super::ConcurrencyTracker;
use queryqueue::{QueryQueue, QueryQueueLayer, operation_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tower::{Layer, ServiceExt};

/// Test: 200k operations through a pool large enough to never overflow
#[tokio::test]
#[ignore]
async fn stress_high_volume_without_overflow() {
    const TOTAL: usize = 200_000;
    let executed = Arc::new(AtomicUsize::new(0));

    let queue = QueryQueue::builder()
        .name("stress-volume")
        .max_capacity(TOTAL)
        .build();
    queue.init().unwrap();

    let start = Instant::now();
    for _ in 0..TOTAL {
        let executed = Arc::clone(&executed);
        queue
            .submit(operation_fn(move || {
                executed.fetch_add(1, Ordering::Relaxed);
                async { Ok::<_, std::io::Error>(()) }
            }))
            .unwrap();
    }
    let submitted_in = start.elapsed();

    while executed.load(Ordering::Relaxed) < TOTAL {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let elapsed = start.elapsed();

    println!("{} submissions in {:?}", TOTAL, submitted_in);
    println!(
        "Throughput: {:.0} ops/sec",
        TOTAL as f64 / elapsed.as_secs_f64()
    );

    let stats = queue.stats();
    assert_eq!(stats.overflow_len, 0);
    assert_eq!(stats.available_slots, 0);
}

/// Test: many threads submit at once; execution stays serial
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_concurrent_submitters() {
    const TASKS: usize = 64;
    const PER_TASK: usize = 500;

    let tracker = ConcurrencyTracker::new();
    let executed = Arc::new(AtomicUsize::new(0));
    let queue = QueryQueue::builder()
        .name("stress-submitters")
        .max_capacity(TASKS * PER_TASK)
        .build();
    queue.init().unwrap();

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let queue = queue.clone();
        let tracker = Arc::clone(&tracker);
        let executed = Arc::clone(&executed);
        handles.push(tokio::spawn(async move {
            for _ in 0..PER_TASK {
                let tracker = Arc::clone(&tracker);
                let executed = Arc::clone(&executed);
                queue
                    .submit(operation_fn(move || {
                        let tracker = Arc::clone(&tracker);
                        let executed = Arc::clone(&executed);
                        async move {
                            tracker.enter();
                            tokio::task::yield_now().await;
                            executed.fetch_add(1, Ordering::SeqCst);
                            tracker.exit();
                            Ok::<_, std::io::Error>(())
                        }
                    }))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while executed.load(Ordering::SeqCst) < TASKS * PER_TASK && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!("Peak concurrency: {}", tracker.peak());
    assert_eq!(executed.load(Ordering::SeqCst), TASKS * PER_TASK);
    assert_eq!(tracker.peak(), 1);
    assert_eq!(tracker.current(), 0);
}

/// Test: a deep overflow backlog drains completely over many promotion ticks
#[tokio::test(start_paused = true)]
#[ignore]
async fn stress_deep_overflow_backlog() {
    const TOTAL: usize = 50_000;
    const CAPACITY: usize = 79;

    let executed = Arc::new(AtomicUsize::new(0));
    let queue = QueryQueue::builder()
        .name("stress-overflow")
        .max_capacity(CAPACITY)
        .build();
    queue.init().unwrap();

    for _ in 0..TOTAL {
        let executed = Arc::clone(&executed);
        queue
            .submit(operation_fn(move || {
                executed.fetch_add(1, Ordering::Relaxed);
                async { Ok::<_, std::io::Error>(()) }
            }))
            .unwrap();
    }
    assert_eq!(queue.stats().overflow_len, TOTAL - CAPACITY);

    // One full pool per minute of virtual time.
    let minutes = TOTAL.div_ceil(CAPACITY) as u64 + 1;
    tokio::time::sleep(Duration::from_secs(minutes * 60)).await;

    assert_eq!(executed.load(Ordering::Relaxed), TOTAL);
    let stats = queue.stats();
    assert_eq!(stats.overflow_len, 0);
    assert_eq!(stats.primary_len, 0);
}

/// Test: concurrent calls through the tower layer all get their own response
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn stress_layer_responses_are_not_crossed() {
    const CALLS: usize = 10_000;

    let queue = QueryQueue::builder()
        .name("stress-layer")
        .max_capacity(CALLS)
        .build();
    queue.init().unwrap();

    let service = QueryQueueLayer::new(queue).layer(tower::service_fn(|n: usize| async move {
        Ok::<_, String>(n * 2)
    }));

    let mut handles = Vec::with_capacity(CALLS);
    for n in 0..CALLS {
        let service = service.clone();
        handles.push(tokio::spawn(async move { (n, service.oneshot(n).await) }));
    }

    for handle in handles {
        let (n, result) = handle.await.unwrap();
        assert_eq!(result.unwrap(), n * 2);
    }
}
