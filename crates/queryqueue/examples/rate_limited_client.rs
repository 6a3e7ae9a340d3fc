use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use queryqueue::{QueryQueue, QueryQueueLayer};
use tower::{Layer, Service, ServiceExt};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("queryqueue=debug")),
        )
        .init();

    println!("Rate-limited client example\n");

    // Three calls per second; everything beyond that waits in overflow.
    let queue = QueryQueue::builder()
        .name("tournament-api")
        .max_capacity(3)
        .replenish_delay(Duration::from_secs(1))
        .promotion_interval(Duration::from_millis(100))
        .on_at_capacity(|waiting| println!("  at capacity, {} waiting", waiting))
        .on_promoted(|count| println!("  promoted {} from overflow", count))
        .on_drained(|| println!("  queue drained"))
        .build();
    queue.init()?;

    // A flaky upstream: every third call fails once.
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let upstream = tower::service_fn(move |slug: String| {
        let n = c.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n % 3 == 2 {
                Err(format!("503 for {}", slug))
            } else {
                Ok(format!("{{\"slug\":\"{}\"}}", slug))
            }
        }
    });

    let client = QueryQueueLayer::new(queue.clone()).layer(upstream);

    let mut handles = Vec::new();
    for i in 1..=7 {
        let mut client = client.clone();
        handles.push(tokio::spawn(async move {
            let slug = format!("tournament-{}", i);
            let result = client.ready().await?.call(slug.clone()).await;
            Ok::<_, queryqueue::QueuedServiceError<String>>((slug, result))
        }));
    }

    for handle in handles {
        let (slug, result) = handle.await??;
        match result {
            Ok(body) => println!("{} -> {}", slug, body),
            Err(e) => println!("{} failed: {}", slug, e),
        }
    }

    println!("\nUpstream saw {} calls", calls.load(Ordering::SeqCst));
    println!("Final stats: {:?}", queue.stats());
    Ok(())
}
