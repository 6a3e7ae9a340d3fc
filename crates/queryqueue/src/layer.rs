//! Tower layer that routes a service's calls through a [`QueryQueue`].

use crate::queue::QueryQueue;
use crate::service::QueuedService;
use tower::Layer;

/// Layer that turns every call of the wrapped service into a queued operation.
///
/// All services built from one layer (and from clones of the same queue) share
/// one capacity pool, so a whole client can be throttled from one place.
///
/// # Examples
///
/// ```
/// use queryqueue::{QueryQueue, QueryQueueLayer};
/// use tower::{Layer, Service, ServiceExt};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = QueryQueue::builder().max_capacity(79).build();
/// queue.init()?;
///
/// let client = tower::service_fn(|slug: String| async move {
///     Ok::<_, std::io::Error>(format!("tournament/{slug}"))
/// });
/// let mut client = QueryQueueLayer::new(queue).layer(client);
///
/// let body = client.ready().await?.call("genesis-9".to_string()).await?;
/// assert_eq!(body, "tournament/genesis-9");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct QueryQueueLayer {
    queue: QueryQueue,
}

impl QueryQueueLayer {
    /// Creates a layer that submits to `queue`.
    pub fn new(queue: QueryQueue) -> Self {
        Self { queue }
    }
}

impl<S> Layer<S> for QueryQueueLayer {
    type Service = QueuedService<S>;

    fn layer(&self, service: S) -> Self::Service {
        QueuedService::new(service, self.queue.clone())
    }
}
