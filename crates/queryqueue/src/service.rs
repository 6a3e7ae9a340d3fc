//! Service wrapper that executes each call as a queued operation.

use crate::error::QueueError;
use crate::queue::QueryQueue;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use queryqueue_core::{AttemptFuture, Operation, OperationError};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tower::{Service, ServiceExt};

/// Errors returned by a [`QueuedService`].
#[derive(Debug, thiserror::Error)]
pub enum QueuedServiceError<E> {
    /// The queue refused the submission.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Every attempt failed; this is the error of the last one.
    #[error("service error: {0}")]
    Service(E),
    /// The operation was dropped without producing a response, e.g. because
    /// every attempt panicked or the queue itself was dropped.
    #[error("operation abandoned without a response")]
    Abandoned,
}

impl<E> QueuedServiceError<E> {
    /// Extracts the inner service error, if any.
    pub fn into_service_error(self) -> Option<E> {
        match self {
            QueuedServiceError::Service(e) => Some(e),
            _ => None,
        }
    }
}

/// A service whose calls are admitted, throttled and retried by a [`QueryQueue`].
///
/// Built by [`QueryQueueLayer`](crate::QueryQueueLayer). Readiness is always
/// immediate: back-pressure comes from the queue, not from `poll_ready`. The
/// inner service is driven to readiness inside each attempt.
#[derive(Clone)]
pub struct QueuedService<S> {
    inner: S,
    queue: QueryQueue,
}

impl<S> QueuedService<S> {
    pub(crate) fn new(inner: S, queue: QueryQueue) -> Self {
        Self { inner, queue }
    }

    /// Returns the queue this service submits to.
    pub fn queue(&self) -> &QueryQueue {
        &self.queue
    }
}

impl<S: fmt::Debug> fmt::Debug for QueuedService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedService")
            .field("inner", &self.inner)
            .field("queue", &self.queue.name())
            .finish()
    }
}

impl<S, Req> Service<Req> for QueuedService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = QueuedServiceError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let (tx, rx) = oneshot::channel();
        let operation = CallOperation {
            inner: self.inner.clone(),
            request,
            outcome: Arc::new(Mutex::new(Outcome {
                tx: Some(tx),
                last_error: None,
            })),
        };
        let submitted = self.queue.submit(operation);

        Box::pin(async move {
            submitted?;
            match rx.await {
                Ok(result) => result.map_err(QueuedServiceError::Service),
                Err(_) => Err(QueuedServiceError::Abandoned),
            }
        })
    }
}

type Reply<T, E> = oneshot::Sender<Result<T, E>>;

struct Outcome<T, E> {
    tx: Option<Reply<T, E>>,
    last_error: Option<E>,
}

/// One service call, replayed on every attempt.
///
/// Sends the response on success. When the queue drops it after the last
/// failed attempt, the most recent error is sent instead.
struct CallOperation<S, Req, T, E> {
    inner: S,
    request: Req,
    outcome: Arc<Mutex<Outcome<T, E>>>,
}

impl<S, Req> Operation for CallOperation<S, Req, S::Response, S::Error>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    Req: Clone + Send + 'static,
{
    fn attempt(&mut self) -> AttemptFuture {
        let service = self.inner.clone();
        let request = self.request.clone();
        let outcome = Arc::clone(&self.outcome);

        async move {
            match service.oneshot(request).await {
                Ok(response) => {
                    if let Some(tx) = outcome.lock().tx.take() {
                        let _ = tx.send(Ok(response));
                    }
                    Ok(())
                }
                Err(err) => {
                    let failure = OperationError::failed(err.to_string());
                    outcome.lock().last_error = Some(err);
                    Err(failure)
                }
            }
        }
        .boxed()
    }
}

impl<S, Req, T, E> Drop for CallOperation<S, Req, T, E> {
    fn drop(&mut self) {
        let mut outcome = self.outcome.lock();
        if let (Some(tx), Some(err)) = (outcome.tx.take(), outcome.last_error.take()) {
            let _ = tx.send(Err(err));
        }
    }
}
