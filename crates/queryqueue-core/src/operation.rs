//! The operation contract.
//!
//! An [`Operation`] is a deferred, argument-free unit of work. The controller
//! owns it from submission until it either succeeds or runs out of attempts,
//! and calls [`Operation::attempt`] once per attempt. It never looks at what the
//! operation does or what it produces: a collaborator that needs the outcome
//! captures it itself, for example by sending into a channel it owns.
//!
//! ```
//! use queryqueue_core::{Operation, operation_fn};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! # async fn example() {
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//!
//! let mut op = operation_fn(move || {
//!     let counter = Arc::clone(&counter);
//!     async move {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!         Ok::<_, std::io::Error>(())
//!     }
//! });
//!
//! assert!(op.attempt().await.is_ok());
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;

/// Boxed error type carried by a failed attempt.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a single attempt of an operation.
pub type AttemptFuture = BoxFuture<'static, Result<(), OperationError>>;

/// Error produced by one failed attempt of an operation.
///
/// These never leave the controller: they are logged, counted against the
/// operation's retry budget and reported through events.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The attempt resolved with an error.
    #[error("operation failed: {0}")]
    Failed(#[source] BoxError),
    /// The attempt panicked while running.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    /// Wraps any error as a failed attempt.
    pub fn failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        OperationError::Failed(error.into())
    }

    /// Returns `true` if the attempt panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, OperationError::Panicked(_))
    }
}

/// A deferred unit of work that can be attempted repeatedly.
pub trait Operation: Send + 'static {
    /// Starts one attempt.
    ///
    /// Called again, on the same value, for every retry.
    fn attempt(&mut self) -> AttemptFuture;
}

/// Builds an [`Operation`] from a closure returning a future.
///
/// The closure runs once per attempt, so each retry gets a fresh future.
pub fn operation_fn<F, Fut, E>(f: F) -> OperationFn<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    OperationFn { f }
}

/// An [`Operation`] backed by a closure. See [`operation_fn`].
#[derive(Clone)]
pub struct OperationFn<F> {
    f: F,
}

impl<F, Fut, E> Operation for OperationFn<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn attempt(&mut self) -> AttemptFuture {
        (self.f)().map(|result| result.map_err(OperationError::failed)).boxed()
    }
}

impl<F> fmt::Debug for OperationFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFn")
            .field("f", &std::any::type_name::<F>())
            .finish()
    }
}

/// A type-erased, owned operation.
pub struct BoxOperation {
    inner: Box<dyn Operation>,
}

impl BoxOperation {
    /// Erases the concrete type of an operation.
    pub fn new<O>(operation: O) -> Self
    where
        O: Operation,
    {
        Self {
            inner: Box::new(operation),
        }
    }
}

impl Operation for BoxOperation {
    fn attempt(&mut self) -> AttemptFuture {
        self.inner.attempt()
    }
}

impl fmt::Debug for BoxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxOperation").finish_non_exhaustive()
    }
}
