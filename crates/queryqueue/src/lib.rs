//! Admission control for calls to a rate-limited remote API.
//!
//! A [`QueryQueue`] throttles outbound work against a fixed capacity ceiling.
//! Each submitted [`Operation`] takes a capacity slot and joins the primary
//! queue, which a single drain loop executes in order. Every slot comes back
//! after a fixed delay measured from admission. Work submitted while no slot
//! is free waits in an overflow queue until a periodic promotion tick finds
//! capacity for it. Failed operations are retried in place a bounded number
//! of times and then dropped.
//!
//! # Features
//!
//! - **Capacity pool**: `max_capacity` admissions per `replenish_delay` window
//! - **Overflow queue**: excess work is deferred, never rejected
//! - **Bounded retry**: `max_retries` attempts per operation, panics included
//! - **Event system**: admitted, at-capacity, drained and per-attempt events
//! - **Tower integration**: [`QueryQueueLayer`] queues every call of a service
//!
//! # Ordering
//!
//! Execution is FIFO within the primary queue only. While overflow holds
//! anything, new submissions join it even when a slot is free, and an
//! operation that had to wait in overflow can run after one submitted later.
//!
//! # Capacity
//!
//! A slot returns to the pool `replenish_delay` after admission whether or
//! not its operation has finished. With slow operations this can briefly
//! allow more in-flight work than `max_capacity`.
//!
//! # Examples
//!
//! ```
//! use queryqueue::{QueryQueue, operation_fn};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), queryqueue::QueueError> {
//! let drained = Arc::new(AtomicUsize::new(0));
//! let d = Arc::clone(&drained);
//!
//! let queue = QueryQueue::builder()
//!     .name("tournaments")
//!     .max_capacity(79)
//!     .replenish_delay(Duration::from_secs(60))
//!     .max_retries(3)
//!     .on_at_capacity(|waiting| println!("{waiting} calls waiting for capacity"))
//!     .on_drained(move || {
//!         d.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .build();
//! queue.init()?;
//!
//! queue.submit(operation_fn(|| async {
//!     // issue the remote call here
//!     Ok::<_, std::io::Error>(())
//! }))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `tracing` (default): logs drain-loop activity, overflow routing and failed attempts
//! - `metrics`: exports counters and gauges through the `metrics` facade
//! - `serde`: derives `Serialize` for [`QueueStats`] and [`Lane`]

mod config;
mod drain;
mod error;
mod events;
mod layer;
mod queue;
mod scheduler;
mod service;
mod state;

pub use config::{
    DEFAULT_MAX_CAPACITY, DEFAULT_MAX_RETRIES, DEFAULT_PROMOTION_INTERVAL,
    DEFAULT_REPLENISH_DELAY, MAX_TIMER_DELAY, QueryQueueConfig, QueryQueueConfigBuilder,
};
pub use error::QueueError;
pub use events::QueueEvent;
pub use layer::QueryQueueLayer;
pub use queue::QueryQueue;
pub use service::{QueuedService, QueuedServiceError};
pub use state::{Lane, QueueStats};

pub use queryqueue_core::{
    BoxError, BoxOperation, ControllerEvent, EventListener, FnListener, Operation,
    OperationError, operation_fn,
};
