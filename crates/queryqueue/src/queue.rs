//! The shared admission controller handle.

use crate::config::{QueryQueueConfig, QueryQueueConfigBuilder};
use crate::error::QueueError;
use crate::events::QueueEvent;
use crate::state::{Lane, QueueState, QueueStats};
use crate::{drain, scheduler};
use parking_lot::Mutex;
use queryqueue_core::{BoxOperation, Operation};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant as StdInstant;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// State shared between queue handles, the drain loop and the scheduler task.
pub(crate) struct Shared {
    pub(crate) config: QueryQueueConfig,
    pub(crate) state: Mutex<QueueState<BoxOperation>>,
    // Set exactly once by `init`; doubles as the initialized flag.
    runtime: OnceLock<Handle>,
    /// Pinged whenever a new replenishment is scheduled.
    schedule_changed: Arc<Notify>,
    listener_panics: AtomicU64,
}

impl Shared {
    pub(crate) fn emit(&self, event: QueueEvent) {
        let panicked = self.config.event_listeners.emit(&event);
        if panicked == 0 {
            return;
        }
        self.listener_panics.fetch_add(panicked as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        counter!("queryqueue_listener_panics_total", "queue" => self.config.name.clone())
            .increment(panicked as u64);
    }

    /// Spawns a drain loop if none is running and the primary queue has work.
    pub(crate) fn kick(self: &Arc<Self>) {
        let Some(runtime) = self.runtime.get() else {
            return;
        };
        let claimed = self.state.lock().try_begin_drain();
        if claimed {
            runtime.spawn(drain::run(Arc::clone(self)));
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn record_depths(&self, stats: &QueueStats) {
        let name = self.config.name.clone();
        gauge!("queryqueue_available_slots", "queue" => name.clone())
            .set(stats.available_slots as f64);
        gauge!("queryqueue_primary_length", "queue" => name.clone()).set(stats.primary_len as f64);
        gauge!("queryqueue_overflow_length", "queue" => name).set(stats.overflow_len as f64);
    }
}

/// An admission controller for calls to a rate-limited remote API.
///
/// `QueryQueue` is a cheap, cloneable handle: construct one at the
/// composition root, [`init`](QueryQueue::init) it once, and pass clones to
/// every collaborator that issues remote calls.
///
/// Submissions consume a capacity slot and go to the primary queue, which a
/// single drain loop executes in order, retrying each operation up to
/// `max_retries` attempts. Each slot returns to the pool `replenish_delay`
/// after it was taken. Once capacity runs out, submissions wait in an overflow
/// queue; a periodic tick promotes them as slots come back. While overflow
/// holds anything, new submissions join it even if a slot is free, so an
/// earlier submission can run after a later one that found free capacity.
///
/// # Examples
///
/// ```
/// use queryqueue::{QueryQueue, operation_fn};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), queryqueue::QueueError> {
/// let queue = QueryQueue::builder()
///     .name("tournaments")
///     .max_capacity(79)
///     .replenish_delay(Duration::from_secs(60))
///     .build();
/// queue.init()?;
///
/// let (tx, rx) = tokio::sync::oneshot::channel();
/// let mut tx = Some(tx);
/// queue.submit(operation_fn(move || {
///     let tx = tx.take();
///     async move {
///         if let Some(tx) = tx {
///             let _ = tx.send("payload");
///         }
///         Ok::<_, std::io::Error>(())
///     }
/// }))?;
///
/// assert_eq!(rx.await.ok(), Some("payload"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueryQueue {
    shared: Arc<Shared>,
}

impl QueryQueue {
    /// Creates an uninitialized queue from a configuration.
    pub fn new(config: QueryQueueConfig) -> Self {
        let state = QueueState::new(config.max_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                runtime: OnceLock::new(),
                schedule_changed: Arc::new(Notify::new()),
                listener_panics: AtomicU64::new(0),
            }),
        }
    }

    /// Creates an uninitialized queue with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(QueryQueueConfig::default())
    }

    /// Creates a new configuration builder.
    pub fn builder() -> QueryQueueConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "queryqueue_operations_admitted_total",
                    "Total number of operations accepted, by lane"
                );
                describe_counter!(
                    "queryqueue_operations_promoted_total",
                    "Total number of operations moved from overflow to the primary queue"
                );
                describe_counter!(
                    "queryqueue_attempts_total",
                    "Total number of operation attempts, by result"
                );
                describe_counter!(
                    "queryqueue_operations_abandoned_total",
                    "Total number of operations dropped after exhausting retries"
                );
                describe_counter!(
                    "queryqueue_listener_panics_total",
                    "Total number of event listener invocations that panicked"
                );
                describe_gauge!("queryqueue_available_slots", "Free capacity slots");
                describe_gauge!(
                    "queryqueue_primary_length",
                    "Operations waiting in the primary queue"
                );
                describe_gauge!(
                    "queryqueue_overflow_length",
                    "Operations waiting in the overflow queue"
                );
            });
        }
        QueryQueueConfigBuilder::new()
    }

    /// Starts the queue's scheduler on the current tokio runtime.
    ///
    /// Idempotent: only the first successful call has an effect. Queue state
    /// is never reset and the scheduler is never started twice.
    pub fn init(&self) -> Result<(), QueueError> {
        if self.is_initialized() {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| QueueError::RuntimeUnavailable)?;
        if self.shared.runtime.set(runtime.clone()).is_ok() {
            runtime.spawn(scheduler::run(
                Arc::downgrade(&self.shared),
                Arc::clone(&self.shared.schedule_changed),
            ));

            #[cfg(feature = "tracing")]
            debug!(
                queue = %self.shared.config.name,
                max_capacity = self.shared.config.max_capacity,
                "query queue initialized"
            );
        }
        Ok(())
    }

    /// Returns `true` once [`init`](QueryQueue::init) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.shared.runtime.get().is_some()
    }

    /// Submits an operation.
    ///
    /// Returns as soon as the operation is queued; it runs later on the drain
    /// loop. The queue reports nothing about how it turned out, so capture the
    /// result inside the operation if you need it.
    pub fn submit<O>(&self, operation: O) -> Result<(), QueueError>
    where
        O: Operation,
    {
        self.submit_boxed(BoxOperation::new(operation))
    }

    /// Submits an already type-erased operation.
    pub fn submit_boxed(&self, operation: BoxOperation) -> Result<(), QueueError> {
        if !self.is_initialized() {
            return Err(QueueError::Uninitialized);
        }

        let config = &self.shared.config;
        let (lane, stats) = {
            let mut state = self.shared.state.lock();
            let lane = state.admit(operation, Instant::now(), config.replenish_delay);
            (lane, state.stats())
        };

        match lane {
            Lane::Primary => self.shared.schedule_changed.notify_one(),
            Lane::Overflow => {
                #[cfg(feature = "tracing")]
                warn!(
                    queue = %config.name,
                    max_capacity = config.max_capacity,
                    overflow_len = stats.overflow_len,
                    "query queue at capacity, deferring to overflow"
                );

                self.shared.emit(QueueEvent::AtCapacity {
                    controller_name: config.name.clone(),
                    timestamp: StdInstant::now(),
                    max_capacity: config.max_capacity,
                    overflow_len: stats.overflow_len,
                });
            }
        }

        #[cfg(feature = "metrics")]
        {
            counter!(
                "queryqueue_operations_admitted_total",
                "queue" => config.name.clone(),
                "lane" => lane.as_str()
            )
            .increment(1);
            self.shared.record_depths(&stats);
        }

        self.shared.emit(QueueEvent::Admitted {
            controller_name: config.name.clone(),
            timestamp: StdInstant::now(),
            lane,
            primary_len: stats.primary_len,
            overflow_len: stats.overflow_len,
        });

        self.shared.kick();
        Ok(())
    }

    /// Submits a dynamically typed value.
    ///
    /// For work that crossed a type-erased boundary. The value must be a
    /// [`BoxOperation`]; anything else is rejected with
    /// [`QueueError::InvalidOperation`] and nothing is queued.
    pub fn submit_any(&self, value: Box<dyn Any + Send>) -> Result<(), QueueError> {
        match value.downcast::<BoxOperation>() {
            Ok(operation) => self.submit_boxed(*operation),
            Err(_) => Err(QueueError::InvalidOperation),
        }
    }

    /// Returns a snapshot of the queue.
    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats()
    }

    /// Returns the number of operations waiting in the primary queue.
    pub fn len(&self) -> usize {
        self.stats().primary_len
    }

    /// Returns `true` if neither queue holds a waiting operation.
    pub fn is_empty(&self) -> bool {
        let stats = self.stats();
        stats.primary_len == 0 && stats.overflow_len == 0
    }

    /// Returns the number of free capacity slots.
    pub fn available_slots(&self) -> usize {
        self.stats().available_slots
    }

    /// Returns how many event listener invocations have panicked so far.
    ///
    /// Panicking listeners never affect the queue; this only makes them visible.
    pub fn listener_panics(&self) -> u64 {
        self.shared.listener_panics.load(Ordering::Relaxed)
    }

    /// Returns the queue's configuration.
    pub fn config(&self) -> &QueryQueueConfig {
        &self.shared.config
    }

    /// Returns the queue's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }
}

impl Default for QueryQueue {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for QueryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryQueue")
            .field("name", &self.shared.config.name)
            .field("initialized", &self.is_initialized())
            .field("stats", &self.stats())
            .finish()
    }
}
