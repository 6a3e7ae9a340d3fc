use crate::events::QueueEvent;
use crate::state::Lane;
use queryqueue_core::events::{EventListener, EventListeners, FnListener};
use std::time::Duration;

/// Default capacity ceiling: operations admitted per replenishment window.
pub const DEFAULT_MAX_CAPACITY: usize = 79;
/// Default delay after which an admitted operation's slot returns to the pool.
pub const DEFAULT_REPLENISH_DELAY: Duration = Duration::from_secs(60);
/// Default number of attempts per operation.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default interval of the overflow promotion tick.
pub const DEFAULT_PROMOTION_INTERVAL: Duration = Duration::from_millis(500);
/// Longest replenishment delay or promotion interval a queue will schedule
/// (30 years). Longer durations are lowered to this.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Configuration for a [`QueryQueue`](crate::QueryQueue).
pub struct QueryQueueConfig {
    pub(crate) name: String,
    pub(crate) max_capacity: usize,
    pub(crate) replenish_delay: Duration,
    pub(crate) max_retries: usize,
    pub(crate) promotion_interval: Duration,
    pub(crate) event_listeners: EventListeners<QueueEvent>,
}

impl QueryQueueConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> QueryQueueConfigBuilder {
        QueryQueueConfigBuilder::new()
    }

    /// Name used in events, logs and metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity ceiling.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Delay between admission and the return of its slot.
    pub fn replenish_delay(&self) -> Duration {
        self.replenish_delay
    }

    /// Attempts per operation, first try included.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Interval of the overflow promotion tick.
    pub fn promotion_interval(&self) -> Duration {
        self.promotion_interval
    }
}

impl Default for QueryQueueConfig {
    fn default() -> Self {
        QueryQueueConfigBuilder::new().into_config()
    }
}

impl std::fmt::Debug for QueryQueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryQueueConfig")
            .field("name", &self.name)
            .field("max_capacity", &self.max_capacity)
            .field("replenish_delay", &self.replenish_delay)
            .field("max_retries", &self.max_retries)
            .field("promotion_interval", &self.promotion_interval)
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`QueryQueueConfig`].
pub struct QueryQueueConfigBuilder {
    name: String,
    max_capacity: usize,
    replenish_delay: Duration,
    max_retries: usize,
    promotion_interval: Duration,
    event_listeners: EventListeners<QueueEvent>,
}

impl Default for QueryQueueConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryQueueConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_capacity: 79
    /// - replenish_delay: 60 seconds
    /// - max_retries: 3
    /// - promotion_interval: 500ms
    /// - name: `"query-queue"`
    pub fn new() -> Self {
        Self {
            name: "query-queue".to_string(),
            max_capacity: DEFAULT_MAX_CAPACITY,
            replenish_delay: DEFAULT_REPLENISH_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            promotion_interval: DEFAULT_PROMOTION_INTERVAL,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name for this queue instance (used in events, logs and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity ceiling.
    ///
    /// At most this many operations are admitted to the primary queue per
    /// `replenish_delay` window; the rest wait in overflow. A ceiling of zero
    /// parks every submission in overflow. There is no upper bound; the pool
    /// is a counter, so a huge ceiling costs nothing until slots are taken.
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets how long after admission a slot returns to the pool.
    ///
    /// The slot comes back after this delay whether or not the operation has
    /// finished running. Delays above [`MAX_TIMER_DELAY`] are lowered to it,
    /// so `Duration::MAX` means a slot is effectively never returned and the
    /// queue admits `max_capacity` operations in total.
    pub fn replenish_delay(mut self, delay: Duration) -> Self {
        self.replenish_delay = delay.min(MAX_TIMER_DELAY);
        self
    }

    /// Sets how many times an operation is attempted before it is abandoned.
    ///
    /// Counts the first attempt. Values below 1 are raised to 1.
    pub fn max_retries(mut self, attempts: usize) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    /// Sets the interval of the overflow promotion tick.
    ///
    /// Intervals shorter than one millisecond are raised to one millisecond;
    /// intervals above [`MAX_TIMER_DELAY`] are lowered to it, which in
    /// practice disables promotion.
    pub fn promotion_interval(mut self, interval: Duration) -> Self {
        self.promotion_interval = interval.clamp(Duration::from_millis(1), MAX_TIMER_DELAY);
        self
    }

    /// Registers a listener for every [`QueueEvent`].
    pub fn event_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<QueueEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback when an operation is admitted.
    ///
    /// # Callback Signature
    /// `Fn(Lane)` - Called with the queue the operation was routed to.
    ///
    /// # Example
    /// ```rust,no_run
    /// use queryqueue::{Lane, QueryQueue};
    ///
    /// let queue = QueryQueue::builder()
    ///     .on_admitted(|lane| {
    ///         if lane == Lane::Overflow {
    ///             println!("deferred until capacity frees up");
    ///         }
    ///     })
    ///     .build();
    /// ```
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(Lane) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Admitted { lane, .. } = event {
                f(*lane);
            }
        }));
        self
    }

    /// Registers a callback when a submission is deferred because the queue
    /// is at capacity.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the overflow length after the deferral.
    pub fn on_at_capacity<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::AtCapacity { overflow_len, .. } = event {
                f(*overflow_len);
            }
        }));
        self
    }

    /// Registers a callback when both queues are empty and the drain loop stops.
    pub fn on_drained<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Drained { .. } = event {
                f();
            }
        }));
        self
    }

    /// Registers a callback when overflow operations are promoted.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the number of operations moved.
    pub fn on_promoted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Promoted { count, .. } = event {
                f(*count);
            }
        }));
        self
    }

    /// Registers a callback when a slot returns to the pool.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the number of free slots afterwards.
    pub fn on_replenished<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Replenished {
                available_slots, ..
            } = event
            {
                f(*available_slots);
            }
        }));
        self
    }

    /// Registers a callback when a single attempt fails.
    ///
    /// # Callback Signature
    /// `Fn(usize, &str)` - Called with the 1-based attempt number and the error text.
    pub fn on_attempt_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::AttemptFailed { attempt, error, .. } = event {
                f(*attempt, error);
            }
        }));
        self
    }

    /// Registers a callback when an operation succeeds.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - Called with the number of attempts it took.
    pub fn on_succeeded<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Succeeded { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when an operation is dropped after its last attempt failed.
    ///
    /// # Callback Signature
    /// `Fn(usize, &str)` - Called with the attempt count and the last error text.
    pub fn on_abandoned<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::Abandoned {
                attempts, error, ..
            } = event
            {
                f(*attempts, error);
            }
        }));
        self
    }

    /// Builds an uninitialized queue.
    ///
    /// Call [`QueryQueue::init`](crate::QueryQueue::init) before submitting.
    pub fn build(self) -> crate::QueryQueue {
        crate::QueryQueue::new(self.into_config())
    }

    fn into_config(self) -> QueryQueueConfig {
        QueryQueueConfig {
            name: self.name,
            max_capacity: self.max_capacity,
            replenish_delay: self.replenish_delay,
            max_retries: self.max_retries,
            promotion_interval: self.promotion_interval,
            event_listeners: self.event_listeners,
        }
    }
}
