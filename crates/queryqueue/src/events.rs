use crate::state::Lane;
use queryqueue_core::events::ControllerEvent;
use std::time::Instant;

/// Events published by a [`QueryQueue`](crate::QueryQueue).
///
/// All events are informational. The completion of an individual operation is
/// never signalled to the submitter through this channel.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// An operation was accepted, either into the primary queue or into overflow.
    Admitted {
        controller_name: String,
        timestamp: Instant,
        lane: Lane,
        primary_len: usize,
        overflow_len: usize,
    },
    /// An operation was deferred to overflow because the queue is at capacity.
    AtCapacity {
        controller_name: String,
        timestamp: Instant,
        max_capacity: usize,
        overflow_len: usize,
    },
    /// Both queues are empty and the drain loop stopped.
    Drained {
        controller_name: String,
        timestamp: Instant,
    },
    /// Overflow operations were moved into the primary queue.
    Promoted {
        controller_name: String,
        timestamp: Instant,
        count: usize,
        overflow_len: usize,
    },
    /// A capacity slot returned to the pool.
    Replenished {
        controller_name: String,
        timestamp: Instant,
        available_slots: usize,
    },
    /// One attempt of an operation failed.
    AttemptFailed {
        controller_name: String,
        timestamp: Instant,
        attempt: usize,
        error: String,
    },
    /// An operation completed successfully.
    Succeeded {
        controller_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// An operation failed on every attempt and was dropped.
    Abandoned {
        controller_name: String,
        timestamp: Instant,
        attempts: usize,
        error: String,
    },
}

impl ControllerEvent for QueueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::Admitted { .. } => "Admitted",
            QueueEvent::AtCapacity { .. } => "AtCapacity",
            QueueEvent::Drained { .. } => "Drained",
            QueueEvent::Promoted { .. } => "Promoted",
            QueueEvent::Replenished { .. } => "Replenished",
            QueueEvent::AttemptFailed { .. } => "AttemptFailed",
            QueueEvent::Succeeded { .. } => "Succeeded",
            QueueEvent::Abandoned { .. } => "Abandoned",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            QueueEvent::Admitted { timestamp, .. }
            | QueueEvent::AtCapacity { timestamp, .. }
            | QueueEvent::Drained { timestamp, .. }
            | QueueEvent::Promoted { timestamp, .. }
            | QueueEvent::Replenished { timestamp, .. }
            | QueueEvent::AttemptFailed { timestamp, .. }
            | QueueEvent::Succeeded { timestamp, .. }
            | QueueEvent::Abandoned { timestamp, .. } => *timestamp,
        }
    }

    fn controller_name(&self) -> &str {
        match self {
            QueueEvent::Admitted {
                controller_name, ..
            }
            | QueueEvent::AtCapacity {
                controller_name, ..
            }
            | QueueEvent::Drained {
                controller_name, ..
            }
            | QueueEvent::Promoted {
                controller_name, ..
            }
            | QueueEvent::Replenished {
                controller_name, ..
            }
            | QueueEvent::AttemptFailed {
                controller_name, ..
            }
            | QueueEvent::Succeeded {
                controller_name, ..
            }
            | QueueEvent::Abandoned {
                controller_name, ..
            } => controller_name,
        }
    }
}
