//! Timer task: due replenishments and the overflow promotion tick.
//!
//! Both timer sources are handled by this one task so that a replenishment
//! and a promotion never interleave.

use crate::events::QueueEvent;
use crate::queue::Shared;
use std::sync::{Arc, Weak};
use std::time::Instant as StdInstant;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

enum Wake {
    Replenish,
    Promote,
    Rescheduled,
}

/// Runs until every [`QueryQueue`](crate::QueryQueue) handle is dropped.
///
/// Only a weak reference is held between wake-ups so the task never keeps the
/// queue alive on its own.
pub(crate) async fn run(shared: Weak<Shared>, schedule_changed: Arc<Notify>) {
    let Some(period) = shared.upgrade().map(|s| s.config.promotion_interval) else {
        return;
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let next_due = match shared.upgrade() {
            Some(shared) => shared.state.lock().next_replenishment(),
            None => break,
        };
        let replenishment = async move {
            match next_due {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let wake = tokio::select! {
            biased;
            _ = replenishment => Wake::Replenish,
            _ = ticker.tick() => Wake::Promote,
            // A submission scheduled a new replenishment; recompute the deadline.
            _ = schedule_changed.notified() => Wake::Rescheduled,
        };

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match wake {
            Wake::Replenish => replenish(&shared),
            Wake::Promote => promote(&shared),
            Wake::Rescheduled => {}
        }
    }

    #[cfg(feature = "tracing")]
    debug!("query queue dropped, scheduler stopped");
}

/// Returns every due slot to the pool and wakes the drain loop.
fn replenish(shared: &Arc<Shared>) {
    let (returned, available_slots) = {
        let mut state = shared.state.lock();
        let returned = state.replenish_due(Instant::now());
        (returned, state.stats().available_slots)
    };
    if returned == 0 {
        return;
    }

    #[cfg(feature = "tracing")]
    trace!(queue = %shared.config.name, returned, available_slots, "slots replenished");

    #[cfg(feature = "metrics")]
    metrics::gauge!("queryqueue_available_slots", "queue" => shared.config.name.clone())
        .set(available_slots as f64);

    let first = (available_slots + 1).saturating_sub(returned);
    for available in first..=available_slots {
        shared.emit(QueueEvent::Replenished {
            controller_name: shared.config.name.clone(),
            timestamp: StdInstant::now(),
            available_slots: available,
        });
    }

    shared.kick();
}

/// Moves overflow operations into the primary queue as far as capacity allows.
fn promote(shared: &Arc<Shared>) {
    let config = &shared.config;
    let (count, stats) = {
        let mut state = shared.state.lock();
        let count = state.promote(Instant::now(), config.replenish_delay);
        (count, state.stats())
    };
    if count == 0 {
        return;
    }

    #[cfg(feature = "tracing")]
    debug!(
        queue = %config.name,
        count,
        available_slots = stats.available_slots,
        overflow_len = stats.overflow_len,
        "promoted overflow operations"
    );

    #[cfg(feature = "metrics")]
    {
        counter!("queryqueue_operations_promoted_total", "queue" => config.name.clone())
            .increment(count as u64);
        shared.record_depths(&stats);
    }

    shared.emit(QueueEvent::Promoted {
        controller_name: config.name.clone(),
        timestamp: StdInstant::now(),
        count,
        overflow_len: stats.overflow_len,
    });

    shared.kick();
}
