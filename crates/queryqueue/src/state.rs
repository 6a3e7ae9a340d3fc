//! Queue bookkeeping: capacity pool, primary and overflow queues, pending
//! replenishments and the drain flag.
//!
//! Everything here is synchronous and clock-agnostic; callers pass `now` in.
//! The async layer holds this behind a single lock, so every transition below
//! is atomic with respect to submissions, timer callbacks and the drain loop.
//!
//! Invariant: `available_slots + pending_replenishments == max_capacity`.

use crate::config::MAX_TIMER_DELAY;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Which queue a submission was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Lane {
    /// Admitted directly; a capacity slot was consumed.
    Primary,
    /// Deferred until a promotion tick finds free capacity.
    Overflow,
}

impl Lane {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Primary => "primary",
            Lane::Overflow => "overflow",
        }
    }
}

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QueueStats {
    /// Capacity ceiling.
    pub max_capacity: usize,
    /// Slots currently free.
    pub available_slots: usize,
    /// Operations waiting in the primary queue (excludes the one executing).
    pub primary_len: usize,
    /// Operations waiting in overflow.
    pub overflow_len: usize,
    /// Slots scheduled to return to the pool.
    pub pending_replenishments: usize,
    /// Whether a drain loop is running.
    pub processing: bool,
}

/// What the drain loop should do next.
#[derive(Debug)]
pub(crate) enum DrainStep<T> {
    /// Execute this item.
    Run(T),
    /// Primary queue is empty; the loop has stopped. `drained` is set when
    /// overflow is empty too.
    Stop { drained: bool },
}

#[derive(Debug)]
pub(crate) struct QueueState<T> {
    max_capacity: usize,
    available_slots: usize,
    primary: VecDeque<T>,
    overflow: VecDeque<T>,
    // Admission times are monotonic and the delay is fixed, so this stays sorted.
    replenish_at: VecDeque<Instant>,
    processing: bool,
}

impl<T> QueueState<T> {
    pub(crate) fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            available_slots: max_capacity,
            primary: VecDeque::new(),
            overflow: VecDeque::new(),
            replenish_at: VecDeque::new(),
            processing: false,
        }
    }

    /// Routes a submission.
    ///
    /// Goes to the primary queue only when a slot is free and overflow is
    /// empty; once overflow holds anything, every submission joins it.
    pub(crate) fn admit(&mut self, item: T, now: Instant, replenish_delay: Duration) -> Lane {
        if self.available_slots > 0 && self.overflow.is_empty() {
            self.take_slot(now, replenish_delay);
            self.primary.push_back(item);
            Lane::Primary
        } else {
            self.overflow.push_back(item);
            Lane::Overflow
        }
    }

    /// Moves up to `available_slots` items from overflow to primary, keeping
    /// their order. Returns how many moved.
    pub(crate) fn promote(&mut self, now: Instant, replenish_delay: Duration) -> usize {
        let count = self.available_slots.min(self.overflow.len());
        for _ in 0..count {
            if let Some(item) = self.overflow.pop_front() {
                self.take_slot(now, replenish_delay);
                self.primary.push_back(item);
            }
        }
        count
    }

    /// Returns every slot whose replenishment is due at `now`. Returns how many
    /// came back.
    pub(crate) fn replenish_due(&mut self, now: Instant) -> usize {
        let mut returned = 0;
        while let Some(&due) = self.replenish_at.front() {
            if due > now {
                break;
            }
            self.replenish_at.pop_front();
            self.available_slots = (self.available_slots + 1).min(self.max_capacity);
            returned += 1;
        }
        returned
    }

    /// Earliest pending replenishment, if any.
    pub(crate) fn next_replenishment(&self) -> Option<Instant> {
        self.replenish_at.front().copied()
    }

    /// Claims the drain loop. Returns `false` if one is already running or
    /// there is nothing in the primary queue to run.
    pub(crate) fn try_begin_drain(&mut self) -> bool {
        if self.processing || self.primary.is_empty() {
            return false;
        }
        self.processing = true;
        true
    }

    /// Pops the next item for the running drain loop, or releases the loop.
    pub(crate) fn next_step(&mut self) -> DrainStep<T> {
        match self.primary.pop_front() {
            Some(item) => DrainStep::Run(item),
            None => {
                self.processing = false;
                DrainStep::Stop {
                    drained: self.overflow.is_empty(),
                }
            }
        }
    }

    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats {
            max_capacity: self.max_capacity,
            available_slots: self.available_slots,
            primary_len: self.primary.len(),
            overflow_len: self.overflow.len(),
            pending_replenishments: self.replenish_at.len(),
            processing: self.processing,
        }
    }

    fn take_slot(&mut self, now: Instant, replenish_delay: Duration) {
        self.available_slots -= 1;
        let due = now
            .checked_add(replenish_delay)
            .or_else(|| now.checked_add(MAX_TIMER_DELAY))
            .unwrap_or(now);
        self.replenish_at.push_back(due);
    }
}
