//! The drain loop: executes primary-queue operations one at a time.

use crate::events::QueueEvent;
use crate::queue::Shared;
use crate::state::DrainStep;
use futures::FutureExt;
use queryqueue_core::events::panic_message;
use queryqueue_core::{BoxOperation, Operation, OperationError};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::{debug, error};

/// Runs until the primary queue is empty.
///
/// The caller must have claimed the loop through `try_begin_drain`; the loop
/// releases the claim in the same critical section that observes the empty
/// queue, so a concurrent submission either sees the loop still running or
/// starts a new one.
pub(crate) async fn run(shared: Arc<Shared>) {
    #[cfg(feature = "tracing")]
    {
        let stats = shared.state.lock().stats();
        debug!(
            queue = %shared.config.name,
            primary_len = stats.primary_len,
            available_slots = stats.available_slots,
            overflow_len = stats.overflow_len,
            "drain loop started"
        );
    }

    loop {
        let step = shared.state.lock().next_step();
        match step {
            DrainStep::Run(operation) => execute(&shared, operation).await,
            DrainStep::Stop { drained } => {
                if drained {
                    shared.emit(QueueEvent::Drained {
                        controller_name: shared.config.name.clone(),
                        timestamp: Instant::now(),
                    });
                }

                #[cfg(feature = "tracing")]
                debug!(queue = %shared.config.name, drained, "drain loop stopped");
                break;
            }
        }
    }
}

/// Attempts one operation up to `max_retries` times, then drops it.
async fn execute(shared: &Shared, mut operation: BoxOperation) {
    let config = &shared.config;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = AssertUnwindSafe(async { operation.attempt().await })
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => {
                #[cfg(feature = "tracing")]
                debug!(queue = %config.name, attempt, "operation executed");

                #[cfg(feature = "metrics")]
                counter!("queryqueue_attempts_total", "queue" => config.name.clone(), "result" => "success")
                    .increment(1);

                shared.emit(QueueEvent::Succeeded {
                    controller_name: config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: attempt,
                });
                return;
            }
            Ok(Err(err)) => err,
            Err(payload) => OperationError::Panicked(panic_message(payload.as_ref())),
        };

        let message = failure.to_string();

        #[cfg(feature = "tracing")]
        error!(
            queue = %config.name,
            attempt,
            max_attempts = config.max_retries,
            error = %message,
            "operation attempt failed"
        );

        #[cfg(feature = "metrics")]
        counter!("queryqueue_attempts_total", "queue" => config.name.clone(), "result" => "failure")
            .increment(1);

        shared.emit(QueueEvent::AttemptFailed {
            controller_name: config.name.clone(),
            timestamp: Instant::now(),
            attempt,
            error: message.clone(),
        });

        if attempt >= config.max_retries {
            #[cfg(feature = "tracing")]
            error!(
                queue = %config.name,
                attempts = attempt,
                "operation abandoned after exhausting retries"
            );

            #[cfg(feature = "metrics")]
            counter!("queryqueue_operations_abandoned_total", "queue" => config.name.clone())
                .increment(1);

            shared.emit(QueueEvent::Abandoned {
                controller_name: config.name.clone(),
                timestamp: Instant::now(),
                attempts: attempt,
                error: message,
            });
            return;
        }
    }
}
