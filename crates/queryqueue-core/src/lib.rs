//! Core contract for queryqueue.
//!
//! This crate holds the pieces shared between the admission controller and
//! the code that feeds it:
//! - [`Operation`], the deferred unit of work a collaborator hands over
//! - [`OperationError`], the outcome of a failed attempt
//! - the event system used for lifecycle notifications

pub mod events;
pub mod operation;

pub use events::{ControllerEvent, EventListener, EventListeners, FnListener};
pub use operation::{
    AttemptFuture, BoxError, BoxOperation, Operation, OperationError, OperationFn, operation_fn,
};
