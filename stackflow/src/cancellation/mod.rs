//! Cooperative cancellation.
//!
//! [`CancellationToken`] is the flag behind every run
//! [`Context`](crate::context::Context). Parallel branches get child tokens so
//! a failing branch can stop its siblings without touching the caller.

mod token;

pub use token::{CancelCallback, CancellationToken};
