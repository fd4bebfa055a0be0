//! Run context for pipeline execution.
//!
//! The [`Context`] travels alongside the [`State`](crate::core::State): the
//! state carries the data, the context carries cancellation, the deadline and
//! the event sink.

mod run;

pub use run::Context;
