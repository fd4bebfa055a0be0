//! Event sink system for observability.
//!
//! Stages and the engine report progress as [`StageEvent`](crate::core::StageEvent)
//! values through the sink carried by the run
//! [`Context`](crate::context::Context).

mod sink;

pub use sink::{
    ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
};
