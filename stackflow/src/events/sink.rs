//! Event sink trait and implementations.

use crate::core::{EventLevel, StageEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Trait for event sinks that can receive events.
///
/// The run context carries one sink; the runner, the parallel combinator and
/// the deploy stages all report through it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &StageEvent);

    /// Tries to emit an event without blocking.
    ///
    /// This method should never fail. Errors are logged but suppressed.
    fn try_emit(&self, event: &StageEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StageEvent) {}

    fn try_emit(&self, _event: &StageEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// The tracing level follows the event level. A [`LoggingEventSink::quiet`]
/// sink logs info events at debug so only outcomes show at the default filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink {
    quiet_info: bool,
}

impl LoggingEventSink {
    /// Creates a logging sink that logs info events at info level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logging sink that logs info events at debug level.
    #[must_use]
    pub fn quiet() -> Self {
        Self { quiet_info: true }
    }

    fn log_event(&self, event: &StageEvent) {
        let data = serde_json::to_string(&event.data).unwrap_or_default();
        match event.level {
            EventLevel::Info if self.quiet_info => {
                debug!(event_type = %event.kind, event_data = %data, "{}", event.message);
            }
            EventLevel::Info | EventLevel::Success => {
                info!(event_type = %event.kind, event_data = %data, "{}", event.render());
            }
            EventLevel::Warning => {
                warn!(event_type = %event.kind, event_data = %data, "{}", event.render());
            }
            EventLevel::Error => {
                error!(event_type = %event.kind, event_data = %data, "{}", event.render());
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StageEvent) {
        self.log_event(event);
    }
}

/// A collecting event sink for testing and post-run reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events matching a kind prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns events at a given level.
    #[must_use]
    pub fn events_at(&self, level: EventLevel) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}

/// An event sink that forwards events over a bounded channel.
///
/// `emit` waits for room in the channel; `try_emit` drops the event when the
/// channel is full and counts the drop. A closed receiver is treated the same
/// as a full one.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<StageEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StageEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Returns how many events were dropped.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, event: &StageEvent) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(event_type = %event.kind, "Event dropped");
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: &StageEvent) {
        if self.tx.send(event.clone()).await.is_err() {
            self.record_drop(event);
        }
    }

    fn try_emit(&self, event: &StageEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            self.record_drop(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit(&StageEvent::info("test", "x")).await;
        sink.try_emit(&StageEvent::error("test", "y"));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::default();
        sink.emit(&StageEvent::success("build.completed", "built api")).await;
        LoggingEventSink::quiet().try_emit(&StageEvent::info("stage.started", "==> build"));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&StageEvent::info("event1", "a")).await;
        sink.try_emit(&StageEvent::warning("event2", "b"));

        assert_eq!(sink.len(), 2);

        let events = sink.events();
        assert_eq!(events[0].kind, "event1");
        assert_eq!(events[1].kind, "event2");
        assert_eq!(sink.events_at(EventLevel::Warning).len(), 1);
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        sink.emit(&StageEvent::info("stage.started", "")).await;
        sink.emit(&StageEvent::info("stage.completed", "")).await;
        sink.emit(&StageEvent::info("parallel.merged", "")).await;

        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.events_of_type("parallel.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_and_drops() {
        let (sink, mut rx) = ChannelEventSink::new(1);

        sink.try_emit(&StageEvent::info("first", "1"));
        sink.try_emit(&StageEvent::info("second", "2"));
        assert_eq!(sink.dropped(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, "first");

        sink.emit(&StageEvent::info("third", "3")).await;
        assert_eq!(rx.recv().await.unwrap().kind, "third");
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver() {
        let (sink, rx) = ChannelEventSink::new(4);
        drop(rx);
        sink.emit(&StageEvent::info("lost", "x")).await;
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_collecting_sink_outside_runtime() {
        let sink = CollectingEventSink::new();
        tokio_test::block_on(sink.emit(&StageEvent::warning("build.skipped", "no build")));
        sink.try_emit(&StageEvent::info("x", "y"));
        assert_eq!(sink.len(), 2);
    }
}
