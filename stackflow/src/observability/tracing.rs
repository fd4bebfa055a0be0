//! Tracing subscriber setup and timing helpers.

use crate::config::{LogFormat, LoggingConfig};
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "STACKFLOW_LOG";

/// Builds the filter from `STACKFLOW_LOG`, falling back to the configured directives.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed; the existing one is
/// kept, so calling this more than once is harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    }
    installed
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("build");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "build");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }

    #[test]
    fn test_bad_filter_falls_back() {
        let config = LoggingConfig {
            filter: "not a [valid filter".to_string(),
            format: LogFormat::Pretty,
        };
        // Must not panic whatever STACKFLOW_LOG holds.
        let _ = build_filter(&config);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
