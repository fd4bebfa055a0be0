//! Observability utilities.

mod tracing;

pub use self::tracing::{init_tracing, SpanTimer, LOG_ENV_VAR};
