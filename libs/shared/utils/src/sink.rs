use std::fmt::Display;

use tracing::warn;

/// Destination for failures of best-effort work that must never reach the caller.
pub trait ErrorSink: Send + Sync {
    fn record(&self, operation: &str, error: &dyn Display);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn record(&self, operation: &str, error: &dyn Display) {
        warn!("Best-effort operation '{}' failed: {}", operation, error);
    }
}

pub trait BestEffort<T> {
    /// Swallows the error into `sink`, keeping the value on success.
    fn or_record(self, sink: &dyn ErrorSink, operation: &str) -> Option<T>;
}

impl<T, E: Display> BestEffort<T> for Result<T, E> {
    fn or_record(self, sink: &dyn ErrorSink, operation: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                sink.record(operation, &e);
                None
            }
        }
    }
}
