//! Observability for the engine
//!
//! - Structured logging (JSON lines)
//! - Monotonic counters
//! - Typed events
//!
//! Observability is read-only: nothing here affects execution, and a
//! failed log write is swallowed.
//!
//! ```ignore
//! use docmodel::observability::{log_event, Event};
//!
//! log_event(Event::QueryComplete, &[("model", "post"), ("query", "default")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{EngineMetrics, MetricsSnapshot};

/// Log a typed event at its default severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Just verifies no panic
        log_event(Event::QueryStart, &[]);
        log_event(Event::MutationRejected, &[("field", "author")]);
    }
}
