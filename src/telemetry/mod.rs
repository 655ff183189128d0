//! Structured event reporting
//!
//! The registry and the HTTP layer describe what happened as [`LogEvent`]s and
//! hand them to a [`TelemetrySink`]. Sinks are fire-and-forget: `send` never
//! blocks and never reports failure to the caller.

mod http;

pub use http::HttpSink;

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// One structured event.
///
/// Serializes to the collector's wire shape:
/// `{"stack": .., "level": .., "package": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "stack")]
    pub component: String,
    pub level: Level,
    #[serde(rename = "package")]
    pub category: String,
    pub message: String,
}

pub trait TelemetrySink: Send + Sync {
    fn send(&self, event: LogEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn send(&self, _event: LogEvent) {}
}

/// Writes events to the local tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn send(&self, event: LogEvent) {
        emit_locally(&event);
    }
}

pub(crate) fn emit_locally(event: &LogEvent) {
    let LogEvent {
        component,
        level,
        category,
        message,
    } = event;
    match level {
        Level::Debug => tracing::debug!(component = %component, category = %category, "{message}"),
        Level::Info => tracing::info!(component = %component, category = %category, "{message}"),
        Level::Warn => tracing::warn!(component = %component, category = %category, "{message}"),
        Level::Error | Level::Fatal => {
            tracing::error!(component = %component, category = %category, severity = %level, "{message}")
        }
    }
}

/// Keeps every event in memory, in send order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TelemetrySink for MemorySink {
    fn send(&self, event: LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Cheap handle that stamps the component name onto outgoing events.
#[derive(Clone)]
pub struct Telemetry {
    component: Arc<str>,
    sink: Arc<dyn TelemetrySink>,
}

impl Telemetry {
    pub const DEFAULT_COMPONENT: &'static str = "backend";

    pub fn new(component: impl Into<Arc<str>>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            component: component.into(),
            sink,
        }
    }

    /// Local tracing only.
    pub fn local() -> Self {
        Self::new(Self::DEFAULT_COMPONENT, Arc::new(TracingSink))
    }

    pub fn disabled() -> Self {
        Self::new(Self::DEFAULT_COMPONENT, Arc::new(NoopSink))
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn log(&self, level: Level, category: &str, message: impl Into<String>) {
        self.sink.send(LogEvent {
            component: self.component.to_string(),
            level,
            category: category.to_string(),
            message: message.into(),
        });
    }

    pub fn debug(&self, category: &str, message: impl Into<String>) {
        self.log(Level::Debug, category, message);
    }

    pub fn info(&self, category: &str, message: impl Into<String>) {
        self.log(Level::Info, category, message);
    }

    pub fn warn(&self, category: &str, message: impl Into<String>) {
        self.log(Level::Warn, category, message);
    }

    pub fn error(&self, category: &str, message: impl Into<String>) {
        self.log(Level::Error, category, message);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = LogEvent {
            component: "backend".into(),
            level: Level::Warn,
            category: "registry".into(),
            message: "short code conflict".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "stack": "backend",
                "level": "warn",
                "package": "registry",
                "message": "short code conflict",
            })
        );
    }

    #[test]
    fn test_handle_stamps_component() {
        let sink = MemorySink::new();
        let telemetry = Telemetry::new("edge", Arc::new(sink.clone()));

        telemetry.info("handler", "created");
        telemetry.error("registry", "boom");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.component == "edge"));
        assert_eq!(events[0].level, Level::Info);
        assert_eq!(events[1].category, "registry");
    }
}
