use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use super::{emit_locally, LogEvent, TelemetrySink};

/// Ships events to a remote collector over HTTP.
///
/// `send` only enqueues onto a bounded channel; a background task drains it
/// and POSTs each event as JSON. Anything that cannot be delivered (full
/// buffer, closed channel, network or status error) is written to the local
/// tracing subscriber instead.
pub struct HttpSink {
    tx: mpsc::Sender<LogEvent>,
}

impl HttpSink {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        endpoint: impl Into<String>,
        buffer_size: usize,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, rx) = mpsc::channel(buffer_size.max(1));

        let delivery = Delivery {
            client,
            endpoint: endpoint.into(),
            receiver: rx,
        };
        tokio::spawn(delivery.run());

        Ok(Self { tx })
    }
}

impl TelemetrySink for HttpSink {
    fn send(&self, event: LogEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Telemetry buffer full, dropping event");
                emit_locally(&event);
            }
            Err(TrySendError::Closed(event)) => {
                emit_locally(&event);
            }
        }
    }
}

struct Delivery {
    client: reqwest::Client,
    endpoint: String,
    receiver: mpsc::Receiver<LogEvent>,
}

impl Delivery {
    async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if let Err(e) = self.post(&event).await {
                error!(endpoint = %self.endpoint, error = %e, "could not deliver telemetry event");
                emit_locally(&event);
            }
        }
        debug!("Telemetry channel closed, delivery task exiting");
    }

    async fn post(&self, event: &LogEvent) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Level;
    use std::time::Instant;

    fn event(message: &str) -> LogEvent {
        LogEvent {
            component: "backend".into(),
            level: Level::Info,
            category: "registry".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_send_never_blocks_on_unreachable_collector() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let sink = HttpSink::new("http://127.0.0.1:9/logs", 4, Duration::from_millis(200)).unwrap();

        let start = Instant::now();
        for i in 0..100 {
            sink.send(event(&format!("event {i}")));
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_after_receiver_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = HttpSink { tx };

        // Falls back to local logging without panicking.
        sink.send(event("orphaned"));
    }
}
