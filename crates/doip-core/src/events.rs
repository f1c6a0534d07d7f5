//! Event Sink: structured records describing notable server activity.
//!
//! The core never blocks on this — it always emits through `tracing` first
//! (so a developer tailing logs sees everything) and only best-effort
//! mirrors the same information onto a broadcast channel for an embedding
//! application to subscribe to.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Severity of an emitted event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Which subsystem an event record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Transport,
    Protocol,
    Uds,
    Lifecycle,
}

/// One structured record describing something the server did or observed.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Present for connection-scoped events (accept, disconnect, write
    /// failure); absent for server-wide events (start/stop).
    pub peer: Option<SocketAddr>,
}

impl EventRecord {
    pub fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            category,
            message: message.into(),
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

/// Channel capacity for the event broadcast stream, matching the capacity
/// used for incoming-message broadcasting elsewhere in this stack.
const SINK_CAPACITY: usize = 256;

/// Broadcast-backed event sink. Cloning shares the same underlying channel;
/// every clone's `subscribe()` sees every record emitted from any clone.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EventRecord>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SINK_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future event records. Each subscriber gets its own
    /// receiver; a full channel drops the oldest unread record for that
    /// subscriber rather than blocking the sender.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }

    /// Emit a record. Non-blocking: if there are no subscribers the send
    /// simply fails silently, which is expected and not an error.
    pub fn emit(&self, record: EventRecord) {
        let _ = self.tx.send(record);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_records() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();

        sink.emit(EventRecord::new(
            Severity::Info,
            Category::Lifecycle,
            "server started",
        ));

        let record = rx.recv().await.unwrap();
        assert_eq!(record.message, "server started");
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.peer, None);
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let sink = EventSink::new();
        sink.emit(EventRecord::new(Severity::Warn, Category::Transport, "no one listening"));
    }
}
