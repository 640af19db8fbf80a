//! Outbound event stream for UI/notification consumers.
//!
//! Every state change and data/error occurrence in the supervisor and the
//! ingestion pipeline is pushed as one [`Event`] through an injected
//! [`EventSink`]. The core never depends on who is listening; the provided
//! [`BroadcastNotifier`] fans events out to any number of process-internal
//! subscribers, and tests substitute a [`RecordingSink`].

use crate::supervisor::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Maximum number of events buffered per subscriber.
/// Slow consumers lose the oldest events; they never block the supervisor.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Phase of the bounded reconnection policy, carried by
/// [`Event::ReconnectStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconnectPhase {
    /// A retry timer has been armed.
    Scheduled,
    /// A scheduled attempt is firing now.
    Attempting,
    /// The attempt ceiling was reached; no further timers.
    GaveUp,
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// The connection state machine transitioned.
    StatusChanged {
        state: ConnectionState,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Any error, connection-tier or pipeline-tier. Exactly one per error.
    Error { message: String },
    /// The active channel closed without an operator request.
    ConnectionLost { port: String, reconnect_attempts: u32 },
    /// A raw line arrived, before any parsing or validation.
    DataReceived {
        raw: String,
        timestamp: DateTime<Utc>,
        port: String,
    },
    /// Bytes were written to the device.
    DataSent {
        data: String,
        port: String,
        timestamp: DateTime<Utc>,
    },
    /// Progress of the bounded reconnection policy.
    ReconnectStatus {
        status: ReconnectPhase,
        attempts: u32,
        max_attempts: u32,
    },
    /// A live hot-switch between physical ports completed.
    PortSwitched { old_port: String, new_port: String },
    /// The persistence gateway accepted a record.
    PersistenceSuccess { table: String, insert_id: i64 },
    /// Connected but silent past the staleness threshold. Non-fatal.
    StaleData { port: String, silent_for_ms: u64 },
}

/// Consumer seam for the outbound event stream.
///
/// `emit` must not block: implementations queue or drop, they never await.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// [`EventSink`] that fans out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Event>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    /// Subscribe to all events emitted from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastNotifier {
    fn emit(&self, event: Event) {
        // Send errors just mean no active receivers.
        let _ = self.tx.send(event);
    }
}

/// [`EventSink`] that records every event for later inspection in tests.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<parking_lot::Mutex<Vec<Event>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event emitted so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Count events matching a predicate.
    pub fn count_matching(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = Event::PortSwitched {
            old_port: "/dev/ttyUSB0".into(),
            new_port: "/dev/ttyUSB1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "port-switched");
        assert_eq!(json["old_port"], "/dev/ttyUSB0");
        assert_eq!(json["new_port"], "/dev/ttyUSB1");
    }

    #[test]
    fn test_reconnect_phase_serialization() {
        let event = Event::ReconnectStatus {
            status: ReconnectPhase::GaveUp,
            attempts: 5,
            max_attempts: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reconnect-status");
        assert_eq!(json["status"], "gave-up");
    }

    #[tokio::test]
    async fn test_broadcast_notifier_fanout() {
        let notifier = BroadcastNotifier::new();
        let mut rx_a = notifier.subscribe();
        let mut rx_b = notifier.subscribe();

        notifier.emit(Event::Error {
            message: "boom".into(),
        });

        assert!(matches!(rx_a.recv().await, Ok(Event::Error { .. })));
        assert!(matches!(rx_b.recv().await, Ok(Event::Error { .. })));
    }

    #[test]
    fn test_broadcast_without_receivers_is_silent() {
        let notifier = BroadcastNotifier::new();
        // Must not panic or error with zero subscribers
        notifier.emit(Event::Error {
            message: "nobody listening".into(),
        });
    }

    #[test]
    fn test_recording_sink_order() {
        let sink = RecordingSink::new();
        sink.emit(Event::Error { message: "a".into() });
        sink.emit(Event::Error { message: "b".into() });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            Event::Error { message: "a".into() }
        );
    }
}
