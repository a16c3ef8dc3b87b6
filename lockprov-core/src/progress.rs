//! Progress reporting boundary.
//!
//! The provisioner tells the outside world what it is doing through a
//! [`ProgressReporter`]: step pending/success events, raw traffic dumps,
//! lock identity updates and connection changes. Errors are surfaced once
//! through [`ProgressReporter::alert`].

use lockprov_device::{Direction, TrafficSink};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// State of a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Success => write!(f, "success"),
            StepState::Failed => write!(f, "failed"),
        }
    }
}

/// A notification for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Step {
        step: String,
        state: StepState,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Traffic {
        direction: String,
        hex: String,
    },
    LockInfo {
        id: Option<u64>,
        lock_mac: Option<String>,
        imei: Option<String>,
        status: Option<String>,
    },
    Connected {
        connected: bool,
    },
    Alert {
        message: String,
    },
}

impl ProgressEvent {
    pub fn step(step: &str, state: StepState) -> Self {
        ProgressEvent::Step {
            step: step.to_string(),
            state,
            payload: None,
        }
    }

    pub fn traffic(direction: Direction, data: &[u8]) -> Self {
        ProgressEvent::Traffic {
            direction: direction.to_string(),
            hex: hex::encode(data),
        }
    }
}

/// Receives progress notifications.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);

    /// Surfaces an error to the operator.
    fn alert(&self, message: &str) {
        self.report(ProgressEvent::Alert {
            message: message.to_string(),
        });
    }
}

/// Fans progress events out to any number of subscribers.
pub struct BroadcastReporter {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastReporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ProgressReporter for BroadcastReporter {
    fn report(&self, event: ProgressEvent) {
        // No receivers is fine: events are fire-and-forget
        let _ = self.sender.send(event);
    }
}

/// Turns transport traffic into [`ProgressEvent::Traffic`] events.
pub struct TrafficForwarder(pub Arc<dyn ProgressReporter>);

impl TrafficSink for TrafficForwarder {
    fn on_traffic(&self, direction: Direction, data: &[u8]) {
        self.0.report(ProgressEvent::traffic(direction, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let reporter = BroadcastReporter::new(16);
        let mut first = reporter.subscribe();
        let mut second = reporter.subscribe();
        assert_eq!(reporter.subscriber_count(), 2);

        reporter.report(ProgressEvent::step("Requesting csr...", StepState::Pending));

        let expected = ProgressEvent::step("Requesting csr...", StepState::Pending);
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_report_without_subscribers() {
        let reporter = BroadcastReporter::new(4);
        reporter.report(ProgressEvent::Connected { connected: true });
        reporter.alert("nobody listening");
    }

    #[tokio::test]
    async fn test_alert_event() {
        let reporter = BroadcastReporter::new(4);
        let mut rx = reporter.subscribe();
        reporter.alert("device not present");

        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Alert {
                message: "device not present".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_traffic_forwarder_hex() {
        let reporter = Arc::new(BroadcastReporter::new(4));
        let mut rx = reporter.subscribe();
        let forwarder = TrafficForwarder(reporter.clone());

        forwarder.on_traffic(Direction::Send, &[0x5A, 0x5A, 0x00, 0x3E]);

        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::Traffic {
                direction: "Send".to_string(),
                hex: "5a5a003e".to_string()
            }
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::step("Done", StepState::Success);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "step", "step": "Done", "state": "success"})
        );

        let event = ProgressEvent::LockInfo {
            id: Some(7),
            lock_mac: Some("11:22:33:44:55:66".into()),
            imei: None,
            status: Some("Requesting csr...".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "lock_info");
        assert_eq!(value["id"], 7);
        assert!(value["imei"].is_null());
    }
}
