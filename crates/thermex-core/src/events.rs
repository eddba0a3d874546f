//! Dispatch bus for hood notifications and hub lifecycle events.
//!
//! Every configured hood gets one [`EventDispatcher`]. The hub publishes
//! device `Notify` frames and connection changes on it; entity adapters,
//! the runtime tracker and the CLI subscribe.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Notification kind published when the delayed turn-off state changes.
pub const DELAYED_OFF_KIND: &str = "delayed_turn_off";

/// Snapshot of the delayed turn-off helper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedOffState {
    /// Whether a turn-off is scheduled.
    pub active: bool,
    /// Whole minutes left on the countdown.
    pub remaining_minutes: u32,
    /// RFC 3339 time the fan will be switched off.
    pub scheduled_time: Option<String>,
}

/// Events published on the dispatch bus.
///
/// All events are serializable for logging and for the CLI's `watch` output.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HubEvent {
    /// Unsolicited device notification, e.g. kind `fan` with `{"Fan": {...}}`.
    Notify { kind: String, data: Value },
    /// Delayed turn-off was started, ticked, cancelled or fired.
    DelayedOff(DelayedOffState),
    /// The hub authenticated and its receive loop is running.
    Connected,
    /// The socket was lost or closed.
    Disconnected { reason: DisconnectReason },
    /// Reconnection attempt started.
    ReconnectStarted { attempt: u32 },
    /// Reconnection succeeded.
    ReconnectSucceeded { attempts: u32 },
    /// Reconnection gave up.
    ReconnectFailed { attempts: u32, error: String },
}

impl HubEvent {
    /// Build a notify event.
    pub fn notify(kind: impl Into<String>, data: Value) -> Self {
        Self::Notify {
            kind: kind.into(),
            data,
        }
    }

    /// Notification kind, if this is a notify event.
    pub fn notify_kind(&self) -> Option<&str> {
        match self {
            HubEvent::Notify { kind, .. } => Some(kind),
            HubEvent::DelayedOff(_) => Some(DELAYED_OFF_KIND),
            _ => None,
        }
    }
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// `close()` was called.
    UserRequested,
    /// The device closed the socket.
    SocketClosed,
    /// No traffic within the watchdog's connection timeout.
    Stale,
    /// Writing to the socket failed.
    SendFailed(String),
    /// Reading from the socket failed.
    Error(String),
}

/// Sender for hub events.
pub type EventSender = broadcast::Sender<HubEvent>;

/// Receiver for hub events.
pub type EventReceiver = broadcast::Receiver<HubEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: HubEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Publish a device notification.
    pub fn notify(&self, kind: impl Into<String>, data: Value) {
        self.send(HubEvent::notify(kind, data));
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the sender for direct use.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatcher_preserves_order() {
        let bus = EventDispatcher::default();
        let mut rx = bus.subscribe();
        bus.notify("fan", json!({"Fan": {"fanspeed": 1}}));
        bus.notify("light", json!({"Light": {}}));
        bus.send(HubEvent::Connected);

        assert_eq!(rx.recv().await.unwrap().notify_kind(), Some("fan"));
        assert_eq!(rx.recv().await.unwrap().notify_kind(), Some("light"));
        assert_eq!(rx.recv().await.unwrap(), HubEvent::Connected);
    }

    #[test]
    fn test_send_without_receivers() {
        let bus = EventDispatcher::new(4);
        assert_eq!(bus.receiver_count(), 0);
        bus.send(HubEvent::Connected);
    }

    #[test]
    fn test_event_serialization() {
        let event = HubEvent::Disconnected {
            reason: DisconnectReason::Stale,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "disconnected");

        let event = HubEvent::DelayedOff(DelayedOffState {
            active: true,
            remaining_minutes: 5,
            scheduled_time: None,
        });
        assert_eq!(event.notify_kind(), Some(DELAYED_OFF_KIND));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "delayed_off");
        assert_eq!(value["remaining_minutes"], 5);
    }
}
