//! Connection diagnostics and troubleshooting utilities.
//!
//! [`HubDiagnostics`] is a point-in-time snapshot of a hub suitable for
//! attaching to bug reports. It never contains the API key.
//! [`ConnectionStats`] counts connection lifecycle events seen on the
//! dispatch bus.
//!
//! # Example
//!
//! ```ignore
//! use thermex_core::diagnostics::HubDiagnostics;
//!
//! let diagnostics = HubDiagnostics::collect(&hub);
//! println!("State: {}", diagnostics.connection_state);
//! println!("{}", serde_json::to_string_pretty(&diagnostics)?);
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thermex_types::{ConnectionState, ResponseFrame};

use crate::events::{DisconnectReason, HubEvent};
use crate::hub::Hub;
use crate::util::lock;

/// Number of recent raw frames included in a snapshot.
pub const DIAGNOSTIC_MESSAGES: usize = 5;

/// Counters of connection lifecycle events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Times the hub reported itself connected.
    pub connects: u64,
    /// Times the socket was lost or closed.
    pub disconnects: u64,
    /// Count of disconnection reasons.
    pub disconnection_reasons: BTreeMap<String, u64>,
    /// Number of reconnection attempts.
    pub reconnect_attempts: u64,
    /// Number of successful reconnections.
    pub reconnect_successes: u64,
    /// Number of reconnection runs that gave up.
    pub reconnect_failures: u64,
}

impl ConnectionStats {
    /// Calculate the reconnection success rate as a percentage.
    pub fn reconnect_success_rate(&self) -> f64 {
        let runs = self.reconnect_successes + self.reconnect_failures;
        if runs == 0 {
            0.0
        } else {
            (self.reconnect_successes as f64 / runs as f64) * 100.0
        }
    }
}

fn reason_label(reason: &DisconnectReason) -> &'static str {
    match reason {
        DisconnectReason::UserRequested => "user_requested",
        DisconnectReason::SocketClosed => "socket_closed",
        DisconnectReason::Stale => "stale",
        DisconnectReason::SendFailed(_) => "send_failed",
        DisconnectReason::Error(_) => "error",
    }
}

/// Collects [`ConnectionStats`] from bus events.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    stats: Mutex<ConnectionStats>,
}

impl DiagnosticsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `event` if it is a connection lifecycle event.
    pub fn record(&self, event: &HubEvent) {
        let mut stats = lock(&self.stats);
        match event {
            HubEvent::Connected => stats.connects += 1,
            HubEvent::Disconnected { reason } => {
                stats.disconnects += 1;
                *stats
                    .disconnection_reasons
                    .entry(reason_label(reason).to_string())
                    .or_insert(0) += 1;
            }
            HubEvent::ReconnectStarted { .. } => stats.reconnect_attempts += 1,
            HubEvent::ReconnectSucceeded { .. } => stats.reconnect_successes += 1,
            HubEvent::ReconnectFailed { .. } => stats.reconnect_failures += 1,
            _ => {}
        }
    }

    /// Current counters.
    pub fn stats(&self) -> ConnectionStats {
        lock(&self.stats).clone()
    }

    /// Reset all counters.
    pub fn reset(&self) {
        *lock(&self.stats) = ConnectionStats::default();
    }

    /// Get a summary string suitable for logging.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Connects: {}, Disconnects: {}, Reconnects: {}/{} ({:.1}% success)",
            stats.connects,
            stats.disconnects,
            stats.reconnect_successes,
            stats.reconnect_successes + stats.reconnect_failures,
            stats.reconnect_success_rate(),
        )
    }
}

/// Snapshot of a hub for troubleshooting.
#[derive(Debug, Clone, Serialize)]
pub struct HubDiagnostics {
    /// Device host.
    pub host: String,
    /// Hub unique id.
    pub unique_id: String,
    /// Current lifecycle state.
    pub connection_state: ConnectionState,
    /// Correlation keys of requests awaiting a response.
    pub pending_requests: Vec<String>,
    /// Whether the socket is open.
    pub websocket_connected: bool,
    /// Whether the receive loop is alive.
    pub has_recv_task: bool,
    /// Whether the initial status fan-out completed.
    pub startup_complete: bool,
    /// Negotiated protocol version.
    pub protocol_version: Option<String>,
    /// Last `Status` response.
    pub last_status: Option<ResponseFrame>,
    /// Last recorded error.
    pub last_error: Option<String>,
    /// Most recent raw frames, oldest first.
    pub recent_messages: Vec<String>,
    /// Seconds since the last frame sent or received.
    pub idle_secs: u64,
    /// Lifecycle counters, when a collector is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_stats: Option<ConnectionStats>,
}

impl HubDiagnostics {
    /// Collect a snapshot of `hub`.
    pub fn collect(hub: &Hub) -> Self {
        let mut recent_messages = hub.recent_messages();
        let skip = recent_messages.len().saturating_sub(DIAGNOSTIC_MESSAGES);
        recent_messages.drain(..skip);

        Self {
            host: hub.host().to_string(),
            unique_id: hub.unique_id(),
            connection_state: hub.connection_state(),
            pending_requests: hub.pending_kinds(),
            websocket_connected: hub.is_connected(),
            has_recv_task: hub.is_receiving(),
            startup_complete: hub.startup_complete(),
            protocol_version: hub.protocol_version(),
            last_status: hub.last_status(),
            last_error: hub.last_error(),
            recent_messages,
            idle_secs: hub.idle_time().as_secs(),
            connection_stats: None,
        }
    }

    /// Attach lifecycle counters.
    pub fn with_stats(mut self, stats: ConnectionStats) -> Self {
        self.connection_stats = Some(stats);
        self
    }
}
