//! Notification-driven runtime accounting.
//!
//! [`RuntimeTracker`] watches `fan` notifications on the dispatch bus and
//! opens or closes runtime sessions on the shared [`RuntimeManager`]
//! accordingly. Every change is persisted straight away.
//!
//! [`RuntimeManager`]: crate::runtime::RuntimeManager

use serde_json::Value;
use thermex_types::{FanSection, Section};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{EventDispatcher, HubEvent};
use crate::runtime::SharedRuntime;

/// Drives a [`SharedRuntime`] from fan notifications.
#[derive(Debug, Clone)]
pub struct RuntimeTracker {
    runtime: SharedRuntime,
}

/// Fan section of a `fan` notification, if it carries any fan state.
///
/// The reset button publishes `{"Fan": {}}` to make adapters refresh; that
/// carries no state and yields `None`.
fn fan_state(event: &HubEvent) -> Option<FanSection> {
    let HubEvent::Notify { kind, data } = event else {
        return None;
    };
    if Section::from_notify_kind(kind) != Some(Section::Fan) {
        return None;
    }
    let fan = Section::Fan.extract(data)?;
    let fields = fan.as_object()?;
    if !fields.contains_key("fanonoff") && !fields.contains_key("fanspeed") {
        return None;
    }
    Some(FanSection::from_value(&Value::Object(fields.clone())))
}

impl RuntimeTracker {
    /// Create a tracker for `runtime`.
    pub fn new(runtime: SharedRuntime) -> Self {
        Self { runtime }
    }

    /// Apply one bus event. Returns whether the runtime state changed.
    pub async fn handle_event(&self, event: &HubEvent) -> Result<bool> {
        match fan_state(event) {
            Some(fan) => self.apply_at(fan, OffsetDateTime::now_utc()).await,
            None => Ok(false),
        }
    }

    /// Apply a fan state observed at `now`.
    ///
    /// Running opens a session (keeping an already open one), remembers the
    /// preset and stamps the first reset time if there is none. Stopped
    /// closes the session. The preset is only remembered while running, so
    /// it always holds the last speed the fan actually ran at.
    pub async fn apply_at(&self, fan: FanSection, now: OffsetDateTime) -> Result<bool> {
        let mut runtime = self.runtime.lock().await;
        let changed = if fan.is_on() {
            let preset = fan.preset();
            let started = !runtime.is_running();
            runtime.start_at(now);
            let preset_changed = runtime.last_preset() != preset;
            runtime.set_last_preset(preset);
            let stamped = runtime.ensure_last_reset_at(now);
            if started {
                debug!("Fan started at preset {}", preset);
            }
            started || preset_changed || stamped
        } else if runtime.is_running() {
            runtime.stop_at(now);
            debug!(
                "Fan stopped, total runtime {:.2} h",
                runtime.data().runtime_hours
            );
            true
        } else {
            false
        };

        if changed {
            runtime.save()?;
        }
        Ok(changed)
    }

    /// Spawn the tracking task. It runs until `cancel` fires or the bus
    /// closes.
    pub fn spawn(self, events: &EventDispatcher, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Runtime tracker cancelled, shutting down");
                        break;
                    }
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            warn!("Failed to persist runtime state: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Runtime tracker lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
