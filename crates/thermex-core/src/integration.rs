//! Per-entry wiring of hub, runtime accounting and entities.
//!
//! An [`Integration`] owns everything that belongs to one configured hood:
//! the dispatch bus, the [`Hub`], the runtime manager and its tracker, the
//! delayed turn-off helper, every entity adapter, and the event router that
//! feeds bus events to the entities. Dependencies are passed in explicitly;
//! there is no global registry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thermex_core::{EntryConfig, EntryOptions, Integration};
//! use thermex_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Store::open_default()?);
//!     let config = EntryConfig::new("kitchen", "192.168.1.40", "1234");
//!     let integration = Integration::setup(config, EntryOptions::default(), store).await?;
//!
//!     integration.entities().fan.turn_on(None).await?;
//!     integration.unload().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thermex_store::Store;
use thermex_types::DEFAULT_PORT;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::button::{DelayedTurnOffButton, ResetRuntimeButton};
use crate::delayed_off::{DelayedOff, MAX_DELAY_MINUTES, MIN_DELAY_MINUTES};
use crate::diagnostics::{DiagnosticsCollector, HubDiagnostics};
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::fan::FanEntity;
use crate::hub::{DEFAULT_CONNECTION_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, Hub, HubConfig};
use crate::light::{DecoLight, Light};
use crate::runtime::{RuntimeManager, SharedRuntime};
use crate::sensor::{
    ConnectionStateSensor, DelayedOffTimeSensor, FilterAlert, RuntimeMetric, RuntimeSensor,
};
use crate::thresholds::{DEFAULT_ALERT_DAYS, DEFAULT_ALERT_HOURS, FilterThresholds};
use crate::tracker::RuntimeTracker;
use crate::traits::{Entity, EntitySnapshot};
use crate::transport::{Connector, TungsteniteConnector};
use crate::util::lock;

/// Default delay used by the delayed turn-off button.
pub const DEFAULT_DELAYED_OFF_MINUTES: u32 = 30;

/// Connection data of one configured hood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Identifier of the entry; keys the persisted runtime state.
    pub entry_id: String,
    /// Hostname or IP address of the hood.
    pub host: String,
    /// API key (the hood's pairing code).
    pub api_key: String,
    /// WebSocket port; the hood default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl EntryConfig {
    /// Create an entry on the default port.
    pub fn new(
        entry_id: impl Into<String>,
        host: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            host: host.into(),
            api_key: api_key.into(),
            port: None,
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Hub configuration for this entry with `options` applied.
    pub fn hub_config(&self, options: &EntryOptions) -> HubConfig {
        HubConfig::new(&self.host, &self.api_key)
            .port(self.port.unwrap_or(DEFAULT_PORT))
            .heartbeat_interval(Duration::from_secs(options.heartbeat_interval))
            .connection_timeout(Duration::from_secs(options.connection_timeout))
    }
}

/// User-tunable options of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryOptions {
    /// Expose the decorative RGB light.
    pub enable_decolight: bool,
    /// Runtime hours before the filter alert turns on.
    pub fan_alert_hours: u32,
    /// Days since reset before the filter alert turns on.
    pub fan_alert_days: u32,
    /// Delay of the delayed turn-off button, in minutes.
    pub delayed_off_minutes: u32,
    /// Seconds between watchdog heartbeats.
    pub heartbeat_interval: u64,
    /// Seconds without traffic before the connection counts as stale.
    pub connection_timeout: u64,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            enable_decolight: false,
            fan_alert_hours: DEFAULT_ALERT_HOURS,
            fan_alert_days: DEFAULT_ALERT_DAYS,
            delayed_off_minutes: DEFAULT_DELAYED_OFF_MINUTES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT.as_secs(),
        }
    }
}

impl EntryOptions {
    /// Filter alert thresholds.
    pub fn thresholds(&self) -> FilterThresholds {
        FilterThresholds::new(self.fan_alert_hours, self.fan_alert_days)
    }

    /// Check the options for values the entry cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_DELAY_MINUTES..=MAX_DELAY_MINUTES).contains(&self.delayed_off_minutes) {
            return Err(Error::invalid_config(format!(
                "delayed_off_minutes must be between {} and {}, got {}",
                MIN_DELAY_MINUTES, MAX_DELAY_MINUTES, self.delayed_off_minutes
            )));
        }
        if self.heartbeat_interval == 0 {
            return Err(Error::invalid_config("heartbeat_interval must be > 0"));
        }
        if self.connection_timeout <= self.heartbeat_interval {
            return Err(Error::invalid_config(
                "connection_timeout must be longer than heartbeat_interval",
            ));
        }
        Ok(())
    }
}

/// Every entity of one entry.
#[derive(Debug, Clone)]
pub struct Entities {
    /// Extractor fan.
    pub fan: Arc<FanEntity>,
    /// Main light.
    pub light: Arc<Light>,
    /// Deco light, when enabled.
    pub decolight: Option<Arc<DecoLight>>,
    /// Runtime hours, last reset, filter time and days since reset.
    pub runtime_sensors: Vec<Arc<RuntimeSensor>>,
    /// Connection state (diagnostic).
    pub connection_state: Arc<ConnectionStateSensor>,
    /// Delayed turn-off scheduled time.
    pub delayed_off_time: Arc<DelayedOffTimeSensor>,
    /// Filter alert.
    pub filter_alert: Arc<FilterAlert>,
    /// Reset runtime button.
    pub reset_runtime: Arc<ResetRuntimeButton>,
    /// Delayed turn-off button.
    pub delayed_turn_off: Arc<DelayedTurnOffButton>,
}

impl Entities {
    fn build(
        hub: &Hub,
        runtime: &SharedRuntime,
        delayed_off: &DelayedOff,
        options: &EntryOptions,
    ) -> Self {
        let thresholds = options.thresholds();
        let fan = Arc::new(FanEntity::new(
            hub.clone(),
            runtime.clone(),
            delayed_off.clone(),
            thresholds,
        ));
        Self {
            light: Arc::new(Light::new(hub.clone())),
            decolight: options
                .enable_decolight
                .then(|| Arc::new(DecoLight::new(hub.clone()))),
            runtime_sensors: RuntimeMetric::ALL
                .into_iter()
                .map(|metric| Arc::new(RuntimeSensor::new(hub, metric, runtime.clone())))
                .collect(),
            connection_state: Arc::new(ConnectionStateSensor::new(hub.clone())),
            delayed_off_time: Arc::new(DelayedOffTimeSensor::new(hub, delayed_off.clone())),
            filter_alert: Arc::new(FilterAlert::new(hub, runtime.clone(), thresholds)),
            reset_runtime: Arc::new(ResetRuntimeButton::new(hub, runtime.clone())),
            delayed_turn_off: Arc::new(DelayedTurnOffButton::new(
                hub,
                fan.clone(),
                options.delayed_off_minutes,
            )),
            fan,
        }
    }

    /// All entities as trait objects.
    pub fn all(&self) -> Vec<Arc<dyn Entity>> {
        let mut all: Vec<Arc<dyn Entity>> = vec![self.fan.clone(), self.light.clone()];
        if let Some(deco) = &self.decolight {
            all.push(deco.clone());
        }
        all.extend(
            self.runtime_sensors
                .iter()
                .map(|sensor| sensor.clone() as Arc<dyn Entity>),
        );
        all.push(self.connection_state.clone());
        all.push(self.delayed_off_time.clone());
        all.push(self.filter_alert.clone());
        all.push(self.reset_runtime.clone());
        all.push(self.delayed_turn_off.clone());
        all
    }
}

/// One set-up hood.
pub struct Integration {
    config: EntryConfig,
    options: EntryOptions,
    hub: Hub,
    runtime: SharedRuntime,
    delayed_off: DelayedOff,
    entities: Entities,
    collector: Arc<DiagnosticsCollector>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("entry_id", &self.config.entry_id)
            .field("hub", &self.hub)
            .field("options", &self.options)
            .finish()
    }
}

impl Integration {
    /// Set up an entry talking to a real hood.
    pub async fn setup(
        config: EntryConfig,
        options: EntryOptions,
        store: Arc<Store>,
    ) -> Result<Self> {
        Self::setup_with_connector(config, options, store, Arc::new(TungsteniteConnector::new()))
            .await
    }

    /// Set up an entry with a custom connector.
    ///
    /// Runtime state is loaded and the tracker and event router are running
    /// before the hub connects, so the initial status is seen by every
    /// entity. A failed connect tears everything down again and is returned.
    pub async fn setup_with_connector(
        config: EntryConfig,
        options: EntryOptions,
        store: Arc<Store>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        options.validate()?;
        info!("Setting up Thermex entry {} ({})", config.entry_id, config.host);

        let events = EventDispatcher::default();
        let hub = Hub::with_connector(config.hub_config(&options), connector, events.clone())?;

        let mut manager = RuntimeManager::new(store, &config.entry_id);
        manager.load()?;
        let runtime = manager.into_shared();

        let delayed_off = DelayedOff::new(events.clone());
        let entities = Entities::build(&hub, &runtime, &delayed_off, &options);
        let collector = Arc::new(DiagnosticsCollector::new());
        let cancel = CancellationToken::new();

        let tracker = RuntimeTracker::new(runtime.clone()).spawn(&events, cancel.clone());
        let router = spawn_router(
            &events,
            entities.all(),
            collector.clone(),
            cancel.clone(),
        );

        let integration = Self {
            config,
            options,
            hub,
            runtime,
            delayed_off,
            entities,
            collector,
            cancel,
            tasks: Mutex::new(vec![tracker, router]),
        };

        if let Err(e) = integration.hub.connect().await {
            warn!(
                "Setup of {} failed, unloading: {}",
                integration.config.entry_id, e
            );
            integration.unload().await;
            return Err(e);
        }
        Ok(integration)
    }

    /// Entry configuration.
    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    /// Entry options.
    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    /// The hub.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Shared runtime manager.
    pub fn runtime(&self) -> &SharedRuntime {
        &self.runtime
    }

    /// Entity adapters.
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Snapshots of every entity.
    pub async fn snapshots(&self) -> Vec<EntitySnapshot> {
        let mut snapshots = Vec::new();
        for entity in self.entities.all() {
            snapshots.push(entity.snapshot().await);
        }
        snapshots
    }

    /// Diagnostics snapshot including lifecycle counters.
    pub fn diagnostics(&self) -> HubDiagnostics {
        HubDiagnostics::collect(&self.hub).with_stats(self.collector.stats())
    }

    /// Whether [`unload`](Self::unload) has run.
    pub fn is_unloaded(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop background tasks, cancel the delayed turn-off, persist runtime
    /// state and close the hub. Safe to call more than once.
    pub async fn unload(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("Unloading Thermex entry {}", self.config.entry_id);
        self.delayed_off.cancel();
        self.cancel.cancel();

        let tasks: Vec<_> = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            let _ = task.await;
        }

        if let Err(e) = self.runtime.lock().await.save() {
            warn!("Failed to save runtime state on unload: {}", e);
        }
        self.hub.close().await;
    }
}

/// Feed every bus event to every entity until `cancel` fires.
fn spawn_router(
    events: &EventDispatcher,
    entities: Vec<Arc<dyn Entity>>,
    collector: Arc<DiagnosticsCollector>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => {
                    collector.record(&event);
                    for entity in &entities {
                        if entity.handle_event(&event) {
                            debug!("Entity {} updated", entity.unique_id());
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event router lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = EntryOptions::default();
        assert!(!options.enable_decolight);
        assert_eq!(options.fan_alert_hours, 30);
        assert_eq!(options.fan_alert_days, 90);
        assert_eq!(options.delayed_off_minutes, 30);
        assert_eq!(options.heartbeat_interval, 30);
        assert_eq!(options.connection_timeout, 120);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_partial_deserialize() {
        let options: EntryOptions =
            serde_json::from_str(r#"{"enable_decolight": true, "fan_alert_hours": 12}"#).unwrap();
        assert!(options.enable_decolight);
        assert_eq!(options.fan_alert_hours, 12);
        assert_eq!(options.fan_alert_days, 90);
    }

    #[test]
    fn test_options_validation() {
        let options = EntryOptions {
            delayed_off_minutes: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = EntryOptions {
            connection_timeout: 10,
            heartbeat_interval: 30,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_hub_config_from_entry() {
        let entry = EntryConfig::new("e1", "10.0.0.5", "key").port(8080);
        let options = EntryOptions {
            heartbeat_interval: 15,
            ..Default::default()
        };
        let config = entry.hub_config(&options);
        assert_eq!(config.url(), "ws://10.0.0.5:8080/api");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));

        let config = EntryConfig::new("e1", "10.0.0.5", "key").hub_config(&options);
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
