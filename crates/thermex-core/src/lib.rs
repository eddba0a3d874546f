//! Core library for Thermex extractor hoods with the ESP WebSocket API.
//!
//! This crate talks to a Thermex hood over its local WebSocket API
//! (`ws://<host>:9999/api`), keeps the session healthy, accounts fan
//! runtime for filter maintenance and exposes the hood as a set of
//! entities.
//!
//! # Features
//!
//! - **Hub**: authenticated WebSocket session with request/response
//!   correlation, timeout retry, reconnection and a heartbeat watchdog
//! - **Dispatch bus**: device notifications and connection events fanned out
//!   to any number of subscribers
//! - **Runtime accounting**: persistent fan runtime hours with reset tracking
//! - **Delayed turn-off**: cancelable countdown that switches the fan off
//! - **Entities**: fan, lights, runtime sensors, filter alert and buttons
//! - **Diagnostics**: redacted session snapshots and lifecycle counters
//! - **Mock hood**: in-memory device for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use thermex_core::{EventDispatcher, Hub, HubConfig};
//! use thermex_types::{FanSection, Preset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let events = EventDispatcher::default();
//!     let hub = Hub::new(HubConfig::new("192.168.1.40", "1234"), events.clone())?;
//!     hub.connect().await?;
//!
//!     let status = hub.request_status().await?;
//!     println!("Status: {}", status.data);
//!
//!     hub.update(FanSection::for_preset(Preset::High).to_update()).await?;
//!     hub.close().await;
//!     Ok(())
//! }
//! ```

pub mod button;
pub mod delayed_off;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fan;
pub mod hub;
pub mod integration;
pub mod light;
pub mod mock;
pub mod reconnect;
pub mod runtime;
pub mod sensor;
pub mod thresholds;
pub mod timer;
pub mod tracker;
pub mod traits;
pub mod transport;
pub mod util;

// Core exports
pub use error::{ConnectionFailureReason, Error, Result};
pub use hub::{DeviceInfo, Hub, HubConfig};
pub use integration::{Entities, EntryConfig, EntryOptions, Integration};

pub use button::{DelayedTurnOffButton, ResetRuntimeButton};
pub use delayed_off::{DelayedOff, TurnOffAction};
pub use diagnostics::{ConnectionStats, DiagnosticsCollector, HubDiagnostics};
pub use events::{
    DelayedOffState, DisconnectReason, EventDispatcher, EventReceiver, EventSender, HubEvent,
};
pub use fan::FanEntity;
pub use light::{DecoLight, Light};
pub use mock::{MockHood, MockHoodBuilder};
pub use reconnect::ReconnectOptions;
pub use runtime::{RuntimeData, RuntimeManager, SharedRuntime};
pub use sensor::{
    ConnectionStateSensor, DelayedOffTimeSensor, FilterAlert, RuntimeMetric, RuntimeSensor,
};
pub use thresholds::{FilterLevel, FilterStatus, FilterThresholds};
pub use timer::{ScheduledTask, call_later, call_periodic};
pub use tracker::RuntimeTracker;
pub use traits::{Entity, EntityKind, EntitySnapshot};
pub use transport::{Connector, FrameSink, FrameStream, TungsteniteConnector, WsConnection};
pub use util::unique_id_for_host;

// Re-export from thermex-types
pub use thermex_types::{ConnectionState, FanSection, Preset, ResponseFrame, Section};
