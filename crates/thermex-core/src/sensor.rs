//! Read-only sensors derived from runtime accounting, the hub connection and
//! the delayed turn-off helper, plus the filter alert binary sensor.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::delayed_off::DelayedOff;
use crate::events::HubEvent;
use crate::hub::Hub;
use crate::runtime::SharedRuntime;
use crate::thresholds::{FilterStatus, FilterThresholds};
use crate::traits::{Entity, EntityKind, EntitySnapshot, is_notify_of};

/// Quantity a [`RuntimeSensor`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMetric {
    /// Total fan runtime in hours, two decimals.
    RuntimeHours,
    /// RFC 3339 time of the last counter reset.
    LastReset,
    /// Runtime hours shown as filter usage.
    FilterTime,
    /// Whole days since the last reset.
    DaysSinceReset,
}

impl RuntimeMetric {
    /// All runtime metrics.
    pub const ALL: [RuntimeMetric; 4] = [
        RuntimeMetric::RuntimeHours,
        RuntimeMetric::LastReset,
        RuntimeMetric::FilterTime,
        RuntimeMetric::DaysSinceReset,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            RuntimeMetric::RuntimeHours => "runtime_hours",
            RuntimeMetric::LastReset => "last_reset",
            RuntimeMetric::FilterTime => "filter_time",
            RuntimeMetric::DaysSinceReset => "days_since_reset",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RuntimeMetric::RuntimeHours => "Thermex Fan Runtime",
            RuntimeMetric::LastReset => "Thermex Fan Last Reset",
            RuntimeMetric::FilterTime => "Thermex Filter Time",
            RuntimeMetric::DaysSinceReset => "Thermex Days Since Filter Reset",
        }
    }

    fn unit(&self) -> Option<&'static str> {
        match self {
            RuntimeMetric::RuntimeHours | RuntimeMetric::FilterTime => Some("h"),
            RuntimeMetric::DaysSinceReset => Some("d"),
            RuntimeMetric::LastReset => None,
        }
    }
}

/// Sensor backed by the runtime manager. Refreshes on every `fan` notify.
#[derive(Debug)]
pub struct RuntimeSensor {
    hub_id: String,
    metric: RuntimeMetric,
    runtime: SharedRuntime,
}

impl RuntimeSensor {
    /// Create a sensor for `metric`.
    pub fn new(hub: &Hub, metric: RuntimeMetric, runtime: SharedRuntime) -> Self {
        Self {
            hub_id: hub.unique_id(),
            metric,
            runtime,
        }
    }

    /// Metric reported by this sensor.
    pub fn metric(&self) -> RuntimeMetric {
        self.metric
    }

    /// Current value; `null` when unknown.
    pub async fn value(&self) -> Value {
        let runtime = self.runtime.lock().await;
        match self.metric {
            RuntimeMetric::RuntimeHours | RuntimeMetric::FilterTime => {
                Value::from(runtime.filter_time())
            }
            RuntimeMetric::LastReset => runtime.last_reset().map(Value::from).unwrap_or(Value::Null),
            RuntimeMetric::DaysSinceReset => runtime
                .days_since_reset()
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl Entity for RuntimeSensor {
    fn unique_id(&self) -> String {
        format!("{}_{}", self.hub_id, self.metric.suffix())
    }

    fn name(&self) -> &'static str {
        self.metric.name()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        is_notify_of(event, "fan")
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let mut attributes = Map::new();
        if let Some(unit) = self.metric.unit() {
            attributes.insert("unit_of_measurement".to_string(), Value::from(unit));
        }
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: self.value().await,
            attributes,
        }
    }
}

/// Diagnostic sensor reporting the hub's connection state.
#[derive(Debug)]
pub struct ConnectionStateSensor {
    hub: Hub,
}

impl ConnectionStateSensor {
    /// Create the sensor.
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Entity for ConnectionStateSensor {
    fn unique_id(&self) -> String {
        format!("{}_connection_state", self.hub.unique_id())
    }

    fn name(&self) -> &'static str {
        "Thermex Connection State"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        matches!(
            event,
            HubEvent::Connected
                | HubEvent::Disconnected { .. }
                | HubEvent::ReconnectStarted { .. }
                | HubEvent::ReconnectSucceeded { .. }
                | HubEvent::ReconnectFailed { .. }
        )
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let mut attributes = Map::new();
        attributes.insert(
            "last_error".to_string(),
            self.hub.last_error().map(Value::from).unwrap_or(Value::Null),
        );
        attributes.insert(
            "websocket_connected".to_string(),
            Value::from(self.hub.is_connected()),
        );
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: Value::from(self.hub.connection_state().as_str()),
            attributes,
        }
    }
}

/// Time the pending delayed turn-off will fire; `null` when inactive.
#[derive(Debug)]
pub struct DelayedOffTimeSensor {
    hub_id: String,
    delayed_off: DelayedOff,
}

impl DelayedOffTimeSensor {
    /// Create the sensor.
    pub fn new(hub: &Hub, delayed_off: DelayedOff) -> Self {
        Self {
            hub_id: hub.unique_id(),
            delayed_off,
        }
    }
}

#[async_trait]
impl Entity for DelayedOffTimeSensor {
    fn unique_id(&self) -> String {
        format!("{}_delayed_off_time", self.hub_id)
    }

    fn name(&self) -> &'static str {
        "Thermex Delayed Turn-Off"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        matches!(event, HubEvent::DelayedOff(_))
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let state = self.delayed_off.state();
        let mut attributes = Map::new();
        attributes.insert(
            "remaining_minutes".to_string(),
            Value::from(state.remaining_minutes),
        );
        let value = match state.scheduled_time {
            Some(time) if state.active => Value::from(time),
            _ => Value::Null,
        };
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: value,
            attributes,
        }
    }
}

/// Binary sensor that turns on when the grease filter needs cleaning.
#[derive(Debug)]
pub struct FilterAlert {
    hub_id: String,
    runtime: SharedRuntime,
    thresholds: FilterThresholds,
}

impl FilterAlert {
    /// Create the alert with the configured thresholds.
    pub fn new(hub: &Hub, runtime: SharedRuntime, thresholds: FilterThresholds) -> Self {
        Self {
            hub_id: hub.unique_id(),
            runtime,
            thresholds,
        }
    }

    /// Evaluate the thresholds against the current runtime.
    pub async fn status(&self) -> FilterStatus {
        let runtime = self.runtime.lock().await;
        self.thresholds
            .evaluate(runtime.runtime_hours(), runtime.days_since_reset())
    }

    /// Whether the alert is on.
    pub async fn is_on(&self) -> bool {
        self.status().await.alert()
    }
}

#[async_trait]
impl Entity for FilterAlert {
    fn unique_id(&self) -> String {
        format!("{}_threshold_alert", self.hub_id)
    }

    fn name(&self) -> &'static str {
        "Thermex Filter Alert"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::BinarySensor
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        is_notify_of(event, "fan")
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let status = self.status().await;
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: Value::Bool(status.alert()),
            attributes: status.attributes(),
        }
    }
}
