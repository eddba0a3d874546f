//! Trait abstractions for hood entities.
//!
//! This module provides the [`Entity`] trait shared by every adapter that
//! exposes hood state: the fan, the lights, the runtime sensors, the filter
//! alert and the buttons. The integration's event router feeds bus events to
//! all entities through it, and the CLI renders their snapshots.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::events::HubEvent;

/// What sort of entity an adapter is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Extractor fan with presets.
    Fan,
    /// Dimmable or RGB light.
    Light,
    /// Read-only measurement.
    Sensor,
    /// Read-only on/off condition.
    BinarySensor,
    /// Stateless action.
    Button,
}

/// Point-in-time view of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    /// Stable identifier, prefixed with the hub's unique id.
    pub unique_id: String,
    /// Display name.
    pub name: &'static str,
    /// Entity kind.
    pub kind: EntityKind,
    /// Primary state; `null` when unknown.
    pub state: Value,
    /// Extra state attributes.
    pub attributes: Map<String, Value>,
}

/// Trait implemented by every hood entity.
///
/// # Example
///
/// ```ignore
/// use thermex_core::{Entity, HubEvent};
///
/// fn refresh(entities: &[std::sync::Arc<dyn Entity>], event: &HubEvent) {
///     for entity in entities {
///         if entity.handle_event(event) {
///             println!("{} changed", entity.unique_id());
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier.
    fn unique_id(&self) -> String;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Entity kind.
    fn kind(&self) -> EntityKind;

    /// Feed one bus event. Returns whether the entity's visible state may
    /// have changed.
    ///
    /// The default implementation ignores every event.
    fn handle_event(&self, _event: &HubEvent) -> bool {
        false
    }

    /// Current state and attributes.
    async fn snapshot(&self) -> EntitySnapshot;
}

/// Whether `event` is a notification of `kind`, ignoring case.
pub(crate) fn is_notify_of(event: &HubEvent, kind: &str) -> bool {
    matches!(event, HubEvent::Notify { kind: k, .. } if k.eq_ignore_ascii_case(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_notify_of() {
        let event = HubEvent::notify("Fan", json!({}));
        assert!(is_notify_of(&event, "fan"));
        assert!(!is_notify_of(&event, "light"));
        assert!(!is_notify_of(&HubEvent::Connected, "fan"));
    }

    #[test]
    fn test_snapshot_serializes_kind() {
        let snapshot = EntitySnapshot {
            unique_id: "thermex_10_0_0_5_fan".to_string(),
            name: "Thermex Fan",
            kind: EntityKind::BinarySensor,
            state: Value::Bool(true),
            attributes: Map::new(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["kind"], "binary_sensor");
        assert_eq!(value["state"], true);
    }
}
