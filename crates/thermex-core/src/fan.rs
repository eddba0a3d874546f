//! Extractor fan adapter.
//!
//! [`FanEntity`] mirrors the hood's `Fan` section from notifications and
//! exposes preset and percentage control, runtime attributes and the
//! delayed turn-off countdown.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thermex_types::{FanSection, Preset, Section};
use tracing::{debug, info, warn};

use crate::delayed_off::{DelayedOff, TurnOffAction};
use crate::error::Result;
use crate::events::HubEvent;
use crate::hub::Hub;
use crate::runtime::SharedRuntime;
use crate::thresholds::FilterThresholds;
use crate::traits::{Entity, EntityKind, EntitySnapshot, is_notify_of};
use crate::util::lock;

/// Switches the fan off when a delayed turn-off fires.
///
/// Sends the off update directly so the countdown that owns this action is
/// not cancelled from inside its own task.
struct FanOff {
    hub: Hub,
}

#[async_trait]
impl TurnOffAction for FanOff {
    async fn turn_off(&self) -> Result<()> {
        self.hub
            .update(FanSection::for_preset(Preset::Off).to_update())
            .await?;
        Ok(())
    }
}

/// The hood's extractor fan.
pub struct FanEntity {
    hub: Hub,
    runtime: SharedRuntime,
    delayed_off: DelayedOff,
    thresholds: FilterThresholds,
    state: Mutex<FanSection>,
}

impl std::fmt::Debug for FanEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanEntity")
            .field("host", &self.hub.host())
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl FanEntity {
    /// Create the fan adapter. State stays "off" until the first `fan`
    /// notification arrives.
    pub fn new(
        hub: Hub,
        runtime: SharedRuntime,
        delayed_off: DelayedOff,
        thresholds: FilterThresholds,
    ) -> Self {
        Self {
            hub,
            runtime,
            delayed_off,
            thresholds,
            state: Mutex::new(FanSection::default()),
        }
    }

    /// Whether the fan runs.
    pub fn is_on(&self) -> bool {
        lock(&self.state).is_on()
    }

    /// Current preset; `Off` unless running.
    pub fn preset(&self) -> Preset {
        let state = lock(&self.state);
        if state.is_on() {
            state.preset()
        } else {
            Preset::Off
        }
    }

    /// Current speed as a percentage.
    pub fn percentage(&self) -> u8 {
        self.preset().percentage()
    }

    /// Presets the fan supports.
    pub fn preset_modes(&self) -> &'static [Preset] {
        &Preset::ALL
    }

    /// The delayed turn-off helper.
    pub fn delayed_off(&self) -> &DelayedOff {
        &self.delayed_off
    }

    /// Switch to `preset`. `Off` behaves like [`turn_off`](Self::turn_off).
    pub async fn set_preset(&self, preset: Preset) -> Result<()> {
        if !preset.is_running() {
            return self.turn_off().await;
        }
        let section = FanSection::for_preset(preset);
        self.hub.update(section.to_update()).await?;
        *lock(&self.state) = section;
        info!("Fan set to {}", preset);
        Ok(())
    }

    /// Switch to the preset covering `percentage`.
    pub async fn set_percentage(&self, percentage: u8) -> Result<()> {
        self.set_preset(Preset::from_percentage(percentage)).await
    }

    /// Turn on at `preset`, else at the last preset the fan ran at, else
    /// at medium.
    pub async fn turn_on(&self, preset: Option<Preset>) -> Result<()> {
        let preset = match preset {
            Some(preset) => preset,
            None => {
                let last = self.runtime.lock().await.last_preset();
                if last.is_running() { last } else { Preset::Medium }
            }
        };
        self.set_preset(preset).await
    }

    /// Turn off and cancel any pending delayed turn-off.
    pub async fn turn_off(&self) -> Result<()> {
        self.delayed_off.cancel();
        let section = FanSection::for_preset(Preset::Off);
        self.hub.update(section.to_update()).await?;
        *lock(&self.state) = section;
        info!("Fan turned off");
        Ok(())
    }

    /// Start a delayed turn-off of `minutes` (clamped to 1..=120).
    ///
    /// Refused with `false` while the fan is off.
    pub fn start_delayed_off(&self, minutes: u32) -> bool {
        if !self.is_on() {
            warn!("Cannot start delayed turn-off: fan is off");
            return false;
        }
        let action = Arc::new(FanOff {
            hub: self.hub.clone(),
        });
        self.delayed_off.start(minutes, action);
        true
    }

    /// Cancel a pending delayed turn-off.
    pub fn cancel_delayed_off(&self) {
        self.delayed_off.cancel();
    }

    async fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        {
            let runtime = self.runtime.lock().await;
            let hours = runtime.runtime_hours();
            attrs.insert(
                "runtime_hours".to_string(),
                Value::from((hours * 100.0).round() / 100.0),
            );
            attrs.insert(
                "last_start".to_string(),
                runtime
                    .data()
                    .last_start
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from("unknown")),
            );
            attrs.insert(
                "last_reset".to_string(),
                Value::from(runtime.last_reset().unwrap_or("never")),
            );
            attrs.insert(
                "threshold".to_string(),
                Value::from(self.thresholds.alert_hours),
            );
            attrs.insert(
                "alert".to_string(),
                Value::from(hours >= f64::from(self.thresholds.alert_hours)),
            );
        }
        attrs.insert("preset_mode".to_string(), Value::from(self.preset().name()));
        attrs.insert("percentage".to_string(), Value::from(self.percentage()));
        attrs.extend(self.delayed_off.state_attributes());
        attrs
    }
}

#[async_trait]
impl Entity for FanEntity {
    fn unique_id(&self) -> String {
        format!("{}_fan", self.hub.unique_id())
    }

    fn name(&self) -> &'static str {
        "Thermex Fan"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Fan
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        match event {
            HubEvent::DelayedOff(_) => true,
            HubEvent::Notify { data, .. } if is_notify_of(event, "fan") => {
                // `{"Fan": {}}` is a refresh request for runtime attributes
                let Some(fan) = Section::Fan.extract(data).and_then(Value::as_object) else {
                    return true;
                };
                if fan.contains_key("fanonoff") || fan.contains_key("fanspeed") {
                    let section = FanSection::from_value(&Value::Object(fan.clone()));
                    debug!("Fan notify: {:?}", section);
                    *lock(&self.state) = section;
                }
                true
            }
            _ => false,
        }
    }

    async fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: Value::Bool(self.is_on()),
            attributes: self.attributes().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;
    use crate::hub::HubConfig;
    use crate::mock::MockHood;
    use crate::runtime::RuntimeManager;
    use serde_json::json;
    use thermex_store::Store;

    fn setup(hood: &MockHood) -> (FanEntity, SharedRuntime) {
        let bus = EventDispatcher::default();
        let hub = Hub::with_connector(
            HubConfig::new("10.0.0.5", "secret"),
            Arc::new(hood.clone()),
            bus.clone(),
        )
        .unwrap();
        let runtime = RuntimeManager::new(Arc::new(Store::open_in_memory()), "e1").into_shared();
        let fan = FanEntity::new(
            hub,
            runtime.clone(),
            DelayedOff::new(bus),
            FilterThresholds::default(),
        );
        (fan, runtime)
    }

    #[tokio::test]
    async fn test_notify_updates_state() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        assert!(!fan.is_on());

        let event = HubEvent::notify("fan", json!({"Fan": {"fanonoff": 1, "fanspeed": 3}}));
        assert!(fan.handle_event(&event));
        assert!(fan.is_on());
        assert_eq!(fan.preset(), Preset::High);
        assert_eq!(fan.percentage(), 75);

        // refresh ping keeps state
        assert!(fan.handle_event(&HubEvent::notify("fan", json!({"Fan": {}}))));
        assert_eq!(fan.preset(), Preset::High);

        assert!(!fan.handle_event(&HubEvent::notify("light", json!({}))));
    }

    #[tokio::test]
    async fn test_turn_on_uses_last_preset_then_medium() {
        let hood = MockHood::new("secret");
        let (fan, runtime) = setup(&hood);

        fan.turn_on(None).await.unwrap();
        assert_eq!(hood.fan().preset(), Preset::Medium);

        runtime.lock().await.set_last_preset(Preset::Boost);
        fan.turn_off().await.unwrap();
        fan.turn_on(None).await.unwrap();
        assert_eq!(hood.fan().preset(), Preset::Boost);
        assert!(fan.is_on());

        fan.turn_on(Some(Preset::Low)).await.unwrap();
        assert_eq!(hood.fan(), FanSection::for_preset(Preset::Low));
    }

    #[tokio::test]
    async fn test_set_percentage() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        fan.set_percentage(60).await.unwrap();
        assert_eq!(hood.fan().preset(), Preset::High);
        fan.set_percentage(0).await.unwrap();
        assert!(!hood.fan().is_on());
        assert!(!fan.is_on());
    }

    #[tokio::test]
    async fn test_delayed_off_refused_while_off() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        assert!(!fan.start_delayed_off(10));
        assert!(!fan.delayed_off().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_off_turns_fan_off() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        fan.set_preset(Preset::High).await.unwrap();

        assert!(fan.start_delayed_off(2));
        assert!(fan.delayed_off().is_active());
        tokio::time::sleep(std::time::Duration::from_secs(2 * 60 + 5)).await;

        assert!(!hood.fan().is_on());
        assert!(!fan.delayed_off().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_off_cancels_delayed_off() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        fan.set_preset(Preset::Low).await.unwrap();
        assert!(fan.start_delayed_off(30));
        fan.turn_off().await.unwrap();
        assert!(!fan.delayed_off().is_active());
    }

    #[tokio::test]
    async fn test_snapshot_attributes() {
        let hood = MockHood::new("secret");
        let (fan, _) = setup(&hood);
        let snapshot = fan.snapshot().await;
        assert_eq!(snapshot.unique_id, "thermex_10_0_0_5_fan");
        assert_eq!(snapshot.state, Value::Bool(false));
        assert_eq!(snapshot.attributes["last_reset"], "never");
        assert_eq!(snapshot.attributes["last_start"], "unknown");
        assert_eq!(snapshot.attributes["threshold"], 30);
        assert_eq!(snapshot.attributes["alert"], false);
        assert_eq!(snapshot.attributes["delayed_off_active"], false);
    }
}
