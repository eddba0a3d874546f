//! Action buttons: reset the runtime counter and start a delayed turn-off.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::error::Result;
use crate::events::EventDispatcher;
use crate::fan::FanEntity;
use crate::hub::Hub;
use crate::runtime::SharedRuntime;
use crate::traits::{Entity, EntityKind, EntitySnapshot};

fn button_snapshot(entity: &dyn Entity) -> EntitySnapshot {
    EntitySnapshot {
        unique_id: entity.unique_id(),
        name: entity.name(),
        kind: entity.kind(),
        state: Value::Null,
        attributes: Map::new(),
    }
}

/// Resets the runtime (filter usage) counter.
#[derive(Debug)]
pub struct ResetRuntimeButton {
    hub_id: String,
    runtime: SharedRuntime,
    events: EventDispatcher,
}

impl ResetRuntimeButton {
    /// Create the button.
    pub fn new(hub: &Hub, runtime: SharedRuntime) -> Self {
        Self {
            hub_id: hub.unique_id(),
            runtime,
            events: hub.events().clone(),
        }
    }

    /// Reset and persist the counter, then publish an empty `fan` notify so
    /// runtime-derived entities refresh.
    ///
    /// A fan that is running keeps counting from the moment of the reset.
    pub async fn press(&self) -> Result<()> {
        {
            let mut runtime = self.runtime.lock().await;
            let running = runtime.is_running();
            runtime.reset();
            if running {
                runtime.start();
            }
            runtime.save()?;
        }
        self.events.notify("fan", json!({ "Fan": {} }));
        Ok(())
    }
}

#[async_trait]
impl Entity for ResetRuntimeButton {
    fn unique_id(&self) -> String {
        format!("{}_reset_runtime", self.hub_id)
    }

    fn name(&self) -> &'static str {
        "Reset Runtime"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Button
    }

    async fn snapshot(&self) -> EntitySnapshot {
        button_snapshot(self)
    }
}

/// Starts the fan's delayed turn-off with the configured delay.
#[derive(Debug)]
pub struct DelayedTurnOffButton {
    hub_id: String,
    fan: Arc<FanEntity>,
    minutes: u32,
}

impl DelayedTurnOffButton {
    /// Create the button with a delay of `minutes`.
    pub fn new(hub: &Hub, fan: Arc<FanEntity>, minutes: u32) -> Self {
        Self {
            hub_id: hub.unique_id(),
            fan,
            minutes,
        }
    }

    /// Configured delay.
    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    /// Start the countdown. Returns `false` if the fan is off.
    pub fn press(&self) -> bool {
        let started = self.fan.start_delayed_off(self.minutes);
        if started {
            info!("Delayed turn-off requested for {} minutes", self.minutes);
        }
        started
    }
}

#[async_trait]
impl Entity for DelayedTurnOffButton {
    fn unique_id(&self) -> String {
        format!("{}_delayed_turn_off", self.hub_id)
    }

    fn name(&self) -> &'static str {
        "Delayed Turn-Off"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Button
    }

    async fn snapshot(&self) -> EntitySnapshot {
        button_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delayed_off::DelayedOff;
    use crate::events::HubEvent;
    use crate::hub::HubConfig;
    use crate::mock::MockHood;
    use crate::runtime::RuntimeManager;
    use crate::thresholds::FilterThresholds;
    use thermex_store::Store;
    use thermex_types::Preset;
    use time::{Duration, OffsetDateTime};

    fn hub(hood: &MockHood, bus: &EventDispatcher) -> Hub {
        Hub::with_connector(
            HubConfig::new("10.0.0.5", "secret"),
            Arc::new(hood.clone()),
            bus.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reset_button_resets_saves_and_notifies() {
        let bus = EventDispatcher::default();
        let mut rx = bus.subscribe();
        let hub = hub(&MockHood::new("secret"), &bus);
        let store = Arc::new(Store::open_in_memory());
        let runtime = RuntimeManager::new(store.clone(), "e1").into_shared();
        {
            let mut rt = runtime.lock().await;
            let now = OffsetDateTime::now_utc();
            rt.start_at(now - Duration::hours(5));
            rt.stop_at(now);
        }

        let button = ResetRuntimeButton::new(&hub, runtime.clone());
        button.press().await.unwrap();

        let rt = runtime.lock().await;
        assert_eq!(rt.data().runtime_hours, 0.0);
        assert!(rt.last_reset().is_some());
        assert!(!rt.is_running());
        let saved = store.load(rt.key()).unwrap().unwrap();
        assert_eq!(saved["runtime_hours"], 0.0);

        let event = rx.try_recv().unwrap();
        assert_eq!(event, HubEvent::notify("fan", json!({"Fan": {}})));
    }

    #[tokio::test]
    async fn test_reset_button_keeps_running_session_open() {
        let bus = EventDispatcher::default();
        let hub = hub(&MockHood::new("secret"), &bus);
        let runtime = RuntimeManager::new(Arc::new(Store::open_in_memory()), "e1").into_shared();
        runtime.lock().await.start();

        ResetRuntimeButton::new(&hub, runtime.clone())
            .press()
            .await
            .unwrap();
        assert!(runtime.lock().await.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_turn_off_button() {
        let bus = EventDispatcher::default();
        let hood = MockHood::new("secret");
        let hub = hub(&hood, &bus);
        let runtime = RuntimeManager::new(Arc::new(Store::open_in_memory()), "e1").into_shared();
        let fan = Arc::new(FanEntity::new(
            hub.clone(),
            runtime,
            DelayedOff::new(bus),
            FilterThresholds::default(),
        ));
        let button = DelayedTurnOffButton::new(&hub, fan.clone(), 30);
        assert_eq!(button.unique_id(), "thermex_10_0_0_5_delayed_turn_off");

        assert!(!button.press());
        fan.set_preset(Preset::Medium).await.unwrap();
        assert!(button.press());
        assert_eq!(fan.delayed_off().remaining_minutes(), 30);
        fan.cancel_delayed_off();
    }
}
