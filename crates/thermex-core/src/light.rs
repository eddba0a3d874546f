//! Light adapters for the main hood light and the optional deco light.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thermex_types::{
    DecolightSection, LightSection, Section, brightness_to_device, brightness_to_host,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::events::HubEvent;
use crate::hub::Hub;
use crate::traits::{Entity, EntityKind, EntitySnapshot, is_notify_of};
use crate::util::lock;

/// Host brightness, 0-255, of a device brightness.
fn host_brightness(device: i64) -> u16 {
    brightness_to_host(device.clamp(0, i64::from(u8::MAX)) as u8)
}

/// Device brightness to send when turning on: the requested host
/// brightness converted, else the current level, else full.
fn target_brightness(requested: Option<u16>, current: i64) -> i64 {
    match requested {
        Some(host) => i64::from(brightness_to_device(i32::from(host))),
        None if current > 0 => current,
        None => 100,
    }
}

/// The main hood light.
#[derive(Debug)]
pub struct Light {
    hub: Hub,
    state: Mutex<LightSection>,
}

impl Light {
    /// Create the light adapter.
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            state: Mutex::new(LightSection::default()),
        }
    }

    /// Whether the light is on.
    pub fn is_on(&self) -> bool {
        lock(&self.state).is_on()
    }

    /// Brightness on the host scale, 0-255.
    pub fn brightness(&self) -> u16 {
        host_brightness(lock(&self.state).lightbrightness)
    }

    /// Turn on, optionally at a host brightness (0-255).
    pub async fn turn_on(&self, brightness: Option<u16>) -> Result<()> {
        let current = lock(&self.state).lightbrightness;
        let section = LightSection {
            lightonoff: 1,
            lightbrightness: target_brightness(brightness, current),
        };
        self.hub.update(section.to_update()).await?;
        *lock(&self.state) = section;
        info!("Light on at {}%", section.lightbrightness);
        Ok(())
    }

    /// Turn off.
    pub async fn turn_off(&self) -> Result<()> {
        let section = LightSection::default();
        self.hub.update(section.to_update()).await?;
        *lock(&self.state) = section;
        info!("Light off");
        Ok(())
    }
}

#[async_trait]
impl Entity for Light {
    fn unique_id(&self) -> String {
        format!("{}_light", self.hub.unique_id())
    }

    fn name(&self) -> &'static str {
        "Thermex Light"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Light
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        let HubEvent::Notify { data, .. } = event else {
            return false;
        };
        if !is_notify_of(event, "light") {
            return false;
        }
        let Some(section) = Section::Light.extract(data) else {
            return false;
        };
        let section = LightSection::from_value(section);
        debug!("Light notify: {:?}", section);
        *lock(&self.state) = section;
        true
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let mut attributes = Map::new();
        attributes.insert("brightness".to_string(), Value::from(self.brightness()));
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: Value::Bool(self.is_on()),
            attributes,
        }
    }
}

/// The decorative RGB light.
#[derive(Debug)]
pub struct DecoLight {
    hub: Hub,
    state: Mutex<DecolightSection>,
}

impl DecoLight {
    /// Create the deco light adapter.
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            state: Mutex::new(DecolightSection::default()),
        }
    }

    /// Whether the deco light is on.
    pub fn is_on(&self) -> bool {
        lock(&self.state).is_on()
    }

    /// Brightness on the host scale, 0-255.
    pub fn brightness(&self) -> u16 {
        host_brightness(lock(&self.state).decolightbrightness)
    }

    /// Current colour.
    pub fn rgb(&self) -> (u8, u8, u8) {
        lock(&self.state).rgb()
    }

    /// Turn on, optionally changing brightness (0-255) and colour. Omitted
    /// values keep their current setting.
    pub async fn turn_on(&self, brightness: Option<u16>, rgb: Option<(u8, u8, u8)>) -> Result<()> {
        let current = *lock(&self.state);
        let (r, g, b) = rgb.unwrap_or_else(|| current.rgb());
        let section = DecolightSection {
            decolightonoff: 1,
            decolightbrightness: target_brightness(brightness, current.decolightbrightness),
            decolightr: i64::from(r),
            decolightg: i64::from(g),
            decolightb: i64::from(b),
        };
        self.hub.update(section.to_update()).await?;
        *lock(&self.state) = section;
        info!("Deco light on, colour ({}, {}, {})", r, g, b);
        Ok(())
    }

    /// Turn off. The colour is kept for the next turn on.
    pub async fn turn_off(&self) -> Result<()> {
        self.hub.update(DecolightSection::off_update()).await?;
        let mut state = lock(&self.state);
        state.decolightonoff = 0;
        state.decolightbrightness = 0;
        info!("Deco light off");
        Ok(())
    }
}

#[async_trait]
impl Entity for DecoLight {
    fn unique_id(&self) -> String {
        format!("{}_decolight", self.hub.unique_id())
    }

    fn name(&self) -> &'static str {
        "Thermex Deco Light"
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Light
    }

    fn handle_event(&self, event: &HubEvent) -> bool {
        let HubEvent::Notify { data, .. } = event else {
            return false;
        };
        if !is_notify_of(event, "decolight") {
            return false;
        }
        let Some(section) = Section::Decolight.extract(data) else {
            return false;
        };
        let section = DecolightSection::from_value(section);
        debug!("Deco light notify: {:?}", section);
        *lock(&self.state) = section;
        true
    }

    async fn snapshot(&self) -> EntitySnapshot {
        let (r, g, b) = self.rgb();
        let mut attributes = Map::new();
        attributes.insert("brightness".to_string(), Value::from(self.brightness()));
        attributes.insert("rgb_color".to_string(), json!([r, g, b]));
        EntitySnapshot {
            unique_id: self.unique_id(),
            name: self.name(),
            kind: self.kind(),
            state: Value::Bool(self.is_on()),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;
    use crate::hub::HubConfig;
    use crate::mock::MockHood;
    use std::sync::Arc;

    fn hub(hood: &MockHood) -> Hub {
        Hub::with_connector(
            HubConfig::new("10.0.0.5", "secret"),
            Arc::new(hood.clone()),
            EventDispatcher::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_target_brightness() {
        assert_eq!(target_brightness(Some(255), 40), 100);
        assert_eq!(target_brightness(Some(0), 40), 1);
        assert_eq!(target_brightness(None, 40), 40);
        assert_eq!(target_brightness(None, 0), 100);
    }

    #[tokio::test]
    async fn test_light_turn_on_converts_brightness() {
        let hood = MockHood::new("secret");
        let light = Light::new(hub(&hood));

        light.turn_on(Some(128)).await.unwrap();
        assert_eq!(hood.light().lightbrightness, 50);
        assert!(hood.light().is_on());
        assert_eq!(light.brightness(), 128);

        light.turn_off().await.unwrap();
        assert!(!hood.light().is_on());
        assert_eq!(light.brightness(), 0);
    }

    #[tokio::test]
    async fn test_light_notify() {
        let hood = MockHood::new("secret");
        let light = Light::new(hub(&hood));
        let event = HubEvent::notify(
            "light",
            serde_json::json!({"Light": {"lightonoff": 1, "lightbrightness": 100}}),
        );
        assert!(light.handle_event(&event));
        assert!(light.is_on());
        assert_eq!(light.brightness(), 255);
        assert!(!light.handle_event(&HubEvent::notify("fan", serde_json::json!({}))));
    }

    #[tokio::test]
    async fn test_deco_light_colour_and_off() {
        let hood = MockHood::new("secret");
        let deco = DecoLight::new(hub(&hood));

        deco.turn_on(None, Some((255, 0, 10))).await.unwrap();
        let section = hood.decolight();
        assert!(section.is_on());
        assert_eq!(section.rgb(), (255, 0, 10));

        deco.turn_off().await.unwrap();
        assert!(!hood.decolight().is_on());
        assert_eq!(deco.rgb(), (255, 0, 10));

        let snapshot = deco.snapshot().await;
        assert_eq!(snapshot.unique_id, "thermex_10_0_0_5_decolight");
        assert_eq!(snapshot.attributes["rgb_color"], json!([255, 0, 10]));
    }
}
