//! End-to-end tests of an entry: hub, tracker, router and entities wired
//! together against an emulated hood.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thermex_core::{
    ConnectionState, Entity, EntryConfig, EntryOptions, Error, FanSection, Integration, MockHood,
    Preset, RuntimeMetric,
};
use thermex_store::Store;
use thermex_types::LightSection;

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

async fn setup(hood: &MockHood, store: Arc<Store>, options: EntryOptions) -> Integration {
    Integration::setup_with_connector(
        EntryConfig::new("kitchen", "10.0.0.5", "secret"),
        options,
        store,
        Arc::new(hood.clone()),
    )
    .await
    .unwrap()
}

fn running_hood() -> MockHood {
    MockHood::builder()
        .api_key("secret")
        .fan(FanSection::for_preset(Preset::High))
        .light(LightSection {
            lightonoff: 1,
            lightbrightness: 128,
        })
        .build()
}

#[tokio::test]
async fn test_initial_status_seeds_entities_and_runtime() {
    let hood = running_hood();
    let store = Arc::new(Store::open_in_memory());
    let integration = setup(&hood, store.clone(), EntryOptions::default()).await;
    let entities = integration.entities();

    eventually(|| entities.fan.is_on() && entities.light.is_on()).await;
    assert_eq!(entities.fan.preset(), Preset::High);
    assert!(entities.light.brightness() > 0);

    for _ in 0..200 {
        if integration.runtime().lock().await.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let runtime = integration.runtime().lock().await;
    assert!(runtime.is_running());
    assert!(runtime.last_reset().is_some());
    assert_eq!(runtime.last_preset(), Preset::High);
    assert!(store.load(runtime.key()).unwrap().is_some());
    drop(runtime);

    integration.unload().await;
}

#[tokio::test]
async fn test_entity_set_has_unique_ids() {
    let hood = MockHood::new("secret");
    let store = Arc::new(Store::open_in_memory());

    let integration = setup(&hood, store.clone(), EntryOptions::default()).await;
    let snapshots = integration.snapshots().await;
    assert_eq!(snapshots.len(), 11);
    assert!(integration.entities().decolight.is_none());
    integration.unload().await;

    let options = EntryOptions {
        enable_decolight: true,
        ..Default::default()
    };
    let integration = setup(&hood, store, options).await;
    let snapshots = integration.snapshots().await;
    assert_eq!(snapshots.len(), 12);
    let ids: HashSet<_> = snapshots.iter().map(|s| s.unique_id.clone()).collect();
    assert_eq!(ids.len(), snapshots.len());
    assert!(ids.contains("thermex_10_0_0_5_fan"));
    assert!(ids.contains("thermex_10_0_0_5_decolight"));
    assert!(ids.iter().all(|id| id.starts_with("thermex_10_0_0_5_")));
    integration.unload().await;
}

#[tokio::test]
async fn test_fan_control_updates_device_and_runtime() {
    let hood = MockHood::new("secret");
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;
    let fan = &integration.entities().fan;
    eventually(|| integration.hub().connection_state() == ConnectionState::Connected).await;

    fan.set_percentage(20).await.unwrap();
    assert_eq!(hood.fan().fanspeed, 1);
    assert_eq!(fan.preset(), Preset::Low);

    for _ in 0..200 {
        if integration.runtime().lock().await.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(integration.runtime().lock().await.is_running());

    fan.turn_off().await.unwrap();
    assert!(!hood.fan().is_on());
    for _ in 0..200 {
        if !integration.runtime().lock().await.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let runtime = integration.runtime().lock().await;
    assert!(!runtime.is_running());
    assert_eq!(runtime.last_preset(), Preset::Low);
    drop(runtime);

    // Turning on without a preset falls back to the last one used.
    fan.turn_on(None).await.unwrap();
    assert_eq!(hood.fan().fanspeed, 1);
    integration.unload().await;
}

#[tokio::test]
async fn test_external_notify_updates_entities() {
    let hood = MockHood::new("secret");
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;
    eventually(|| integration.hub().startup_complete()).await;

    hood.press(&FanSection::for_preset(Preset::Boost).to_update());
    eventually(|| integration.entities().fan.preset() == Preset::Boost).await;
    assert_eq!(integration.entities().fan.percentage(), 100);
    integration.unload().await;
}

#[tokio::test(start_paused = true)]
async fn test_delayed_turn_off_button_switches_fan_off() {
    let hood = running_hood();
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;
    let entities = integration.entities();
    eventually(|| entities.fan.is_on()).await;

    assert!(entities.delayed_turn_off.press());
    let snapshot = entities.delayed_off_time.snapshot().await;
    assert!(snapshot.state.is_string());
    assert_eq!(snapshot.attributes["remaining_minutes"], 30);

    tokio::time::sleep(Duration::from_secs(31 * 60)).await;
    eventually(|| !hood.fan().is_on()).await;
    eventually(|| !entities.fan.is_on()).await;
    assert!(!entities.fan.delayed_off().is_active());
    assert_eq!(entities.delayed_off_time.snapshot().await.state, Value::Null);
    integration.unload().await;
}

#[tokio::test]
async fn test_reset_button_clears_runtime() {
    let hood = MockHood::new("secret");
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;
    {
        let mut runtime = integration.runtime().lock().await;
        let now = time::OffsetDateTime::now_utc();
        runtime.start_at(now - time::Duration::hours(40));
        runtime.stop_at(now);
    }
    assert!(integration.entities().filter_alert.is_on().await);

    integration.entities().reset_runtime.press().await.unwrap();
    assert!(!integration.entities().filter_alert.is_on().await);

    let hours = integration
        .entities()
        .runtime_sensors
        .iter()
        .find(|s| s.metric() == RuntimeMetric::RuntimeHours)
        .unwrap()
        .value()
        .await;
    assert_eq!(hours, 0.0);
    integration.unload().await;
}

#[tokio::test]
async fn test_runtime_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let hood = running_hood();

    let store = Arc::new(Store::open(dir.path()).unwrap());
    let integration = setup(&hood, store, EntryOptions::default()).await;
    for _ in 0..200 {
        if integration.runtime().lock().await.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let last_reset = integration
        .runtime()
        .lock()
        .await
        .last_reset()
        .map(str::to_string);
    assert!(last_reset.is_some());
    integration.unload().await;
    assert!(integration.is_unloaded());

    let store = Arc::new(Store::open(dir.path()).unwrap());
    let integration = setup(&hood, store, EntryOptions::default()).await;
    let runtime = integration.runtime().lock().await;
    assert!(runtime.is_running());
    assert_eq!(runtime.last_reset().map(str::to_string), last_reset);
    drop(runtime);
    integration.unload().await;
}

#[tokio::test]
async fn test_unload_is_idempotent() {
    let hood = MockHood::new("secret");
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;

    integration.unload().await;
    integration.unload().await;
    assert!(integration.is_unloaded());
    assert_eq!(integration.hub().connection_state(), ConnectionState::Closed);
    assert!(!hood.is_connected());
    assert!(matches!(
        integration.entities().light.turn_on(None).await,
        Err(Error::Closing)
    ));
}

#[tokio::test]
async fn test_setup_fails_with_wrong_key() {
    let hood = MockHood::new("other");
    let result = Integration::setup_with_connector(
        EntryConfig::new("kitchen", "10.0.0.5", "secret"),
        EntryOptions::default(),
        Arc::new(Store::open_in_memory()),
        Arc::new(hood.clone()),
    )
    .await;
    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(hood.connect_count(), 1);
}

#[tokio::test]
async fn test_setup_rejects_invalid_options() {
    let hood = MockHood::new("secret");
    let options = EntryOptions {
        delayed_off_minutes: 500,
        ..Default::default()
    };
    let result = Integration::setup_with_connector(
        EntryConfig::new("kitchen", "10.0.0.5", "secret"),
        options,
        Arc::new(Store::open_in_memory()),
        Arc::new(hood.clone()),
    )
    .await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert_eq!(hood.connect_count(), 0);
}

#[tokio::test]
async fn test_diagnostics_include_connection_stats() {
    let hood = MockHood::new("secret");
    let integration = setup(&hood, Arc::new(Store::open_in_memory()), EntryOptions::default()).await;
    eventually(|| integration.diagnostics().connection_stats.is_some_and(|s| s.connects == 1))
        .await;

    let diagnostics = integration.diagnostics();
    assert_eq!(diagnostics.host, "10.0.0.5");
    let text = serde_json::to_string(&diagnostics).unwrap();
    assert!(!text.contains("secret"));
    integration.unload().await;
}
