//! Accumulated fan runtime, used for filter-maintenance alerts.
//!
//! A [`RuntimeManager`] keeps one JSON blob per configured hood:
//!
//! ```json
//! {"runtime_hours": 12.5, "last_start": 1718000000.0,
//!  "last_reset": "2024-06-01T08:00:00Z", "last_preset": "medium"}
//! ```
//!
//! `last_start` is set while the fan runs. Stopping folds the elapsed time
//! into `runtime_hours`.
//!
//! Every operation has an `_at` variant taking the current time, which the
//! plain variant calls with the wall clock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use thermex_store::Store;
use thermex_types::Preset;

use crate::error::Result;
use crate::util::{format_rfc3339, unix_seconds};

/// Runtime manager shared between the tracker, adapters and buttons.
pub type SharedRuntime = Arc<tokio::sync::Mutex<RuntimeManager>>;

/// Persisted runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeData {
    /// Accumulated hours of closed sessions.
    pub runtime_hours: f64,
    /// Unix timestamp (seconds) the open session started at.
    pub last_start: Option<f64>,
    /// RFC 3339 time of the last reset.
    pub last_reset: Option<String>,
    /// Last preset the fan ran at.
    pub last_preset: String,
}

impl Default for RuntimeData {
    fn default() -> Self {
        Self {
            runtime_hours: 0.0,
            last_start: None,
            last_reset: None,
            last_preset: Preset::Off.name().to_string(),
        }
    }
}

impl RuntimeData {
    /// Read a stored blob, keeping each valid field and replacing each
    /// invalid one with its default.
    pub fn from_value_lenient(value: &Value) -> Self {
        let mut data = Self::default();
        let Some(obj) = value.as_object() else {
            warn!("Runtime blob is not an object, using defaults");
            return data;
        };

        match obj.get("runtime_hours") {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_f64() {
                Some(hours) if hours.is_finite() && hours >= 0.0 => data.runtime_hours = hours,
                _ => warn!("Discarding invalid runtime_hours: {}", v),
            },
        }

        match obj.get("last_start") {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_f64() {
                Some(ts) if ts.is_finite() && ts > 0.0 => data.last_start = Some(ts),
                _ => warn!("Discarding invalid last_start: {}", v),
            },
        }

        match obj.get("last_reset") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => data.last_reset = Some(s.clone()),
            Some(v) => warn!("Discarding invalid last_reset: {}", v),
        }

        match obj.get("last_preset") {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_str().and_then(Preset::from_name) {
                Some(preset) => data.last_preset = preset.name().to_string(),
                None => warn!("Discarding invalid last_preset: {}", v),
            },
        }

        data
    }
}

/// Storage key of the runtime blob for a config entry.
pub fn storage_key(entry_id: &str) -> String {
    format!("thermex_{}_runtime", entry_id)
}

/// Persistent accumulator of fan runtime.
#[derive(Debug)]
pub struct RuntimeManager {
    store: Arc<Store>,
    key: String,
    data: RuntimeData,
}

impl RuntimeManager {
    /// Create a manager for `entry_id` with default state. Call
    /// [`load`](Self::load) to restore persisted state.
    pub fn new(store: Arc<Store>, entry_id: &str) -> Self {
        Self {
            store,
            key: storage_key(entry_id),
            data: RuntimeData::default(),
        }
    }

    /// Wrap into a [`SharedRuntime`].
    pub fn into_shared(self) -> SharedRuntime {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Current state.
    pub fn data(&self) -> &RuntimeData {
        &self.data
    }

    /// Storage key used for this manager.
    pub fn key(&self) -> &str {
        &self.key
    }

    // ==================== Persistence ====================

    /// Restore state from the store.
    ///
    /// Invalid fields fall back to their defaults individually, and an
    /// unreadable blob falls back to the defaults as a whole. Only I/O
    /// errors are returned.
    pub fn load(&mut self) -> Result<()> {
        self.data = match self.store.load(&self.key) {
            Ok(Some(value)) => RuntimeData::from_value_lenient(&value),
            Ok(None) => RuntimeData::default(),
            Err(thermex_store::Error::Io(e)) => return Err(thermex_store::Error::Io(e).into()),
            Err(e) => {
                warn!("Unreadable runtime state '{}', starting fresh: {}", self.key, e);
                RuntimeData::default()
            }
        };
        Ok(())
    }

    /// Persist the current state.
    pub fn save(&self) -> Result<()> {
        let value = serde_json::to_value(&self.data)?;
        self.store.save(&self.key, &value)?;
        Ok(())
    }

    // ==================== Sessions ====================

    /// Whether a session is open.
    pub fn is_running(&self) -> bool {
        self.data.last_start.is_some()
    }

    /// Open a session now.
    pub fn start(&mut self) {
        self.start_at(OffsetDateTime::now_utc());
    }

    /// Open a session at `now`.
    ///
    /// An already open session keeps its original start time, so replayed
    /// "on" notifications do not lose runtime.
    pub fn start_at(&mut self, now: OffsetDateTime) {
        if self.data.last_start.is_none() {
            self.data.last_start = Some(unix_seconds(now));
        }
    }

    /// Close the open session now.
    pub fn stop(&mut self) {
        self.stop_at(OffsetDateTime::now_utc());
    }

    /// Close the open session at `now`, adding its length to the total.
    /// No-op without an open session.
    pub fn stop_at(&mut self, now: OffsetDateTime) {
        if let Some(start) = self.data.last_start.take() {
            let elapsed = (unix_seconds(now) - start).max(0.0);
            self.data.runtime_hours += elapsed / 3600.0;
        }
    }

    /// Zero the total and stamp the reset time now.
    pub fn reset(&mut self) {
        self.reset_at(OffsetDateTime::now_utc());
    }

    /// Zero the total, close any open session and stamp `now` as the reset
    /// time.
    pub fn reset_at(&mut self, now: OffsetDateTime) {
        info!("Thermex filter time counter has been reset to 0");
        self.data.runtime_hours = 0.0;
        self.data.last_start = None;
        self.data.last_reset = Some(format_rfc3339(now));
    }

    /// Stamp `now` as the reset time if the counter was never reset.
    ///
    /// Returns whether a stamp was written.
    pub fn ensure_last_reset_at(&mut self, now: OffsetDateTime) -> bool {
        if self.data.last_reset.is_some() {
            return false;
        }
        self.data.last_reset = Some(format_rfc3339(now));
        true
    }

    // ==================== Queries ====================

    /// Total runtime in hours, including the open session.
    pub fn runtime_hours(&self) -> f64 {
        self.runtime_hours_at(OffsetDateTime::now_utc())
    }

    /// Total runtime in hours at `now`, including the open session.
    pub fn runtime_hours_at(&self, now: OffsetDateTime) -> f64 {
        let open = self
            .data
            .last_start
            .map(|start| (unix_seconds(now) - start).max(0.0) / 3600.0)
            .unwrap_or(0.0);
        self.data.runtime_hours + open
    }

    /// Filter time shown to users: runtime hours rounded to two decimals.
    pub fn filter_time(&self) -> f64 {
        (self.runtime_hours() * 100.0).round() / 100.0
    }

    /// RFC 3339 time of the last reset.
    pub fn last_reset(&self) -> Option<&str> {
        self.data.last_reset.as_deref()
    }

    /// Whole days since the last reset, or `None` if never reset or the
    /// stored time is unparseable.
    pub fn days_since_reset(&self) -> Option<i64> {
        self.days_since_reset_at(OffsetDateTime::now_utc())
    }

    /// Whole days between the last reset and `now`.
    pub fn days_since_reset_at(&self, now: OffsetDateTime) -> Option<i64> {
        let raw = self.data.last_reset.as_deref()?;
        match OffsetDateTime::parse(raw, &Rfc3339) {
            Ok(reset) => Some((now - reset).whole_days().max(0)),
            Err(e) => {
                warn!("Error calculating days since reset from '{}': {}", raw, e);
                None
            }
        }
    }

    /// Last preset the fan ran at.
    pub fn last_preset(&self) -> Preset {
        Preset::from_name(&self.data.last_preset).unwrap_or_default()
    }

    /// Remember the preset the fan runs at.
    pub fn set_last_preset(&mut self, preset: Preset) {
        self.data.last_preset = preset.name().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use time::Duration;

    fn manager() -> RuntimeManager {
        RuntimeManager::new(Arc::new(Store::open_in_memory()), "entry1")
    }

    fn t0() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(manager().key(), "thermex_entry1_runtime");
    }

    #[test]
    fn test_start_stop_accumulates() {
        let mut rt = manager();
        rt.start_at(t0());
        assert!(rt.is_running());
        rt.stop_at(t0() + Duration::minutes(90));
        assert!(!rt.is_running());
        assert!((rt.runtime_hours_at(t0() + Duration::hours(10)) - 1.5).abs() < 1e-9);

        // stopping twice is harmless
        rt.stop_at(t0() + Duration::hours(5));
        assert!((rt.data().runtime_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_open_session_counts_live() {
        let mut rt = manager();
        rt.start_at(t0());
        assert!((rt.runtime_hours_at(t0() + Duration::hours(2)) - 2.0).abs() < 1e-9);
        assert_eq!(rt.data().runtime_hours, 0.0);
    }

    #[test]
    fn test_start_keeps_original_start() {
        let mut rt = manager();
        rt.start_at(t0());
        rt.start_at(t0() + Duration::hours(1));
        rt.stop_at(t0() + Duration::hours(3));
        assert!((rt.data().runtime_hours - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ensure_last_reset_only_once() {
        let mut rt = manager();
        assert!(rt.ensure_last_reset_at(t0()));
        let first = rt.last_reset().map(str::to_string);
        assert!(!rt.ensure_last_reset_at(t0() + Duration::days(3)));
        assert_eq!(rt.last_reset().map(str::to_string), first);
        assert_eq!(rt.days_since_reset_at(t0() + Duration::days(3)), Some(3));
    }

    #[test]
    fn test_reset() {
        let mut rt = manager();
        rt.start_at(t0());
        rt.stop_at(t0() + Duration::hours(4));
        rt.start_at(t0() + Duration::hours(5));

        let now = t0() + Duration::hours(6);
        rt.reset_at(now);
        assert_eq!(rt.runtime_hours_at(now), 0.0);
        assert_eq!(rt.days_since_reset_at(now), Some(0));
        assert!(!rt.is_running());
        assert_eq!(rt.days_since_reset_at(now + Duration::days(3)), Some(3));
    }

    #[test]
    fn test_days_since_reset_invalid() {
        let mut rt = manager();
        assert_eq!(rt.days_since_reset(), None);
        rt.data.last_reset = Some("last tuesday".to_string());
        assert_eq!(rt.days_since_reset(), None);
    }

    #[test]
    fn test_days_since_reset_accepts_offset() {
        let mut rt = manager();
        rt.data.last_reset = Some("2023-11-14T22:13:19.123456+00:00".to_string());
        assert_eq!(rt.days_since_reset_at(t0() + Duration::days(2)), Some(2));
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = Arc::new(Store::open_in_memory());
        let mut rt = RuntimeManager::new(store.clone(), "e");
        rt.start_at(t0());
        rt.stop_at(t0() + Duration::minutes(45));
        rt.reset_at(t0() + Duration::hours(1));
        rt.start_at(t0() + Duration::hours(2));
        rt.stop_at(t0() + Duration::hours(3));
        rt.set_last_preset(Preset::High);
        rt.save().unwrap();

        let mut restored = RuntimeManager::new(store, "e");
        restored.load().unwrap();
        assert_eq!(restored.data(), rt.data());
        assert_eq!(restored.last_preset(), Preset::High);
    }

    #[test]
    fn test_load_missing_blob() {
        let mut rt = manager();
        rt.load().unwrap();
        assert_eq!(rt.data(), &RuntimeData::default());
        assert_eq!(rt.last_preset(), Preset::Off);
    }

    #[test]
    fn test_load_corrupted_fields() {
        let store = Arc::new(Store::open_in_memory());
        store
            .save(
                &storage_key("e"),
                &json!({
                    "runtime_hours": -4.0,
                    "last_start": "yesterday",
                    "last_reset": 12345,
                    "last_preset": "turbo",
                }),
            )
            .unwrap();
        let mut rt = RuntimeManager::new(store.clone(), "e");
        rt.load().unwrap();
        assert_eq!(rt.data(), &RuntimeData::default());

        store
            .save(
                &storage_key("e"),
                &json!({
                    "runtime_hours": 7.25,
                    "last_start": [1],
                    "last_reset": "2024-01-01T00:00:00Z",
                    "last_preset": 3,
                }),
            )
            .unwrap();
        rt.load().unwrap();
        assert_eq!(rt.data().runtime_hours, 7.25);
        assert_eq!(rt.data().last_start, None);
        assert_eq!(rt.last_reset(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(rt.data().last_preset, "off");
    }

    #[test]
    fn test_load_non_object() {
        assert_eq!(
            RuntimeData::from_value_lenient(&json!([1, 2, 3])),
            RuntimeData::default()
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Stop,
    }

    fn op_strategy() -> impl Strategy<Value = (Op, i64)> {
        (prop_oneof![Just(Op::Start), Just(Op::Stop)], 0i64..10_000)
    }

    proptest! {
        #[test]
        fn prop_runtime_monotonic(ops in proptest::collection::vec(op_strategy(), 1..50)) {
            let mut rt = manager();
            let mut now = t0();
            let mut previous = rt.runtime_hours_at(now);
            for (op, advance) in ops {
                now += Duration::seconds(advance);
                match op {
                    Op::Start => rt.start_at(now),
                    Op::Stop => rt.stop_at(now),
                }
                let hours = rt.runtime_hours_at(now);
                prop_assert!(hours >= 0.0);
                prop_assert!(hours + 1e-9 >= previous);
                previous = hours;
            }
        }

        #[test]
        fn prop_lenient_load_never_panics(value in any::<i64>(), text in ".*") {
            let blob = json!({
                "runtime_hours": text.clone(),
                "last_start": value,
                "last_reset": value,
                "last_preset": text,
            });
            let data = RuntimeData::from_value_lenient(&blob);
            prop_assert!(data.runtime_hours >= 0.0);
        }
    }
}
