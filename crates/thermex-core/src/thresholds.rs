//! Filter maintenance thresholds.
//!
//! The grease filter should be cleaned after a number of fan runtime hours
//! or a number of days since the last cleaning, whichever comes first.
//!
//! # Example
//!
//! ```
//! use thermex_core::{FilterLevel, FilterThresholds};
//!
//! let thresholds = FilterThresholds::default();
//!
//! let status = thresholds.evaluate(12.0, Some(20));
//! assert_eq!(status.level, FilterLevel::Ok);
//!
//! let status = thresholds.evaluate(31.5, Some(20));
//! assert!(status.alert());
//! println!("{}", status.level.action());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default runtime hours before the filter alert turns on.
pub const DEFAULT_ALERT_HOURS: u32 = 30;

/// Default days since reset before the filter alert turns on.
pub const DEFAULT_ALERT_DAYS: u32 = 90;

/// Filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLevel {
    /// Below both thresholds.
    Ok,
    /// Runtime hours reached the threshold.
    RuntimeExceeded,
    /// Days since reset reached the threshold.
    AgeExceeded,
    /// Both thresholds reached.
    BothExceeded,
}

impl FilterLevel {
    /// Get a human-readable description of the level.
    pub fn description(&self) -> &'static str {
        match self {
            FilterLevel::Ok => "Filter OK",
            FilterLevel::RuntimeExceeded => "Runtime limit reached",
            FilterLevel::AgeExceeded => "Filter age limit reached",
            FilterLevel::BothExceeded => "Runtime and age limits reached",
        }
    }

    /// Get the suggested action for this level.
    pub fn action(&self) -> &'static str {
        match self {
            FilterLevel::Ok => "No action needed",
            _ => "Clean the grease filter, then reset the runtime counter",
        }
    }
}

/// Alert thresholds for the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterThresholds {
    /// Runtime hours at which the alert turns on.
    pub alert_hours: u32,
    /// Days since reset at which the alert turns on.
    pub alert_days: u32,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            alert_hours: DEFAULT_ALERT_HOURS,
            alert_days: DEFAULT_ALERT_DAYS,
        }
    }
}

/// Result of evaluating runtime against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterStatus {
    /// Overall condition.
    pub level: FilterLevel,
    /// Runtime hours evaluated.
    pub runtime_hours: f64,
    /// Days since reset evaluated, if known.
    pub days_since_reset: Option<i64>,
    /// The thresholds used.
    pub thresholds: FilterThresholds,
}

impl FilterStatus {
    /// Whether the filter needs attention.
    pub fn alert(&self) -> bool {
        self.level != FilterLevel::Ok
    }

    /// Attributes exposed on the filter alert entity.
    pub fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert(
            "runtime_hours".to_string(),
            Value::from((self.runtime_hours * 100.0).round() / 100.0),
        );
        attrs.insert(
            "alert_hours".to_string(),
            Value::from(self.thresholds.alert_hours),
        );
        attrs.insert(
            "days_since_reset".to_string(),
            self.days_since_reset.map(Value::from).unwrap_or(Value::Null),
        );
        attrs.insert(
            "alert_days".to_string(),
            Value::from(self.thresholds.alert_days),
        );
        attrs
    }
}

impl FilterThresholds {
    /// Create thresholds.
    pub fn new(alert_hours: u32, alert_days: u32) -> Self {
        Self {
            alert_hours,
            alert_days,
        }
    }

    /// Evaluate runtime hours and days since the last reset.
    ///
    /// An unknown reset date never triggers the age alert.
    pub fn evaluate(&self, runtime_hours: f64, days_since_reset: Option<i64>) -> FilterStatus {
        let runtime = runtime_hours >= f64::from(self.alert_hours);
        let age = days_since_reset.is_some_and(|days| days >= i64::from(self.alert_days));
        let level = match (runtime, age) {
            (false, false) => FilterLevel::Ok,
            (true, false) => FilterLevel::RuntimeExceeded,
            (false, true) => FilterLevel::AgeExceeded,
            (true, true) => FilterLevel::BothExceeded,
        };
        FilterStatus {
            level,
            runtime_hours,
            days_since_reset,
            thresholds: *self,
        }
    }
}
