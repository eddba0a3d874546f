//! Device sections, presets and connection state for Thermex hoods.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ParseError;

/// Named fan speed.
///
/// The hood accepts speeds `0..=4`; each speed has a fixed preset name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Preset {
    /// Fan stopped.
    #[default]
    Off = 0,
    /// Speed 1.
    Low = 1,
    /// Speed 2.
    Medium = 2,
    /// Speed 3.
    High = 3,
    /// Speed 4.
    Boost = 4,
}

impl Preset {
    /// All presets in ascending speed order.
    pub const ALL: [Preset; 5] = [
        Preset::Off,
        Preset::Low,
        Preset::Medium,
        Preset::High,
        Preset::Boost,
    ];

    /// Preset name as shown to users and persisted as `last_preset`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Off => "off",
            Preset::Low => "low",
            Preset::Medium => "medium",
            Preset::High => "high",
            Preset::Boost => "boost",
        }
    }

    /// Look up a preset by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Device speed code.
    #[must_use]
    pub fn speed(&self) -> u8 {
        *self as u8
    }

    /// Preset for a device speed code; unknown codes map to `Off`.
    #[must_use]
    pub fn from_speed(speed: i64) -> Self {
        match speed {
            1 => Preset::Low,
            2 => Preset::Medium,
            3 => Preset::High,
            4 => Preset::Boost,
            _ => Preset::Off,
        }
    }

    /// Speed expressed as a percentage (`speed * 25`).
    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.speed() * 25
    }

    /// Preset for a percentage.
    ///
    /// `0` is off, then each quarter of the range maps to the next speed.
    /// Values above 100 are treated as 100.
    ///
    /// ```
    /// use thermex_types::Preset;
    ///
    /// assert_eq!(Preset::from_percentage(0), Preset::Off);
    /// assert_eq!(Preset::from_percentage(1), Preset::Low);
    /// assert_eq!(Preset::from_percentage(26), Preset::Medium);
    /// assert_eq!(Preset::from_percentage(75), Preset::High);
    /// assert_eq!(Preset::from_percentage(100), Preset::Boost);
    /// ```
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => Preset::Off,
            1..=25 => Preset::Low,
            26..=50 => Preset::Medium,
            51..=75 => Preset::High,
            _ => Preset::Boost,
        }
    }

    /// Whether this preset runs the fan.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self != Preset::Off
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            ParseError::invalid_field(
                "preset",
                format!("unknown preset '{s}', expected one of off, low, medium, high, boost"),
            )
        })
    }
}

/// Device sections addressable by `Update` and reported by `Notify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Extractor fan.
    Fan,
    /// Main light.
    Light,
    /// Decorative RGB light.
    Decolight,
}

impl Section {
    /// All sections.
    pub const ALL: [Section; 3] = [Section::Fan, Section::Light, Section::Decolight];

    /// Key of this section inside a `Data` object, e.g. `"Fan"`.
    #[must_use]
    pub fn data_key(&self) -> &'static str {
        match self {
            Section::Fan => "Fan",
            Section::Light => "Light",
            Section::Decolight => "Decolight",
        }
    }

    /// Notification kind for this section, e.g. `"fan"`.
    #[must_use]
    pub fn notify_kind(&self) -> &'static str {
        match self {
            Section::Fan => "fan",
            Section::Light => "light",
            Section::Decolight => "decolight",
        }
    }

    /// Section addressed by a notification kind, ignoring case.
    #[must_use]
    pub fn from_notify_kind(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|section| section.notify_kind().eq_ignore_ascii_case(kind))
    }

    /// Extract this section's object from a `Data` payload.
    #[must_use]
    pub fn extract<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        data.get(self.data_key())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data_key())
    }
}

fn int_field(obj: &Value, key: &str) -> i64 {
    obj.get(key).and_then(Value::as_i64).unwrap_or(0)
}

/// State of the `Fan` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSection {
    /// `1` when switched on.
    pub fanonoff: i64,
    /// Speed code `0..=4`.
    pub fanspeed: i64,
}

impl FanSection {
    /// Read the section leniently; missing or non-integer fields count as 0.
    #[must_use]
    pub fn from_value(obj: &Value) -> Self {
        Self {
            fanonoff: int_field(obj, "fanonoff"),
            fanspeed: int_field(obj, "fanspeed"),
        }
    }

    /// Section payload for a preset.
    #[must_use]
    pub fn for_preset(preset: Preset) -> Self {
        Self {
            fanonoff: i64::from(preset.is_running()),
            fanspeed: i64::from(preset.speed()),
        }
    }

    /// The fan only counts as running when switched on with a nonzero speed.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.fanonoff != 0 && self.fanspeed != 0
    }

    /// Preset matching the reported speed.
    #[must_use]
    pub fn preset(&self) -> Preset {
        Preset::from_speed(self.fanspeed)
    }

    /// `Update` data payload, `{"Fan": {...}}`.
    #[must_use]
    pub fn to_update(&self) -> Value {
        json!({ "Fan": { "fanonoff": self.fanonoff, "fanspeed": self.fanspeed } })
    }
}

/// State of the main `Light` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSection {
    /// `1` when switched on.
    pub lightonoff: i64,
    /// Device brightness `1..=100` (0 when off).
    pub lightbrightness: i64,
}

impl LightSection {
    /// Read the section leniently; missing or non-integer fields count as 0.
    #[must_use]
    pub fn from_value(obj: &Value) -> Self {
        Self {
            lightonoff: int_field(obj, "lightonoff"),
            lightbrightness: int_field(obj, "lightbrightness"),
        }
    }

    /// Whether the light is switched on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.lightonoff != 0
    }

    /// `Update` data payload, `{"Light": {...}}`.
    #[must_use]
    pub fn to_update(&self) -> Value {
        json!({
            "Light": { "lightonoff": self.lightonoff, "lightbrightness": self.lightbrightness }
        })
    }
}

/// State of the decorative `Decolight` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecolightSection {
    /// `1` when switched on.
    pub decolightonoff: i64,
    /// Brightness as reported by the device.
    pub decolightbrightness: i64,
    /// Red channel `0..=255`.
    pub decolightr: i64,
    /// Green channel `0..=255`.
    pub decolightg: i64,
    /// Blue channel `0..=255`.
    pub decolightb: i64,
}

impl DecolightSection {
    /// Read the section leniently; missing or non-integer fields count as 0.
    #[must_use]
    pub fn from_value(obj: &Value) -> Self {
        Self {
            decolightonoff: int_field(obj, "decolightonoff"),
            decolightbrightness: int_field(obj, "decolightbrightness"),
            decolightr: int_field(obj, "decolightr"),
            decolightg: int_field(obj, "decolightg"),
            decolightb: int_field(obj, "decolightb"),
        }
    }

    /// Whether the deco light is switched on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.decolightonoff != 0
    }

    /// Colour as an RGB triple, saturating out-of-range channels.
    #[must_use]
    pub fn rgb(&self) -> (u8, u8, u8) {
        let clamp = |v: i64| v.clamp(0, 255) as u8;
        (
            clamp(self.decolightr),
            clamp(self.decolightg),
            clamp(self.decolightb),
        )
    }

    /// `Update` payload switching the deco light off.
    #[must_use]
    pub fn off_update() -> Value {
        json!({ "Decolight": { "decolightonoff": 0, "decolightbrightness": 0 } })
    }

    /// `Update` data payload, `{"Decolight": {...}}`.
    #[must_use]
    pub fn to_update(&self) -> Value {
        json!({
            "Decolight": {
                "decolightonoff": self.decolightonoff,
                "decolightbrightness": self.decolightbrightness,
                "decolightr": self.decolightr,
                "decolightg": self.decolightg,
                "decolightb": self.decolightb,
            }
        })
    }
}

/// Lifecycle state of a hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Waiting for the authentication response.
    Authenticating,
    /// Authenticated; negotiating protocol version and loading status.
    Initializing,
    /// Fully operational.
    Connected,
    /// The last connection attempt failed.
    Error,
    /// Closed for good.
    Closed,
}

impl ConnectionState {
    /// Lowercase name of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether a handshake is underway.
    #[must_use]
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Initializing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a host brightness (`0..=255`) to the device scale (`1..=100`).
///
/// Out-of-range inputs are clamped into the device range, so 0 still maps
/// to the dimmest level rather than switching the light off.
///
/// ```
/// use thermex_types::brightness_to_device;
///
/// assert_eq!(brightness_to_device(255), 100);
/// assert_eq!(brightness_to_device(128), 50);
/// assert_eq!(brightness_to_device(0), 1);
/// ```
#[must_use]
pub fn brightness_to_device(brightness: i32) -> u8 {
    let scaled = (f64::from(brightness) / 255.0 * 100.0).round();
    scaled.clamp(1.0, 100.0) as u8
}

/// Convert a device brightness (`0..=100`) to the host scale (`0..=255`).
///
/// Values above 100 are scaled without clamping.
///
/// ```
/// use thermex_types::brightness_to_host;
///
/// assert_eq!(brightness_to_host(100), 255);
/// assert_eq!(brightness_to_host(50), 128);
/// assert_eq!(brightness_to_host(0), 0);
/// ```
#[must_use]
pub fn brightness_to_host(brightness: u8) -> u16 {
    if brightness == 0 {
        return 0;
    }
    (f64::from(brightness) / 100.0 * 255.0).round() as u16
}
