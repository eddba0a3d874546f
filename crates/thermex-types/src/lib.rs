//! Platform-agnostic types for Thermex extractor hoods.
//!
//! This crate provides the wire frames and device state types shared by
//! the connection layer (thermex-core) and the command-line tool.
//!
//! # Features
//!
//! - Request frames and inbound `Response` / `Notify` parsing
//! - Fan, light and deco-light section types
//! - Fan presets with percentage mapping
//! - Light brightness conversion between host and device scales
//! - Error types for frame parsing
//!
//! # Example
//!
//! ```
//! use thermex_types::{FanSection, InboundFrame, Preset, Section};
//!
//! let text = r#"{"Notify":"fan","Data":{"Fan":{"fanonoff":1,"fanspeed":2}}}"#;
//! if let Ok(InboundFrame::Notify(notify)) = InboundFrame::parse(text) {
//!     let fan = Section::Fan.extract(&notify.data).map(FanSection::from_value);
//!     assert_eq!(fan.map(|f| f.preset()), Some(Preset::Medium));
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use protocol::{
    DEFAULT_PORT, InboundFrame, NotifyFrame, Request, RequestKind, ResponseFrame, SUCCESS_STATUS,
    WEBSOCKET_PATH, correlation_key,
};
pub use types::{
    ConnectionState, DecolightSection, FanSection, LightSection, Preset, Section,
    brightness_to_device, brightness_to_host,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_status_response_sections() {
        let text = r#"{
            "Response": "Status",
            "Status": 200,
            "Data": {
                "Fan": {"fanonoff": 1, "fanspeed": 4},
                "Light": {"lightonoff": 1, "lightbrightness": 80},
                "Decolight": {"decolightonoff": 0}
            }
        }"#;
        let InboundFrame::Response(resp) = InboundFrame::parse(text).unwrap() else {
            panic!("expected response");
        };
        assert!(resp.is_success());

        let fan = FanSection::from_value(Section::Fan.extract(&resp.data).unwrap());
        assert_eq!(fan.preset(), Preset::Boost);

        let light = LightSection::from_value(Section::Light.extract(&resp.data).unwrap());
        assert!(light.is_on());
        assert_eq!(brightness_to_host(light.lightbrightness as u8), 204);

        let deco = DecolightSection::from_value(Section::Decolight.extract(&resp.data).unwrap());
        assert!(!deco.is_on());
    }

    #[test]
    fn test_update_request_for_preset() {
        let payload = FanSection::for_preset(Preset::High).to_update();
        let req = Request::new("update", payload);
        let text = req.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"Request": "Update", "Data": {"Fan": {"fanonoff": 1, "fanspeed": 3}}})
        );
    }

    proptest! {
        #[test]
        fn prop_brightness_to_device_in_range(v in any::<i32>()) {
            let device = brightness_to_device(v);
            prop_assert!((1..=100).contains(&device));
        }

        #[test]
        fn prop_brightness_roundtrip_close(v in 1u8..=100) {
            let host = brightness_to_host(v);
            let back = brightness_to_device(i32::from(host));
            prop_assert_eq!(back, v);
        }

        #[test]
        fn prop_percentage_matches_preset(pct in 0u8..=100) {
            let preset = Preset::from_percentage(pct);
            prop_assert_eq!(preset == Preset::Off, pct == 0);
            prop_assert!(preset.percentage() >= pct);
        }

        #[test]
        fn prop_parse_never_panics(s in ".*") {
            let _ = InboundFrame::parse(&s);
        }
    }
}
