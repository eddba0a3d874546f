//! JSON frames exchanged with the hood over its WebSocket API.
//!
//! Every frame is a single JSON object:
//!
//! - client to device: `{"Request": "<Kind>", "Data": {...}}`
//! - device to client, solicited: `{"Response": "<Kind>", "Status": 200, "Data": {...}}`
//! - device to client, unsolicited: `{"Notify": "<kind>", "Data": {"<Section>": {...}}}`

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

/// Status code the device uses for a successful response.
pub const SUCCESS_STATUS: i64 = 200;

/// Default TCP port of the hood's WebSocket API.
pub const DEFAULT_PORT: u16 = 9999;

/// Default WebSocket path of the hood's API.
pub const WEBSOCKET_PATH: &str = "/api";

/// Request kinds understood by the hood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Handshake carrying the shared secret.
    Authenticate,
    /// Change one or more device sections.
    Update,
    /// Full device status.
    Status,
    /// Protocol version negotiation.
    ProtocolVersion,
}

impl RequestKind {
    /// All known request kinds.
    pub const ALL: [RequestKind; 4] = [
        RequestKind::Authenticate,
        RequestKind::Update,
        RequestKind::Status,
        RequestKind::ProtocolVersion,
    ];

    /// The name used on the wire.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            RequestKind::Authenticate => "Authenticate",
            RequestKind::Update => "Update",
            RequestKind::Status => "Status",
            RequestKind::ProtocolVersion => "ProtocolVersion",
        }
    }

    /// Look up a kind by name, ignoring case.
    ///
    /// ```
    /// use thermex_types::RequestKind;
    ///
    /// assert_eq!(RequestKind::from_name("status"), Some(RequestKind::Status));
    /// assert_eq!(RequestKind::from_name("PROTOCOLVERSION"), Some(RequestKind::ProtocolVersion));
    /// assert_eq!(RequestKind::from_name("reboot"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_name().eq_ignore_ascii_case(name))
    }

    /// Whether requests of this kind carry a `Data` object.
    #[must_use]
    pub fn carries_data(&self) -> bool {
        !matches!(self, RequestKind::Status | RequestKind::ProtocolVersion)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Normalise a request or response kind into the key used for correlation.
#[must_use]
pub fn correlation_key(kind: &str) -> String {
    kind.to_lowercase()
}

/// An outgoing request frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Wire name of the request.
    #[serde(rename = "Request")]
    pub name: String,
    /// Request payload, omitted for `Status` and `ProtocolVersion`.
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Build a request for `kind`.
    ///
    /// Known kinds are mapped to their wire spelling regardless of the case
    /// they were given in; unknown kinds are sent exactly as given.
    pub fn new(kind: &str, payload: Value) -> Self {
        match RequestKind::from_name(kind) {
            Some(known) => Self {
                name: known.wire_name().to_string(),
                data: known.carries_data().then_some(payload),
            },
            None => Self {
                name: kind.to_string(),
                data: Some(payload),
            },
        }
    }

    /// The authentication handshake request.
    pub fn authenticate(code: &str) -> Self {
        Self::new(
            RequestKind::Authenticate.wire_name(),
            serde_json::json!({ "Code": code }),
        )
    }

    /// Correlation key for the response to this request.
    pub fn key(&self) -> String {
        correlation_key(&self.name)
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> ParseResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "Response")]
    response: Option<Value>,
    #[serde(rename = "Notify")]
    notify: Option<Value>,
    #[serde(rename = "Status")]
    status: Option<Value>,
    #[serde(rename = "Data")]
    data: Option<Value>,
}

/// A response to a previously sent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Kind of the request being answered, as spelled by the device.
    pub kind: String,
    /// Status code, if the device sent one.
    pub status: Option<i64>,
    /// Response payload (an empty object when absent).
    pub data: Value,
}

impl ResponseFrame {
    /// Correlation key of this response.
    pub fn key(&self) -> String {
        correlation_key(&self.kind)
    }

    /// Whether the device reported success.
    pub fn is_success(&self) -> bool {
        self.status == Some(SUCCESS_STATUS)
    }

    /// The payload as a JSON object, if it is one.
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }
}

/// An unsolicited notification from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyFrame {
    /// Notification kind, e.g. `fan` or `light`.
    pub kind: String,
    /// Notification payload, usually `{"<Section>": {...}}`.
    pub data: Value,
}

/// A frame received from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Solicited response.
    Response(ResponseFrame),
    /// Unsolicited notification.
    Notify(NotifyFrame),
}

impl InboundFrame {
    /// Parse a text frame.
    ///
    /// ```
    /// use thermex_types::InboundFrame;
    ///
    /// let frame = InboundFrame::parse(r#"{"Response":"Status","Status":200,"Data":{}}"#).unwrap();
    /// assert!(matches!(frame, InboundFrame::Response(r) if r.is_success()));
    /// ```
    pub fn parse(text: &str) -> ParseResult<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let data = match raw.data {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data) => data,
        };

        if let Some(response) = raw.response {
            let kind = response
                .as_str()
                .ok_or_else(|| ParseError::invalid_field("Response", "expected a string"))?
                .to_string();
            let status = match raw.status {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_i64().ok_or_else(|| {
                    ParseError::invalid_field("Status", format!("expected an integer, got {value}"))
                })?),
            };
            return Ok(InboundFrame::Response(ResponseFrame { kind, status, data }));
        }

        if let Some(notify) = raw.notify {
            let kind = notify
                .as_str()
                .ok_or_else(|| ParseError::invalid_field("Notify", "expected a string"))?
                .to_string();
            return Ok(InboundFrame::Notify(NotifyFrame { kind, data }));
        }

        Err(ParseError::UnknownFrame(truncate(text, 120)))
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_request_omits_data() {
        let req = Request::new("status", json!({}));
        assert_eq!(req.to_json().unwrap(), r#"{"Request":"Status"}"#);

        let req = Request::new("protocolversion", json!({}));
        assert_eq!(req.to_json().unwrap(), r#"{"Request":"ProtocolVersion"}"#);
    }

    #[test]
    fn test_update_request_keeps_data() {
        let req = Request::new("update", json!({"Fan": {"fanonoff": 1, "fanspeed": 2}}));
        let value: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(value["Request"], "Update");
        assert_eq!(value["Data"]["Fan"]["fanspeed"], 2);
        assert_eq!(req.key(), "update");
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let req = Request::new("Reboot", json!({"Now": true}));
        assert_eq!(req.name, "Reboot");
        assert_eq!(req.data, Some(json!({"Now": true})));
    }

    #[test]
    fn test_authenticate_request() {
        let req = Request::authenticate("secret");
        let value: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"Request": "Authenticate", "Data": {"Code": "secret"}}));
    }

    #[test]
    fn test_parse_response() {
        let frame =
            InboundFrame::parse(r#"{"Response":"Update","Status":401,"Data":{"x":1}}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("expected response");
        };
        assert_eq!(resp.key(), "update");
        assert_eq!(resp.status, Some(401));
        assert!(!resp.is_success());
        assert_eq!(resp.data["x"], 1);
    }

    #[test]
    fn test_parse_response_without_data() {
        let frame = InboundFrame::parse(r#"{"Response":"Authenticate","Status":200}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("expected response");
        };
        assert!(resp.is_success());
        assert_eq!(resp.data, json!({}));
    }

    #[test]
    fn test_parse_notify() {
        let frame =
            InboundFrame::parse(r#"{"Notify":"fan","Data":{"Fan":{"fanonoff":1,"fanspeed":3}}}"#)
                .unwrap();
        let InboundFrame::Notify(ntf) = frame else {
            panic!("expected notify");
        };
        assert_eq!(ntf.kind, "fan");
        assert_eq!(ntf.data["Fan"]["fanspeed"], 3);
    }

    #[test]
    fn test_parse_notify_null_data() {
        let frame = InboundFrame::parse(r#"{"Notify":"light","Data":null}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Notify(n) if n.data == json!({})));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            InboundFrame::parse("not json"),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"Hello":"world"}"#),
            Err(ParseError::UnknownFrame(_))
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"Response":5}"#),
            Err(ParseError::InvalidField { field: "Response", .. })
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"Response":"Status","Status":"ok"}"#),
            Err(ParseError::InvalidField { field: "Status", .. })
        ));
    }

    #[test]
    fn test_request_kind_names() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_name(&kind.to_string()), Some(kind));
            assert_eq!(
                RequestKind::from_name(&kind.wire_name().to_lowercase()),
                Some(kind)
            );
        }
        assert!(RequestKind::Update.carries_data());
        assert!(!RequestKind::Status.carries_data());
    }
}
