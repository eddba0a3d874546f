//! Mock hood implementation for testing.
//!
//! This module provides an in-memory hood that can be used for unit testing
//! without a real device on the network.
//!
//! The [`MockHood`] implements the [`Connector`] trait, so a [`Hub`] built
//! with it runs its real handshake, correlation, receive loop and watchdog
//! against an emulated device.
//!
//! # Features
//!
//! - **Protocol emulation**: `Authenticate`, `Status`, `ProtocolVersion` and
//!   `Update` (which answers and then notifies the changed sections)
//! - **Failure injection**: failed connects, per-kind suppressed or limited
//!   responses, forced status codes, forced disconnects
//! - **Latency simulation**: delay every response
//! - **Inspection**: every received request frame and the connect count
//!
//! [`Hub`]: crate::hub::Hub

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use thermex_types::{
    DecolightSection, FanSection, LightSection, RequestKind, SUCCESS_STATUS, Section,
    correlation_key,
};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Connector, FrameSink, FrameStream, WsConnection};
use crate::util::lock;

/// Status code the mock returns for a wrong API key.
pub const UNAUTHORIZED_STATUS: i64 = 401;

/// Status code the mock returns for an unknown request kind.
pub const UNKNOWN_REQUEST_STATUS: i64 = 404;

#[derive(Debug, Default)]
struct Behavior {
    silent: bool,
    suppressed: HashSet<String>,
    response_limits: HashMap<String, u32>,
    forced_status: HashMap<String, i64>,
    response_delay: Duration,
    failing_connects: u32,
}

type ClientTx = mpsc::UnboundedSender<Option<String>>;

struct Shared {
    api_key: String,
    sections: Mutex<Map<String, Value>>,
    protocol_version: Option<(i64, i64)>,
    behavior: Mutex<Behavior>,
    requests: Mutex<Vec<Value>>,
    connect_count: AtomicU32,
    current: Mutex<Option<(ClientTx, Arc<AtomicBool>)>>,
}

/// An in-memory Thermex hood.
///
/// Cloning is cheap; clones share the same device state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use thermex_core::{EventDispatcher, Hub, HubConfig, MockHood};
///
/// #[tokio::main]
/// async fn main() {
///     let hood = MockHood::new("secret");
///     let hub = Hub::with_connector(
///         HubConfig::new("mock", "secret"),
///         Arc::new(hood.clone()),
///         EventDispatcher::default(),
///     )
///     .unwrap();
///     hub.connect().await.unwrap();
///     assert_eq!(hood.connect_count(), 1);
///     hub.close().await;
/// }
/// ```
#[derive(Clone)]
pub struct MockHood {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MockHood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHood")
            .field("connect_count", &self.connect_count())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MockHood {
    /// Create a hood accepting `api_key`, with everything switched off.
    pub fn new(api_key: &str) -> Self {
        MockHoodBuilder::new().api_key(api_key).build()
    }

    /// Start building a customised hood.
    pub fn builder() -> MockHoodBuilder {
        MockHoodBuilder::new()
    }

    // ==================== Device state ====================

    /// Current fan section.
    pub fn fan(&self) -> FanSection {
        FanSection::from_value(&self.section(Section::Fan))
    }

    /// Current light section.
    pub fn light(&self) -> LightSection {
        LightSection::from_value(&self.section(Section::Light))
    }

    /// Current deco light section.
    pub fn decolight(&self) -> DecolightSection {
        DecolightSection::from_value(&self.section(Section::Decolight))
    }

    fn section(&self, section: Section) -> Value {
        lock(&self.shared.sections)
            .get(section.data_key())
            .cloned()
            .unwrap_or_else(|| json!({}))
    }

    /// Change the device state as if a user pressed a button on the hood,
    /// and notify the connected client.
    pub fn press(&self, update: &Value) {
        for notify in self.apply_update(update) {
            self.push_raw(notify);
        }
    }

    // ==================== Failure injection ====================

    /// Stop answering every request except `Authenticate`.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.shared.behavior).silent = silent;
    }

    /// Never answer requests of `kind`.
    pub fn suppress(&self, kind: &str) {
        lock(&self.shared.behavior)
            .suppressed
            .insert(correlation_key(kind));
    }

    /// Answer requests of `kind` again.
    pub fn unsuppress(&self, kind: &str) {
        let mut behavior = lock(&self.shared.behavior);
        let key = correlation_key(kind);
        behavior.suppressed.remove(&key);
        behavior.response_limits.remove(&key);
    }

    /// Answer only the next `count` requests of `kind`, then go quiet.
    pub fn limit_responses(&self, kind: &str, count: u32) {
        lock(&self.shared.behavior)
            .response_limits
            .insert(correlation_key(kind), count);
    }

    /// Answer requests of `kind` with `status` instead of 200.
    pub fn force_status(&self, kind: &str, status: i64) {
        lock(&self.shared.behavior)
            .forced_status
            .insert(correlation_key(kind), status);
    }

    /// Delay every response (not the handshake) by `delay`.
    pub fn set_response_delay(&self, delay: Duration) {
        lock(&self.shared.behavior).response_delay = delay;
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.shared.behavior).failing_connects = count;
    }

    /// Close the current socket from the device side.
    pub fn disconnect(&self) {
        if let Some((tx, closed)) = lock(&self.shared.current).take() {
            closed.store(true, Ordering::SeqCst);
            let _ = tx.send(None);
        }
    }

    /// Send an unsolicited notification to the connected client.
    pub fn push_notify(&self, kind: &str, data: Value) {
        self.push_raw(json!({ "Notify": kind, "Data": data }).to_string());
    }

    /// Send a raw text frame to the connected client.
    pub fn push_raw(&self, text: String) {
        if let Some((tx, _)) = lock(&self.shared.current).as_ref() {
            let _ = tx.send(Some(text));
        }
    }

    // ==================== Inspection ====================

    /// Number of successful connection attempts.
    pub fn connect_count(&self) -> u32 {
        self.shared.connect_count.load(Ordering::SeqCst)
    }

    /// Whether a client socket is open.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.current)
            .as_ref()
            .is_some_and(|(_, closed)| !closed.load(Ordering::SeqCst))
    }

    /// Every request frame received, in order.
    pub fn requests(&self) -> Vec<Value> {
        lock(&self.shared.requests).clone()
    }

    /// The `Request` names received, in order.
    pub fn request_kinds(&self) -> Vec<String> {
        lock(&self.shared.requests)
            .iter()
            .filter_map(|r| r.get("Request").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Number of requests of `kind` received.
    pub fn request_count(&self, kind: &str) -> usize {
        self.request_kinds()
            .iter()
            .filter(|k| k.eq_ignore_ascii_case(kind))
            .count()
    }

    /// Forget the recorded requests.
    pub fn clear_requests(&self) {
        lock(&self.shared.requests).clear();
    }

    // ==================== Protocol ====================

    /// Merge an `Update` payload into the device state.
    ///
    /// Returns the notifications the device sends for the changed sections.
    fn apply_update(&self, update: &Value) -> Vec<String> {
        let Some(changes) = update.as_object() else {
            return Vec::new();
        };
        let mut sections = lock(&self.shared.sections);
        let mut notifies = Vec::new();
        for (name, fields) in changes {
            let entry = sections
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Some(target), Some(fields)) = (entry.as_object_mut(), fields.as_object()) {
                for (field, value) in fields {
                    target.insert(field.clone(), value.clone());
                }
            }
            let mut data = Map::new();
            data.insert(name.clone(), entry.clone());
            notifies.push(
                json!({ "Notify": name.to_lowercase(), "Data": Value::Object(data) }).to_string(),
            );
        }
        notifies
    }

    fn handle_request(&self, request: &Value) -> Vec<String> {
        let name = request
            .get("Request")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let key = correlation_key(&name);

        {
            let mut behavior = lock(&self.shared.behavior);
            if behavior.silent || behavior.suppressed.contains(&key) {
                return Vec::new();
            }
            if let Some(remaining) = behavior.response_limits.get_mut(&key) {
                if *remaining == 0 {
                    return Vec::new();
                }
                *remaining -= 1;
            }
        }
        let forced = lock(&self.shared.behavior).forced_status.get(&key).copied();

        let respond = |status: i64, data: Value| {
            json!({ "Response": name, "Status": forced.unwrap_or(status), "Data": data })
                .to_string()
        };

        match RequestKind::from_name(&name) {
            Some(RequestKind::Status) => {
                let data = Value::Object(lock(&self.shared.sections).clone());
                vec![respond(SUCCESS_STATUS, data)]
            }
            Some(RequestKind::ProtocolVersion) => match self.shared.protocol_version {
                Some((major, minor)) => vec![respond(
                    SUCCESS_STATUS,
                    json!({ "MajorVersion": major, "MinorVersion": minor }),
                )],
                None => Vec::new(),
            },
            Some(RequestKind::Update) => {
                let update = request.get("Data").cloned().unwrap_or(Value::Null);
                let mut frames = vec![respond(SUCCESS_STATUS, json!({}))];
                if forced.is_none() {
                    frames.extend(self.apply_update(&update));
                }
                frames
            }
            Some(RequestKind::Authenticate) => vec![respond(SUCCESS_STATUS, json!({}))],
            None => vec![respond(UNKNOWN_REQUEST_STATUS, json!({}))],
        }
    }

    /// Check the handshake code; returns whether it matched and the reply.
    fn authenticate(&self, request: &Value) -> (bool, String) {
        let code = request
            .get("Data")
            .and_then(|d| d.get("Code"))
            .and_then(Value::as_str);
        let accepted = code == Some(self.shared.api_key.as_str());
        let status = if accepted {
            SUCCESS_STATUS
        } else {
            UNAUTHORIZED_STATUS
        };
        let reply = json!({ "Response": "Authenticate", "Status": status, "Data": {} });
        (accepted, reply.to_string())
    }
}

#[async_trait]
impl Connector for MockHood {
    async fn connect(&self, url: &str) -> Result<WsConnection> {
        {
            let mut behavior = lock(&self.shared.behavior);
            if behavior.failing_connects > 0 {
                behavior.failing_connects -= 1;
                return Err(Error::connection_failed(url, ConnectionFailureReason::Refused));
            }
        }

        // A new client replaces the previous one, like the real device.
        self.disconnect();
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        *lock(&self.shared.current) = Some((tx.clone(), closed.clone()));
        self.shared.connect_count.fetch_add(1, Ordering::SeqCst);

        Ok(WsConnection {
            sink: Box::new(MockSink {
                hood: self.clone(),
                tx,
                closed,
                authenticated: false,
            }),
            stream: Box::new(MockStream { rx }),
        })
    }
}

struct MockSink {
    hood: MockHood,
    tx: ClientTx,
    closed: Arc<AtomicBool>,
    authenticated: bool,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost("mock socket closed".to_string()));
        }
        let request: Value = serde_json::from_str(&text)?;
        lock(&self.hood.shared.requests).push(request.clone());

        if !self.authenticated {
            let (accepted, reply) = self.hood.authenticate(&request);
            self.authenticated = accepted;
            let _ = self.tx.send(Some(reply));
            return Ok(());
        }

        let frames = self.hood.handle_request(&request);
        if frames.is_empty() {
            return Ok(());
        }
        let delay = lock(&self.hood.shared.behavior).response_delay;
        if delay.is_zero() {
            for frame in frames {
                let _ = self.tx.send(Some(frame));
            }
        } else {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for frame in frames {
                    let _ = tx.send(Some(frame));
                }
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(None);
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Option<String>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        match self.rx.recv().await {
            Some(Some(text)) => Some(Ok(text)),
            Some(None) | None => None,
        }
    }
}

/// Builder for creating mock hoods with custom settings.
#[derive(Debug, Clone)]
pub struct MockHoodBuilder {
    api_key: String,
    fan: FanSection,
    light: LightSection,
    decolight: DecolightSection,
    protocol_version: Option<(i64, i64)>,
    response_delay: Duration,
}

impl Default for MockHoodBuilder {
    fn default() -> Self {
        Self {
            api_key: "secret".to_string(),
            fan: FanSection::default(),
            light: LightSection {
                lightonoff: 0,
                lightbrightness: 100,
            },
            decolight: DecolightSection {
                decolightonoff: 0,
                decolightbrightness: 100,
                decolightr: 255,
                decolightg: 255,
                decolightb: 255,
            },
            protocol_version: Some((1, 0)),
            response_delay: Duration::ZERO,
        }
    }
}

impl MockHoodBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accepted API key.
    pub fn api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    /// Set the initial fan state.
    pub fn fan(mut self, fan: FanSection) -> Self {
        self.fan = fan;
        self
    }

    /// Set the initial light state.
    pub fn light(mut self, light: LightSection) -> Self {
        self.light = light;
        self
    }

    /// Set the initial deco light state.
    pub fn decolight(mut self, decolight: DecolightSection) -> Self {
        self.decolight = decolight;
        self
    }

    /// Version reported for `ProtocolVersion`, or `None` to never answer it.
    pub fn protocol_version(mut self, version: Option<(i64, i64)>) -> Self {
        self.protocol_version = version;
        self
    }

    /// Delay every response by `delay`.
    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Build the mock hood.
    pub fn build(self) -> MockHood {
        let mut sections = Map::new();
        for update in [
            self.fan.to_update(),
            self.light.to_update(),
            self.decolight.to_update(),
        ] {
            if let Value::Object(map) = update {
                sections.extend(map);
            }
        }
        MockHood {
            shared: Arc::new(Shared {
                api_key: self.api_key,
                sections: Mutex::new(sections),
                protocol_version: self.protocol_version,
                behavior: Mutex::new(Behavior {
                    response_delay: self.response_delay,
                    ..Default::default()
                }),
                requests: Mutex::new(Vec::new()),
                connect_count: AtomicU32::new(0),
                current: Mutex::new(None),
            }),
        }
    }
}
