//! Connection session to one Thermex hood.
//!
//! The [`Hub`] owns a single WebSocket to the device. It authenticates,
//! correlates responses to requests by lowercase request kind, publishes
//! unsolicited `Notify` frames on the [`EventDispatcher`], reconnects on
//! demand and runs a watchdog that sends heartbeats and replaces stale
//! sockets.
//!
//! # State machine
//!
//! ```text
//! disconnected -> connecting -> authenticating -> initializing -> connected
//!       ^                                                            |
//!       +---------------------- socket lost -------------------------+
//! any state -> error (on failure)      any state -> closed (close())
//! ```
//!
//! # Pending requests
//!
//! The pending table holds at most one request per kind. Sending a second
//! request of the same kind before the first is answered replaces the
//! first's slot; the first caller then only sees its timeout.
//!
//! # Background tasks
//!
//! Background tasks hold a [`Weak`] reference to the hub so dropping the
//! last [`Hub`] handle stops them. [`Hub::close`] cancels them and waits for
//! them to finish.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use thermex_types::{
    ConnectionState, DEFAULT_PORT, InboundFrame, Request, RequestKind, ResponseFrame,
    WEBSOCKET_PATH,
};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, HubEvent};
use crate::reconnect::ReconnectOptions;
use crate::timer::{ScheduledTask, call_periodic};
use crate::transport::{
    Connector, FrameSink, FrameStream, TungsteniteConnector, WsConnection, api_url,
};
use crate::util::{lock, truncate, unique_id_for_host};

/// Number of raw frames kept for diagnostics.
pub const RECENT_MESSAGES: usize = 10;

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default watchdog interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default idle time after which the socket is considered dead.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(120);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`Hub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hostname or IP address of the hood.
    pub host: String,
    /// Shared secret sent in the `Authenticate` request.
    pub api_key: String,
    /// WebSocket port.
    pub port: u16,
    /// WebSocket path.
    pub path: String,
    /// How long to wait for a matching response.
    pub request_timeout: Duration,
    /// Watchdog tick interval.
    pub heartbeat_interval: Duration,
    /// Idle time after which the watchdog replaces the socket.
    pub connection_timeout: Duration,
    /// How long a caller waits for another task's reconnect.
    pub reconnect_wait: Duration,
    /// Reconnection policy.
    pub reconnect: ReconnectOptions,
}

impl HubConfig {
    /// Create a configuration with default timings.
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            port: DEFAULT_PORT,
            path: WEBSOCKET_PATH.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            reconnect_wait: Duration::from_secs(30),
            reconnect: ReconnectOptions::default(),
        }
    }

    /// Set the WebSocket port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the WebSocket path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the watchdog interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the idle time after which the socket is replaced.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set how long callers wait for a reconnect in progress.
    pub fn reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// Set the reconnection policy.
    pub fn reconnect(mut self, options: ReconnectOptions) -> Self {
        self.reconnect = options;
        self
    }

    /// WebSocket URL of the hood's API.
    pub fn url(&self) -> String {
        api_url(&self.host, self.port, &self.path)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid_config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::invalid_config("port must be > 0"));
        }
        if !self.path.starts_with('/') {
            return Err(Error::invalid_config("path must start with '/'"));
        }
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("connection_timeout", self.connection_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{} must be > 0", name)));
            }
        }
        self.reconnect.validate()
    }
}

/// Device registry information for a hood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Stable identifier, see [`Hub::unique_id`].
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model name.
    pub model: String,
    /// Host the hood is reached at.
    pub host: String,
}

#[derive(Debug, Clone, Copy)]
struct WatchdogSettings {
    heartbeat_interval: Duration,
    connection_timeout: Duration,
}

struct PendingSlot {
    id: u64,
    tx: oneshot::Sender<Result<ResponseFrame>>,
}

type PendingTable = Mutex<HashMap<String, PendingSlot>>;

/// Removes a pending slot when its request finishes, unless a newer request
/// of the same kind has taken the slot over.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    key: &'a str,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = lock(self.pending);
        if pending.get(self.key).is_some_and(|slot| slot.id == self.id) {
            pending.remove(self.key);
        }
    }
}

#[derive(Default)]
struct SessionInfo {
    last_error: Option<String>,
    protocol_version: Option<String>,
    last_status: Option<ResponseFrame>,
    recent_messages: VecDeque<String>,
}

struct Inner {
    config: HubConfig,
    watchdog_settings: Mutex<WatchdogSettings>,
    connector: Arc<dyn Connector>,
    events: EventDispatcher,

    sink: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    pending: PendingTable,
    next_request_id: AtomicU64,

    state: watch::Sender<ConnectionState>,
    info: Mutex<SessionInfo>,
    last_activity: Mutex<Instant>,

    startup_complete: AtomicBool,
    fanout_pending: AtomicBool,
    closing: AtomicBool,
    socket_open: AtomicBool,
    heartbeat_in_flight: AtomicBool,
    generation: AtomicU64,

    shutdown: CancellationToken,
    reconnect_lock: tokio::sync::Mutex<()>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    watchdog: Mutex<Option<ScheduledTask>>,
    aux_tasks: Mutex<JoinSet<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = lock(&self.recv_task).take() {
            handle.abort();
        }
        if let Some(watchdog) = lock(&self.watchdog).take() {
            watchdog.cancel();
        }
    }
}

/// Connection session to one hood.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("host", &self.inner.config.host)
            .field("state", &self.connection_state())
            .field("socket_open", &self.is_connected())
            .finish()
    }
}

impl Hub {
    /// Create a hub that connects with [`TungsteniteConnector`].
    pub fn new(config: HubConfig, events: EventDispatcher) -> Result<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector::new()), events)
    }

    /// Create a hub with a custom connector.
    ///
    /// No connection is opened until [`connect`](Self::connect) or the first
    /// [`send_request`](Self::send_request).
    pub fn with_connector(
        config: HubConfig,
        connector: Arc<dyn Connector>,
        events: EventDispatcher,
    ) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let watchdog_settings = WatchdogSettings {
            heartbeat_interval: config.heartbeat_interval,
            connection_timeout: config.connection_timeout,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                watchdog_settings: Mutex::new(watchdog_settings),
                connector,
                events,
                sink: tokio::sync::Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
                state,
                info: Mutex::new(SessionInfo::default()),
                last_activity: Mutex::new(Instant::now()),
                startup_complete: AtomicBool::new(false),
                fanout_pending: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                socket_open: AtomicBool::new(false),
                heartbeat_in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                reconnect_lock: tokio::sync::Mutex::new(()),
                recv_task: Mutex::new(None),
                watchdog: Mutex::new(None),
                aux_tasks: Mutex::new(JoinSet::new()),
            }),
        })
    }

    // ==================== Identity ====================

    /// Host the hub talks to.
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Stable identifier, `thermex_` followed by the host with dots replaced.
    pub fn unique_id(&self) -> String {
        unique_id_for_host(&self.inner.config.host)
    }

    /// Device registry information.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.unique_id(),
            name: format!("Thermex Hood ({})", self.inner.config.host),
            manufacturer: "Thermex".to_string(),
            model: "ESP-API".to_string(),
            host: self.inner.config.host.clone(),
        }
    }

    /// The dispatch bus this hub publishes on.
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    // ==================== State ====================

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether a socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.socket_open.load(Ordering::SeqCst)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    /// Whether a full status fan-out has succeeded.
    pub fn startup_complete(&self) -> bool {
        self.inner.startup_complete.load(Ordering::SeqCst)
    }

    /// Whether the receive loop is running.
    pub fn is_receiving(&self) -> bool {
        lock(&self.inner.recv_task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Most recent recorded error.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.info).last_error.clone()
    }

    /// Protocol version reported by the device.
    pub fn protocol_version(&self) -> Option<String> {
        lock(&self.inner.info).protocol_version.clone()
    }

    /// Last successful `Status` response.
    pub fn last_status(&self) -> Option<ResponseFrame> {
        lock(&self.inner.info).last_status.clone()
    }

    /// The most recent raw frames, oldest first.
    pub fn recent_messages(&self) -> Vec<String> {
        lock(&self.inner.info)
            .recent_messages
            .iter()
            .cloned()
            .collect()
    }

    /// Kinds of the requests awaiting a response, sorted.
    pub fn pending_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = lock(&self.inner.pending).keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Time since the last frame was sent or received.
    pub fn idle_time(&self) -> Duration {
        lock(&self.inner.last_activity).elapsed()
    }

    fn touch(&self) {
        *lock(&self.inner.last_activity) = Instant::now();
    }

    fn set_state(&self, new: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == new {
                return false;
            }
            trace!("Connection state {} -> {}", state, new);
            *state = new;
            true
        });
    }

    fn record_error(&self, message: impl Into<String>) {
        lock(&self.inner.info).last_error = Some(message.into());
    }

    fn fail(&self, err: &Error) {
        self.set_state(ConnectionState::Error);
        self.record_error(err.to_string());
    }

    fn push_recent(&self, text: &str) {
        let mut info = lock(&self.inner.info);
        if info.recent_messages.len() == RECENT_MESSAGES {
            info.recent_messages.pop_front();
        }
        info.recent_messages.push_back(text.to_string());
    }

    fn spawn_aux<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.inner.aux_tasks);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
    }

    // ==================== Connection ====================

    /// Open the socket, authenticate and start the background tasks.
    ///
    /// On success the receive loop and watchdog are running, the protocol
    /// version has been queried (best effort) and the initial status fan-out
    /// has been started in the background. The state becomes `connected`
    /// once that fan-out completes.
    ///
    /// An authentication failure leaves the state at `error`.
    pub async fn connect(&self) -> Result<()> {
        if self.is_closing() {
            return Err(Error::Closing);
        }
        let host = &self.inner.config.host;
        info!("Connecting to Thermex hood at {}", host);
        self.set_state(ConnectionState::Connecting);

        let established = tokio::select! {
            _ = self.inner.shutdown.cancelled() => Err(Error::Closing),
            result = self.establish() => result,
        };
        let WsConnection { sink, stream } = match established {
            Ok(conn) => conn,
            Err(Error::Closing) => return Err(Error::Closing),
            Err(e) => {
                error!("Failed to connect to {}: {}", host, e);
                self.fail(&e);
                return Err(e);
            }
        };

        self.set_state(ConnectionState::Initializing);
        self.install(sink, stream).await;
        if self.is_closing() {
            self.drop_socket(DisconnectReason::UserRequested).await;
            return Err(Error::Closing);
        }
        info!("Connected to Thermex hood at {}", host);
        self.inner.events.send(HubEvent::Connected);

        self.negotiate_protocol_version().await;
        self.spawn_aux(initial_status(Arc::downgrade(&self.inner)));
        Ok(())
    }

    /// Open the socket and run the authentication handshake.
    async fn establish(&self) -> Result<WsConnection> {
        let mut conn = self.inner.connector.connect(&self.inner.config.url()).await?;
        self.set_state(ConnectionState::Authenticating);
        match self
            .authenticate(conn.sink.as_mut(), conn.stream.as_mut())
            .await
        {
            Ok(()) => Ok(conn),
            Err(e) => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, conn.sink.close()).await;
                Err(e)
            }
        }
    }

    async fn authenticate(
        &self,
        sink: &mut dyn FrameSink,
        stream: &mut dyn FrameStream,
    ) -> Result<()> {
        let text = Request::authenticate(&self.inner.config.api_key).to_json()?;
        sink.send_text(text).await?;

        let timeout = self.inner.config.request_timeout;
        let frame = match tokio::time::timeout(timeout, stream.next_frame()).await {
            Err(_) => return Err(Error::timeout("authenticate", timeout)),
            Ok(None) => {
                return Err(Error::connection_failed(
                    &self.inner.config.host,
                    ConnectionFailureReason::ClosedDuringHandshake,
                ));
            }
            Ok(Some(frame)) => frame?,
        };
        self.push_recent(&frame);

        match InboundFrame::parse(&frame) {
            Ok(InboundFrame::Response(response)) if response.key() == "authenticate" => {
                if response.is_success() {
                    debug!("Authenticated with {} (status=200)", self.inner.config.host);
                    Ok(())
                } else {
                    Err(Error::Authentication(format!(
                        "device rejected the API key (status {:?})",
                        response.status
                    )))
                }
            }
            Ok(_) => Err(Error::Authentication(format!(
                "unexpected handshake reply: {}",
                truncate(&frame, 200)
            ))),
            Err(e) => Err(Error::Authentication(format!(
                "malformed handshake reply: {}",
                e
            ))),
        }
    }

    /// Make an authenticated connection the current one.
    async fn install(&self, sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) {
        let inner = &self.inner;
        let previous = inner.sink.lock().await.replace(sink);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.fanout_pending.store(true, Ordering::SeqCst);
        inner.socket_open.store(true, Ordering::SeqCst);
        self.touch();

        let handle = tokio::spawn(recv_loop(Arc::downgrade(inner), stream, generation));
        if let Some(old) = lock(&inner.recv_task).replace(handle) {
            old.abort();
        }
        if let Some(mut old) = previous {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, old.close()).await;
        }
        self.ensure_watchdog();
    }

    async fn negotiate_protocol_version(&self) {
        match self
            .request_kind_once(RequestKind::ProtocolVersion, Value::Null)
            .await
        {
            Ok(response) if response.is_success() => {
                let version = format_protocol_version(&response.data);
                debug!("Protocol version of {}: {}", self.inner.config.host, version);
                lock(&self.inner.info).protocol_version = Some(version);
            }
            Ok(response) => {
                error!(
                    "ProtocolVersion returned non-200 status: {:?}",
                    response.status
                );
            }
            Err(e) if e.is_timeout() => {
                debug!("No ProtocolVersion response within timeout, skipping negotiation");
            }
            Err(Error::Closing) => {}
            Err(e) => {
                warn!("ProtocolVersion request failed: {}", e);
                self.record_error(format!("ProtocolVersion request failed: {}", e));
            }
        }
    }

    /// Publish every section of a status payload as a notification.
    ///
    /// Each `Data` entry `"<Section>": {...}` becomes a notification of kind
    /// `<section>` carrying `{"<Section>": {...}}`.
    fn publish_status(&self, data: &Value) -> usize {
        let Some(sections) = data.as_object() else {
            warn!("Status data is not an object: {}", data);
            return 0;
        };
        for (name, section) in sections {
            debug!("Initial status notify: {}={}", name, section);
            let mut payload = Map::new();
            payload.insert(name.clone(), section.clone());
            self.inner
                .events
                .notify(name.to_lowercase(), Value::Object(payload));
        }
        sections.len()
    }

    /// Reconnect if the socket is not open.
    ///
    /// Only one reconnect runs at a time. A caller that finds another
    /// reconnect in progress waits for it up to the configured
    /// `reconnect_wait`, then fails with [`Error::ReconnectInProgress`].
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.is_closing() {
            return Err(Error::Closing);
        }
        if self.is_connected() {
            return Ok(());
        }

        let wait = self.inner.config.reconnect_wait;
        let _guard = match tokio::time::timeout(wait, self.inner.reconnect_lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Gave up waiting {:?} for a reconnect in progress", wait);
                return Err(Error::ReconnectInProgress);
            }
        };
        if self.is_closing() {
            return Err(Error::Closing);
        }
        if self.is_connected() {
            return Ok(());
        }

        self.drop_socket(DisconnectReason::SocketClosed).await;

        let options = &self.inner.config.reconnect;
        let mut last_error = String::new();
        for attempt in 1..=options.max_attempts {
            self.inner
                .events
                .send(HubEvent::ReconnectStarted { attempt });
            match self.connect().await {
                Ok(()) => {
                    self.inner
                        .events
                        .send(HubEvent::ReconnectSucceeded { attempts: attempt });
                    return Ok(());
                }
                Err(Error::Closing) => return Err(Error::Closing),
                Err(e @ (Error::Authentication(_) | Error::InvalidConfig(_))) => {
                    self.inner.events.send(HubEvent::ReconnectFailed {
                        attempts: attempt,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Reconnect attempt {}/{} to {} failed: {}",
                        attempt, options.max_attempts, self.inner.config.host, e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < options.max_attempts {
                let delay = options.delay_for_attempt(attempt - 1);
                tokio::select! {
                    _ = self.inner.shutdown.cancelled() => return Err(Error::Closing),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        error!(
            "Giving up on {} after {} attempts",
            self.inner.config.host, options.max_attempts
        );
        self.record_error(format!("Reconnect failed: {}", last_error));
        self.inner.events.send(HubEvent::ReconnectFailed {
            attempts: options.max_attempts,
            error: last_error.clone(),
        });
        Err(Error::ReconnectExhausted {
            attempts: options.max_attempts,
            last_error,
        })
    }

    /// Tear down the current socket without closing the hub.
    async fn drop_socket(&self, reason: DisconnectReason) {
        let inner = &self.inner;
        let sink = inner.sink.lock().await.take();
        inner.generation.fetch_add(1, Ordering::SeqCst);
        let was_open = inner.socket_open.swap(false, Ordering::SeqCst);
        if let Some(handle) = lock(&inner.recv_task).take() {
            handle.abort();
        }
        if let Some(mut sink) = sink
            && tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err()
        {
            debug!("Timed out closing socket to {}", inner.config.host);
        }
        if was_open && !self.is_closing() {
            self.set_state(ConnectionState::Disconnected);
            inner.events.send(HubEvent::Disconnected { reason });
        }
    }

    /// Called by the receive loop when its socket ends.
    fn on_socket_closed(&self, generation: u64, reason: DisconnectReason) {
        let inner = &self.inner;
        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        inner.socket_open.store(false, Ordering::SeqCst);
        if self.is_closing() {
            return;
        }
        warn!("Connection to {} closed: {:?}", inner.config.host, reason);
        self.set_state(ConnectionState::Disconnected);
        inner.events.send(HubEvent::Disconnected { reason });
    }

    // ==================== Requests ====================

    /// Send a request and wait for its response.
    ///
    /// The socket is (re)connected first if needed. A failed send triggers
    /// one reconnect and resend. A timeout is retried once with a fresh
    /// pending slot; a second timeout is returned as
    /// [`Error::RequestTimeout`] and the connection is left as it is.
    ///
    /// Returns [`Error::RequestFailed`] when the device answers with a
    /// status other than 200.
    pub async fn send_request(&self, kind: &str, payload: Value) -> Result<ResponseFrame> {
        if self.is_closing() {
            return Err(Error::Closing);
        }
        self.ensure_connected().await?;

        let request = Request::new(kind, payload);
        let key = request.key();
        let text = request.to_json()?;

        let result = match self.transmit(&key, &text).await {
            Err(e) if e.is_timeout() => {
                warn!("Request '{}' timed out, retrying once", key);
                self.transmit(&key, &text).await
            }
            other => other,
        };

        match result {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(Error::RequestFailed {
                kind: response.kind,
                status: response.status,
            }),
            Err(e) => {
                if !matches!(e, Error::Closing) {
                    self.record_error(format!("Send request error: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Send an `Update` request with a section payload.
    pub async fn update(&self, payload: Value) -> Result<ResponseFrame> {
        self.send_request(RequestKind::Update.wire_name(), payload)
            .await
    }

    /// Request the full device status.
    pub async fn request_status(&self) -> Result<ResponseFrame> {
        self.send_request(RequestKind::Status.wire_name(), Value::Null)
            .await
    }

    async fn transmit(&self, key: &str, text: &str) -> Result<ResponseFrame> {
        match self.request_once(key, text).await {
            Err(e @ (Error::ConnectionLost(_) | Error::NotConnected)) => {
                warn!("Send of '{}' failed ({}), reconnecting", key, e);
                self.ensure_connected().await?;
                self.request_once(key, text).await
            }
            other => other,
        }
    }

    async fn request_kind_once(&self, kind: RequestKind, payload: Value) -> Result<ResponseFrame> {
        let request = Request::new(kind.wire_name(), payload);
        let key = request.key();
        let text = request.to_json()?;
        self.request_once(&key, &text).await
    }

    /// One send-and-wait without reconnecting or retrying.
    async fn request_once(&self, key: &str, text: &str) -> Result<ResponseFrame> {
        if self.is_closing() {
            return Err(Error::Closing);
        }
        let (tx, rx) = oneshot::channel();
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        if lock(&self.inner.pending)
            .insert(key.to_string(), PendingSlot { id, tx })
            .is_some()
        {
            warn!("Overwriting pending request for key {}", key);
        }
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            key,
            id,
        };

        self.send_raw(text.to_string()).await?;

        let timeout = self.inner.config.request_timeout;
        let deadline = Instant::now() + timeout;
        tokio::select! {
            _ = self.inner.shutdown.cancelled() => Err(Error::Closing),
            received = tokio::time::timeout_at(deadline, rx) => match received {
                Ok(Ok(result)) => result,
                // The slot was taken over by a newer request of the same kind.
                Ok(Err(_)) => {
                    tokio::select! {
                        _ = self.inner.shutdown.cancelled() => Err(Error::Closing),
                        _ = tokio::time::sleep_until(deadline) => Err(Error::timeout(key, timeout)),
                    }
                }
                Err(_) => Err(Error::timeout(key, timeout)),
            },
        }
    }

    async fn send_raw(&self, text: String) -> Result<()> {
        let result = {
            let mut sink = self.inner.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink.send_text(text).await,
                None => Err(Error::NotConnected),
            }
        };
        match result {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(Error::NotConnected) => Err(Error::NotConnected),
            Err(e) => {
                warn!("WebSocket send failed: {}", e);
                self.record_error(format!("Send request error: {}", e));
                self.drop_socket(DisconnectReason::SendFailed(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Handle one inbound text frame.
    fn handle_frame(&self, text: &str) {
        self.touch();
        self.push_recent(text);

        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => {
                let key = response.key();
                if key == "status" && response.is_success() {
                    lock(&self.inner.info).last_status = Some(response.clone());
                    if self.inner.fanout_pending.swap(false, Ordering::SeqCst) {
                        let sections = self.publish_status(&response.data);
                        self.inner.startup_complete.store(true, Ordering::SeqCst);
                        self.set_state(ConnectionState::Connected);
                        info!(
                            "Initial status from {} published ({} sections)",
                            self.inner.config.host, sections
                        );
                    }
                }
                let slot = lock(&self.inner.pending).remove(&key);
                match slot {
                    Some(slot) => {
                        let _ = slot.tx.send(Ok(response));
                    }
                    None => debug!("Dropping response '{}' with no pending request", key),
                }
            }
            Ok(InboundFrame::Notify(notify)) => {
                debug!("Received Notify '{}': {}", notify.kind, notify.data);
                self.inner.events.notify(notify.kind, notify.data);
            }
            Err(e) => {
                warn!("Skipping malformed frame: {}", e);
                self.record_error(format!("Error parsing message: {}", e));
            }
        }
    }

    // ==================== Watchdog ====================

    /// Change the watchdog timings, restarting it if it is running.
    pub fn configure_watchdog(&self, heartbeat_interval: Duration, connection_timeout: Duration) {
        *lock(&self.inner.watchdog_settings) = WatchdogSettings {
            heartbeat_interval,
            connection_timeout,
        };
        let running = lock(&self.inner.watchdog).take();
        if let Some(task) = running {
            task.cancel();
            self.ensure_watchdog();
        }
    }

    fn ensure_watchdog(&self) {
        if self.is_closing() {
            return;
        }
        let mut slot = lock(&self.inner.watchdog);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let period = lock(&self.inner.watchdog_settings).heartbeat_interval;
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(call_periodic(period, move || watchdog_tick(weak.clone())));
    }

    async fn watchdog_check(&self) {
        if self.is_closing() {
            return;
        }
        let settings = *lock(&self.inner.watchdog_settings);
        let host = &self.inner.config.host;

        if !self.is_connected() {
            debug!("Watchdog: socket to {} is closed, reconnecting", host);
            if let Err(e) = self.ensure_connected().await {
                warn!("Watchdog reconnect to {} failed: {}", host, e);
                self.record_error(format!("Watchdog reconnect failed: {}", e));
            }
            return;
        }

        let idle = self.idle_time();
        if idle > settings.connection_timeout {
            warn!("No activity from {} for {:?}, reconnecting", host, idle);
            self.drop_socket(DisconnectReason::Stale).await;
            if let Err(e) = self.ensure_connected().await {
                warn!("Watchdog reconnect to {} failed: {}", host, e);
                self.record_error(format!("Watchdog reconnect failed: {}", e));
            }
            return;
        }

        if self.inner.heartbeat_in_flight.swap(true, Ordering::SeqCst) {
            trace!("Heartbeat to {} still in flight", host);
            return;
        }
        self.spawn_aux(heartbeat(Arc::downgrade(&self.inner)));
    }

    // ==================== Shutdown ====================

    /// Close the hub.
    ///
    /// Idempotent. Fails every pending request with [`Error::Closing`],
    /// stops the background tasks and waits for them, closes the socket and
    /// moves to the terminal `closed` state.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing connection to {}", inner.config.host);
        inner.shutdown.cancel();

        let drained: Vec<PendingSlot> = lock(&inner.pending).drain().map(|(_, s)| s).collect();
        for slot in drained {
            let _ = slot.tx.send(Err(Error::Closing));
        }

        let watchdog = lock(&inner.watchdog).take();
        if let Some(task) = watchdog {
            task.cancel_and_wait().await;
        }
        let recv = lock(&inner.recv_task).take();
        if let Some(handle) = recv {
            handle.abort();
            let _ = handle.await;
        }
        let mut aux = std::mem::take(&mut *lock(&inner.aux_tasks));
        aux.shutdown().await;

        let sink = inner.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Err(e)) => debug!("Error closing socket: {}", e),
                Err(_) => debug!("Timed out closing socket"),
                Ok(Ok(())) => {}
            }
        }
        inner.socket_open.store(false, Ordering::SeqCst);
        inner.state.send_replace(ConnectionState::Closed);
        inner.events.send(HubEvent::Disconnected {
            reason: DisconnectReason::UserRequested,
        });
    }
}

/// Render the `ProtocolVersion` payload.
fn format_protocol_version(data: &Value) -> String {
    match (
        data.get("MajorVersion").and_then(Value::as_i64),
        data.get("MinorVersion").and_then(Value::as_i64),
    ) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => data.to_string(),
    }
}

async fn recv_loop(weak: Weak<Inner>, mut stream: Box<dyn FrameStream>, generation: u64) {
    let (hub, reason) = loop {
        let next = stream.next_frame().await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let hub = Hub { inner };
        match next {
            Some(Ok(text)) => hub.handle_frame(&text),
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                hub.record_error(format!("Receive loop error: {}", e));
                break (hub, DisconnectReason::Error(e.to_string()));
            }
            None => break (hub, DisconnectReason::SocketClosed),
        }
    };
    hub.on_socket_closed(generation, reason);
}

// Type-erased so the watchdog's future type does not depend on `connect`.
fn watchdog_tick(weak: Weak<Inner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        if let Some(inner) = weak.upgrade() {
            Hub { inner }.watchdog_check().await;
        }
    })
}

async fn heartbeat(weak: Weak<Inner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let hub = Hub { inner };
    let generation = hub.inner.generation.load(Ordering::SeqCst);
    let result = hub
        .request_kind_once(RequestKind::Status, Value::Null)
        .await;
    hub.inner.heartbeat_in_flight.store(false, Ordering::SeqCst);
    match result {
        Ok(response) if response.is_success() => trace!("Heartbeat to {} answered", hub.host()),
        Ok(response) => debug!("Heartbeat returned status {:?}", response.status),
        Err(Error::Closing) => {}
        Err(e @ Error::RequestTimeout { .. }) => {
            hub.record_error(format!("Heartbeat failed: {}", e));
            // Sending refreshes the idle timer, so an unanswered heartbeat is
            // the only sign of a device that accepts writes but stopped replying.
            if hub.is_closing() || hub.inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            warn!("Heartbeat to {} unanswered, reconnecting", hub.host());
            hub.drop_socket(DisconnectReason::Stale).await;
            if let Err(e) = hub.ensure_connected().await {
                warn!("Watchdog reconnect to {} failed: {}", hub.host(), e);
                hub.record_error(format!("Watchdog reconnect failed: {}", e));
            }
        }
        Err(e) => {
            debug!("Heartbeat to {} failed: {}", hub.host(), e);
            hub.record_error(format!("Heartbeat failed: {}", e));
        }
    }
}

/// Request the status whose response the receive loop fans out.
async fn initial_status(weak: Weak<Inner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let hub = Hub { inner };
    let fanout_pending = || hub.inner.fanout_pending.load(Ordering::SeqCst);
    let result = match hub
        .request_kind_once(RequestKind::Status, Value::Null)
        .await
    {
        Err(e) if e.is_timeout() && fanout_pending() => {
            hub.request_kind_once(RequestKind::Status, Value::Null)
                .await
        }
        other => other,
    };
    match result {
        Ok(response) if response.is_success() => {}
        Ok(response) => {
            warn!(
                "Initial STATUS request returned status {:?}",
                response.status
            );
        }
        Err(Error::Closing) => return,
        // Another status response already completed the fan-out.
        Err(_) if !fanout_pending() => {}
        Err(e) => {
            warn!("Initial STATUS request failed: {}", e);
            hub.record_error(format!("Initial status failed: {}", e));
        }
    }
    if hub.is_connected() {
        hub.set_state(ConnectionState::Connected);
    }
}
