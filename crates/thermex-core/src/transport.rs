//! WebSocket transport abstraction.
//!
//! The hub talks to the hood through the [`Connector`] trait so tests can
//! swap the real [`TungsteniteConnector`] for an in-memory
//! [`MockHood`](crate::mock::MockHood). A connection is split into a
//! write half ([`FrameSink`]) that the hub guards with its send lock, and a
//! read half ([`FrameStream`]) owned by the receive loop.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{ConnectionFailureReason, Error, Result};

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next text frame, or `None` once the socket has closed.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// An open WebSocket connection split into its two halves.
pub struct WsConnection {
    /// Write half.
    pub sink: Box<dyn FrameSink>,
    /// Read half.
    pub stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}

/// Opens connections to a hood.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a WebSocket to `url`.
    async fn connect(&self, url: &str) -> Result<WsConnection>;
}

/// Build the API URL for a host.
///
/// ```
/// use thermex_core::transport::api_url;
///
/// assert_eq!(api_url("192.168.1.50", 9999, "/api"), "ws://192.168.1.50:9999/api");
/// ```
pub fn api_url(host: &str, port: u16, path: &str) -> String {
    format!("ws://{}:{}{}", host, port, path)
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TungsteniteConnector {
    /// Create a connector with the default 10 second connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP + WebSocket handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<WsConnection> {
        debug!("Opening WebSocket {}", url);
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection_failed(url, ConnectionFailureReason::Timeout))?
            .map_err(|e| Error::connection_failed(url, classify(&e)))?;

        let (write, read) = ws_stream.split();
        Ok(WsConnection {
            sink: Box::new(TungsteniteSink { inner: write }),
            stream: Box::new(TungsteniteStream { inner: read }),
        })
    }
}

fn classify(err: &WsError) -> ConnectionFailureReason {
    match err {
        WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            ConnectionFailureReason::Refused
        }
        WsError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            ConnectionFailureReason::Timeout
        }
        WsError::Url(e) => ConnectionFailureReason::Other(format!("invalid url: {}", e)),
        other => ConnectionFailureReason::Transport(other.to_string()),
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TungsteniteSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::text(text))
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::ConnectionLost(e.to_string())),
        }
    }
}

struct TungsteniteStream {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!("WebSocket closed by peer: {:?}", frame);
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    trace!("Ignoring {} byte binary frame", data.len());
                }
                Ok(_) => {}
                Err(WsError::ConnectionClosed) => return None,
                Err(e) => return Some(Err(Error::ConnectionLost(e.to_string()))),
            }
        }
    }
}
