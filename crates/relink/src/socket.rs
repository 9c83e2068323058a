//! Transport capability consumed by the reconnector
//!
//! The reconnector never touches payload data. It only needs to build a socket
//! and observe its lifecycle signals: `open`, `close` and `error`.

use std::fmt;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::emitter::{Listener, ListenerId};

/// Error code reported by transports when the remote end refused the connection.
pub const CONNECTION_REFUSED: &str = "ECONNREFUSED";

/// Lifecycle signal kinds a socket can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketEventKind {
    Open,
    Close,
    Error,
}

impl SocketEventKind {
    pub const ALL: [SocketEventKind; 3] = [Self::Close, Self::Error, Self::Open];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SocketEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transport finished its handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenEvent {
    /// Subprotocol negotiated with the peer, if any
    pub protocol: Option<String>,
}

impl OpenEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(protocol: impl Into<String>) -> Self {
        Self {
            protocol: Some(protocol.into()),
        }
    }
}

/// The transport closed, with the status code and optional reason sent by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: Option<String>,
}

impl CloseEvent {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: u16 = 1001;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    pub fn new(code: u16) -> Self {
        Self { code, reason: None }
    }

    pub fn with_reason(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }
}

/// Transport level error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SocketError {
    /// Symbolic error code such as `ECONNREFUSED`
    pub code: Option<String>,
    pub message: String,
}

impl SocketError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::with_code(CONNECTION_REFUSED, message)
    }

    /// Refusals are expected while the peer is down and never surface to consumers.
    pub fn is_connection_refused(&self) -> bool {
        self.code.as_deref() == Some(CONNECTION_REFUSED)
    }
}

impl From<io::Error> for SocketError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::ConnectionRefused => Some(CONNECTION_REFUSED.to_string()),
            io::ErrorKind::ConnectionReset => Some("ECONNRESET".to_string()),
            io::ErrorKind::TimedOut => Some("ETIMEDOUT".to_string()),
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// A lifecycle signal delivered by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open(OpenEvent),
    Close(CloseEvent),
    Error(SocketError),
}

impl SocketEvent {
    pub fn kind(&self) -> SocketEventKind {
        match self {
            Self::Open(_) => SocketEventKind::Open,
            Self::Close(_) => SocketEventKind::Close,
            Self::Error(_) => SocketEventKind::Error,
        }
    }
}

/// Callback attached to a socket for one event kind.
pub type SocketListener = Listener<SocketEvent>;

/// A live transport instance.
///
/// Implementations deliver each event only to listeners registered for its kind.
/// Only `remove_event_listener` must be implemented; `remove_listener` is an
/// alias for transports and callers using that spelling.
pub trait Socket: Send + Sync + 'static {
    /// Attach a listener for `kind`.
    fn add_event_listener(&self, kind: SocketEventKind, listener: SocketListener) -> ListenerId;

    /// Detach a listener previously attached with `add_event_listener`.
    fn remove_event_listener(&self, kind: SocketEventKind, id: ListenerId);

    fn remove_listener(&self, kind: SocketEventKind, id: ListenerId) {
        self.remove_event_listener(kind, id);
    }

    /// Ask the transport to shut down. Called when a still-bound socket is replaced.
    fn close(&self) {}
}

/// Builds new transport instances for each connection attempt.
pub trait SocketFactory: Send + Sync + 'static {
    /// Construct a socket. `protocols` and `options` are forwarded verbatim.
    fn create(
        &self,
        url: &str,
        protocols: &[String],
        options: &Value,
    ) -> Result<Arc<dyn Socket>, SocketError>;
}

impl<F> SocketFactory for F
where
    F: Fn(&str, &[String], &Value) -> Result<Arc<dyn Socket>, SocketError> + Send + Sync + 'static,
{
    fn create(
        &self,
        url: &str,
        protocols: &[String],
        options: &Value,
    ) -> Result<Arc<dyn Socket>, SocketError> {
        self(url, protocols, options)
    }
}
