//! Events emitted by the reconnector to its own subscribers

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::socket::{CloseEvent, OpenEvent, Socket, SocketError};

/// Kinds of events a [`Reconnector`](super::Reconnector) emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectorEventKind {
    Open,
    Close,
    Error,
    Reconnect,
}

impl ReconnectorEventKind {
    pub const ALL: [ReconnectorEventKind; 4] =
        [Self::Open, Self::Close, Self::Error, Self::Reconnect];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for ReconnectorEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection was established.
#[derive(Clone)]
pub struct Opened {
    /// The transport's own open event
    pub event: OpenEvent,
    /// Reconnection attempts made before this success
    pub attempts: u32,
    /// The socket that just opened
    pub socket: Arc<dyn Socket>,
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("event", &self.event)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// A reconnection was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconnecting {
    /// The close event that triggered the retry
    pub close: CloseEvent,
    /// Attempt number of the scheduled retry, starting at 1
    pub attempt: u32,
    pub delay: Duration,
}

impl Reconnecting {
    pub fn delay_ms(&self) -> u128 {
        self.delay.as_millis()
    }
}

/// Event delivered to reconnector subscribers.
#[derive(Debug, Clone)]
pub enum ReconnectorEvent {
    Open(Opened),
    /// Terminal: no further automatic reconnection
    Close,
    Error(SocketError),
    Reconnect(Reconnecting),
}

impl ReconnectorEvent {
    pub fn kind(&self) -> ReconnectorEventKind {
        match self {
            Self::Open(_) => ReconnectorEventKind::Open,
            Self::Close => ReconnectorEventKind::Close,
            Self::Error(_) => ReconnectorEventKind::Error,
            Self::Reconnect(_) => ReconnectorEventKind::Reconnect,
        }
    }
}

/// Lifecycle state of a reconnector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never opened
    #[default]
    Idle,
    /// Socket built, waiting for its first lifecycle event
    Connecting,
    Open,
    /// Timer armed for the next attempt
    ReconnectPending,
    /// Gave up; only an explicit `open()` restarts the cycle
    Terminated,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}
