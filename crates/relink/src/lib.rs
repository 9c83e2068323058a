//! relink - automatic reconnection for socket connections
//!
//! This crate keeps one logical connection alive over an unreliable transport.
//! It wraps an externally supplied socket implementation, re-establishes the
//! connection after unexpected closures using exponential backoff (with an
//! optional peer supplied override), and exposes `open`, `close`, `error` and
//! `reconnect` events to its consumers.

mod config;
pub mod emitter;
mod error;
pub mod reconnect;
pub mod socket;

pub use config::{
    AttemptLimit, ClosePolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_CODES, ReconnectConfig,
};
pub use emitter::{Listener, ListenerId, ListenerRegistry};
pub use error::{ReconnectError, Result};
pub use reconnect::{
    BackoffStrategy, CloseDecision, ConnectionState, Opened, Reconnecting, Reconnector,
    ReconnectorEvent, ReconnectorEventKind,
};
pub use socket::{
    CloseEvent, OpenEvent, Socket, SocketError, SocketEvent, SocketEventKind, SocketFactory,
    SocketListener,
};
