//! Automatic reconnection for a single socket connection
//!
//! The [`Reconnector`] builds sockets through a [`SocketFactory`](crate::SocketFactory),
//! watches their lifecycle, and when one closes either schedules another
//! attempt with exponential backoff or gives up with a terminal `close`.
//!
//! # Example
//!
//! ```ignore
//! use relink::reconnect::{Reconnector, ReconnectorEvent, ReconnectorEventKind};
//! use relink::AttemptLimit;
//!
//! let reconnector = Reconnector::new();
//! reconnector
//!     .set_socket_factory(factory)
//!     .set_url("wss://example.com/feed")
//!     .set_max_attempts(AttemptLimit::Limited(5))
//!     .set_backoff_factor(2.0);
//!
//! reconnector.on(ReconnectorEventKind::Close, |_| println!("gave up"));
//! reconnector.open()?;
//! ```

mod backoff;
mod evaluator;
mod event;
mod reconnector;
mod scheduler;


pub use backoff::{BackoffStrategy, delay_override};
pub use evaluator::{CloseDecision, evaluate_close};
pub use event::{ConnectionState, Opened, Reconnecting, ReconnectorEvent, ReconnectorEventKind};
pub use reconnector::Reconnector;
