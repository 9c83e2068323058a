//! Reconnecting socket manager
//!
//! Wraps a pluggable socket factory and re-establishes the connection whenever
//! the active socket closes for a reason the configuration deems retryable.
//! Consumers observe `open`, `close`, `error` and `reconnect` events.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;

use super::backoff::BackoffStrategy;
use super::evaluator::{CloseDecision, evaluate_close};
use super::event::{
    ConnectionState, Opened, Reconnecting, ReconnectorEvent, ReconnectorEventKind,
};
use super::scheduler::ReconnectTimer;
use crate::config::{AttemptLimit, ClosePolicy, ReconnectConfig};
use crate::emitter::{ListenerId, ListenerRegistry};
use crate::error::{ReconnectError, Result};
use crate::socket::{
    CloseEvent, OpenEvent, Socket, SocketError, SocketEvent, SocketEventKind, SocketFactory,
};

type Bindings = Vec<(SocketEventKind, ListenerId)>;

/// The socket currently owned by the reconnector.
struct ActiveSocket {
    socket: Arc<dyn Socket>,
    generation: u64,
    bindings: Bindings,
    bound: bool,
}

impl ActiveSocket {
    fn is(&self, generation: u64) -> bool {
        self.bound && self.generation == generation
    }

    fn unbind(&mut self) -> Bindings {
        self.bound = false;
        std::mem::take(&mut self.bindings)
    }
}

fn detach(socket: &dyn Socket, bindings: Bindings) {
    for (kind, id) in bindings {
        socket.remove_event_listener(kind, id);
    }
}

/// Detach a socket's listeners and let it go. A socket that never closed on its
/// own is asked to shut down first.
fn release(mut active: ActiveSocket) {
    let still_bound = active.bound;
    let bindings = active.unbind();
    detach(active.socket.as_ref(), bindings);
    if still_bound {
        tracing::debug!(generation = active.generation, "closing superseded socket");
        active.socket.close();
    }
}

#[derive(Default)]
struct Session {
    attempts: u32,
    state: ConnectionState,
    active: Option<ActiveSocket>,
    generation: u64,
}

struct Inner {
    config: RwLock<ReconnectConfig>,
    factory: RwLock<Option<Arc<dyn SocketFactory>>>,
    runtime: RwLock<Option<Handle>>,
    session: Mutex<Session>,
    timer: ReconnectTimer,
    listeners: ListenerRegistry<ReconnectorEventKind, ReconnectorEvent>,
}

impl Inner {
    fn open(self: &Arc<Self>) -> Result<()> {
        // Any pending retry is superseded, even if this open fails.
        let cancelled = self.timer.cancel();
        if cancelled {
            tracing::debug!("cancelled pending reconnect before opening");
        }

        let (config, factory) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                if cancelled {
                    self.session.lock().state = ConnectionState::Terminated;
                }
                return Err(err);
            }
        };
        self.capture_runtime();

        let previous = self.session.lock().active.take();
        if let Some(previous) = previous {
            release(previous);
        }

        let socket = match factory.create(&config.url, &config.protocols, &config.options) {
            Ok(socket) => socket,
            Err(err) => {
                tracing::error!(error = %err, "failed to construct socket");
                self.session.lock().state = ConnectionState::Terminated;
                return Err(ReconnectError::Construction(err));
            }
        };

        let generation = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.state = ConnectionState::Connecting;
            session.active = Some(ActiveSocket {
                socket: socket.clone(),
                generation: session.generation,
                bindings: Vec::new(),
                bound: true,
            });
            session.generation
        };

        let bindings = self.bind(&socket, generation);
        let stale = {
            let mut session = self.session.lock();
            match session.active.as_mut() {
                Some(active) if active.is(generation) => {
                    active.bindings = bindings;
                    None
                }
                _ => Some(bindings),
            }
        };
        // The socket closed while we were still attaching listeners.
        if let Some(bindings) = stale {
            detach(socket.as_ref(), bindings);
        }

        tracing::debug!(generation, "socket constructed and bound");
        Ok(())
    }

    fn prepare(&self) -> Result<(ReconnectConfig, Arc<dyn SocketFactory>)> {
        let config = self.config.read().clone();
        config.validate()?;
        if config.url.is_empty() {
            return Err(ReconnectError::Configuration("url is not set".into()));
        }
        let factory = self
            .factory
            .read()
            .clone()
            .ok_or(ReconnectError::MissingFactory)?;
        Ok((config, factory))
    }

    fn bind(self: &Arc<Self>, socket: &Arc<dyn Socket>, generation: u64) -> Bindings {
        SocketEventKind::ALL
            .iter()
            .map(|&kind| {
                let weak: Weak<Self> = Arc::downgrade(self);
                let id = socket.add_event_listener(
                    kind,
                    Arc::new(move |event: &SocketEvent| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_socket_event(generation, event);
                        }
                    }),
                );
                (kind, id)
            })
            .collect()
    }

    fn handle_socket_event(self: &Arc<Self>, generation: u64, event: &SocketEvent) {
        match event {
            SocketEvent::Open(open) => self.handle_open(generation, open.clone()),
            SocketEvent::Close(close) => self.handle_close(generation, close.clone()),
            SocketEvent::Error(error) => self.handle_error(generation, error.clone()),
        }
    }

    fn handle_open(&self, generation: u64, event: OpenEvent) {
        let (attempts, socket) = {
            let mut guard = self.session.lock();
            let session = &mut *guard;
            let Some(active) = session.active.as_ref().filter(|a| a.is(generation)) else {
                tracing::trace!(generation, "ignoring open from superseded socket");
                return;
            };
            let socket = active.socket.clone();
            let attempts = std::mem::take(&mut session.attempts);
            session.state = ConnectionState::Open;
            (attempts, socket)
        };

        tracing::info!(attempts, "connection established");
        self.emit(ReconnectorEvent::Open(Opened {
            event,
            attempts,
            socket,
        }));
    }

    fn handle_close(self: &Arc<Self>, generation: u64, close: CloseEvent) {
        let config = self.config.read().clone();

        let (active, bindings, decision, attempts, session_generation) = {
            let mut guard = self.session.lock();
            let session = &mut *guard;
            let Some(mut active) = session.active.take_if(|a| a.is(generation)) else {
                tracing::trace!(generation, "ignoring close from superseded socket");
                return;
            };

            let attempts_before = session.attempts;
            let decision = evaluate_close(&config, attempts_before, close.code);
            session.state = match decision {
                CloseDecision::Reconnect => {
                    session.attempts = session.attempts.saturating_add(1);
                    ConnectionState::ReconnectPending
                }
                CloseDecision::Terminate => ConnectionState::Terminated,
            };
            let bindings = active.unbind();
            (active, bindings, decision, attempts_before, session.generation)
        };
        // The socket closed on its own; detach and drop it without closing it again.
        detach(active.socket.as_ref(), bindings);
        drop(active);

        match decision {
            CloseDecision::Terminate => {
                tracing::warn!(
                    code = close.code,
                    reason = close.reason.as_deref().unwrap_or(""),
                    attempts,
                    max_attempts = %config.max_attempts,
                    "connection closed, not reconnecting"
                );
                self.emit(ReconnectorEvent::Close);
            }
            CloseDecision::Reconnect => {
                let delay = BackoffStrategy::new(config.backoff_factor)
                    .next_delay(attempts, close.reason.as_deref());
                let attempt = attempts.saturating_add(1);
                tracing::info!(
                    code = close.code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "connection closed, scheduling reconnect"
                );
                self.emit(ReconnectorEvent::Reconnect(Reconnecting {
                    close,
                    attempt,
                    delay,
                }));

                // A listener may have reopened by hand while the event was dispatched.
                let superseded = {
                    let session = self.session.lock();
                    session.state != ConnectionState::ReconnectPending
                        || session.generation != session_generation
                };
                if superseded {
                    tracing::debug!(attempt, "reconnect superseded before arming timer");
                    return;
                }
                self.schedule(delay);
            }
        }
    }

    fn handle_error(&self, generation: u64, error: SocketError) {
        let current = self
            .session
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.is(generation));
        if !current {
            tracing::trace!(generation, "ignoring error from superseded socket");
            return;
        }
        if error.is_connection_refused() {
            tracing::debug!(error = %error, "suppressed connection refused");
            return;
        }
        tracing::debug!(error = %error, "forwarding socket error");
        self.emit(ReconnectorEvent::Error(error));
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let Some(runtime) = self.runtime() else {
            tracing::error!("no async runtime available, cannot schedule reconnect");
            self.session.lock().state = ConnectionState::Terminated;
            self.emit(ReconnectorEvent::Error(SocketError::new(
                ReconnectError::NoRuntime.to_string(),
            )));
            self.emit(ReconnectorEvent::Close);
            return;
        };

        let weak = Arc::downgrade(self);
        self.timer.arm(&runtime, delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.reopen();
            }
        });
    }

    /// Timer-driven open. Failures have no caller to return to, so they are
    /// reported as an error followed by a terminal close.
    fn reopen(self: &Arc<Self>) {
        let Err(err) = self.open() else {
            return;
        };
        tracing::error!(error = %err, "scheduled reconnect failed");
        self.session.lock().state = ConnectionState::Terminated;
        let error = match err {
            ReconnectError::Construction(error) => error,
            other => SocketError::new(other.to_string()),
        };
        self.emit(ReconnectorEvent::Error(error));
        self.emit(ReconnectorEvent::Close);
    }

    fn runtime(&self) -> Option<Handle> {
        self.runtime
            .read()
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn capture_runtime(&self) {
        if self.runtime.read().is_some() {
            return;
        }
        if let Ok(handle) = Handle::try_current() {
            *self.runtime.write() = Some(handle);
        }
    }

    fn emit(&self, event: ReconnectorEvent) {
        self.listeners.emit(event.kind(), &event);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.timer.cancel();
        if let Some(active) = self.session.get_mut().active.take() {
            release(active);
        }
    }
}

/// Keeps one logical socket connection alive across unexpected closures.
///
/// Cloning yields another handle to the same reconnector.
///
/// # Example
///
/// ```ignore
/// use relink::{AttemptLimit, Reconnector, ReconnectorEventKind};
///
/// let reconnector = Reconnector::new();
/// reconnector
///     .set_socket_factory(MyWebSocketFactory::default())
///     .set_url("wss://example.com/feed")
///     .set_max_attempts(AttemptLimit::Unlimited)
///     .set_backoff_factor(2.0);
///
/// reconnector.on(ReconnectorEventKind::Reconnect, |event| {
///     println!("reconnecting: {:?}", event);
/// });
///
/// reconnector.open()?;
/// ```
#[derive(Clone)]
pub struct Reconnector {
    inner: Arc<Inner>,
}

impl Reconnector {
    /// Create a reconnector with default configuration.
    ///
    /// Captures the current tokio runtime if there is one; see [`Self::with_runtime`].
    pub fn new() -> Self {
        Self::from_config(ReconnectConfig::default())
    }

    pub fn from_config(config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                factory: RwLock::new(None),
                runtime: RwLock::new(Handle::try_current().ok()),
                session: Mutex::new(Session::default()),
                timer: ReconnectTimer::new(),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Run reconnect timers on `handle`.
    pub fn with_runtime(self, handle: Handle) -> Self {
        *self.inner.runtime.write() = Some(handle);
        self
    }

    pub fn socket_factory(&self) -> Option<Arc<dyn SocketFactory>> {
        self.inner.factory.read().clone()
    }

    pub fn set_socket_factory(&self, factory: impl SocketFactory) -> &Self {
        self.set_shared_socket_factory(Arc::new(factory))
    }

    pub fn set_shared_socket_factory(&self, factory: Arc<dyn SocketFactory>) -> &Self {
        *self.inner.factory.write() = Some(factory);
        self
    }

    pub fn url(&self) -> String {
        self.inner.config.read().url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) -> &Self {
        self.inner.config.write().url = url.into();
        self
    }

    pub fn protocols(&self) -> Vec<String> {
        self.inner.config.read().protocols.clone()
    }

    pub fn set_protocols<I, S>(&self, protocols: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.config.write().protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(&self) -> Value {
        self.inner.config.read().options.clone()
    }

    pub fn set_options(&self, options: Value) -> &Self {
        self.inner.config.write().options = options;
        self
    }

    pub fn retryable_codes(&self) -> Vec<u16> {
        self.inner.config.read().retryable_codes.clone()
    }

    pub fn set_retryable_codes(&self, codes: impl IntoIterator<Item = u16>) -> &Self {
        self.inner.config.write().retryable_codes = codes.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> AttemptLimit {
        self.inner.config.read().max_attempts
    }

    pub fn set_max_attempts(&self, max_attempts: AttemptLimit) -> &Self {
        self.inner.config.write().max_attempts = max_attempts;
        self
    }

    pub fn backoff_factor(&self) -> f64 {
        self.inner.config.read().backoff_factor
    }

    /// Takes effect for the next scheduled delay. Invalid factors are rejected by `open`.
    pub fn set_backoff_factor(&self, factor: f64) -> &Self {
        self.inner.config.write().backoff_factor = factor;
        self
    }

    pub fn close_policy(&self) -> ClosePolicy {
        self.inner.config.read().close_policy
    }

    pub fn set_close_policy(&self, policy: ClosePolicy) -> &Self {
        self.inner.config.write().close_policy = policy;
        self
    }

    /// Snapshot of the whole configuration.
    pub fn config(&self) -> ReconnectConfig {
        self.inner.config.read().clone()
    }

    pub fn set_config(&self, config: ReconnectConfig) -> &Self {
        *self.inner.config.write() = config;
        self
    }

    /// Build a new socket and start observing it.
    ///
    /// Cancels any pending reconnect and releases the previous socket first.
    /// Construction failures are returned to the caller.
    #[tracing::instrument(skip(self), fields(url = %self.url()))]
    pub fn open(&self) -> Result<()> {
        self.inner.open()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    /// Reconnection attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.inner.session.lock().attempts
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Time left before the pending reconnect fires.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.inner.timer.remaining()
    }

    /// The socket currently bound, if any.
    pub fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.inner
            .session
            .lock()
            .active
            .as_ref()
            .map(|active| active.socket.clone())
    }

    /// Subscribe to reconnector events of `kind`.
    pub fn on<F>(&self, kind: ReconnectorEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ReconnectorEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.on(kind, listener)
    }

    pub fn off(&self, kind: ReconnectorEventKind, id: ListenerId) -> bool {
        self.inner.listeners.off(kind, id)
    }

    pub fn listener_count(&self, kind: ReconnectorEventKind) -> usize {
        self.inner.listeners.listener_count(kind)
    }

    pub fn remove_all_listeners(&self) {
        self.inner.listeners.clear();
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("Reconnector")
            .field("url", &self.inner.config.read().url)
            .field("state", &session.state)
            .field("attempts", &session.attempts)
            .field("pending_reconnect", &self.inner.timer.is_pending())
            .finish()
    }
}
