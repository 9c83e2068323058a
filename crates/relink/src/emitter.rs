//! Listener registry for publish/subscribe event delivery
//!
//! A registry maps an event kind to the callbacks subscribed to it. It backs the
//! reconnector's own event surface and can be embedded by transport
//! implementations that need add/remove listener semantics.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one subscription, used to unsubscribe it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-wide unique listener id.
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Callback invoked with a reference to the emitted event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Subscribers grouped by event kind.
///
/// `emit` snapshots the subscriber list before invoking anything, so a callback
/// may subscribe, unsubscribe or emit again without deadlocking.
pub struct ListenerRegistry<K, E> {
    listeners: RwLock<HashMap<K, Vec<(ListenerId, Listener<E>)>>>,
}

impl<K, E> ListenerRegistry<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe `listener` to events of `kind`.
    pub fn on<F>(&self, kind: K, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on_shared(kind, Arc::new(listener))
    }

    /// Subscribe an already shared listener to events of `kind`.
    pub fn on_shared(&self, kind: K, listener: Listener<E>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn off(&self, kind: K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Deliver `event` to every subscriber of `kind`, in subscription order.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, kind: K, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = match self.listeners.read().get(&kind) {
            Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    /// Number of subscribers for `kind`.
    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl<K, E> Default for ListenerRegistry<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> fmt::Debug for ListenerRegistry<K, E>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let mut map = f.debug_map();
        for (kind, entries) in listeners.iter() {
            map.entry(kind, &entries.len());
        }
        map.finish()
    }
}
