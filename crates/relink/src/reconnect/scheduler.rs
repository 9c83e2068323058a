//! Single-slot reconnect timer
//!
//! Holds at most one pending reconnection. Arming replaces whatever was
//! pending, and cancelling is idempotent: cancelling a timer that already
//! fired or was already cancelled does nothing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

struct PendingTimer {
    generation: u64,
    deadline: Instant,
    handle: AbortHandle,
}

#[derive(Default)]
struct TimerSlot {
    pending: Option<PendingTimer>,
    next_generation: u64,
}

impl TimerSlot {
    /// Claim the pending timer if `generation` is still the armed one.
    fn claim(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

/// Owner of the one outstanding reconnect task.
#[derive(Clone, Default)]
pub(crate) struct ReconnectTimer {
    slot: Arc<Mutex<TimerSlot>>,
}

impl ReconnectTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` on `runtime` once `delay` has elapsed, replacing any pending timer.
    pub(crate) fn arm<F>(&self, runtime: &Handle, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Hold the slot while spawning so a zero delay cannot fire before it is recorded.
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
            tracing::debug!(generation = previous.generation, "replaced pending reconnect timer");
        }

        slot.next_generation += 1;
        let generation = slot.next_generation;
        let deadline = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(far_future);

        let shared = self.slot.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if shared.lock().claim(generation) {
                tracing::debug!(generation, "reconnect timer fired");
                on_fire();
            }
        });

        slot.pending = Some(PendingTimer {
            generation,
            deadline,
            handle: task.abort_handle(),
        });
        tracing::debug!(generation, delay_ms = delay.as_millis() as u64, "armed reconnect timer");
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub(crate) fn cancel(&self) -> bool {
        let pending = self.slot.lock().pending.take();
        match pending {
            Some(pending) => {
                pending.handle.abort();
                tracing::debug!(generation = pending.generation, "cancelled reconnect timer");
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Time left until the pending timer fires.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .pending
            .as_ref()
            .map(|pending| pending.deadline.saturating_duration_since(Instant::now()))
    }
}

// Roughly thirty years, the same horizon tokio uses for "never".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
