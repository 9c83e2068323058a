//! Exponential backoff calculator for reconnection
//!
//! Delays grow as `factor ^ attempt` seconds. A peer can override the computed
//! delay by closing with a reason containing `delay=<seconds>`, which lets a
//! cooperating server dictate the retry interval when it is rate limiting.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static DELAY_OVERRIDE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"delay=([0-9]+)").expect("valid regex"));

/// Exponential backoff strategy for reconnection attempts.
///
/// # Example
///
/// ```
/// use relink::reconnect::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(2.0);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_secs(1));
/// assert_eq!(backoff.calculate_delay(3), Duration::from_secs(8));
///
/// // The peer asked for a five second pause
/// assert_eq!(
///     backoff.next_delay(3, Some("rate limited, delay=5")),
///     Duration::from_secs(5)
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy {
    /// Exponential base, in seconds
    factor: f64,
}

impl BackoffStrategy {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Delay before the retry that follows `attempt` previous attempts.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let seconds = self.factor.powf(f64::from(attempt));
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Delay for the next retry, honoring a peer override in the close reason.
    pub fn next_delay(&self, attempt: u32, reason: Option<&str>) -> Duration {
        reason
            .and_then(delay_override)
            .unwrap_or_else(|| self.calculate_delay(attempt))
    }
}

impl Default for BackoffStrategy {
    /// A factor of 1 retries every second
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Extract a `delay=<seconds>` override from a close reason.
pub fn delay_override(reason: &str) -> Option<Duration> {
    let captures = DELAY_OVERRIDE_REGEX.captures(reason)?;
    let seconds: u64 = captures.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs(seconds))
}
