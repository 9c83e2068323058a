//! Close classification
//!
//! Decides whether a closed socket should be reconnected or whether the
//! connection is finished for good.

use crate::config::{AttemptLimit, ClosePolicy, ReconnectConfig};

/// Outcome of evaluating a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Schedule another connection attempt
    Reconnect,
    /// Give up and emit a terminal close
    Terminate,
}

/// Classify a close with status `code` after `attempts` reconnection attempts.
///
/// Under [`ClosePolicy::Compatible`] an unlimited budget reconnects only for
/// retryable codes, while a finite budget reconnects for any code until it is
/// spent. [`ClosePolicy::Strict`] requires both a retryable code and budget.
pub fn evaluate_close(config: &ReconnectConfig, attempts: u32, code: u16) -> CloseDecision {
    let retryable = config.is_retryable(code);
    let reconnect = match config.close_policy {
        ClosePolicy::Compatible => {
            (retryable && config.max_attempts.is_unlimited())
                || matches!(config.max_attempts, AttemptLimit::Limited(max) if attempts < max)
        }
        ClosePolicy::Strict => retryable && config.max_attempts.allows(attempts),
    };

    if reconnect {
        CloseDecision::Reconnect
    } else {
        CloseDecision::Terminate
    }
}
