//! Reconnection configuration
//!
//! Holds everything the reconnector needs to build a socket and decide how to
//! react when it closes. Can be built in code or loaded from a TOML file:
//!
//! ```toml
//! url = "wss://example.com/feed"
//! protocols = ["v2.feed"]
//! retryable_codes = [1000, 1001, 1006]
//! max_attempts = -1
//! backoff_factor = 2.0
//! close_policy = "strict"
//!
//! [options]
//! headers = { "x-client" = "relink" }
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReconnectError, Result};
use crate::socket::CloseEvent;

/// Close codes that allow reconnection unless configured otherwise.
pub const DEFAULT_RETRYABLE_CODES: [u16; 3] =
    [CloseEvent::NORMAL, CloseEvent::GOING_AWAY, CloseEvent::ABNORMAL];

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Upper bound on reconnection attempts.
///
/// Serialized as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum AttemptLimit {
    Unlimited,
    Limited(u32),
}

impl AttemptLimit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(max) => attempts < *max,
        }
    }
}

impl Default for AttemptLimit {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_ATTEMPTS)
    }
}

impl TryFrom<i64> for AttemptLimit {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            n => u32::try_from(n)
                .map(Self::Limited)
                .map_err(|_| format!("max_attempts must be -1 or a non-negative integer, got {n}")),
        }
    }
}

impl From<AttemptLimit> for i64 {
    fn from(limit: AttemptLimit) -> Self {
        match limit {
            AttemptLimit::Unlimited => -1,
            AttemptLimit::Limited(n) => i64::from(n),
        }
    }
}

impl fmt::Display for AttemptLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Limited(n) => write!(f, "{n}"),
        }
    }
}

/// How the close code and attempt budget combine into a reconnect decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// With unlimited attempts only retryable codes reconnect; with a finite
    /// budget any code reconnects while attempts remain.
    #[default]
    Compatible,
    /// Reconnect only when the code is retryable and attempts remain.
    Strict,
}

/// Configuration for a [`Reconnector`](crate::Reconnector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Address handed to the socket factory
    pub url: String,
    /// Subprotocols handed to the socket factory
    pub protocols: Vec<String>,
    /// Opaque transport options handed to the socket factory
    #[serde(skip_serializing_if = "Value::is_null")]
    pub options: Value,
    /// Close codes eligible for reconnection
    pub retryable_codes: Vec<u16>,
    /// Maximum reconnection attempts
    pub max_attempts: AttemptLimit,
    /// Exponential base for the delay, in seconds
    pub backoff_factor: f64,
    pub close_policy: ClosePolicy,
}

impl ReconnectConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: AttemptLimit) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    pub fn is_retryable(&self, code: u16) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// Check values that would otherwise produce nonsensical delays.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(ReconnectError::Configuration(format!(
                "backoff_factor must be a finite number > 0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading reconnect config");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            protocols: Vec::new(),
            options: Value::Null,
            retryable_codes: DEFAULT_RETRYABLE_CODES.to_vec(),
            max_attempts: AttemptLimit::default(),
            backoff_factor: 1.0,
            close_policy: ClosePolicy::default(),
        }
    }
}
