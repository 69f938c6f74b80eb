use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client-wide synchronization options.
///
/// Controls:
/// - Database schema the realtime channels listen on
/// - Automatic reconnect limits and linear backoff timing
/// - The connecting-state timeout
/// - Channel naming
///
/// # Example
///
/// ```rust
/// use stallplass_link::SyncOptions;
///
/// let options = SyncOptions::default()
///     .with_max_retries(5)
///     .with_retry_delay_ms(1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Database schema for change listeners
    /// Default: "public"
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Automatic reconnect attempts before giving up
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between reconnect attempts; attempt `n` waits `n * retry_delay_ms`
    /// Default: 2000ms
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pause between `disconnect()` and `connect()` during a manual reconnect
    /// Default: 100ms
    #[serde(default = "default_reconnect_settle_ms")]
    pub reconnect_settle_ms: u64,

    /// How long the initial connecting state may last before it is
    /// reported as an error
    /// Default: 10000ms
    #[serde(default = "default_connecting_timeout_ms")]
    pub connecting_timeout_ms: u64,

    /// Prefix for generated channel names
    /// Default: "stallplass"
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_reconnect_settle_ms() -> u64 {
    100
}

fn default_connecting_timeout_ms() -> u64 {
    10_000
}

fn default_channel_prefix() -> String {
    "stallplass".to_string()
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            reconnect_settle_ms: default_reconnect_settle_ms(),
            connecting_timeout_ms: default_connecting_timeout_ms(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_reconnect_settle_ms(mut self, settle_ms: u64) -> Self {
        self.reconnect_settle_ms = settle_ms;
        self
    }

    pub fn with_connecting_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connecting_timeout_ms = timeout_ms;
        self
    }

    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    ///
    /// Linear: `retry_delay_ms * attempt`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_millis(self.reconnect_settle_ms)
    }

    pub fn connecting_timeout(&self) -> Duration {
        Duration::from_millis(self.connecting_timeout_ms)
    }
}
