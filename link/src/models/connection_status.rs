use serde::{Deserialize, Serialize};

/// Snapshot of the process-wide realtime connection health.
///
/// `connected` and `reconnecting` are never both true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,

    /// Initial connect still pending (downgrades to an error after the
    /// connecting timeout)
    pub connecting: bool,

    /// An automatic or manual reconnect is in flight
    pub reconnecting: bool,

    pub error: Option<String>,

    /// Millis since Unix epoch of the last successful open
    pub last_connected_ms: Option<u64>,

    pub reconnect_attempts: u32,
}

impl ConnectionStatus {
    pub(crate) fn connecting() -> Self {
        Self {
            connecting: true,
            ..Default::default()
        }
    }
}
