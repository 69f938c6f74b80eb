//! Contract of the managed realtime backend.
//!
//! The synchronization layer never speaks the wire protocol itself. It
//! drives an injected [`RealtimeClient`], which hands out
//! [`RealtimeChannel`]s and reports socket lifecycle signals. Callbacks
//! may be invoked from any thread, so they are `Send + Sync`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::models::RawChangePayload;

/// Callback receiving raw change notifications for a channel.
pub type ChangeCallback = Arc<dyn Fn(RawChangePayload) + Send + Sync>;

/// Callback receiving channel subscription status, with an optional
/// backend-supplied error message.
pub type StatusCallback = Arc<dyn Fn(ChannelStatus, Option<String>) + Send + Sync>;

/// Callback for socket open/close signals.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback for socket error signals.
pub type LifecycleErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Change kinds a channel listener can register for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenEvent {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl ListenEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenEvent::All => "*",
            ListenEvent::Insert => "INSERT",
            ListenEvent::Update => "UPDATE",
            ListenEvent::Delete => "DELETE",
        }
    }

    /// Whether a raw event-type tag falls under this listener
    pub fn accepts(&self, event_type: &str) -> bool {
        match self {
            ListenEvent::All => true,
            other => other.as_str().eq_ignore_ascii_case(event_type),
        }
    }
}

/// Listener registration: which events, on which table, scoped by which filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSpec {
    pub event: ListenEvent,
    pub schema: String,
    pub table: String,
    /// Server-side filter in `column=operator.value` form
    pub filter: Option<String>,
}

/// Subscription status reported through [`RealtimeChannel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Subscribed => "SUBSCRIBED",
            ChannelStatus::ChannelError => "CHANNEL_ERROR",
            ChannelStatus::TimedOut => "TIMED_OUT",
            ChannelStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUBSCRIBED" => Ok(ChannelStatus::Subscribed),
            "CHANNEL_ERROR" => Ok(ChannelStatus::ChannelError),
            "TIMED_OUT" => Ok(ChannelStatus::TimedOut),
            "CLOSED" => Ok(ChannelStatus::Closed),
            other => Err(format!("unknown channel status '{}'", other)),
        }
    }
}

/// One logical realtime channel.
pub trait RealtimeChannel: Send + Sync {
    /// Register a change listener. Must be called before [`subscribe`](Self::subscribe).
    fn on(&self, spec: ChangeSpec, callback: ChangeCallback);

    /// Join the channel; `callback` receives every status transition.
    fn subscribe(&self, callback: StatusCallback);

    /// Leave the channel and drop its listeners.
    fn unsubscribe(&self);
}

/// The realtime socket client shared by all channels.
pub trait RealtimeClient: Send + Sync {
    fn channel(&self, name: &str) -> Arc<dyn RealtimeChannel>;

    fn on_open(&self, callback: LifecycleCallback);

    fn on_close(&self, callback: LifecycleCallback);

    fn on_error(&self, callback: LifecycleErrorCallback);

    fn connect(&self);

    fn disconnect(&self);
}
