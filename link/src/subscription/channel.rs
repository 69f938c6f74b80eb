//! `SubscriptionChannel` – lifecycle of one realtime channel.
//!
//! ```text
//! Idle ──open──▶ Opening ──SUBSCRIBED──▶ Subscribed
//!                   │                       │
//!                   └──CHANNEL_ERROR/TIMED_OUT──▶ Errored ──retry──▶ Opening
//! any ──close──▶ Closed
//! ```
//!
//! Every open bumps an epoch that the registered callbacks capture. Once
//! the channel is closed (or reopened) callbacks from the old handle see
//! a stale epoch and drop whatever they receive, so teardown stops
//! dispatch even if the backend keeps delivering. The epoch is checked
//! again right before an event reaches the sink, but the lock is released
//! for the call itself: a delivery already inside the sink when `close()`
//! runs on another thread still completes. Sinks that must not observe
//! events after teardown keep their own flag, as the subscriptions do.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::filter::FilterExpression;
use crate::lock;
use crate::models::{ChangeEvent, RawChangePayload};
use crate::normalize::normalize;
use crate::realtime::{
    ChangeSpec, ChannelStatus, ListenEvent, RealtimeChannel, RealtimeClient,
};

static CHANNEL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Receives normalized events from a channel.
pub type EventSink = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Receives channel state transitions with the current error, if any.
pub type ChannelStateSink = Arc<dyn Fn(ChannelState, Option<String>) + Send + Sync>;

/// Lifecycle state of a [`SubscriptionChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Idle,
    Opening,
    Subscribed,
    Errored,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Idle => "idle",
            ChannelState::Opening => "opening",
            ChannelState::Subscribed => "subscribed",
            ChannelState::Errored => "errored",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a channel listens to.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub table: String,
    pub schema: String,
    pub filter: Option<FilterExpression>,
    pub events: ListenEvent,
    pub name_prefix: String,
}

struct ChannelInner {
    state: ChannelState,
    error: Option<String>,
    handle: Option<Arc<dyn RealtimeChannel>>,
    name: Option<String>,
    epoch: u64,
    /// Set by `close()`; a torn-down channel never reopens
    torn_down: bool,
}

/// Owns one realtime channel handle and dispatches its events.
pub struct SubscriptionChannel {
    client: Arc<dyn RealtimeClient>,
    config: ChannelConfig,
    inner: Arc<Mutex<ChannelInner>>,
    on_event: EventSink,
    on_state: ChannelStateSink,
}

impl SubscriptionChannel {
    pub fn new(
        client: Arc<dyn RealtimeClient>,
        config: ChannelConfig,
        on_event: EventSink,
        on_state: ChannelStateSink,
    ) -> Self {
        Self {
            client,
            config,
            inner: Arc::new(Mutex::new(ChannelInner {
                state: ChannelState::Idle,
                error: None,
                handle: None,
                name: None,
                epoch: 0,
                torn_down: false,
            })),
            on_event,
            on_state,
        }
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.inner).state
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.inner).error.clone()
    }

    /// Name of the current backend channel, once opened
    pub fn name(&self) -> Option<String> {
        lock(&self.inner).name.clone()
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Create a uniquely named channel, register the change listener and join.
    ///
    /// No-op while already opening or subscribed, and after `close()`.
    pub fn open(&self) {
        let (epoch, name) = {
            let mut inner = lock(&self.inner);
            if inner.torn_down
                || matches!(inner.state, ChannelState::Opening | ChannelState::Subscribed)
            {
                return;
            }
            inner.epoch += 1;
            inner.state = ChannelState::Opening;
            inner.error = None;
            let name = format!(
                "{}:{}:{}",
                self.config.name_prefix,
                self.config.table,
                CHANNEL_COUNTER.fetch_add(1, Ordering::Relaxed)
            );
            inner.name = Some(name.clone());
            (inner.epoch, name)
        };

        log::debug!(
            "[SYNC_CHANNEL] Opening '{}' events={} filter={:?}",
            name,
            self.config.events.as_str(),
            self.config.filter.as_ref().map(ToString::to_string)
        );
        (self.on_state)(ChannelState::Opening, None);

        let handle = self.client.channel(&name);
        handle.on(
            ChangeSpec {
                event: self.config.events,
                schema: self.config.schema.clone(),
                table: self.config.table.clone(),
                filter: self.config.filter.as_ref().map(ToString::to_string),
            },
            self.change_callback(epoch),
        );

        {
            let mut inner = lock(&self.inner);
            if inner.epoch != epoch {
                // Closed while the handle was being set up
                drop(inner);
                handle.unsubscribe();
                return;
            }
            inner.handle = Some(Arc::clone(&handle));
        }

        handle.subscribe(self.status_callback(epoch, name));
    }

    /// Reopen after the backend reported an error or closed the channel.
    ///
    /// Returns `false` when there was nothing to retry.
    pub fn retry(&self) -> bool {
        let previous = {
            let mut inner = lock(&self.inner);
            if inner.torn_down
                || !matches!(inner.state, ChannelState::Errored | ChannelState::Closed)
            {
                return false;
            }
            inner.epoch += 1;
            inner.state = ChannelState::Idle;
            inner.handle.take()
        };

        if let Some(handle) = previous {
            handle.unsubscribe();
        }
        log::info!("[SYNC_CHANNEL] Retrying channel for '{}'", self.config.table);
        self.open();
        true
    }

    /// Tear down the channel. Safe to call more than once, including from
    /// inside the event sink.
    pub fn close(&self) {
        let handle = {
            let mut inner = lock(&self.inner);
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            inner.epoch += 1;
            inner.state = ChannelState::Closed;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            handle.unsubscribe();
        }
        log::debug!("[SYNC_CHANNEL] Closed channel for '{}'", self.config.table);
        (self.on_state)(ChannelState::Closed, None);
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).torn_down
    }

    fn change_callback(&self, epoch: u64) -> crate::realtime::ChangeCallback {
        let inner = Arc::clone(&self.inner);
        let on_event = Arc::clone(&self.on_event);
        let filter = self.config.filter.clone();
        let table = self.config.table.clone();

        Arc::new(move |raw: RawChangePayload| {
            if lock(&inner).epoch != epoch {
                return;
            }

            let event = match normalize(raw) {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("[SYNC_CHANNEL] Dropping event on '{}': {}", table, e);
                    return;
                }
            };

            let event = match &filter {
                Some(filter) => match validate(filter, event) {
                    Some(event) => event,
                    None => return,
                },
                None => event,
            };

            // Not held across the sink: it may close this channel
            if lock(&inner).epoch != epoch {
                return;
            }
            on_event(event);
        })
    }

    fn status_callback(&self, epoch: u64, name: String) -> crate::realtime::StatusCallback {
        let inner = Arc::clone(&self.inner);
        let on_state = Arc::clone(&self.on_state);

        Arc::new(move |status: ChannelStatus, message: Option<String>| {
            let (state, error) = {
                let mut inner = lock(&inner);
                if inner.epoch != epoch {
                    return;
                }
                match status {
                    ChannelStatus::Subscribed => {
                        inner.state = ChannelState::Subscribed;
                        inner.error = None;
                    }
                    ChannelStatus::ChannelError | ChannelStatus::TimedOut => {
                        inner.state = ChannelState::Errored;
                        inner.error = Some(message.unwrap_or_else(|| match status {
                            ChannelStatus::TimedOut => "Subscription timed out".to_string(),
                            _ => "Channel error".to_string(),
                        }));
                    }
                    ChannelStatus::Closed => {
                        inner.state = ChannelState::Closed;
                    }
                }
                (inner.state, inner.error.clone())
            };

            match state {
                ChannelState::Errored => log::warn!(
                    "[SYNC_CHANNEL] '{}' {}: {}",
                    name,
                    status,
                    error.as_deref().unwrap_or("")
                ),
                _ => log::debug!("[SYNC_CHANNEL] '{}' {}", name, status),
            }
            on_state(state, error);
        })
    }
}

impl Drop for SubscriptionChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Client-side check of an event against the channel filter.
///
/// Inserts outside the filter are dropped. An update that moves a row out
/// of the filter becomes a delete so the row leaves the local view.
/// Deletes pass through; their old row is often just the key.
fn validate(filter: &FilterExpression, event: ChangeEvent) -> Option<ChangeEvent> {
    match event {
        ChangeEvent::Insert { ref entity } if !filter.matches(entity) => {
            log::debug!("[SYNC_CHANNEL] Insert outside filter '{}' dropped", filter);
            None
        }
        ChangeEvent::Update { entity, .. } if !filter.matches(&entity) => {
            Some(ChangeEvent::Delete { previous: entity })
        }
        other => Some(other),
    }
}
