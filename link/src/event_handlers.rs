//! Connection status listeners.
//!
//! Two ways to observe [`ConnectionStatusAggregator`](crate::ConnectionStatusAggregator):
//!
//! - a plain listener, called with the full [`ConnectionStatus`] on every change
//! - [`TransitionHandlers`], called only when the connection goes up, goes
//!   down, or an error appears
//!
//! Listeners run synchronously on the thread that produced the change. A
//! listener that panics is logged and skipped; the remaining listeners
//! still receive the update.
//!
//! # Example
//!
//! ```rust
//! use stallplass_link::TransitionHandlers;
//!
//! let handlers = TransitionHandlers::new()
//!     .on_connected(|| println!("Tilkoblet"))
//!     .on_disconnected(|| println!("Frakoblet"))
//!     .on_error(|error| eprintln!("Feil: {}", error));
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::models::ConnectionStatus;

/// Listener receiving every status change.
pub type StatusListener = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

/// Type alias for the on_connected / on_disconnected callbacks.
pub type OnTransitionCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Handle returned when registering a listener; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Observer list with per-listener panic isolation.
#[derive(Default)]
pub(crate) struct StatusListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, StatusListener)>>,
}

impl StatusListeners {
    pub(crate) fn add(&self, listener: StatusListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Call every listener with `status`.
    ///
    /// The list is copied first so listeners may subscribe or unsubscribe
    /// from inside the callback.
    pub(crate) fn notify(&self, status: &ConnectionStatus) {
        let listeners: Vec<(ListenerId, StatusListener)> = lock(&self.listeners).clone();
        for (id, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(status))) {
                log::error!(
                    "[SYNC_STATUS] Status {} panicked: {}",
                    id,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Callbacks fired only on connection state transitions.
///
/// All handlers are optional.
#[derive(Clone, Default)]
pub struct TransitionHandlers {
    pub(crate) on_connected: Option<OnTransitionCallback>,
    pub(crate) on_disconnected: Option<OnTransitionCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
}

impl fmt::Debug for TransitionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionHandlers")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl TransitionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired on disconnected → connected.
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Arc::new(f));
        self
    }

    /// Fired on connected → disconnected.
    pub fn on_disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnected = Some(Arc::new(f));
        self
    }

    /// Fired when an error appears or changes; clearing an error is silent.
    pub fn on_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Wrap into a plain listener that remembers the last seen state.
    pub(crate) fn into_listener(self, initial: &ConnectionStatus) -> StatusListener {
        let previous = Mutex::new((initial.connected, initial.error.clone()));
        Arc::new(move |status: &ConnectionStatus| {
            let (was_connected, previous_error) = {
                let mut previous = lock(&previous);
                std::mem::replace(&mut *previous, (status.connected, status.error.clone()))
            };

            if status.connected && !was_connected {
                if let Some(cb) = &self.on_connected {
                    cb();
                }
            }
            if !status.connected && was_connected {
                if let Some(cb) = &self.on_disconnected {
                    cb();
                }
            }
            if let Some(error) = &status.error {
                if previous_error.as_ref() != Some(error) {
                    if let Some(cb) = &self.on_error {
                        cb(error.clone());
                    }
                }
            }
        })
    }
}
