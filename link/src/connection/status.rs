use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::event_handlers::{ListenerId, StatusListeners, TransitionHandlers};
use crate::models::{ConnectionStatus, SyncOptions};
use crate::realtime::RealtimeClient;
use crate::{lock, now_ms};

struct AggregatorState {
    status: ConnectionStatus,
    retry_timer: Option<JoinHandle<()>>,
    connecting_timer: Option<JoinHandle<()>>,
    /// A reconnect is scheduled and has not fired yet
    retry_pending: bool,
}

impl AggregatorState {
    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        self.retry_pending = false;
    }

    fn cancel_connecting(&mut self) {
        if let Some(timer) = self.connecting_timer.take() {
            timer.abort();
        }
    }
}

/// Shared connection health for every subscription of a client.
///
/// Construct one per realtime client and share it via `Arc`. On close or
/// error it schedules `connect()` with linear backoff
/// (`retry_delay * attempt`) up to `max_retries` attempts, then gives up
/// and reports the failure in [`ConnectionStatus::error`]. A successful
/// open resets the attempt counter.
///
/// Timers need a Tokio runtime; without one the aggregator only tracks
/// state.
pub struct ConnectionStatusAggregator {
    me: Weak<Self>,
    client: Arc<dyn RealtimeClient>,
    options: SyncOptions,
    runtime: Option<Handle>,
    state: Mutex<AggregatorState>,
    listeners: StatusListeners,
    /// Close/error signals are expected while a manual reconnect cycles the socket
    suppress_disconnect: AtomicBool,
}

impl ConnectionStatusAggregator {
    /// Register on the client's lifecycle signals and start the
    /// connecting timeout.
    pub fn new(client: Arc<dyn RealtimeClient>, options: SyncOptions) -> Arc<Self> {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            log::debug!("[SYNC_STATUS] No Tokio runtime; reconnect timers disabled");
        }

        let aggregator = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            client: Arc::clone(&client),
            options,
            runtime,
            state: Mutex::new(AggregatorState {
                status: ConnectionStatus::connecting(),
                retry_timer: None,
                connecting_timer: None,
                retry_pending: false,
            }),
            listeners: StatusListeners::default(),
            suppress_disconnect: AtomicBool::new(false),
        });

        let me = Arc::downgrade(&aggregator);
        client.on_open(Arc::new(move || {
            if let Some(aggregator) = me.upgrade() {
                aggregator.handle_open();
            }
        }));
        let me = Arc::downgrade(&aggregator);
        client.on_close(Arc::new(move || {
            if let Some(aggregator) = me.upgrade() {
                aggregator.handle_disconnect(None);
            }
        }));
        let me = Arc::downgrade(&aggregator);
        client.on_error(Arc::new(move |error: String| {
            if let Some(aggregator) = me.upgrade() {
                aggregator.handle_disconnect(Some(error));
            }
        }));

        aggregator.start_connecting_timer();
        aggregator
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.state).status.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).status.connected
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Register a listener called with the full status on every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Register handlers fired only on connect, disconnect and new errors.
    pub fn on_transition(&self, handlers: TransitionHandlers) -> ListenerId {
        let listener = handlers.into_listener(&self.status());
        self.listeners.add(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Cycle the socket by hand, starting over with a fresh attempt budget.
    ///
    /// Dropping the returned future stops the wait, not the reconnect.
    pub async fn reconnect(&self) {
        log::info!("[SYNC_STATUS] Manual reconnect requested");
        self.update(|state| {
            state.cancel_retry();
            state.status.reconnect_attempts = 0;
            state.status.error = None;
            state.status.reconnecting = !state.status.connected;
        });

        self.suppress_disconnect.store(true, Ordering::Release);
        self.client.disconnect();
        self.update(|state| {
            state.status.connected = false;
            state.status.reconnecting = true;
        });

        // Settle and connect on a task; a dropped caller must not leave
        // disconnects suppressed
        let me = self.me.clone();
        let settle = self.options.reconnect_settle();
        let task = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let Some(aggregator) = me.upgrade() else {
                return;
            };
            aggregator.suppress_disconnect.store(false, Ordering::Release);
            aggregator.client.connect();
        });
        if let Err(e) = task.await {
            if e.is_panic() {
                log::error!("[SYNC_STATUS] Manual reconnect panicked");
            }
        }
    }

    /// Forget the attempt count and error, and stop any pending timers.
    pub fn reset(&self) {
        self.update(|state| {
            state.cancel_retry();
            state.cancel_connecting();
            state.status.reconnect_attempts = 0;
            state.status.error = None;
            state.status.reconnecting = false;
            state.status.connecting = false;
        });
    }

    /// Mutate the state, then notify listeners outside the lock if the
    /// status changed.
    fn update(&self, f: impl FnOnce(&mut AggregatorState)) {
        let changed = {
            let mut state = lock(&self.state);
            let before = state.status.clone();
            f(&mut state);
            (state.status != before).then(|| state.status.clone())
        };
        if let Some(status) = changed {
            self.listeners.notify(&status);
        }
    }

    fn handle_open(&self) {
        log::info!("[SYNC_STATUS] Realtime connection open");
        self.update(|state| {
            state.cancel_retry();
            state.cancel_connecting();
            state.status.connected = true;
            state.status.connecting = false;
            state.status.reconnecting = false;
            state.status.error = None;
            state.status.reconnect_attempts = 0;
            state.status.last_connected_ms = Some(now_ms());
        });
    }

    fn handle_disconnect(&self, error: Option<String>) {
        match &error {
            Some(error) => log::warn!("[SYNC_STATUS] Realtime connection error: {}", error),
            None => log::info!("[SYNC_STATUS] Realtime connection closed"),
        }
        let suppressed = self.suppress_disconnect.load(Ordering::Acquire);

        self.update(|state| {
            state.cancel_connecting();
            state.status.connected = false;
            state.status.connecting = false;
            if error.is_some() {
                state.status.error = error;
            }

            // A close usually follows an error; one failure, one attempt
            if suppressed || state.retry_pending {
                return;
            }

            let max_retries = self.options.max_retries;
            if state.status.reconnect_attempts < max_retries {
                state.status.reconnect_attempts += 1;
                state.status.reconnecting = true;
                self.schedule_retry(state);
            } else {
                log::warn!(
                    "[SYNC_STATUS] Giving up after {} reconnect attempts",
                    max_retries
                );
                state.status.reconnecting = false;
                state.status.error =
                    Some(format!("Failed to reconnect after {} attempts", max_retries));
            }
        });
    }

    fn schedule_retry(&self, state: &mut AggregatorState) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let attempt = state.status.reconnect_attempts;
        let delay = self.options.retry_delay(attempt);
        log::info!(
            "[SYNC_STATUS] Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            self.options.max_retries
        );

        let me = self.me.clone();
        state.retry_pending = true;
        state.retry_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(aggregator) = me.upgrade() else {
                return;
            };
            {
                let mut state = lock(&aggregator.state);
                state.retry_pending = false;
                state.retry_timer = None;
            }
            aggregator.client.connect();
        }));
    }

    fn start_connecting_timer(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let timeout = self.options.connecting_timeout();
        let me = self.me.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(aggregator) = me.upgrade() else {
                return;
            };
            aggregator.update(|state| {
                state.connecting_timer = None;
                if state.status.connecting && !state.status.connected {
                    log::warn!(
                        "[SYNC_STATUS] Still connecting after {}ms",
                        timeout.as_millis()
                    );
                    state.status.connecting = false;
                    state.status.error = Some("Connection timeout".to_string());
                }
            });
        });
        lock(&self.state).connecting_timer = Some(timer);
    }
}

impl Drop for ConnectionStatusAggregator {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.cancel_retry();
        state.cancel_connecting();
    }
}
