//! `CollectionSubscription` – a table (or filtered slice of it) kept in sync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use super::channel::{ChannelConfig, ChannelState, ChannelStateSink, EventSink, SubscriptionChannel};
use super::current_runtime;
use crate::error::Result;
use crate::filter::FilterExpression;
use crate::lock;
use crate::models::{ChangeEvent, CollectionView, Entity, SubscriptionOptions, SyncOptions};
use crate::realtime::RealtimeClient;
use crate::reconcile;
use crate::snapshot::SnapshotLoader;

#[derive(Default)]
struct CollectionSync {
    data: Vec<Entity>,
    loading: bool,
    connected: bool,
    fetch_error: Option<String>,
    channel_error: Option<String>,
    /// Live events held back while a snapshot is loading
    pending: Vec<ChangeEvent>,
    load_generation: u64,
}

impl CollectionSync {
    fn view(&self) -> CollectionView {
        CollectionView {
            data: self.data.clone(),
            loading: self.loading,
            error: self.channel_error.clone().or_else(|| self.fetch_error.clone()),
            connected: self.connected,
        }
    }
}

struct CollectionShared {
    table: String,
    filter: Option<FilterExpression>,
    loader: SnapshotLoader,
    /// Cleared on teardown; nothing mutates the view afterwards
    active: AtomicBool,
    sync: Mutex<CollectionSync>,
    view_tx: watch::Sender<CollectionView>,
}

impl CollectionShared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn publish(&self, sync: &CollectionSync) {
        self.view_tx.send_replace(sync.view());
    }

    fn apply_event(&self, event: ChangeEvent) {
        if !self.is_active() {
            return;
        }
        let mut sync = lock(&self.sync);
        if sync.loading {
            sync.pending.push(event);
            return;
        }
        let data = std::mem::take(&mut sync.data);
        sync.data = reconcile::apply_to_collection(data, &event);
        self.publish(&sync);
    }

    fn apply_channel_state(&self, state: ChannelState, error: Option<String>) {
        if !self.is_active() {
            return;
        }
        let mut sync = lock(&self.sync);
        sync.connected = state == ChannelState::Subscribed;
        match state {
            ChannelState::Subscribed => {
                sync.channel_error = None;
                sync.fetch_error = None;
            }
            ChannelState::Errored => sync.channel_error = error,
            _ => {}
        }
        self.publish(&sync);
    }

    fn begin_load(&self) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        let mut sync = lock(&self.sync);
        sync.load_generation += 1;
        sync.loading = true;
        self.publish(&sync);
        Some(sync.load_generation)
    }

    fn finish_load(&self, generation: u64, result: Result<Vec<Entity>>) {
        if !self.is_active() {
            log::debug!(
                "[SYNC_SNAPSHOT] Discarding snapshot for '{}' after teardown",
                self.table
            );
            return;
        }

        let mut sync = lock(&self.sync);
        if sync.load_generation != generation {
            log::debug!(
                "[SYNC_SNAPSHOT] Discarding superseded snapshot #{} for '{}'",
                generation,
                self.table
            );
            return;
        }

        let pending = std::mem::take(&mut sync.pending);
        let base = match result {
            Ok(rows) => {
                sync.fetch_error = None;
                reconcile::from_snapshot(rows)
            }
            Err(e) => {
                // Keep whatever we had; live events still apply on top
                sync.fetch_error = Some(e.to_string());
                std::mem::take(&mut sync.data)
            }
        };
        if !pending.is_empty() {
            log::debug!(
                "[SYNC_SNAPSHOT] Replaying {} buffered events over '{}' snapshot",
                pending.len(),
                self.table
            );
        }
        sync.data = reconcile::apply_all(base, &pending);
        sync.loading = false;
        self.publish(&sync);
    }
}

/// Live view of the rows of one table, optionally filtered.
///
/// Created through [`SyncClient::subscribe_collection`](crate::SyncClient::subscribe_collection).
/// The view starts out `loading`; failures after opening are reported in
/// [`CollectionView::error`] rather than returned. Dropping the
/// subscription closes it.
pub struct CollectionSubscription {
    shared: Arc<CollectionShared>,
    channel: SubscriptionChannel,
    load_task: Mutex<Option<AbortHandle>>,
    runtime: Handle,
}

impl CollectionSubscription {
    /// Compile the filter, start the snapshot load and open the channel.
    ///
    /// Only a malformed filter (or a missing runtime) fails; the
    /// subscription is never opened unfiltered in that case.
    pub(crate) fn open(
        client: Arc<dyn RealtimeClient>,
        loader: SnapshotLoader,
        options: &SyncOptions,
        table: &str,
        subscription: SubscriptionOptions,
    ) -> Result<Self> {
        let filter = subscription
            .filter
            .as_deref()
            .map(FilterExpression::compile)
            .transpose()?;
        let runtime = current_runtime()?;

        let (view_tx, _) = watch::channel(CollectionView::default());
        let shared = Arc::new(CollectionShared {
            table: table.to_string(),
            filter: filter.clone(),
            loader,
            active: AtomicBool::new(true),
            sync: Mutex::new(CollectionSync::default()),
            view_tx,
        });

        let weak = Arc::downgrade(&shared);
        let on_event: EventSink = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_event(event);
            }
        });
        let weak = Arc::downgrade(&shared);
        let on_state: ChannelStateSink = Arc::new(move |state, error| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_channel_state(state, error);
            }
        });

        let channel = SubscriptionChannel::new(
            client,
            ChannelConfig {
                table: table.to_string(),
                schema: options.schema.clone(),
                filter,
                events: subscription.events,
                name_prefix: options.channel_prefix.clone(),
            },
            on_event,
            on_state,
        );

        let subscription = Self {
            shared,
            channel,
            load_task: Mutex::new(None),
            runtime,
        };
        // Start loading before joining so early events are buffered
        subscription.spawn_load();
        subscription.channel.open();
        Ok(subscription)
    }

    /// Current state
    pub fn view(&self) -> CollectionView {
        self.shared.view_tx.borrow().clone()
    }

    /// Current rows
    pub fn data(&self) -> Vec<Entity> {
        self.shared.view_tx.borrow().data.clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<CollectionView> {
        self.shared.view_tx.subscribe()
    }

    pub fn table(&self) -> &str {
        &self.shared.table
    }

    pub fn filter(&self) -> Option<&FilterExpression> {
        self.shared.filter.as_ref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Reload the snapshot, rejoining the channel first if it errored.
    ///
    /// Live events keep flowing into the buffer while the reload runs.
    /// The reload runs as its own task: dropping the returned future stops
    /// the wait, not the reload.
    pub async fn refresh(&self) {
        self.channel.retry();

        let Some(task) = self.spawn_load() else {
            return;
        };
        if let Err(e) = task.await {
            if e.is_panic() {
                log::error!(
                    "[SYNC_SNAPSHOT] Reload of '{}' panicked",
                    self.shared.table
                );
            }
        }
    }

    /// Stop dispatching events and release the channel.
    ///
    /// Safe to call multiple times; later calls are no-ops.
    pub fn close(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.channel.close();
        if let Some(task) = lock(&self.load_task).take() {
            task.abort();
        }
        log::debug!(
            "[SYNC_SUBSCRIPTION] Closed collection subscription on '{}'",
            self.shared.table
        );
    }

    /// Start a snapshot load, superseding any load still in flight.
    fn spawn_load(&self) -> Option<JoinHandle<()>> {
        let generation = self.shared.begin_load()?;
        let shared = Arc::clone(&self.shared);
        let task = self.runtime.spawn(async move {
            let result = shared
                .loader
                .load_collection(&shared.table, shared.filter.as_ref())
                .await;
            shared.finish_load(generation, result);
        });
        if let Some(previous) = lock(&self.load_task).replace(task.abort_handle()) {
            previous.abort();
        }
        Some(task)
    }
}

impl Drop for CollectionSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
