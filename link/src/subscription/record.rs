//! `RecordSubscription` – one row, followed by identifier.

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
use crate::models::{ChangeEvent, Entity, RecordView, SyncOptions};
use crate::realtime::{ListenEvent, RealtimeClient};
use crate::reconcile::{self, RecordState};
use crate::snapshot::SnapshotLoader;

/// Called with the identifier of the watched row when it is deleted.
pub type DeletedCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct RecordSync {
    watched: Option<String>,
    record: RecordState,
    loading: bool,
    connected: bool,
    fetch_error: Option<String>,
    channel_error: Option<String>,
    pending: Vec<ChangeEvent>,
    load_generation: u64,
}

impl RecordSync {
    fn view(&self) -> RecordView {
        RecordView {
            data: self.record.value().cloned(),
            loading: self.loading,
            error: self.channel_error.clone().or_else(|| self.fetch_error.clone()),
            connected: self.connected,
        }
    }

    fn is_watching(&self, id: &str) -> bool {
        self.watched.as_deref() == Some(id)
    }

    /// Apply `event` to the slot; true when it deleted the watched row.
    fn apply(&mut self, event: &ChangeEvent) -> bool {
        let Some(watched) = self.watched.as_deref() else {
            return false;
        };
        let outcome = reconcile::apply_to_record(std::mem::take(&mut self.record), event, watched);
        self.record = outcome.state;
        outcome.deleted
    }
}

struct RecordShared {
    table: String,
    loader: SnapshotLoader,
    active: AtomicBool,
    sync: Mutex<RecordSync>,
    view_tx: watch::Sender<RecordView>,
    on_deleted: Mutex<Option<DeletedCallback>>,
}

impl RecordShared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn publish(&self, sync: &RecordSync) {
        self.view_tx.send_replace(sync.view());
    }

    fn apply_event(&self, id: &str, event: ChangeEvent) {
        if !self.is_active() {
            return;
        }
        let deleted = {
            let mut sync = lock(&self.sync);
            if !sync.is_watching(id) {
                return;
            }
            if sync.loading {
                sync.pending.push(event);
                return;
            }
            let deleted = sync.apply(&event);
            self.publish(&sync);
            deleted
        };
        if deleted {
            self.notify_deleted(id);
        }
    }

    fn apply_channel_state(&self, id: &str, state: ChannelState, error: Option<String>) {
        if !self.is_active() {
            return;
        }
        let mut sync = lock(&self.sync);
        if !sync.is_watching(id) {
            return;
        }
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

    /// Switch the watched identifier, resetting everything tied to the old one.
    ///
    /// Returns the load generation for the new identifier.
    fn watch_id(&self, id: Option<String>) -> u64 {
        let mut sync = lock(&self.sync);
        sync.loading = id.is_some();
        sync.watched = id;
        sync.record = RecordState::empty();
        sync.pending.clear();
        sync.connected = false;
        sync.fetch_error = None;
        sync.channel_error = None;
        sync.load_generation += 1;
        self.publish(&sync);
        sync.load_generation
    }

    fn begin_load(&self) -> Option<(u64, String)> {
        if !self.is_active() {
            return None;
        }
        let mut sync = lock(&self.sync);
        let id = sync.watched.clone()?;
        sync.load_generation += 1;
        sync.loading = true;
        self.publish(&sync);
        Some((sync.load_generation, id))
    }

    fn finish_load(&self, generation: u64, id: &str, result: Result<Option<Entity>>) {
        if !self.is_active() {
            log::debug!(
                "[SYNC_SNAPSHOT] Discarding '{}' from '{}' after teardown",
                id,
                self.table
            );
            return;
        }

        let deletions = {
            let mut sync = lock(&self.sync);
            if sync.load_generation != generation || !sync.is_watching(id) {
                log::debug!(
                    "[SYNC_SNAPSHOT] Discarding superseded load of '{}' from '{}'",
                    id,
                    self.table
                );
                return;
            }

            match result {
                Ok(Some(entity)) => {
                    sync.record = RecordState::with_value(entity);
                    sync.fetch_error = None;
                }
                // Absent row: exists=false, not an error
                Ok(None) => {
                    sync.record = RecordState::empty();
                    sync.fetch_error = None;
                }
                Err(e) => sync.fetch_error = Some(e.to_string()),
            }

            let pending = std::mem::take(&mut sync.pending);
            let deletions = pending.iter().filter(|event| sync.apply(event)).count();
            sync.loading = false;
            self.publish(&sync);
            deletions
        };

        for _ in 0..deletions {
            self.notify_deleted(id);
        }
    }

    fn notify_deleted(&self, id: &str) {
        log::info!("[SYNC_SUBSCRIPTION] '{}' deleted from '{}'", id, self.table);
        let callback = lock(&self.on_deleted).clone();
        if let Some(callback) = callback {
            callback(id);
        }
    }
}

/// Live view of a single row.
///
/// The watched identifier can be changed with [`set_id`](Self::set_id);
/// with no identifier the subscription is idle and holds no channel.
/// Dropping the subscription closes it.
pub struct RecordSubscription {
    shared: Arc<RecordShared>,
    client: Arc<dyn RealtimeClient>,
    options: SyncOptions,
    channel: Mutex<Option<SubscriptionChannel>>,
    load_task: Mutex<Option<AbortHandle>>,
    runtime: Handle,
}

impl RecordSubscription {
    pub(crate) fn open(
        client: Arc<dyn RealtimeClient>,
        loader: SnapshotLoader,
        options: &SyncOptions,
        table: &str,
        id: Option<&str>,
    ) -> Result<Self> {
        let runtime = current_runtime()?;
        let (view_tx, _) = watch::channel(RecordView::default());

        let subscription = Self {
            shared: Arc::new(RecordShared {
                table: table.to_string(),
                loader,
                active: AtomicBool::new(true),
                sync: Mutex::new(RecordSync::default()),
                view_tx,
                on_deleted: Mutex::new(None),
            }),
            client,
            options: options.clone(),
            channel: Mutex::new(None),
            load_task: Mutex::new(None),
            runtime,
        };
        subscription.set_id(id);
        Ok(subscription)
    }

    /// Register the callback fired when the watched row is deleted.
    ///
    /// Fires once per delete event, after local state has been cleared.
    pub fn on_deleted(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.shared.on_deleted) = Some(Arc::new(f));
    }

    /// Follow a different row, or none.
    ///
    /// The channel for the previous identifier is closed before the new
    /// one opens, and results still in flight for it are discarded.
    pub fn set_id(&self, id: Option<&str>) {
        if !self.shared.is_active() {
            return;
        }
        let id = id.filter(|id| !id.is_empty()).map(str::to_string);
        if let Some(current) = lock(&self.shared.sync).watched.as_deref() {
            if id.as_deref() == Some(current) {
                return;
            }
        }

        if let Some(previous) = lock(&self.channel).take() {
            previous.close();
        }
        if let Some(task) = lock(&self.load_task).take() {
            task.abort();
        }

        let generation = self.shared.watch_id(id.clone());
        let Some(id) = id else {
            log::debug!(
                "[SYNC_SUBSCRIPTION] Record subscription on '{}' is idle",
                self.shared.table
            );
            return;
        };

        let channel = self.build_channel(&id);
        channel.open();
        *lock(&self.channel) = Some(channel);

        self.spawn_load(generation, id);
    }

    /// Identifier currently followed
    pub fn id(&self) -> Option<String> {
        lock(&self.shared.sync).watched.clone()
    }

    pub fn view(&self) -> RecordView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn data(&self) -> Option<Entity> {
        self.shared.view_tx.borrow().data.clone()
    }

    pub fn exists(&self) -> bool {
        self.shared.view_tx.borrow().exists()
    }

    pub fn watch(&self) -> watch::Receiver<RecordView> {
        self.shared.view_tx.subscribe()
    }

    pub fn table(&self) -> &str {
        &self.shared.table
    }

    /// Idle when no identifier is set
    pub fn channel_state(&self) -> ChannelState {
        lock(&self.channel)
            .as_ref()
            .map_or(ChannelState::Idle, SubscriptionChannel::state)
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Reload the watched row, rejoining the channel first if it errored.
    ///
    /// Dropping the returned future stops the wait, not the reload.
    pub async fn refresh(&self) {
        if let Some(channel) = lock(&self.channel).as_ref() {
            channel.retry();
        }

        let Some((generation, id)) = self.shared.begin_load() else {
            return;
        };
        if let Err(e) = self.spawn_load(generation, id).await {
            if e.is_panic() {
                log::error!(
                    "[SYNC_SNAPSHOT] Reload of '{}' panicked",
                    self.shared.table
                );
            }
        }
    }

    /// Stop following the row. Safe to call more than once.
    pub fn close(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(channel) = lock(&self.channel).take() {
            channel.close();
        }
        if let Some(task) = lock(&self.load_task).take() {
            task.abort();
        }
        log::debug!(
            "[SYNC_SUBSCRIPTION] Closed record subscription on '{}'",
            self.shared.table
        );
    }

    /// Load `id` as generation `generation`, superseding any load in flight.
    fn spawn_load(&self, generation: u64, id: String) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let task = self.runtime.spawn(async move {
            let result = shared.loader.load_record(&shared.table, &id).await;
            shared.finish_load(generation, &id, result);
        });
        if let Some(previous) = lock(&self.load_task).replace(task.abort_handle()) {
            previous.abort();
        }
        task
    }

    fn build_channel(&self, id: &str) -> SubscriptionChannel {
        let weak = Arc::downgrade(&self.shared);
        let watched = id.to_string();
        let on_event: EventSink = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_event(&watched, event);
            }
        });

        let weak = Arc::downgrade(&self.shared);
        let watched = id.to_string();
        let on_state: ChannelStateSink = Arc::new(move |state, error| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_channel_state(&watched, state, error);
            }
        });

        SubscriptionChannel::new(
            Arc::clone(&self.client),
            ChannelConfig {
                table: self.shared.table.clone(),
                schema: self.options.schema.clone(),
                filter: Some(FilterExpression::id_eq(id)),
                events: ListenEvent::All,
                name_prefix: self.options.channel_prefix.clone(),
            },
            on_event,
            on_state,
        )
    }
}

impl Drop for RecordSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
