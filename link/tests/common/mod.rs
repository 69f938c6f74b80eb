//! In-memory stand-ins for the realtime backend and the snapshot endpoint.
//!
//! `FakeRealtime` records every channel and lifecycle callback so tests
//! can push change notifications and socket signals by hand.
//! `FakeQueryBackend` serves rows from memory and can hold reads back on
//! a semaphore to force events to race the snapshot.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use stallplass_link::{
    ChangeCallback, ChangeSpec, ChannelStatus, Entity, FilterExpression, LifecycleCallback,
    LifecycleErrorCallback, QueryBackend, QueryError, RawChangePayload, RealtimeChannel,
    RealtimeClient, StatusCallback, SyncClient, SyncOptions,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn row(value: JsonValue) -> Entity {
    Entity::try_from(value).expect("test rows are JSON objects")
}

pub fn boks(id: &str, stable_id: &str, price: i64) -> Entity {
    row(json!({ "id": id, "stable_id": stable_id, "price": price }))
}

pub fn insert(table: &str, entity: &Entity) -> RawChangePayload {
    RawChangePayload::new("INSERT")
        .with_table("public", table)
        .with_new(serde_json::to_value(entity).unwrap())
        .with_old(json!({}))
}

pub fn update(table: &str, entity: &Entity) -> RawChangePayload {
    RawChangePayload::new("UPDATE")
        .with_table("public", table)
        .with_new(serde_json::to_value(entity).unwrap())
        .with_old(json!({ "id": entity.id() }))
}

pub fn delete(table: &str, id: &str) -> RawChangePayload {
    RawChangePayload::new("DELETE")
        .with_table("public", table)
        .with_new(json!({}))
        .with_old(json!({ "id": id }))
}

// ── realtime ─────────────────────────────────────────────────────────────────

pub struct FakeChannel {
    pub name: String,
    auto_ack: bool,
    listeners: Mutex<Vec<(ChangeSpec, ChangeCallback)>>,
    status: Mutex<Option<StatusCallback>>,
    unsubscribed: AtomicUsize,
}

impl FakeChannel {
    pub fn specs(&self) -> Vec<ChangeSpec> {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(spec, _)| spec.clone())
            .collect()
    }

    /// Deliver `payload` to matching listeners, whether or not the channel
    /// has been unsubscribed.
    pub fn emit(&self, payload: &RawChangePayload) {
        let listeners: Vec<(ChangeSpec, ChangeCallback)> = self.listeners.lock().unwrap().clone();
        for (spec, callback) in listeners {
            if spec.table == payload.table && spec.event.accepts(&payload.event_type) {
                callback(payload.clone());
            }
        }
    }

    pub fn set_status(&self, status: ChannelStatus, message: Option<&str>) {
        let callback = self.status.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(status, message.map(str::to_string));
        }
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

impl RealtimeChannel for FakeChannel {
    fn on(&self, spec: ChangeSpec, callback: ChangeCallback) {
        self.listeners.lock().unwrap().push((spec, callback));
    }

    fn subscribe(&self, callback: StatusCallback) {
        *self.status.lock().unwrap() = Some(callback.clone());
        if self.auto_ack {
            callback(ChannelStatus::Subscribed, None);
        }
    }

    fn unsubscribe(&self) {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeRealtime {
    manual_ack: AtomicBool,
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    on_open: Mutex<Vec<LifecycleCallback>>,
    on_close: Mutex<Vec<LifecycleCallback>>,
    on_error: Mutex<Vec<LifecycleErrorCallback>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeRealtime {
    /// Channels acknowledge `subscribe` immediately with `SUBSCRIBED`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channels stay joining until `set_status` is called.
    pub fn manual_ack() -> Arc<Self> {
        let realtime = Self::default();
        realtime.manual_ack.store(true, Ordering::SeqCst);
        Arc::new(realtime)
    }

    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.channels.lock().unwrap().clone()
    }

    pub fn last_channel(&self) -> Arc<FakeChannel> {
        self.channels().last().cloned().expect("no channel opened")
    }

    /// Broadcast a change to every channel, old ones included.
    pub fn emit(&self, payload: RawChangePayload) {
        for channel in self.channels() {
            channel.emit(&payload);
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn fire_open(&self) {
        let callbacks = self.on_open.lock().unwrap().clone();
        callbacks.iter().for_each(|cb| cb());
    }

    pub fn fire_close(&self) {
        let callbacks = self.on_close.lock().unwrap().clone();
        callbacks.iter().for_each(|cb| cb());
    }

    pub fn fire_error(&self, message: &str) {
        let callbacks = self.on_error.lock().unwrap().clone();
        callbacks.iter().for_each(|cb| cb(message.to_string()));
    }
}

impl RealtimeClient for FakeRealtime {
    fn channel(&self, name: &str) -> Arc<dyn RealtimeChannel> {
        let channel = Arc::new(FakeChannel {
            name: name.to_string(),
            auto_ack: !self.manual_ack.load(Ordering::SeqCst),
            listeners: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            unsubscribed: AtomicUsize::new(0),
        });
        self.channels.lock().unwrap().push(channel.clone());
        channel
    }

    fn on_open(&self, callback: LifecycleCallback) {
        self.on_open.lock().unwrap().push(callback);
    }

    fn on_close(&self, callback: LifecycleCallback) {
        self.on_close.lock().unwrap().push(callback);
    }

    fn on_error(&self, callback: LifecycleErrorCallback) {
        self.on_error.lock().unwrap().push(callback);
    }

    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ── snapshot endpoint ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeQueryBackend {
    rows: Mutex<Vec<Entity>>,
    gate: Option<Arc<Semaphore>>,
    failure: Mutex<Option<QueryError>>,
    calls: AtomicUsize,
}

impl FakeQueryBackend {
    pub fn with_rows(rows: Vec<Entity>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Default::default()
        })
    }

    /// Every read waits for one permit from the returned semaphore.
    pub fn gated(rows: Vec<Entity>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(Self {
            rows: Mutex::new(rows),
            gate: Some(gate.clone()),
            ..Default::default()
        });
        (backend, gate)
    }

    pub fn set_rows(&self, rows: Vec<Entity>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn fail_with(&self, error: QueryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait_for_gate(&self) -> Result<(), QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| QueryError::Transport(e.to_string()))?
                .forget();
        }
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueryBackend for FakeQueryBackend {
    async fn select_all(
        &self,
        _table: &str,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<Entity>, QueryError> {
        self.wait_for_gate().await?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .cloned()
            .collect())
    }

    async fn select_by_id(&self, _table: &str, id: &str) -> Result<Entity, QueryError> {
        self.wait_for_gate().await?;
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.has_id(id))
            .cloned()
            .ok_or(QueryError::NotFound)
    }
}

pub fn client(realtime: &Arc<FakeRealtime>, backend: &Arc<FakeQueryBackend>) -> SyncClient {
    init_logger();
    SyncClient::builder()
        .realtime(realtime.clone())
        .query_backend(backend.clone())
        .options(SyncOptions::default())
        .build()
        .expect("client builds")
}
