//! # stallplass-link
//!
//! Client-side realtime read-model synchronization for Stallplass.
//!
//! The crate keeps an in-memory collection of rows (or a single row) in
//! step with a remote table by seeding it from a snapshot query and then
//! applying the live change stream of a managed realtime backend on top.
//!
//! ## Module Structure
//!
//! - [`filter`]: `column=operator.value` filter compilation and client-side matching
//! - [`normalize`]: raw change notifications into [`ChangeEvent`]
//! - [`reconcile`]: pure reducers for collections and single records
//! - [`snapshot`]: initial snapshot loading over a [`QueryBackend`]
//! - [`subscription`]: channel lifecycle plus collection/record views
//! - [`connection`]: process-wide connection health with bounded reconnects
//! - [`client`]: the [`SyncClient`] facade wiring the pieces together
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stallplass_link::{AuthProvider, RealtimeClient, SubscriptionOptions, SyncClient};
//!
//! # async fn example(realtime: Arc<dyn RealtimeClient>) -> stallplass_link::Result<()> {
//! let client = SyncClient::builder()
//!     .realtime(realtime)
//!     .rest_backend("https://project.example.co", AuthProvider::api_key("anon-key"))
//!     .build()?;
//!
//! let boxes = client.subscribe_collection(
//!     "boxes",
//!     SubscriptionOptions::new().with_filter("stable_id=eq.s1"),
//! )?;
//!
//! let mut rx = boxes.watch();
//! rx.wait_for(|view| !view.loading).await.ok();
//! println!("{} boxes", boxes.view().data.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod filter;
pub mod models;
pub mod normalize;
pub mod query;
pub mod realtime;
pub mod reconcile;
pub mod snapshot;
pub mod subscription;

pub use auth::AuthProvider;
pub use client::{SyncClient, SyncClientBuilder};
pub use connection::ConnectionStatusAggregator;
pub use error::{QueryError, Result, SyncError};
pub use event_handlers::{ListenerId, TransitionHandlers};
pub use filter::{and, FilterExpression, FilterOperator};
pub use models::{
    ChangeEvent, ChangeType, CollectionView, ConnectionStatus, Entity, RawChangePayload,
    RecordView, SubscriptionOptions, SyncOptions, ID_COLUMN,
};
pub use normalize::normalize;
pub use query::RestQueryBackend;
pub use realtime::{
    ChangeCallback, ChangeSpec, ChannelStatus, LifecycleCallback, LifecycleErrorCallback,
    ListenEvent, RealtimeChannel, RealtimeClient, StatusCallback,
};
pub use reconcile::{RecordOutcome, RecordState};
pub use snapshot::{QueryBackend, SnapshotLoader};
pub use subscription::{
    ChannelConfig, ChannelState, ChannelStateSink, CollectionSubscription, DeletedCallback,
    EventSink, RecordSubscription, SubscriptionChannel,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// None of the guarded state can be left half-written by a panic (all
/// user callbacks run outside the locks), so poisoning carries no meaning.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current time in millis since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
