//! Realtime subscriptions with local state reconciliation.
//!
//! - [`SubscriptionChannel`] – one backend channel and its lifecycle.
//! - [`CollectionSubscription`] – a keyed list of rows kept in sync.
//! - [`RecordSubscription`] – a single row kept in sync, following an
//!   identifier that may change or be absent.
//!
//! Both views seed themselves from a snapshot and apply live events on
//! top. Events that arrive while a snapshot is still loading are buffered
//! and replayed over the snapshot in arrival order, so the final state is
//! the same whichever of the two lands first.

mod channel;
mod collection;
mod record;

pub use channel::{ChannelConfig, ChannelState, ChannelStateSink, EventSink, SubscriptionChannel};
pub use collection::CollectionSubscription;
pub use record::{DeletedCallback, RecordSubscription};

use tokio::runtime::Handle;

use crate::error::{Result, SyncError};

/// Snapshot loads run as spawned tasks, so opening needs a runtime.
pub(crate) fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|_| {
        SyncError::ConfigurationError(
            "subscriptions must be opened inside a Tokio runtime".to_string(),
        )
    })
}
