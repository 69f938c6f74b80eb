//! Pure reducers applying [`ChangeEvent`](crate::models::ChangeEvent)s to local state.
//!
//! Both reducers take the current state by value and return the next
//! state, with no hidden state of their own, so any event sequence can be
//! replayed deterministically. Subscriptions rely on this to replay
//! events that raced an in-flight snapshot.

pub mod collection;
pub mod record;

pub use collection::{apply as apply_to_collection, apply_all, from_snapshot};
pub use record::{apply as apply_to_record, RecordOutcome, RecordState};
