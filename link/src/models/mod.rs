//! Data models for stallplass-link.
//!
//! Rows, change events, caller-facing views and configuration.

mod change_event;
mod change_type;
mod connection_status;
mod entity;
mod raw_change_payload;
mod subscription_options;
mod sync_options;
mod views;

pub use change_event::ChangeEvent;
pub use change_type::ChangeType;
pub use connection_status::ConnectionStatus;
pub use entity::{Entity, ID_COLUMN};
pub use raw_change_payload::RawChangePayload;
pub use subscription_options::SubscriptionOptions;
pub use sync_options::SyncOptions;
pub use views::{CollectionView, RecordView};
