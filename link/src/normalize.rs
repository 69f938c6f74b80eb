//! Normalization of raw change notifications.
//!
//! The realtime backend tags each notification with a string event type
//! and ships the row on the `new` or `old` side depending on that type.
//! This module turns that into a [`ChangeEvent`], rejecting anything the
//! reconcilers could not key by identifier.

use serde_json::Value as JsonValue;

use crate::error::{Result, SyncError};
use crate::models::{ChangeEvent, ChangeType, Entity, RawChangePayload, ID_COLUMN};

/// Convert a raw notification into a [`ChangeEvent`].
///
/// - `INSERT` / `UPDATE` take the row from `new`; `old` is optional.
/// - `DELETE` takes the row from `old`.
/// - The authoritative row must carry an `id`.
pub fn normalize(raw: RawChangePayload) -> Result<ChangeEvent> {
    let kind: ChangeType = raw
        .event_type
        .parse()
        .map_err(SyncError::NormalizeError)?;

    match kind {
        ChangeType::Insert => {
            let entity = required_row(raw.new, kind, "new")?;
            Ok(ChangeEvent::Insert { entity })
        }
        ChangeType::Update => {
            let entity = required_row(raw.new, kind, "new")?;
            // Without full replica identity the old side is often empty
            let previous = match optional_row(raw.old) {
                Ok(previous) => previous,
                Err(e) => {
                    log::debug!("[SYNC_CHANNEL] Ignoring previous row of update: {}", e);
                    None
                }
            };
            Ok(ChangeEvent::Update { entity, previous })
        }
        ChangeType::Delete => {
            let previous = required_row(raw.old, kind, "old")?;
            Ok(ChangeEvent::Delete { previous })
        }
    }
}

/// Decode and normalize a notification still in JSON form.
pub fn normalize_value(raw: JsonValue) -> Result<ChangeEvent> {
    let payload: RawChangePayload = serde_json::from_value(raw)
        .map_err(|e| SyncError::NormalizeError(format!("invalid payload: {}", e)))?;
    normalize(payload)
}

fn required_row(side: Option<JsonValue>, kind: ChangeType, label: &str) -> Result<Entity> {
    let entity = optional_row(side)?.ok_or_else(|| {
        SyncError::NormalizeError(format!("{} event without '{}' row", kind, label))
    })?;

    if entity.id().is_none() {
        return Err(SyncError::NormalizeError(format!(
            "{} event '{}' row has no '{}' column",
            kind, label, ID_COLUMN
        )));
    }

    Ok(entity)
}

/// `None`, `null` and `{}` all mean "no row"
fn optional_row(side: Option<JsonValue>) -> Result<Option<Entity>> {
    match side {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Object(map)) if map.is_empty() => Ok(None),
        Some(JsonValue::Object(map)) => Ok(Some(Entity::from(map))),
        Some(other) => Err(SyncError::NormalizeError(format!(
            "row payload is not an object: {}",
            other
        ))),
    }
}
