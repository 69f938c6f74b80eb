//! Keyed, ordered collection reducer.
//!
//! - Insert of a known id is ignored (a snapshot row and a racing insert
//!   must not produce two copies).
//! - Update replaces in place, or appends when the id is unknown.
//! - Delete removes, or does nothing when the id is unknown.
//!
//! New rows go to the end and updated rows keep their position.

use crate::models::{ChangeEvent, Entity};

/// Apply one event to a collection
pub fn apply(mut state: Vec<Entity>, event: &ChangeEvent) -> Vec<Entity> {
    let Some(id) = event.id() else {
        log::warn!(
            "[SYNC_RECONCILE] Dropping {} event without identifier",
            event.kind()
        );
        return state;
    };

    let position = state.iter().position(|row| row.has_id(&id));

    match (event, position) {
        (ChangeEvent::Insert { .. }, Some(_)) => {
            log::debug!("[SYNC_RECONCILE] Ignoring duplicate insert for id={}", id);
        }
        (ChangeEvent::Insert { entity }, None) => state.push(entity.clone()),
        (ChangeEvent::Update { entity, .. }, Some(index)) => state[index] = entity.clone(),
        (ChangeEvent::Update { entity, .. }, None) => {
            log::debug!("[SYNC_RECONCILE] Update for unknown id={}, appending", id);
            state.push(entity.clone());
        }
        (ChangeEvent::Delete { .. }, Some(index)) => {
            state.remove(index);
        }
        (ChangeEvent::Delete { .. }, None) => {}
    }

    state
}

/// Apply events in order
pub fn apply_all<'a, I>(state: Vec<Entity>, events: I) -> Vec<Entity>
where
    I: IntoIterator<Item = &'a ChangeEvent>,
{
    events.into_iter().fold(state, apply)
}

/// Build a collection from snapshot rows.
///
/// Rows without an identifier cannot be reconciled and are dropped; a
/// repeated identifier keeps its first occurrence.
pub fn from_snapshot(rows: Vec<Entity>) -> Vec<Entity> {
    let mut state: Vec<Entity> = Vec::with_capacity(rows.len());
    for row in rows {
        match row.id() {
            Some(id) if state.iter().any(|existing| existing.has_id(&id)) => {
                log::warn!("[SYNC_RECONCILE] Snapshot repeated id={}, keeping first", id);
            }
            Some(_) => state.push(row),
            None => log::warn!("[SYNC_RECONCILE] Snapshot row without identifier dropped"),
        }
    }
    state
}
