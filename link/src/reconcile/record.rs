//! Single-record reducer.

use crate::models::{ChangeEvent, Entity};

/// Local slot for one watched row.
///
/// `exists()` is derived from the value, so a record can never claim to
/// exist without data or the other way round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordState {
    value: Option<Entity>,
}

impl RecordState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_value(entity: Entity) -> Self {
        Self {
            value: Some(entity),
        }
    }

    pub fn value(&self) -> Option<&Entity> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Entity> {
        self.value
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

/// Result of applying one event to a [`RecordState`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub state: RecordState,
    /// The watched row was deleted by this event
    pub deleted: bool,
}

/// Apply one event to the slot watching `watched_id`.
///
/// Events for any other identifier leave the state untouched.
pub fn apply(state: RecordState, event: &ChangeEvent, watched_id: &str) -> RecordOutcome {
    if event.id().as_deref() != Some(watched_id) {
        return RecordOutcome {
            state,
            deleted: false,
        };
    }

    match event {
        ChangeEvent::Insert { entity } | ChangeEvent::Update { entity, .. } => RecordOutcome {
            state: RecordState::with_value(entity.clone()),
            deleted: false,
        },
        ChangeEvent::Delete { .. } => RecordOutcome {
            state: RecordState::empty(),
            deleted: true,
        },
    }
}
