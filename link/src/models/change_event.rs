use super::change_type::ChangeType;
use super::entity::Entity;

/// A normalized row-level change.
///
/// Produced by [`normalize`](crate::normalize::normalize), which guarantees
/// that the authoritative side (`entity` for inserts and updates,
/// `previous` for deletes) carries an identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Row inserted
    Insert {
        /// New row values
        entity: Entity,
    },

    /// Row updated
    Update {
        /// Current row values
        entity: Entity,
        /// Previous row values, when the backend replicates them
        previous: Option<Entity>,
    },

    /// Row deleted
    Delete {
        /// Last known row values (at least the identifier)
        previous: Entity,
    },
}

impl ChangeEvent {
    pub fn insert(entity: Entity) -> Self {
        Self::Insert { entity }
    }

    pub fn update(entity: Entity) -> Self {
        Self::Update {
            entity,
            previous: None,
        }
    }

    pub fn delete(previous: Entity) -> Self {
        Self::Delete { previous }
    }

    pub fn kind(&self) -> ChangeType {
        match self {
            Self::Insert { .. } => ChangeType::Insert,
            Self::Update { .. } => ChangeType::Update,
            Self::Delete { .. } => ChangeType::Delete,
        }
    }

    /// Identifier taken from the authoritative side of the event
    pub fn id(&self) -> Option<String> {
        match self {
            Self::Insert { entity } | Self::Update { entity, .. } => entity.id(),
            Self::Delete { previous } => previous.id(),
        }
    }

    /// New row values, `None` for deletes
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Insert { entity } | Self::Update { entity, .. } => Some(entity),
            Self::Delete { .. } => None,
        }
    }
}
