use super::entity::Entity;

/// Caller-facing state of a collection subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionView {
    /// Rows in arrival order, unique by identifier
    pub data: Vec<Entity>,

    /// Snapshot load in flight
    pub loading: bool,

    pub error: Option<String>,

    /// The live channel is subscribed
    pub connected: bool,
}

/// Caller-facing state of a single-record subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordView {
    pub data: Option<Entity>,
    pub loading: bool,
    pub error: Option<String>,
    pub connected: bool,
}

impl RecordView {
    /// Whether the watched row currently exists
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}
