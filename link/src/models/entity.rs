use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Column that identifies a row within its table.
pub const ID_COLUMN: &str = "id";

/// A single row of a tracked table, keyed by column name.
///
/// Serializes transparently as the underlying JSON object so snapshot
/// responses and change payloads decode straight into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, JsonValue>);

impl Entity {
    /// Create an empty row
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Identifier of this row, if the `id` column holds a usable value.
    ///
    /// String ids are returned as-is; numeric ids are rendered in their
    /// decimal form so they compare equal to the `eq.<id>` filter value.
    pub fn id(&self) -> Option<String> {
        match self.0.get(ID_COLUMN)? {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether this row carries the given identifier
    pub fn has_id(&self, id: &str) -> bool {
        self.id().as_deref() == Some(id)
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.0.insert(column.into(), value)
    }

    /// Builder-style variant of [`Entity::insert`]
    pub fn with(mut self, column: impl Into<String>, value: JsonValue) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for Entity {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl TryFrom<JsonValue> for Entity {
    type Error = JsonValue;

    /// Accepts JSON objects only; anything else is handed back unchanged.
    fn try_from(value: JsonValue) -> std::result::Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
