use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Change notification exactly as the realtime backend delivers it.
///
/// Deletes usually arrive with an empty `new` object and inserts with an
/// empty `old` object; [`normalize`](crate::normalize::normalize) treats
/// empty objects the same as missing ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChangePayload {
    /// `INSERT`, `UPDATE` or `DELETE`
    #[serde(rename = "eventType")]
    pub event_type: String,

    #[serde(default)]
    pub schema: String,

    #[serde(default)]
    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,

    /// New row values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<JsonValue>,

    /// Old row values (primary key only unless replica identity is full)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<JsonValue>,
}

impl RawChangePayload {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_table(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.table = table.into();
        self
    }

    pub fn with_new(mut self, new: JsonValue) -> Self {
        self.new = Some(new);
        self
    }

    pub fn with_old(mut self, old: JsonValue) -> Self {
        self.old = Some(old);
        self
    }
}
