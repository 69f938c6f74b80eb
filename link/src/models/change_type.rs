use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of change that occurred in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// New row inserted
    Insert,

    /// Existing row updated
    Update,

    /// Row deleted
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "INSERT",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    /// Parses the backend's event-type tag, ignoring ASCII case.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("INSERT") {
            Ok(ChangeType::Insert)
        } else if s.eq_ignore_ascii_case("UPDATE") {
            Ok(ChangeType::Update)
        } else if s.eq_ignore_ascii_case("DELETE") {
            Ok(ChangeType::Delete)
        } else {
            Err(format!("unknown change type '{}'", s))
        }
    }
}
