use serde::{Deserialize, Serialize};

use crate::realtime::ListenEvent;

/// Per-subscription options for a collection view.
///
/// # Example
///
/// ```rust
/// use stallplass_link::{ListenEvent, SubscriptionOptions};
///
/// let options = SubscriptionOptions::new()
///     .with_filter("stable_id=eq.s1")
///     .with_events(ListenEvent::All);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Optional `column=operator.value` filter scoping both the snapshot
    /// query and the live channel
    #[serde(default)]
    pub filter: Option<String>,

    /// Which change kinds to listen for
    #[serde(default)]
    pub events: ListenEvent,
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_events(mut self, events: ListenEvent) -> Self {
        self.events = events;
        self
    }
}
