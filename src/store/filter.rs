use crate::event::EventType;
use chrono::{DateTime, Utc};

/// Filter applied by [`super::EventStore::query`]. All fields are
/// conjunctive; an unset field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub event_types: Vec<EventType>,
    pub address_substring: Option<String>,
    pub domain_substring: Option<String>,
    pub interface: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl QueryFilter {
    pub fn new() -> Self {
        QueryFilter {
            limit: 50,
            ..Default::default()
        }
    }

    /// Caller-facing limit is capped at 100 regardless of what was requested,
    /// matching the bound the read-only API imposes on itself.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, 100)
    }
}
