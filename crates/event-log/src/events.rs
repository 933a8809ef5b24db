//! Event records and replay filters.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One recorded daemon event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// What happened (`create`, `start`, `die`, `pull`, ...).
    pub status: String,
    /// Object the event refers to.
    pub id: String,
    /// Origin, usually the image name.
    pub from: String,
    /// Unix seconds.
    pub time: i64,
}

impl Event {
    /// Stamp a new event with the current time.
    pub fn now(
        status: impl Into<String>,
        id: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            id: id.into(),
            from: from.into(),
            time: Utc::now().timestamp(),
        }
    }
}

/// Inclusive time window for replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.since.map_or(true, |s| event.time >= s) && self.until.map_or(true, |u| event.time <= u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(time: i64) -> Event {
        Event {
            status: "create".into(),
            id: "c1".into(),
            from: "busybox".into(),
            time,
        }
    }

    #[test]
    fn test_filter_window_is_inclusive() {
        let filter = EventFilter {
            since: Some(10),
            until: Some(20),
        };
        assert!(!filter.matches(&at(9)));
        assert!(filter.matches(&at(10)));
        assert!(filter.matches(&at(20)));
        assert!(!filter.matches(&at(21)));
        assert!(EventFilter::all().matches(&at(0)));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(at(42)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "create", "id": "c1", "from": "busybox", "time": 42})
        );
    }
}
