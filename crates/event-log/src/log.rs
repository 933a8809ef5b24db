//! # Event Log
//!
//! Bounded replay history plus `tokio::sync::broadcast` fan-out for live
//! subscribers.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::events::{Event, EventFilter};
use crate::{DEFAULT_CHANNEL_CAPACITY, HISTORY_LIMIT};

pub struct EventLog {
    history: Mutex<VecDeque<Event>>,
    sender: broadcast::Sender<Event>,
    limit: usize,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    /// Keep at most `limit` events for replay. Zero keeps none; live
    /// subscribers still receive every event.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            history: Mutex::new(VecDeque::with_capacity(limit)),
            sender,
            limit,
        }
    }

    /// Record an event. Returns how many live subscribers received it.
    pub fn record(&self, event: Event) -> usize {
        {
            let mut history = self.history.lock();
            if self.limit > 0 {
                while history.len() >= self.limit {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
        }

        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(receivers, "Event recorded");
        receivers
    }

    /// Recorded events inside `filter`, oldest first.
    #[must_use]
    pub fn replay(&self, filter: EventFilter) -> Vec<Event> {
        self.history
            .lock()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Live event stream. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once the log is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, time: i64) -> Event {
        Event {
            status: "start".into(),
            id: id.into(),
            from: "busybox".into(),
            time,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let log = EventLog::with_limit(3);
        for i in 0..5 {
            log.record(event(&format!("c{i}"), i));
        }

        let ids: Vec<_> = log.replay(EventFilter::all()).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c2", "c3", "c4"]);
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_no_history() {
        let log = EventLog::with_limit(0);
        let mut sub = log.subscribe();
        for i in 0..10 {
            log.record(event(&format!("c{i}"), i));
        }

        assert_eq!(log.len(), 0);
        assert!(log.replay(EventFilter::all()).is_empty());
        assert_eq!(sub.recv().await.map(|e| e.id), Some("c0".to_string()));
    }

    #[test]
    fn test_replay_applies_filter() {
        let log = EventLog::new();
        log.record(event("old", 100));
        log.record(event("new", 200));

        let recent = log.replay(EventFilter {
            since: Some(150),
            until: None,
        });
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }

    #[tokio::test]
    async fn test_subscriber_receives_live_events() {
        let log = EventLog::new();
        let mut sub = log.subscribe();
        assert_eq!(log.subscriber_count(), 1);

        assert_eq!(log.record(event("c1", 1)), 1);
        assert_eq!(sub.recv().await.unwrap().id, "c1");

        drop(sub);
        assert_eq!(log.subscriber_count(), 0);
        assert_eq!(log.record(event("c2", 2)), 0);
    }
}
