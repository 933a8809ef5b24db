//! # Event Log
//!
//! Records daemon events (container created, image pulled, ...) and exposes
//! them to the rest of the process through three jobs:
//!
//! | Job | Input | Effect |
//! |-----|-------|--------|
//! | `log` | args `ACTION ID FROM` | records one event |
//! | `events` | env `since`, `until` | writes matching history, one JSON object per line |
//! | `subscribers_count` | none | env `count` = live subscribers |
//!
//! ```text
//! log ──▶ ┌──────────────┐ ──▶ history (last 64)  ──▶ events
//!         │   EventLog   │
//!         └──────────────┘ ──▶ broadcast          ──▶ subscribe()
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod events;
pub mod jobs;
pub mod log;

pub use events::{Event, EventFilter};
pub use jobs::EventsService;
pub use log::{EventLog, Subscription};

/// Events kept for replay.
pub const HISTORY_LIMIT: usize = 64;

/// Broadcast buffer per live subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
