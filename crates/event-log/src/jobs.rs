//! Job handlers for the event subsystem.

use std::sync::Arc;

use job_engine::{Engine, EngineResult, Install, Job, Status};
use tracing::warn;

use crate::events::{Event, EventFilter};
use crate::log::EventLog;

/// Installs `log`, `events` and `subscribers_count` over one [`EventLog`].
#[derive(Clone, Default)]
pub struct EventsService {
    log: Arc<EventLog>,
}

impl EventsService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    #[must_use]
    pub fn event_log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }
}

impl Install for EventsService {
    fn install(&self, engine: &Engine) -> EngineResult<()> {
        let log = Arc::clone(&self.log);
        engine.register_fn("log", move |job| record(&log, job))?;

        let log = Arc::clone(&self.log);
        engine.register_fn("events", move |job| replay(&log, job))?;

        let log = Arc::clone(&self.log);
        engine.register_fn("subscribers_count", move |job| {
            job.setenv_int("count", log.subscriber_count() as i64);
            Status::Ok
        })
    }
}

fn record(log: &EventLog, job: &mut Job) -> Status {
    let [action, id, from] = job.args() else {
        return job.usage("ACTION ID FROM");
    };
    log.record(Event::now(action.clone(), id.clone(), from.clone()));
    Status::Ok
}

fn replay(log: &EventLog, job: &mut Job) -> Status {
    let filter = match (job.getenv_int("since"), job.getenv_int("until")) {
        (Ok(since), Ok(until)) => EventFilter {
            since: since.filter(|s| *s > 0),
            until: until.filter(|u| *u > 0),
        },
        (Err(e), _) | (_, Err(e)) => return job.error(e),
    };

    for event in log.replay(filter) {
        match serde_json::to_string(&event) {
            Ok(line) => job.stdout.write_line(&line),
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                return job.error(e);
            }
        }
    }
    Status::Ok
}
