//! Registry service: installs the `auth` and `search` jobs.

use std::sync::Arc;

use async_trait::async_trait;
use job_engine::{Engine, EngineResult, Handler, Install, Job, Status};
use tracing::warn;

use crate::client::IndexClient;
use crate::types::AuthConfig;

/// Env key carrying JSON-encoded [`AuthConfig`].
pub const AUTH_CONFIG_KEY: &str = "authConfig";

#[derive(Clone)]
pub struct RegistryService {
    client: Arc<dyn IndexClient>,
}

impl RegistryService {
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self { client }
    }
}

impl Install for RegistryService {
    fn install(&self, engine: &Engine) -> EngineResult<()> {
        engine.register(
            "auth",
            AuthJob {
                client: Arc::clone(&self.client),
            },
        )?;
        engine.register(
            "search",
            SearchJob {
                client: Arc::clone(&self.client),
            },
        )
    }
}

fn auth_config(job: &Job) -> Result<AuthConfig, job_engine::EnvError> {
    Ok(job.getenv_json(AUTH_CONFIG_KEY)?.unwrap_or_default())
}

struct AuthJob {
    client: Arc<dyn IndexClient>,
}

#[async_trait]
impl Handler for AuthJob {
    async fn handle(&self, job: &mut Job) -> Status {
        let auth = match auth_config(job) {
            Ok(auth) => auth,
            Err(e) => return job.error(e),
        };
        if auth.is_anonymous() {
            return job.error("username is required");
        }

        match self.client.login(&auth).await {
            Ok(status) => {
                job.stdout.write_line(&status);
                job.setenv("Status", status);
                Status::Ok
            }
            Err(e) => {
                warn!(user = %auth.username, error = %e, "Index login failed");
                job.error(e)
            }
        }
    }
}

struct SearchJob {
    client: Arc<dyn IndexClient>,
}

#[async_trait]
impl Handler for SearchJob {
    async fn handle(&self, job: &mut Job) -> Status {
        let [term] = job.args() else {
            return job.usage("TERM");
        };
        let term = term.clone();
        let auth = match auth_config(job) {
            Ok(auth) => auth,
            Err(e) => return job.error(e),
        };

        let results = match self.client.search(&term, &auth).await {
            Ok(results) => results,
            Err(e) => return job.error(e),
        };

        for result in &results.results {
            match serde_json::to_string(result) {
                Ok(line) => job.stdout.write_line(&line),
                Err(e) => return job.error(e),
            }
        }
        Status::Ok
    }
}
