//! `auth` and `search` jobs against an in-memory index.

use std::sync::Arc;

use async_trait::async_trait;
use index_client::{
    AuthConfig, IndexClient, IndexError, RegistryService, SearchResult, SearchResults,
};
use job_engine::{Engine, Env, Install, Status};
use parking_lot::Mutex;

#[derive(Default)]
struct FakeIndex {
    searches: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl IndexClient for FakeIndex {
    async fn login(&self, auth: &AuthConfig) -> Result<String, IndexError> {
        if auth.password == "hunter2" {
            Ok("Login Succeeded".into())
        } else {
            Err(IndexError::Unauthorized)
        }
    }

    async fn search(&self, term: &str, auth: &AuthConfig) -> Result<SearchResults, IndexError> {
        self.searches
            .lock()
            .push((term.to_string(), auth.username.clone()));
        Ok(SearchResults {
            query: term.to_string(),
            num_results: 2,
            results: vec![
                SearchResult {
                    name: term.to_string(),
                    description: "official image".into(),
                    star_count: 120,
                    is_official: true,
                    is_automated: false,
                },
                SearchResult {
                    name: format!("someone/{term}"),
                    description: String::new(),
                    star_count: 3,
                    is_official: false,
                    is_automated: true,
                },
            ],
        })
    }
}

fn setup() -> (Engine, Arc<FakeIndex>) {
    let engine = Engine::new();
    let index = Arc::new(FakeIndex::default());
    RegistryService::new(index.clone()).install(&engine).unwrap();
    (engine, index)
}

fn auth_env(username: &str, password: &str) -> Env {
    let mut env = Env::new();
    env.set_json(
        "authConfig",
        &AuthConfig {
            username: username.into(),
            password: password.into(),
            ..AuthConfig::default()
        },
    )
    .unwrap();
    env
}

#[tokio::test]
async fn test_auth_success_reports_status() {
    let (engine, _) = setup();
    let outcome = engine
        .run("auth", Vec::<String>::new(), auth_env("ann", "hunter2"))
        .await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.stdout_str(), "Login Succeeded\n");
    assert_eq!(outcome.env.get("Status").as_deref(), Some("Login Succeeded"));
}

#[tokio::test]
async fn test_auth_failure_is_handler_error() {
    let (engine, _) = setup();
    let outcome = engine
        .run("auth", Vec::<String>::new(), auth_env("ann", "wrong"))
        .await;

    assert_eq!(outcome.status, Status::Error);
    assert!(outcome.stderr_str().contains("Wrong login/password"));
}

#[tokio::test]
async fn test_auth_requires_username() {
    let (engine, _) = setup();
    let outcome = engine.job("auth").run().await;
    assert_eq!(outcome.status, Status::Error);
    assert_eq!(outcome.stderr_str(), "username is required\n");
}

#[tokio::test]
async fn test_search_writes_one_line_per_result() {
    let (engine, index) = setup();
    let outcome = engine.run("search", ["redis"], Env::new()).await;

    assert!(outcome.is_ok());
    let lines: Vec<SearchResult> = outcome
        .stdout_str()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].is_official);
    assert_eq!(lines[1].name, "someone/redis");
    assert_eq!(
        index.searches.lock().as_slice(),
        &[("redis".to_string(), String::new())]
    );
}

#[tokio::test]
async fn test_search_usage() {
    let (engine, _) = setup();
    let outcome = engine.job("search").run().await;
    assert_eq!(outcome.status, Status::Error);
    assert_eq!(outcome.stderr_str(), "usage: search TERM\n");
}
