//! HTTP surface of the remote API.
//!
//! Every route is a thin translation onto an engine job: request parameters
//! become job args and env, job stdout becomes the response body, and the
//! job status picks the HTTP status.

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use job_engine::{Engine, Env, JobOutcome, Status};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServeApiConfig;
use crate::cors::create_cors_layer;
use crate::gate::ReadinessGate;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
struct AppState {
    engine: Engine,
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    since: Option<i64>,
    until: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainersQuery {
    #[serde(default)]
    all: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    term: String,
}

/// Build the router for one `serveapi` invocation.
///
/// When requests are not buffered, the router itself answers 503 until the
/// readiness gate opens.
pub fn build_router(engine: Engine, config: &ServeApiConfig, gate: ReadinessGate) -> Router {
    let mut router = Router::new()
        .route("/_ping", get(ping))
        .route("/version", get(version))
        .route("/info", get(info))
        .route("/events", get(events))
        .route("/commands", get(commands))
        .route("/containers/json", get(containers))
        .route("/auth", post(auth))
        .route("/images/search", get(search))
        .with_state(AppState { engine });

    if !config.buffer_requests {
        router = router.layer(middleware::from_fn_with_state(gate, reject_until_ready));
    }

    if let Some(version) = &config.version {
        match HeaderValue::from_str(&format!("Dockyard/{version}")) {
            Ok(value) => {
                router = router.layer(middleware::map_response_with_state(
                    value,
                    set_server_header,
                ));
            }
            Err(e) => warn!(version = %version, error = %e, "Version is not a valid header value"),
        }
    }

    if config.enable_cors {
        router = router.layer(create_cors_layer());
    }

    if config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

async fn reject_until_ready(
    State(gate): State<ReadinessGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.is_open() {
        next.run(request).await
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "daemon is still initializing\n",
        )
            .into_response()
    }
}

async fn set_server_header(State(value): State<HeaderValue>, mut response: Response) -> Response {
    response.headers_mut().insert(header::SERVER, value);
    response
}

async fn ping() -> &'static str {
    "OK"
}

async fn version(State(state): State<AppState>) -> Response {
    let outcome = state.engine.run("version", Vec::<String>::new(), Env::new()).await;
    respond(outcome, JSON)
}

async fn info(State(state): State<AppState>) -> Response {
    let outcome = state.engine.run("info", Vec::<String>::new(), Env::new()).await;
    respond(outcome, JSON)
}

async fn events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Response {
    let mut env = Env::new();
    if let Some(since) = query.since {
        env.set_int("since", since);
    }
    if let Some(until) = query.until {
        env.set_int("until", until);
    }
    let outcome = state.engine.run("events", Vec::<String>::new(), env).await;
    respond(outcome, JSON)
}

async fn commands(State(state): State<AppState>) -> Response {
    let outcome = state.engine.run("commands", Vec::<String>::new(), Env::new()).await;
    respond(outcome, TEXT)
}

async fn containers(
    State(state): State<AppState>,
    Query(query): Query<ContainersQuery>,
) -> Response {
    let mut env = Env::new();
    if let Some(all) = query.all {
        env.set("all", all);
    }
    let outcome = state.engine.run("containers", Vec::<String>::new(), env).await;
    respond(outcome, JSON)
}

async fn auth(State(state): State<AppState>, Json(auth_config): Json<Value>) -> Response {
    let mut env = Env::new();
    if let Err(e) = env.set_json("authConfig", &auth_config) {
        return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response();
    }
    let outcome = state.engine.run("auth", Vec::<String>::new(), env).await;
    if !outcome.is_ok() {
        return respond(outcome, JSON);
    }
    let status = outcome.env.get("Status").unwrap_or_default();
    Json(serde_json::json!({ "Status": status })).into_response()
}

async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let outcome = state.engine.run("search", [query.term], Env::new()).await;
    respond(outcome, JSON)
}

fn respond(outcome: JobOutcome, content_type: &'static str) -> Response {
    match outcome.status {
        Status::Ok => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            outcome.stdout,
        )
            .into_response(),
        Status::NotFound => (
            StatusCode::NOT_FOUND,
            format!("{}: {}\n", outcome.name, outcome.failure_message()),
        )
            .into_response(),
        Status::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n", outcome.failure_message()),
        )
            .into_response(),
    }
}
