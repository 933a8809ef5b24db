//! CORS for the remote API.
//!
//! Browser-based clients need cross-origin access only when the operator
//! asks for it with `EnableCors`.

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Layer answering preflights for any origin, as enabled by `EnableCors`.
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}
