//! # API Server
//!
//! Reference request-serving transport for the daemon. It is started by the
//! `serveapi` job, which runs for the whole life of the process, and is told
//! the daemon is ready by the `acceptconnections` job.
//!
//! ```text
//! serveapi tcp://127.0.0.1:2375      acceptconnections
//!        │                                  │
//!        ▼                                  ▼
//!   bind listeners ──► wait on gate ◄── open gate ──► sd_notify READY=1
//!                           │
//!                           ▼
//!                  axum serve until engine shutdown
//! ```
//!
//! Only `tcp://` listeners are served. `unix://`, `fd://` and TLS settings
//! are parsed and validated but rejected when serving starts.

pub mod config;
pub mod cors;
pub mod error;
pub mod gate;
pub mod notify;
pub mod router;
pub mod service;

pub use config::{ListenAddr, Proto, ServeApiConfig, TlsSettings};
pub use error::TransportError;
pub use gate::ReadinessGate;
pub use router::build_router;
pub use service::{serve, ApiService, LISTENERS_KEY};
