//! # Index Client
//!
//! Talks to a public image index on behalf of the daemon and exposes that
//! through two jobs:
//!
//! - `auth`: env `authConfig` (JSON) → validates the credentials, prints the
//!   index status line and sets env `Status`.
//! - `search`: arg `TERM`, optional env `authConfig` → writes one JSON
//!   object per result.
//!
//! The HTTP transport sits behind the [`IndexClient`] port so the jobs can
//! be exercised without a network.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod error;
pub mod service;
pub mod types;

pub use client::{HttpIndexClient, IndexClient, DEFAULT_INDEX_SERVER};
pub use error::IndexError;
pub use service::RegistryService;
pub use types::{AuthConfig, SearchResult, SearchResults};
