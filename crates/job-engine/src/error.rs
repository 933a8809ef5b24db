//! Error types for the job engine.
//!
//! Registration conflicts are `Err` values that abort startup. Invocation
//! failures travel as data inside a [`JobOutcome`](crate::JobOutcome) and
//! only become an [`EngineError`] when a caller asks for it.

use thiserror::Error;

use crate::status::Status;

/// Errors raised by the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A handler is already bound to this name.
    #[error("can't overwrite handler for job {name:?}")]
    DuplicateName { name: String },

    /// A job completed with a non-OK status.
    #[error("{name}: {message}")]
    JobFailed {
        name: String,
        status: Status,
        message: String,
    },

    /// The engine no longer accepts work.
    #[error("engine is shutdown")]
    Shutdown,
}

/// Errors raised by typed [`Env`](crate::Env) accessors.
///
/// Each variant is distinct from "key absent", which accessors report as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("value of {key:?} is not a boolean: {value:?}")]
    InvalidBool { key: String, value: String },

    #[error("value of {key:?} is not an integer: {value:?}")]
    InvalidInt { key: String, value: String },

    #[error("value of {key:?} does not decode into the requested type: {source}")]
    InvalidJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for {key:?} cannot be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment stream must hold a JSON object")]
    NotAnObject,

    #[error("malformed environment stream: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
