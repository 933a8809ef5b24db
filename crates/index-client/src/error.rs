//! Index client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Wrong login/password, please try again")]
    Unauthorized,

    #[error("Login: Account is not Active. Please check your e-mail for a confirmation link.")]
    Inactive,

    #[error("index returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid index address {0:?}")]
    InvalidAddress(String),

    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),
}
