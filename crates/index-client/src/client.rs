//! Index access port and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::IndexError;
use crate::types::{AuthConfig, SearchResults};

/// Index used when `serveraddress` is empty.
pub const DEFAULT_INDEX_SERVER: &str = "https://index.docker.io/v1/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the registry jobs need from an index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Verify credentials. Returns the status line to show the user.
    async fn login(&self, auth: &AuthConfig) -> Result<String, IndexError>;

    async fn search(&self, term: &str, auth: &AuthConfig) -> Result<SearchResults, IndexError>;
}

/// [`IndexClient`] speaking the v1 index HTTP API.
pub struct HttpIndexClient {
    http: reqwest::Client,
    default_index: String,
}

impl HttpIndexClient {
    pub fn new(default_index: impl Into<String>) -> Result<Self, IndexError> {
        let default_index = default_index.into();
        if !default_index.starts_with("http://") && !default_index.starts_with("https://") {
            return Err(IndexError::InvalidAddress(default_index));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("dockyard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            default_index,
        })
    }

    /// `path` under the index named by `auth`, or the default index.
    fn endpoint(&self, auth: &AuthConfig, path: &str) -> String {
        let base = if auth.server_address.is_empty() {
            &self.default_index
        } else {
            &auth.server_address
        };
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn login(&self, auth: &AuthConfig) -> Result<String, IndexError> {
        let url = self.endpoint(auth, "users/");
        debug!(url = %url, user = %auth.username, "Checking index credentials");

        let resp = self
            .http
            .get(&url)
            .basic_auth(&auth.username, Some(&auth.password))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                info!(user = %auth.username, "Index login succeeded");
                Ok("Login Succeeded".to_string())
            }
            StatusCode::UNAUTHORIZED => Err(IndexError::Unauthorized),
            StatusCode::FORBIDDEN => Err(IndexError::Inactive),
            status => Err(IndexError::UnexpectedStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn search(&self, term: &str, auth: &AuthConfig) -> Result<SearchResults, IndexError> {
        let url = self.endpoint(auth, "search");
        debug!(url = %url, term, "Searching index");

        let mut req = self.http.get(&url).query(&[("q", term)]);
        if !auth.is_anonymous() {
            req = req.basic_auth(&auth.username, Some(&auth.password));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IndexError::UnexpectedStatus {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json::<SearchResults>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_prefers_auth_server() {
        let client = HttpIndexClient::new(DEFAULT_INDEX_SERVER).unwrap();

        let anonymous = AuthConfig::default();
        assert_eq!(
            client.endpoint(&anonymous, "search"),
            "https://index.docker.io/v1/search"
        );

        let private = AuthConfig {
            server_address: "https://registry.example.com/v1".into(),
            ..AuthConfig::default()
        };
        assert_eq!(
            client.endpoint(&private, "users/"),
            "https://registry.example.com/v1/users/"
        );
    }

    #[test]
    fn test_rejects_non_http_index() {
        assert!(matches!(
            HttpIndexClient::new("index.docker.io"),
            Err(IndexError::InvalidAddress(_))
        ));
    }
}
