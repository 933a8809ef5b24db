//! Wire types shared with the index.

use serde::{Deserialize, Serialize};

/// Credentials passed in a job's `authConfig` env entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "serveraddress")]
    pub server_address: String,
}

impl AuthConfig {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub star_count: u32,
    #[serde(default)]
    pub is_official: bool,
    #[serde(default, alias = "is_trusted")]
    pub is_automated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub num_results: u32,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_wire_names() {
        let auth: AuthConfig =
            serde_json::from_str(r#"{"username":"ann","serveraddress":"https://idx.example/v1/"}"#)
                .unwrap();
        assert_eq!(auth.username, "ann");
        assert_eq!(auth.server_address, "https://idx.example/v1/");
        assert!(auth.password.is_empty());
        assert!(!auth.is_anonymous());
    }

    #[test]
    fn test_search_results_accept_legacy_trusted_flag() {
        let results: SearchResults = serde_json::from_str(
            r#"{"query":"redis","num_results":1,
                "results":[{"name":"redis","star_count":9,"is_official":true,"is_trusted":true}]}"#,
        )
        .unwrap();
        assert_eq!(results.results[0].star_count, 9);
        assert!(results.results[0].is_automated);
        assert!(results.results[0].description.is_empty());
    }
}
