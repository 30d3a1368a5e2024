//! Retrieval service configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Hybrid retrieval endpoint. Without a URL no documents are retrieved.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RetrievalConfig {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = self.url() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidUrl("retrieval.url"));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("retrieval.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_url_is_valid() {
        let config = RetrievalConfig::default();
        assert!(config.url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_http_url_rejected() {
        let config = RetrievalConfig {
            url: Some("ftp://rag.local".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
