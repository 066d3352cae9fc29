//! Galaxy Tool Shed Client
//!
//! A small HTTP client for the tool shed endpoints the repository update
//! loop polls. Each call is a plain GET with query parameters; responses
//! are either JSON or plain text.
//!
//! # Example
//!
//! ```no_run
//! use galaxy_core::domain::toolshed::RepositoryRef;
//! use galaxy_toolshed::ToolShedClient;
//!
//! #[tokio::main]
//! async fn main() -> galaxy_toolshed::Result<()> {
//!     let client = ToolShedClient::new("https://toolshed.g2.bx.psu.edu");
//!     let repo = RepositoryRef {
//!         name: "bwa".to_string(),
//!         owner: "devteam".to_string(),
//!         changeset_revision: "abc123".to_string(),
//!     };
//!
//!     let status = client.status_for_installed_repository(&repo).await?;
//!     println!("update available: {}", status.has_update());
//!     Ok(())
//! }
//! ```

pub mod error;
mod repositories;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for a single tool shed
#[derive(Debug, Clone)]
pub struct ToolShedClient {
    /// Base URL of the tool shed (e.g., "https://toolshed.g2.bx.psu.edu")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ToolShedClient {
    /// Create a new tool shed client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new tool shed client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Get the base URL of the tool shed
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(self.base_url.clone()));
        }
        Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let text = self.handle_text_response(response).await?;

        serde_json::from_str(&text)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code and return the body as text
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response.text().await?)
    }
}
