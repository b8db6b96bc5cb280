//! Search index mirror.
//!
//! Projects user/product/order documents into the external full-text search
//! provider, one logical index per entity kind. The mirrored body is the
//! full denormalized document, sent verbatim - the provider owns nothing
//! canonical and can always be rebuilt from the primary store.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use thiserror::Error;

use crate::config::SearchConfig;

/// Logical index names, one per mirrored collection.
pub mod indexes {
    pub const USERS: &str = "users";
    pub const PRODUCTS: &str = "products";
    pub const ORDERS: &str = "orders";
}

/// Errors that can occur when talking to the search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to construct the client.
    #[error("Client error: {0}")]
    Client(String),
}

/// Write access to the external search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create or replace one object in an index.
    async fn upsert(&self, index: &str, object_id: &str, body: &Value) -> Result<(), SearchError>;

    /// Remove one object from an index. Removing an absent object is fine.
    async fn remove(&self, index: &str, object_id: &str) -> Result<(), SearchError>;
}

/// REST client for the search provider.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchClient {
    /// Create a new search provider client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Application-Id",
            HeaderValue::from_str(&config.app_id)
                .map_err(|e| SearchError::Client(format!("invalid app id: {e}")))?,
        );
        headers.insert(
            "X-API-Key",
            HeaderValue::from_str(config.admin_api_key.expose_secret())
                .map_err(|e| SearchError::Client(format!("invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
        })
    }

    fn object_url(&self, index: &str, object_id: &str) -> String {
        format!("{}/1/indexes/{index}/{object_id}", self.endpoint)
    }
}

#[async_trait]
impl SearchIndex for SearchClient {
    async fn upsert(&self, index: &str, object_id: &str, body: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .put(self.object_url(index, object_id))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    async fn remove(&self, index: &str, object_id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.object_url(index, object_id))
            .send()
            .await?;

        let status = response.status();
        // The provider answers 404 for objects it never saw; removal of an
        // already-absent mirror entry is not a failure.
        if !status.is_success() && status.as_u16() != 404 {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
