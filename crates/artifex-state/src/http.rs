//! HTTP object-store client
//!
//! Talks to an object gateway exposing:
//! - `PUT/GET/DELETE {base}/objects/{key}`
//! - `POST {base}/presign` with `{"key", "ttlSeconds"}` returning `{"url"}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::{ObjectMetadata, ObjectStore};

/// Header prefix carrying object attributes.
const ATTRIBUTE_HEADER_PREFIX: &str = "x-artifex-meta-";

/// Object gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpObjectStoreConfig {
    /// Gateway base URL, without trailing slash
    pub base_url: String,
    /// Bearer token (optional for unauthenticated gateways)
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpObjectStoreConfig {
    fn default() -> Self {
        HttpObjectStoreConfig {
            base_url: std::env::var("ARTIFEX_OBJECT_STORE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            token: std::env::var("ARTIFEX_OBJECT_STORE_TOKEN").ok(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpObjectStoreConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        HttpObjectStoreConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    key: &'a str,
    ttl_seconds: u64,
}

#[derive(Deserialize)]
struct PresignResponse {
    url: String,
}

/// Object store reached over HTTP.
pub struct HttpObjectStore {
    config: HttpObjectStoreConfig,
    http_client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(config: HttpObjectStoreConfig) -> StorageResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("artifex-state/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(HttpObjectStore {
            config,
            http_client,
        })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(HttpObjectStoreConfig::from_env())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.config.base_url, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn status_error(key: &str, status: StatusCode) -> StorageError {
    if status == StatusCode::NOT_FOUND {
        StorageError::NotFound {
            key: key.to_string(),
        }
    } else {
        StorageError::Backend(format!("{key}: gateway returned {status}"))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], metadata: &ObjectMetadata) -> StorageResult<()> {
        let mut request = self
            .http_client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, &metadata.content_type)
            .body(bytes.to_vec());
        for (name, value) in &metadata.attributes {
            request = request.header(format!("{ATTRIBUTE_HEADER_PREFIX}{name}"), value);
        }
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }
        debug!(key = %key, bytes = bytes.len(), "object uploaded");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .authorize(self.http_client.get(self.object_url(key)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let url = format!("{}/presign", self.config.base_url);
        let body = PresignRequest {
            key,
            ttl_seconds: ttl.as_secs(),
        };
        let response = self
            .authorize(self.http_client.post(url).json(&body))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }
        let presigned: PresignResponse = response.json().await?;
        Ok(presigned.url)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let response = self
            .authorize(self.http_client.delete(self.object_url(key)))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(status_error(key, s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_trims_slash() {
        let config = HttpObjectStoreConfig::new("http://gateway:9000/");
        assert_eq!(config.base_url, "http://gateway:9000");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_with_token() {
        let config = HttpObjectStoreConfig::new("http://gateway").with_token("secret");
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_object_url() {
        let store = HttpObjectStore::new(HttpObjectStoreConfig::new("http://gw")).unwrap();
        assert_eq!(store.object_url("a/b.js"), "http://gw/objects/a/b.js");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_backend_error() {
        let config = HttpObjectStoreConfig::new("http://127.0.0.1:9")
            .with_timeout(Duration::from_millis(500));
        let store = HttpObjectStore::new(config).unwrap();
        let err = store.get("missing.js").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
