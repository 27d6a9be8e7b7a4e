//! HTTP client for the remote mount API
//!
//! Requires the `http` feature.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    ApiResponse, ApiResult, FileListing, MountListing, OrbitApi, OrgListing, SyncPayload,
    TransportError,
};
use crate::error::{Result, SyncError};

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitClientConfig {
    /// API base URL, e.g. `https://orbit.example.com/api/v1`
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout() -> u64 {
    10_000
}

impl OrbitClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Remote mount API over HTTP
pub struct OrbitClient {
    client: reqwest::Client,
    base: reqwest::Url,
    config: OrbitClientConfig,
}

impl OrbitClient {
    pub fn new(config: OrbitClientConfig) -> Result<Self> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "Base URL must start with http:// or https://: {}",
                config.base_url
            )));
        }
        let base = reqwest::Url::parse(&config.base_url).map_err(|e| {
            SyncError::Config(format!("Invalid base URL {}: {}", config.base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "Base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        self.authorize(request)
            .send()
            .await
            .map_err(classify_send_error)
    }

    /// Send a request and decode a 2xx body; other statuses get `T::default()`
    async fn execute<T>(&self, request: reqwest::RequestBuilder) -> ApiResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let response = self.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Remote API answered {}: {}", status, body);
            return Ok(ApiResponse::new(status.as_u16(), T::default()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::ChunkedEncoding(e.to_string()))?;

        decode_body(status.as_u16(), &bytes)
    }
}

fn classify_send_error(e: reqwest::Error) -> TransportError {
    if e.is_body() || e.is_decode() {
        TransportError::ChunkedEncoding(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}

fn decode_body<T: DeserializeOwned + Default>(status: u16, bytes: &[u8]) -> ApiResult<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApiResponse::new(status, T::default()));
    }
    serde_json::from_slice(bytes)
        .map(|body| ApiResponse::new(status, body))
        .map_err(|e| TransportError::Decode(e.to_string()))
}

/// Body of a sync acknowledgement
///
/// The status alone decides whether a submission was accepted. JSON bodies
/// are kept as-is, anything else is kept as text.
fn decode_acknowledgement(bytes: &[u8]) -> serde_json::Value {
    if let Ok(body) = serde_json::from_slice(bytes) {
        return body;
    }
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(text)
    }
}

#[async_trait]
impl OrbitApi for OrbitClient {
    async fn list_orgs(&self) -> ApiResult<OrgListing> {
        self.execute(self.client.get(self.endpoint(&["orgs"])))
            .await
    }

    async fn list_mounts(&self, group_id: &str) -> ApiResult<MountListing> {
        let url = self.endpoint(&["orgs", group_id, "mounts"]);
        self.execute(self.client.get(url)).await
    }

    async fn list_remote_files(
        &self,
        group_id: &str,
        mount_id: &str,
        path: &str,
    ) -> ApiResult<FileListing> {
        let url = self.endpoint(&["orgs", group_id, "mounts", mount_id, "files"]);
        self.execute(self.client.get(url).query(&[("path", path)]))
            .await
    }

    async fn submit_sync_transaction(
        &self,
        group_id: &str,
        mount_id: &str,
        payload: &SyncPayload,
    ) -> ApiResult<serde_json::Value> {
        let url = self.endpoint(&["orgs", group_id, "mounts", mount_id, "sync"]);
        let response = self.send(self.client.post(url).json(payload)).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Sync request answered {}: {}", status, body);
            return Ok(ApiResponse::new(status.as_u16(), serde_json::Value::Null));
        }

        let body = match response.bytes().await {
            Ok(bytes) => decode_acknowledgement(&bytes),
            Err(e) => {
                tracing::warn!("Sync request accepted ({}) but body unreadable: {}", status, e);
                serde_json::Value::Null
            }
        };
        Ok(ApiResponse::new(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = OrbitClient::new(OrbitClientConfig::new("ftp://example.com"));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_url_joining() {
        let client = OrbitClient::new(OrbitClientConfig::new("https://orbit.example.com/api/"))
            .unwrap();
        assert_eq!(
            client.endpoint(&["orgs", "1", "mounts"]).as_str(),
            "https://orbit.example.com/api/orgs/1/mounts"
        );

        let bare = OrbitClient::new(OrbitClientConfig::new("https://orbit.example.com/api"))
            .unwrap();
        assert_eq!(
            bare.endpoint(&["orgs"]).as_str(),
            "https://orbit.example.com/api/orgs"
        );
    }

    #[test]
    fn test_ids_are_escaped_in_paths() {
        let client = OrbitClient::new(OrbitClientConfig::new("https://orbit.example.com/api"))
            .unwrap();
        let url = client.endpoint(&["orgs", "a/b?c#d", "mounts", "m 1", "files"]);
        assert_eq!(
            url.as_str(),
            "https://orbit.example.com/api/orgs/a%2Fb%3Fc%23d/mounts/m%201/files"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_decode_listing_body() {
        let response: ApiResponse<FileListing> =
            decode_body(200, br#"{"files": [{"name": "a.txt", "type": "FILE"}]}"#).unwrap();
        assert_eq!(response.body.files.unwrap().len(), 1);

        let response: ApiResponse<FileListing> = decode_body(200, b"  ").unwrap();
        assert!(response.body.files.is_none());

        let result: ApiResult<FileListing> = decode_body(200, b"{\"files\": [");
        assert!(matches!(result, Err(TransportError::Decode(_))));
    }

    #[test]
    fn test_decode_acknowledgement_never_fails() {
        assert_eq!(
            decode_acknowledgement(b"Accepted"),
            serde_json::Value::String("Accepted".into())
        );
        assert_eq!(
            decode_acknowledgement(br#"{"transactionId": "t1"}"#)["transactionId"],
            "t1"
        );
        assert_eq!(decode_acknowledgement(b""), serde_json::Value::Null);
        assert_eq!(decode_acknowledgement(b" \n"), serde_json::Value::Null);
        assert_eq!(
            decode_acknowledgement(b"{\"partial"),
            serde_json::Value::String("{\"partial".into())
        );
    }
}
