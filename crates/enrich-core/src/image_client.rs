//! External image-service HTTP interface (§3, §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Request body sent to the external image service.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub id: String,
    pub time_sec: i64,
    pub fraction: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ImageRequest {
    pub fn new(id: impl Into<String>, time_sec: i64, fraction: i64) -> Self {
        ImageRequest {
            id: id.into(),
            time_sec,
            fraction,
            width: None,
            height: None,
            url: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub image: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("timed out")]
    Timeout,
    #[error("API error: status {0}")]
    ApiStatus(u16),
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

/// The HTTP client contract the fetcher pool depends on. Kept abstract so
/// tests can substitute a fake without spinning up a real HTTP server.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn fetch(&self, request: ImageRequest) -> Result<ImageResponse, FetchError>;
}

/// Endpoint the image client sends requests to, constructed from the
/// configured `host,port,path` triple (§4.3).
#[derive(Debug, Clone)]
pub struct ImageServiceEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ImageServiceEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// `reqwest`-backed implementation used in production.
pub struct ReqwestImageClient {
    client: reqwest::Client,
    endpoint: ImageServiceEndpoint,
}

impl ReqwestImageClient {
    pub fn new(endpoint: ImageServiceEndpoint, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(ReqwestImageClient { client, endpoint })
    }
}

#[async_trait]
impl ImageClient for ReqwestImageClient {
    async fn fetch(&self, request: ImageRequest) -> Result<ImageResponse, FetchError> {
        let resp = self
            .client
            .post(self.endpoint.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Request(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::ApiStatus(resp.status().as_u16()));
        }

        resp.json::<ImageResponse>()
            .await
            .map_err(|e| FetchError::MalformedBody(e.to_string()))
    }
}
