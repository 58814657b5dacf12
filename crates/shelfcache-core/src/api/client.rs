//! API client for the library backend's REST endpoints.
//!
//! Collection endpoints follow one shape for every namespace:
//! `GET /api/{ns}`, `POST /api/{ns}`, `PUT /api/{ns}/update/{id}` and
//! `DELETE /api/{ns}/delete/{id}`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::ApiError;
use crate::cache::{Remote, Verb};
use crate::models::EntityId;
use crate::status::{StatusLog, SystemStatus};

/// Backend address used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
/// Short, so list views fall back to the snapshot quickly.
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// API client for the library backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("API base URL cannot carry a path: {}", base_url);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("API base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .push("api")
            .extend(segments.iter());
        Ok(url)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn send_json(&self, method: reqwest::Method, url: Url, body: &Value) -> Result<Value> {
        debug!(method = %method, url = %url, "Sending request");
        let response = self
            .client
            .request(method.clone(), url.clone())
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send {} request to {}", method, url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// Current health of the backend's components.
    pub async fn fetch_status(&self) -> Result<SystemStatus> {
        self.get(self.endpoint(&["status"])?).await
    }

    /// Status change history used for uptime reporting.
    pub async fn fetch_status_logs(&self) -> Result<Vec<StatusLog>> {
        self.get(self.endpoint(&["status", "logs"])?).await
    }
}

#[async_trait]
impl Remote for ApiClient {
    async fn fetch_all(&self, namespace: &str) -> Result<Value> {
        self.get(self.endpoint(&[namespace])?).await
    }

    async fn create(&self, namespace: &str, body: Value) -> Result<Value> {
        let url = self.endpoint(&[namespace])?;
        self.send_json(reqwest::Method::POST, url, &body).await
    }

    async fn update(&self, namespace: &str, id: &EntityId, body: Value) -> Result<Value> {
        let id = id.to_string();
        let url = self.endpoint(&[namespace, "update", &id])?;
        self.send_json(reqwest::Method::PUT, url, &body).await
    }

    async fn delete(&self, namespace: &str, id: &EntityId) -> Result<()> {
        let id = id.to_string();
        let url = self.endpoint(&[namespace, "delete", &id])?;
        debug!(url = %url, "DELETE");
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send DELETE request to {}", url))?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn call(&self, verb: Verb, path: &[&str], query: &[(&str, &str)]) -> Result<Value> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        let method = match verb {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
        };
        debug!(method = %method, url = %url, "Sending request");
        let response = self
            .client
            .request(method, url.clone())
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send {} request to {}", verb, url))?;

        let response = Self::check_response(response).await?;
        let body = response
            .text()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to read response from {}", url))?;
        Ok(parse_body(&body))
    }
}

/// Some endpoints answer with plain text or nothing at all.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
