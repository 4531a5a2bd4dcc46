//! reqwest-backed transport.
//!
//! Talks JSON to the Garbet REST backend. The backend authenticates with
//! httpOnly cookies (`accessToken`, `refreshToken`) that it sets and
//! rotates itself, so the client keeps a cookie store and never touches
//! a token directly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::config::ApiConfig;
use crate::types::GarbetError;

const USER_AGENT: &str = "garbet-client/0.1.0";

/// Cookie-carrying HTTP transport.
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport from the `[api]` config section.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::with_base_url(config.resolved_base_url(), config.timeout())
    }

    /// Create a transport against an explicit base URL (for testing).
    pub fn with_base_url(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for Garbet API")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Parse a response body: JSON when possible, raw text otherwise.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GarbetError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "API request");

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| GarbetError::Transport(format!("{request} failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| GarbetError::Transport(format!("{request} body read failed: {e}")))?;

        debug!(method = %request.method, url = %url, status, "API response");
        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}
