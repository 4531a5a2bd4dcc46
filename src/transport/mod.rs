//! Transport layer.
//!
//! Defines the `Transport` trait the session guard issues requests
//! through, the request/response value types, and the reqwest-backed
//! implementation:
//! - `HttpTransport`: cookie-carrying HTTP client against the REST backend
//!
//! Credential attachment is the transport's business. The guard only
//! knows that "issue request" exists and that 401 means expired.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use crate::types::GarbetError;

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
        }
    }
}

/// A request against the backend, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path under the base URL, e.g. `/auth/me`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn put(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A backend response. Any status, success or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a JSON string when the body
    /// was not JSON.
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GarbetError> {
        serde_json::from_value(self.body.clone()).map_err(|e| GarbetError::Decode(e.to_string()))
    }

    /// Human-readable error text: the backend's `message` field when it
    /// sent one, otherwise the raw body.
    pub fn error_message(&self) -> String {
        match &self.body {
            Value::Object(map) => map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.body.to_string()),
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Null => format!("status {}", self.status),
            other => other.to_string(),
        }
    }

    /// Convert a non-success response into the matching error.
    pub fn into_error(self) -> GarbetError {
        if self.is_unauthorized() {
            return GarbetError::AuthExpired;
        }
        GarbetError::Http {
            status: self.status,
            message: self.error_message(),
        }
    }
}

/// Abstraction over the wire.
///
/// Implementors return every HTTP response as `Ok`, whatever its status;
/// `Err` is reserved for failures where no response arrived at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GarbetError>;
}
