//! Generic HTTP request wrapper.
//!
//! All API traffic funnels through [`ApiClient::request`]: one pooled
//! `reqwest` client with a cookie store (session credentials ride on every
//! call), a JSON content-type header merged under any caller-supplied
//! headers, and normalization of empty responses into a typed empty value.
//!
//! A non-success status fails with [`ApiError::Http`] before the body is
//! inspected; there is no retry. An empty body — 204, a zero
//! content-length, or a JSON content-type over empty text — yields
//! `T::default()` and never reaches the parser.

use freightline_core::config::ApiConfig;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the request wrapper.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status code.
    #[error("HTTP error! status: {status}")]
    Http {
        /// Status code of the failed response.
        status: StatusCode,
    },

    /// A body that claimed to be JSON could not be decoded.
    #[error("malformed response body: {0}")]
    Parse(String),

    /// Connection-level failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The client could not be constructed from its configuration.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// HTTP client bound to a fixed API base address.
///
/// Cheap to clone; clones share the connection pool and the cookie store.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    /// Build a client for the configured base address.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issue a request against the API.
    ///
    /// `path` is appended verbatim to the base address (the base carries a
    /// path prefix that plain URL joining would drop). Caller-supplied
    /// headers are merged on top of the defaults and win on conflict.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        headers: HeaderMap,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base, path);
        debug!(%method, %url, "issuing API request");

        let mut builder = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json")
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http { status });
        }

        // 204 and explicitly empty responses carry no body worth parsing.
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(T::default());
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        if is_json {
            // A JSON content-type does not guarantee a body; read the text
            // first so an empty payload never reaches the parser.
            let text = response.text().await?;
            if text.trim().is_empty() {
                return Ok(T::default());
            }
            return Ok(serde_json::from_str(&text)?);
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ApiError::Parse(e.to_string())
            } else {
                ApiError::Transport(e)
            }
        })
    }

    /// GET `path`.
    pub async fn get<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
    {
        self.request(Method::GET, path, None, HeaderMap::new()).await
    }

    /// POST `path` with an optional JSON payload.
    pub async fn post<T, B>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_string).transpose()?;
        self.request(Method::POST, path, body, HeaderMap::new())
            .await
    }

    /// PUT `path` with a JSON payload (full replacement, no patch semantics).
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body)?;
        self.request(Method::PUT, path, Some(body), HeaderMap::new())
            .await
    }

    /// DELETE `path`. Success responses carry no content.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request::<EmptyBody>(Method::DELETE, path, None, HeaderMap::new())
            .await?;
        Ok(())
    }
}

/// Target type for responses whose content is irrelevant.
///
/// Deserializes from any JSON value, so a server that answers a DELETE with
/// a confirmation object instead of 204 still succeeds.
#[derive(Debug, Default)]
struct EmptyBody;

impl<'de> Deserialize<'de> for EmptyBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Self)
    }
}
