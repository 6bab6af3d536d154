use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{ClientError, ClientResult};

pub const AUTHORIZATION_HEADER: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request relative to the service base URL.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: vec![],
            headers: vec![],
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First header with `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(AUTHORIZATION_HEADER) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after_secs: Option<u64>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves one request to the service and back.
///
/// Implementations only fail with [`ClientError::Transport`]; every HTTP
/// status, including errors, comes back as an [`HttpResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = reqwest::Url::parse(&normalized)
            .with_context(|| format!("invalid service base URL: {base_url}"))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client")?;

        debug!(base_url = %base_url, timeout_secs = timeout.as_secs(), "built HTTP transport");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(method = request.method.as_str(), path = %request.path))]
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let mut url = self.base_url.join(&request.path).map_err(|err| {
            ClientError::Transport(format!("invalid request path {}: {err}", request.path))
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .header(ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let payload = serde_json::to_vec(body).map_err(|err| {
                ClientError::Transport(format!("failed encoding request body: {err}"))
            })?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(error = %err, "request failed before a response arrived");
            ClientError::Transport(err.to_string())
        })?;

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(|err| {
            ClientError::Transport(format!("failed reading response body: {err}"))
        })?;

        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse {
            status,
            body,
            retry_after_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{HttpRequest, ReqwestTransport};

    #[test]
    fn debug_output_redacts_bearer_token() {
        let request = HttpRequest::get("api/v1/projects/")
            .with_query("limit", 10)
            .with_header("Authorization", "Bearer secret-token");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(request.header("authorization"), Some("Bearer secret-token"));
        assert_eq!(request.query_value("limit"), Some("10"));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let transport = ReqwestTransport::new("http://localhost:8000", Duration::from_secs(5))
            .expect("transport");
        assert_eq!(transport.base_url().as_str(), "http://localhost:8000/");
        let joined = transport
            .base_url()
            .join("api/v1/projects/")
            .expect("join");
        assert_eq!(joined.as_str(), "http://localhost:8000/api/v1/projects/");
    }

    #[test]
    fn rejects_unparsable_base_url() {
        assert!(ReqwestTransport::new("not a url", Duration::from_secs(5)).is_err());
    }
}
