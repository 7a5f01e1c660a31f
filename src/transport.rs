/*!
Upstream http transport

Everything that talks to spotify goes through [`Transport`] so the
token provider and catalog client can be exercised against canned
responses.
*/
use std::time::Duration;

use crate::LOG;

/// Delay before the single retry of a transient failure
pub const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl From<Method> for surf::http::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => surf::http::Method::Get,
            Method::Post => surf::http::Method::Post,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: vec![],
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream network error: {0}")]
    Network(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Connection resets and timeouts are worth one more attempt,
    /// a request we couldn't even build is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Network(_))
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// [`Transport`] backed by a shared surf client
pub struct SurfTransport {
    client: surf::Client,
    timeout: Duration,
}

impl SurfTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: surf::Client::new(),
            timeout,
        }
    }

    async fn round_trip(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let url = surf::Url::parse(&req.url)
            .map_err(|e| TransportError::InvalidRequest(format!("{} {}", req.url, e)))?;
        let mut builder = surf::RequestBuilder::new(req.method.into(), url);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = req.body {
            builder = builder.body_string(body);
        }
        let mut resp = self
            .client
            .send(builder.build())
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let body = resp
            .body_string()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(UpstreamResponse {
            status: u16::from(resp.status()),
            body,
        })
    }
}

#[async_trait::async_trait]
impl Transport for SurfTransport {
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        async_std::future::timeout(self.timeout, self.round_trip(req))
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

/// Send `req`, retrying once after [`RETRY_BACKOFF`] if the first attempt
/// failed before any response came back. Http error statuses are returned
/// to the caller untouched and never retried.
pub async fn send_with_retry(
    transport: &dyn Transport,
    req: UpstreamRequest,
) -> Result<UpstreamResponse, TransportError> {
    match transport.send(req.clone()).await {
        Err(e) if e.is_transient() => {
            slog::warn!(
                LOG, "retrying upstream request";
                "url" => &req.url,
                "error" => e.to_string(),
            );
            async_std::task::sleep(RETRY_BACKOFF).await;
            transport.send(req).await
        }
        other => other,
    }
}
