//! Request/response calls against the job API with bounded retries.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobs_core::{RetryConfig, ServiceError};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// HTTP verbs the job API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
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

/// A response as seen by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: String::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Future type for a single transport round trip. `Err` is a network failure.
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<RawResponse, String>> + Send>>;

/// One HTTP round trip, without retries.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(&self, method: Method, url: String, body: Option<JsonValue>) -> TransportFuture;
}

/// `reqwest`-backed transport sending and accepting JSON.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, method: Method, url: String, body: Option<JsonValue>) -> TransportFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let mut request = client
                .request(method.into(), &url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(&body);
            }

            let response = request.send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            let body = response.text().await.map_err(|e| e.to_string())?;

            Ok(RawResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            })
        })
    }
}

/// Why the last attempt of a call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureCause {
    #[error("network error: {0}")]
    Transport(String),

    #[error("HTTP {code}: {reason}")]
    Status { code: u16, reason: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// A call that failed on every attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("API call {method} {path} failed after {attempts} attempts: {cause}")]
pub struct RequestError {
    pub method: Method,
    pub path: String,
    pub attempts: u32,
    pub cause: FailureCause,
}

impl From<RequestError> for ServiceError {
    fn from(error: RequestError) -> Self {
        ServiceError::Request {
            attempts: error.attempts,
            cause: error.cause.to_string(),
        }
    }
}

/// Calls the job API, retrying any failure with exponential backoff.
///
/// The retry counter is local to each call.
#[derive(Clone)]
pub struct RequestClient {
    base_url: String,
    retry: RetryConfig,
    transport: Arc<dyn HttpTransport>,
}

impl RequestClient {
    /// Create a client that talks HTTP through `reqwest`.
    pub fn new(base_url: impl Into<String>, retry: RetryConfig) -> Self {
        Self::with_transport(base_url, retry, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        retry: RetryConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call an endpoint and parse its JSON payload.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<T, RequestError> {
        self.call_with(method, path, body, |response| {
            if response.status == 204 || response.body.trim().is_empty() {
                return Err(FailureCause::Decode("empty response body".into()));
            }
            serde_json::from_str(&response.body).map_err(|e| FailureCause::Decode(e.to_string()))
        })
        .await
    }

    /// Call an endpoint whose success carries no payload.
    pub async fn call_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<(), RequestError> {
        self.call_with(method, path, body, |_| Ok(())).await
    }

    async fn call_with<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        decode: impl Fn(&RawResponse) -> Result<T, FailureCause>,
    ) -> Result<T, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0;

        loop {
            let cause = match self.transport.send(method, url.clone(), body.clone()).await {
                Ok(response) if response.is_success() => match decode(&response) {
                    Ok(value) => return Ok(value),
                    Err(cause) => cause,
                },
                Ok(response) => FailureCause::Status {
                    code: response.status,
                    reason: response.reason,
                },
                Err(error) => FailureCause::Transport(error),
            };

            if !self.retry.allows(retries) {
                let error = RequestError {
                    method,
                    path: path.to_string(),
                    attempts: retries + 1,
                    cause,
                };
                tracing::warn!("{}", error);
                return Err(error);
            }

            let delay = self.retry.delay_for(retries);
            tracing::debug!(
                %method,
                path,
                retry = retries + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying request: {}",
                cause
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}
