//! Resilient HTTP transport.
//!
//! Every request runs under two policies:
//!
//! - **Per-attempt timeout**: each attempt (send and body read) gets its own
//!   ceiling, so one slow attempt cannot eat the whole retry budget.
//! - **Retry with exponential backoff**: network failures, timeouts, 5xx and
//!   408 responses are retried; anything else is returned at once.
//!
//! When retries run out on a transient *status*, the last response is returned
//! so the caller can interpret it. When they run out on a network failure or
//! timeout, the [`TransportError`] is returned.
//!
//! The caller's [`CancellationToken`] aborts the whole exchange, including a
//! pending backoff sleep.

use crate::error::BuildError;
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use todo_sync_core::{CancellationToken, TransportError};
use todo_sync_runtime::{RetryPolicy, retry_with_predicate};

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "TodoSystem/1.0";

/// An outbound request relative to the transport's base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRequest {
    method: Method,
    path: String,
    body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// `GET path`
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    /// `DELETE path`
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, None)
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if `body` cannot be encoded.
    pub fn post_json<T: Serialize + ?Sized>(
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, TransportError> {
        Ok(Self::new(Method::POST, path, Some(encode(body)?)))
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if `body` cannot be encoded.
    pub fn put_json<T: Serialize + ?Sized>(
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, TransportError> {
        Ok(Self::new(Method::PUT, path, Some(encode(body)?)))
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Vec<u8>>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn encode<T: Serialize + ?Sized>(body: &T) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(body).map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// A fully read response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl TransportResponse {
    /// HTTP status
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Raw body bytes
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the body carries no value: empty, whitespace, or a JSON `null`.
    #[must_use]
    pub fn has_empty_body(&self) -> bool {
        let trimmed = self.body.trim_ascii();
        trimmed.is_empty() || trimmed == b"null"
    }
}

/// Whether a response status is worth retrying.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

/// Why a single attempt did not produce a final response.
#[derive(Debug)]
enum AttemptError {
    Transport(TransportError),
    TransientStatus(TransportResponse),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::TransientStatus(_) => true,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => e.fmt(f),
            Self::TransientStatus(response) => write!(f, "transient status {}", response.status),
        }
    }
}

/// HTTP transport with per-attempt timeout and retry.
#[derive(Clone, Debug)]
pub struct ResilientTransport {
    client: Client,
    base_url: Url,
    attempt_timeout: Duration,
    policy: RetryPolicy,
}

impl ResilientTransport {
    /// Start building a transport for `base_url`.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> ResilientTransportBuilder {
        ResilientTransportBuilder {
            base_url: base_url.into(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            policy: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Base URL every request path is resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send `request`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Cancelled`] if `cancel` fires first
    /// - [`TransportError::InvalidRequest`] if the path does not form a valid URL
    /// - [`TransportError::Network`] or [`TransportError::Timeout`] once retries are exhausted
    pub async fn send(
        &self,
        request: &TransportRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {e}", request.path)))?;

        let retried = retry_with_predicate(
            &self.policy,
            || self.attempt(request, url.clone()),
            AttemptError::is_retryable,
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(method = %request.method, path = %request.path, "Request cancelled");
                Err(TransportError::Cancelled)
            }
            outcome = retried => match outcome {
                Ok(response) | Err(AttemptError::TransientStatus(response)) => Ok(response),
                Err(AttemptError::Transport(e)) => Err(e),
            },
        }
    }

    async fn attempt(
        &self,
        request: &TransportRequest,
        url: Url,
    ) -> Result<TransportResponse, AttemptError> {
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(TransportResponse {
                status,
                body: body.to_vec(),
            })
        };

        let response = match tokio::time::timeout(self.attempt_timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AttemptError::Transport(self.classify(&e))),
            Err(_) => {
                return Err(AttemptError::Transport(TransportError::Timeout(
                    self.attempt_timeout,
                )));
            }
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "Provider responded"
        );

        if is_transient_status(response.status) {
            Err(AttemptError::TransientStatus(response))
        } else {
            Ok(response)
        }
    }

    fn classify(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.attempt_timeout)
        } else if error.is_builder() {
            TransportError::InvalidRequest(error.to_string())
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

/// Builder for [`ResilientTransport`].
#[derive(Debug)]
pub struct ResilientTransportBuilder {
    base_url: String,
    attempt_timeout: Duration,
    policy: RetryPolicy,
    user_agent: String,
}

impl ResilientTransportBuilder {
    /// Ceiling for a single attempt.
    #[must_use]
    pub const fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Retry policy applied to transient failures.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `User-Agent` sent with every request.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the transport.
    ///
    /// A missing trailing slash is added to the base URL so relative paths
    /// resolve beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidBaseUrl`] for an unparseable URL and
    /// [`BuildError::Client`] if the HTTP client cannot be initialized.
    pub fn build(self) -> Result<ResilientTransport, BuildError> {
        let mut raw = self.base_url;
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|e| BuildError::InvalidBaseUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| BuildError::Client(format!("invalid user agent: {e}")))?;
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(USER_AGENT, user_agent);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BuildError::Client(e.to_string()))?;

        Ok(ResilientTransport {
            client,
            base_url,
            attempt_timeout: self.attempt_timeout,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Panics: Test will fail if the transport misbehaves
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retries(max_retries: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .base_delay(Duration::from_millis(5))
            .build()
    }

    fn transport(server: &MockServer, max_retries: usize) -> ResilientTransport {
        ResilientTransport::builder(server.uri())
            .retry_policy(fast_retries(max_retries))
            .attempt_timeout(Duration::from_millis(200))
            .build()
            .expect("transport")
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.expect("recording enabled").len()
    }

    #[test]
    fn transient_statuses_are_5xx_and_408() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn null_and_blank_bodies_are_empty() {
        for body in [&b""[..], b"  \n", b"null", b" null "] {
            let response = TransportResponse {
                status: StatusCode::OK,
                body: body.to_vec(),
            };
            assert!(response.has_empty_body());
        }
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let transport = ResilientTransport::builder("https://example.com/api")
            .build()
            .expect("transport");
        assert_eq!(transport.base_url().as_str(), "https://example.com/api/");
    }

    #[test]
    fn unparseable_base_url_is_rejected() {
        let result = ResilientTransport::builder("not a url").build();
        assert!(matches!(result, Err(BuildError::InvalidBaseUrl { .. })));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let response = transport(&server, 3)
            .send(&TransportRequest::get("todos"), &CancellationToken::new())
            .await
            .expect("send");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = transport(&server, 3)
            .send(&TransportRequest::get("todos/1"), &CancellationToken::new())
            .await
            .expect("send");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn exhausted_transient_status_returns_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let response = transport(&server, 2)
            .send(&TransportRequest::get("todos"), &CancellationToken::new())
            .await
            .expect("send");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out_and_next_attempt_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let response = transport(&server, 1)
            .send(&TransportRequest::get("todos"), &CancellationToken::new())
            .await
            .expect("send");

        assert!(response.is_success());
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn every_attempt_timing_out_is_a_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = transport(&server, 0)
            .send(&TransportRequest::get("todos"), &CancellationToken::new())
            .await
            .expect_err("should time out");

        assert_eq!(err, TransportError::Timeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_sending() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transport(&server, 3)
            .send(&TransportRequest::get("todos"), &cancel)
            .await
            .expect_err("should be cancelled");

        assert_eq!(err, TransportError::Cancelled);
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    async fn sends_user_agent_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/todos"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let request =
            TransportRequest::post_json("todos", &serde_json::json!({ "title": "t" })).expect("encode");
        let response = transport(&server, 0)
            .send(&request, &CancellationToken::new())
            .await
            .expect("send");

        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
