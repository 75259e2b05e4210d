//! HTTP transport for telemetry events
//!
//! [`HttpTransport`] performs the network call. [`InstrumentedTransport`]
//! decorates any [`Transport`] and, in verbose mode, logs each request and
//! response before handing the response back unchanged.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Request, StatusCode};
use std::borrow::Cow;
use std::time::Duration;

use crate::error::TelemetryError;

/// Time allowed to establish the TCP connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keep-alive interval
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed for the TLS handshake once connected
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const LOG_TARGET: &str = "stripe_telemetry::transport";

/// Response to a telemetry request, fully read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl EventResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Executes a single request. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<EventResponse, TelemetryError>;
}

/// Network transport backed by `reqwest`.
///
/// Proxies are resolved from `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TelemetryError> {
        // reqwest's connect timeout spans both the dial and the TLS handshake
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT + TLS_HANDSHAKE_TIMEOUT)
            .tcp_keepalive(KEEP_ALIVE_INTERVAL)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<EventResponse, TelemetryError> {
        let response = self.client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(EventResponse {
            status,
            headers,
            body,
        })
    }
}

/// Transport decorator that optionally logs traffic
#[derive(Debug, Clone)]
pub struct InstrumentedTransport<T = HttpTransport> {
    inner: T,
    verbose: bool,
}

impl InstrumentedTransport<HttpTransport> {
    /// Wrap a freshly configured [`HttpTransport`]
    pub fn new(verbose: bool) -> Result<Self, TelemetryError> {
        Ok(Self::wrap(HttpTransport::new()?, verbose))
    }
}

impl<T: Transport> InstrumentedTransport<T> {
    pub fn wrap(inner: T, verbose: bool) -> Self {
        Self { inner, verbose }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn log_request(request: &Request) {
        let body = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(String::from_utf8_lossy)
            .unwrap_or_default();

        tracing::info!(
            target: LOG_TARGET,
            method = %request.method(),
            url = %request.url(),
            headers = ?request.headers(),
            body = %body,
            "telemetry request"
        );
    }

    fn log_response(response: &EventResponse) {
        tracing::info!(
            target: LOG_TARGET,
            status = %response.status,
            headers = ?response.headers,
            body = %response.text(),
            "telemetry response"
        );
    }
}

#[async_trait]
impl<T: Transport> Transport for InstrumentedTransport<T> {
    async fn execute(&self, request: Request) -> Result<EventResponse, TelemetryError> {
        if !self.verbose {
            return self.inner.execute(request).await;
        }

        Self::log_request(&request);
        let result = self.inner.execute(request).await;
        match &result {
            Ok(response) => Self::log_response(response),
            Err(err) => tracing::info!(target: LOG_TARGET, error = %err, "telemetry request failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LogBuffer, StubTransport};
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use reqwest::Method;

    fn request() -> Request {
        let mut request = Request::new(Method::POST, "https://r.stripe.com/0".parse().unwrap());
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        *request.body_mut() = Some("event_name=login".into());
        request
    }

    async fn execute_logged(verbose: bool) -> (EventResponse, String) {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = InstrumentedTransport::wrap(StubTransport::with_body(200, "ok"), verbose);
        let response = transport.execute(request()).await.unwrap();
        (response, logs.contents())
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(CONNECT_TIMEOUT, Duration::from_secs(30));
        assert_eq!(KEEP_ALIVE_INTERVAL, Duration::from_secs(30));
        assert_eq!(TLS_HANDSHAKE_TIMEOUT, Duration::from_secs(10));
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new().is_ok());
        assert!(!InstrumentedTransport::new(false).unwrap().is_verbose());
    }

    #[tokio::test]
    async fn test_verbose_logs_request_and_response() {
        let (_, logs) = execute_logged(true).await;

        assert!(logs.contains("telemetry request"), "logs: {logs}");
        assert!(logs.contains("https://r.stripe.com/0"));
        assert!(logs.contains("event_name=login"));
        assert!(logs.contains("content-type"));
        assert!(logs.contains("application/x-www-form-urlencoded"));
        assert!(logs.contains("telemetry response"));
        assert!(logs.contains("200 OK"));
    }

    #[tokio::test]
    async fn test_quiet_mode_logs_nothing() {
        let (_, logs) = execute_logged(false).await;
        assert!(logs.is_empty(), "unexpected logs: {logs}");
    }

    #[tokio::test]
    async fn test_both_modes_return_identical_responses() {
        let (verbose, _) = execute_logged(true).await;
        let (quiet, _) = execute_logged(false).await;

        assert_eq!(verbose, quiet);
        assert_eq!(quiet.text(), "ok");
    }

    #[tokio::test]
    async fn test_decorator_calls_inner_once() {
        let stub = StubTransport::with_body(204, "");
        let transport = InstrumentedTransport::wrap(stub.clone(), true);
        transport.execute(request()).await.unwrap();

        assert_eq!(stub.calls(), 1);
    }
}
