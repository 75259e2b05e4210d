//! Delivery of a single telemetry event
//!
//! One call to [`EventSender::send_event`] produces at most one request.
//! There is no batching, queueing or retry: an event that fails to send is
//! dropped and the failure is reported back to the caller.

use chrono::Utc;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Body, Method, Request, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::{opted_out_by_env, TelemetryConfig, DEFAULT_ENDPOINT, DEFAULT_PRE_SEND_DELAY};
use crate::context::EventContext;
use crate::error::TelemetryError;
use crate::invocation::new_identifier;
use crate::transport::{EventResponse, InstrumentedTransport, Transport};

/// Identifies this client to the analytics service
pub const CLIENT_ID: &str = "stripe-cli";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Why an event was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The opt-out environment variable is set
    OptedOut,
    /// The sender was built with telemetry disabled
    Disabled,
}

/// What happened to an event
#[derive(Debug)]
pub enum SendOutcome {
    /// The endpoint answered, with any status
    Sent(EventResponse),
    /// Nothing touched the network
    Skipped(SkipReason),
    /// The event was not delivered
    Failed(TelemetryError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SendOutcome::Skipped(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SendOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&EventResponse> {
        match self {
            SendOutcome::Sent(response) => Some(response),
            _ => None,
        }
    }

    /// `Ok(Some(_))` when sent, `Ok(None)` when skipped
    pub fn into_result(self) -> Result<Option<EventResponse>, TelemetryError> {
        match self {
            SendOutcome::Sent(response) => Ok(Some(response)),
            SendOutcome::Skipped(_) => Ok(None),
            SendOutcome::Failed(err) => Err(err),
        }
    }
}

/// Fields appended to the context for each event
#[derive(Serialize)]
struct EventFields<'a> {
    client_id: &'a str,
    event_id: String,
    event_name: &'a str,
    event_value: &'a str,
    created: i64,
}

/// Encode the context plus the per-event fields as a form body
pub fn encode_payload(
    ctx: &EventContext,
    event_name: &str,
    event_value: &str,
) -> Result<String, TelemetryError> {
    let context = serde_urlencoded::to_string(ctx)?;
    let event = serde_urlencoded::to_string(EventFields {
        client_id: CLIENT_ID,
        event_id: new_identifier(),
        event_name,
        event_value,
        created: Utc::now().timestamp(),
    })?;

    Ok(format!("{context}&{event}"))
}

/// Sends telemetry events through a [`Transport`]
#[derive(Clone)]
pub struct EventSender {
    transport: Arc<dyn Transport>,
    endpoint: String,
    pre_send_delay: Duration,
    enabled: bool,
}

impl EventSender {
    /// Sender with the default endpoint and pre-send delay
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            pre_send_delay: DEFAULT_PRE_SEND_DELAY,
            enabled: true,
        }
    }

    /// Sender over an [`InstrumentedTransport`] configured from `config`
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let transport = InstrumentedTransport::new(config.verbose)?;
        Ok(Self::new(transport)
            .with_endpoint(&config.endpoint)
            .with_pre_send_delay(config.pre_send_delay())
            .with_enabled(config.enabled))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Wait applied before every send. Zero disables it.
    pub fn with_pre_send_delay(mut self, delay: Duration) -> Self {
        self.pre_send_delay = delay;
        self
    }

    /// A disabled sender skips every event
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pre_send_delay(&self) -> Duration {
        self.pre_send_delay
    }

    /// Send one event describing `ctx`.
    ///
    /// The opt-out environment variable is read on every call. A cancelled
    /// `cancel` token aborts both the pre-send delay and the request.
    pub async fn send_event(
        &self,
        ctx: &EventContext,
        cancel: Option<&CancellationToken>,
        event_name: &str,
        event_value: &str,
    ) -> SendOutcome {
        if let Err(err) = self.wait_before_send(cancel).await {
            return SendOutcome::Failed(err);
        }

        if opted_out_by_env() {
            tracing::debug!(event_name, "telemetry opted out, skipping event");
            return SendOutcome::Skipped(SkipReason::OptedOut);
        }

        if !self.enabled {
            tracing::debug!(event_name, "telemetry disabled, skipping event");
            return SendOutcome::Skipped(SkipReason::Disabled);
        }

        match self.deliver(ctx, cancel, event_name, event_value).await {
            Ok(response) => {
                tracing::debug!(event_name, status = %response.status, "telemetry event sent");
                SendOutcome::Sent(response)
            }
            Err(err) => {
                tracing::debug!(event_name, error = %err, "telemetry event not delivered");
                SendOutcome::Failed(err)
            }
        }
    }

    async fn wait_before_send(&self, cancel: Option<&CancellationToken>) -> Result<(), TelemetryError> {
        if self.pre_send_delay.is_zero() {
            return Ok(());
        }

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TelemetryError::Cancelled),
                _ = tokio::time::sleep(self.pre_send_delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(self.pre_send_delay).await;
                Ok(())
            }
        }
    }

    async fn deliver(
        &self,
        ctx: &EventContext,
        cancel: Option<&CancellationToken>,
        event_name: &str,
        event_value: &str,
    ) -> Result<EventResponse, TelemetryError> {
        let url = Url::parse(&self.endpoint).map_err(|err| TelemetryError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: err.to_string(),
        })?;

        let body = encode_payload(ctx, event_name, event_value)?;
        let request = build_request(url, body)?;

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TelemetryError::Cancelled),
                result = self.transport.execute(request) => result,
            },
            None => self.transport.execute(request).await,
        }
    }
}

fn build_request(url: Url, body: String) -> Result<Request, TelemetryError> {
    let mut request = Request::new(Method::POST, url);

    let headers = request.headers_mut();
    headers.insert("origin", HeaderValue::from_str(CLIENT_ID)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));

    *request.body_mut() = Some(Body::from(body));
    Ok(request)
}
