//! Main telemetry client

use anyhow::Result;

use crate::cancel::CancellationToken;
use crate::command::CommandDescriptor;
use crate::config::{load_telemetry_config, TelemetryConfig};
use crate::context::{self, EventContext};
use crate::sender::{EventSender, SendOutcome};

/// Account and request details the host knows about an invocation
#[derive(Debug, Clone, Default)]
pub struct InvocationMetadata {
    pub cli_version: String,
    pub merchant: String,
    pub request_id: String,
    pub live_mode: bool,
}

impl InvocationMetadata {
    pub fn new(cli_version: impl Into<String>) -> Self {
        Self {
            cli_version: cli_version.into(),
            ..Default::default()
        }
    }

    fn user_agent(&self) -> String {
        format!("Stripe/v1 stripe-cli/{}", self.cli_version)
    }
}

/// Main telemetry client
///
/// Ties the process-wide [`EventContext`] to an [`EventSender`] built from
/// the loaded configuration.
pub struct TelemetryClient {
    config: TelemetryConfig,
    sender: EventSender,
}

impl TelemetryClient {
    /// Create a new telemetry client
    ///
    /// Respects opt-out configuration and environment variables.
    /// If telemetry is disabled, this will still succeed but won't send any events.
    pub fn new() -> Result<Self> {
        Self::with_config(load_telemetry_config()?)
    }

    pub fn with_config(config: TelemetryConfig) -> Result<Self> {
        let sender = EventSender::from_config(&config)?;
        Ok(Self { config, sender })
    }

    /// Use a custom sender, e.g. one over a stub transport
    pub fn with_sender(config: TelemetryConfig, sender: EventSender) -> Self {
        Self { config, sender }
    }

    /// Prepare the process-wide context for the command being dispatched.
    ///
    /// Binds the command, assigns a fresh invocation ID and records the
    /// platform and account details. Returns a copy of the resulting context.
    pub fn begin_invocation(
        &self,
        command: &CommandDescriptor,
        metadata: &InvocationMetadata,
    ) -> EventContext {
        context::update(|ctx| {
            ctx.user_agent = metadata.user_agent();
            ctx.cli_version = metadata.cli_version.clone();
            ctx.os = std::env::consts::OS.to_string();
            ctx.merchant = metadata.merchant.clone();
            ctx.request_id = metadata.request_id.clone();
            ctx.live_mode = metadata.live_mode;
            ctx.bind_command(command);
            ctx.assign_invocation_id();
            ctx.clone()
        })
    }

    /// Send one event describing the process-wide context
    pub async fn send_event(
        &self,
        cancel: Option<&CancellationToken>,
        event_name: &str,
        event_value: &str,
    ) -> SendOutcome {
        let ctx = context::snapshot();
        self.sender
            .send_event(&ctx, cancel, event_name, event_value)
            .await
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Check if telemetry is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DO_NOT_TRACK_ENV, OPT_OUT_ENV};
    use crate::test_support::StubTransport;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn test_client_with_default_config() {
        let client = TelemetryClient::with_config(TelemetryConfig::default()).unwrap();
        assert!(client.is_enabled());
        assert!(!client.config().verbose);
    }

    #[test]
    #[serial]
    fn test_begin_invocation_fills_global_context() {
        let client = TelemetryClient::with_sender(
            TelemetryConfig::default(),
            EventSender::new(StubTransport::with_body(200, "")),
        );
        let metadata = InvocationMetadata {
            merchant: "acct_42".to_string(),
            live_mode: true,
            ..InvocationMetadata::new("1.19.4")
        };

        let first = client.begin_invocation(&CommandDescriptor::generated("stripe charges list"), &metadata);
        assert_eq!(first.user_agent, "Stripe/v1 stripe-cli/1.19.4");
        assert_eq!(first.cli_version, "1.19.4");
        assert_eq!(first.os, std::env::consts::OS);
        assert_eq!(first.merchant, "acct_42");
        assert!(first.live_mode);
        assert!(first.generated_resource);
        assert_eq!(context::snapshot(), first);

        let second = client.begin_invocation(&CommandDescriptor::new("stripe listen"), &metadata);
        assert_ne!(first.invocation_id, second.invocation_id);
        assert!(!second.generated_resource);
    }

    #[tokio::test]
    #[serial]
    async fn test_send_event_uses_global_context() {
        let saved: Vec<_> = [OPT_OUT_ENV, DO_NOT_TRACK_ENV]
            .into_iter()
            .map(|name| (name, std::env::var(name).ok()))
            .collect();
        for (name, _) in &saved {
            std::env::remove_var(name);
        }

        let stub = StubTransport::with_body(200, "");
        let client = TelemetryClient::with_sender(
            TelemetryConfig::default(),
            EventSender::new(stub.clone()).with_pre_send_delay(Duration::ZERO),
        );
        let ctx = client.begin_invocation(&CommandDescriptor::new("stripe login"), &InvocationMetadata::new("1.0.0"));

        let outcome = client.send_event(None, "login", "ok").await;
        assert!(outcome.is_sent());
        assert_eq!(stub.last_request().field("invocation_id"), Some(ctx.invocation_id));
        assert_eq!(stub.last_request().field("command_path").as_deref(), Some("stripe login"));

        for (name, value) in saved {
            if let Some(value) = value {
                std::env::set_var(name, value);
            }
        }
    }
}
