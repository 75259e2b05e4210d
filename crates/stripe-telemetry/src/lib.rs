//! # Stripe CLI Telemetry
//!
//! Anonymized usage telemetry for the Stripe CLI.
//!
//! ## What We Collect
//!
//! - The command that ran and whether it was generated from the API description
//! - A random invocation ID, fresh for every process run
//! - CLI version and operating system
//! - The account the command targeted and whether it ran in live mode
//! - The ID of the API request the command made, if any
//!
//! ## Flow
//!
//! 1. The command framework binds the dispatched command to the [`EventContext`]
//!    and assigns an invocation ID.
//! 2. [`EventSender::send_event`] posts the context plus an event name/value as
//!    a form to the analytics endpoint, at most once, with no retry.
//! 3. The caller receives a [`SendOutcome`]: sent, skipped (opted out) or failed.
//!
//! ## Opt-Out
//!
//! ```bash
//! # Via environment variable
//! export STRIPE_CLI_TELEMETRY_OPTOUT=1
//!
//! # Via config file (~/.config/stripe/config.toml)
//! [telemetry]
//! enabled = false
//! ```

pub mod cancel;
pub mod client;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod invocation;
pub mod sender;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use cancel::CancellationToken;
pub use client::{InvocationMetadata, TelemetryClient};
pub use command::{CommandDescriptor, CommandKind};
pub use config::TelemetryConfig;
pub use context::EventContext;
pub use error::TelemetryError;
pub use sender::{EventSender, SendOutcome, SkipReason};
pub use transport::{EventResponse, HttpTransport, InstrumentedTransport, Transport};
