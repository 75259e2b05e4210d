//! Errors returned by the telemetry pipeline

use thiserror::Error;

/// Reasons a telemetry event was not delivered.
///
/// None of these are fatal to the command being run. Callers treat any of
/// them as "telemetry not delivered" and carry on.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The analytics endpoint could not be parsed as a URL
    #[error("invalid analytics endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The form payload could not be encoded
    #[error("failed to encode telemetry payload: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    /// A request header could not be built
    #[error("invalid telemetry request header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// DNS, connect, TLS, timeout or body read failure
    #[error("telemetry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller cancelled the send before it completed
    #[error("telemetry request was cancelled")]
    Cancelled,
}

impl TelemetryError {
    /// True when the send was aborted through a cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TelemetryError::Cancelled)
    }
}
