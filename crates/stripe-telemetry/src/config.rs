//! Telemetry configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable users set to opt out of telemetry
pub const OPT_OUT_ENV: &str = "STRIPE_CLI_TELEMETRY_OPTOUT";

/// Universal opt-out honoured alongside [`OPT_OUT_ENV`]
pub const DO_NOT_TRACK_ENV: &str = "DO_NOT_TRACK";

/// Enables verbose transport logging
pub const VERBOSE_ENV: &str = "STRIPE_CLI_TELEMETRY_VERBOSE";

/// Overrides the pre-send delay, in milliseconds
pub const DELAY_ENV: &str = "STRIPE_CLI_TELEMETRY_DELAY_MS";

/// Analytics endpoint events are posted to
pub const DEFAULT_ENDPOINT: &str = "https://r.stripe.com/0";

/// Wait applied before every send
pub const DEFAULT_PRE_SEND_DELAY: Duration = Duration::from_secs(5);

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Whether telemetry is enabled (default: true, opt-out model)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Log every request and response the transport handles (default: false)
    #[serde(default)]
    pub verbose: bool,

    /// Wait before each send, in milliseconds (default: 5000)
    #[serde(default = "default_pre_send_delay_ms")]
    pub pre_send_delay_ms: u64,

    /// Analytics endpoint (default: https://r.stripe.com/0)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            verbose: false,
            pre_send_delay_ms: default_pre_send_delay_ms(),
            endpoint: default_endpoint(),
        }
    }
}

impl TelemetryConfig {
    pub fn pre_send_delay(&self) -> Duration {
        Duration::from_millis(self.pre_send_delay_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_pre_send_delay_ms() -> u64 {
    DEFAULT_PRE_SEND_DELAY.as_millis() as u64
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Load telemetry configuration with precedence:
/// 1. Environment variables (highest priority)
/// 2. User config (`<config dir>/stripe/config.toml`)
/// 3. Default (enabled=true)
pub fn load_telemetry_config() -> Result<TelemetryConfig> {
    let mut config = TelemetryConfig::default();

    if let Some(path) = user_config_path() {
        if path.exists() {
            match load_config_from_file(&path) {
                Ok(cfg) => config = cfg,
                Err(err) => tracing::debug!("ignoring telemetry config: {err:#}"),
            }
        }
    }

    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Configuration used when [`load_telemetry_config`] fails: defaults with
/// the opt-out and verbose environment flags still applied
pub fn fallback_config() -> TelemetryConfig {
    TelemetryConfig {
        enabled: !opted_out_by_env(),
        verbose: env_flag(VERBOSE_ENV),
        ..TelemetryConfig::default()
    }
}

/// Location of the user-level config file
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stripe").join("config.toml"))
}

/// Load telemetry config from a TOML file
pub fn load_config_from_file(path: &Path) -> Result<TelemetryConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;

    // Parse full config to extract telemetry section
    #[derive(Deserialize)]
    struct FullConfig {
        #[serde(default)]
        telemetry: Option<TelemetryConfig>,
    }

    let full_config: FullConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    Ok(full_config.telemetry.unwrap_or_default())
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut TelemetryConfig) -> Result<()> {
    if opted_out_by_env() {
        config.enabled = false;
    }

    if env_flag(VERBOSE_ENV) {
        config.verbose = true;
    }

    if let Ok(raw) = env::var(DELAY_ENV) {
        config.pre_send_delay_ms = raw
            .trim()
            .parse()
            .with_context(|| format!("{DELAY_ENV} must be a number of milliseconds, got `{raw}`"))?;
    }

    Ok(())
}

/// Whether the environment currently opts out of telemetry.
///
/// Checked again at every send so that a change after start-up still applies.
pub fn opted_out_by_env() -> bool {
    env_flag(OPT_OUT_ENV) || env_flag(DO_NOT_TRACK_ENV)
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|value| is_truthy(&value)).unwrap_or(false)
}

/// `1` and `true` (any case) count as set
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
