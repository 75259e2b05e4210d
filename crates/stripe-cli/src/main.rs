use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use stripe_telemetry::config::{fallback_config, load_telemetry_config};
use stripe_telemetry::{
    CancellationToken, CommandDescriptor, EventContext, InvocationMetadata, SendOutcome,
    SkipReason, TelemetryClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stripe", version, about = "Stripe CLI")]
struct Cli {
    /// Log telemetry traffic to stderr
    #[arg(long, global = true)]
    verbose: bool,
    /// Mark the invocation as targeting live mode
    #[arg(long, global = true)]
    live: bool,
    /// Account the invocation targets
    #[arg(long, global = true, value_name = "ACCOUNT_ID")]
    merchant: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect and exercise usage telemetry
    Telemetry {
        #[command(subcommand)]
        action: TelemetryAction,
    },
}

#[derive(Subcommand)]
enum TelemetryAction {
    /// Show telemetry configuration and the current event context
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Send a single telemetry event
    Send {
        event_name: String,
        event_value: String,
        /// Give up after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },
}

impl Command {
    fn descriptor(&self) -> CommandDescriptor {
        match self {
            Command::Telemetry { action } => match action {
                TelemetryAction::Status { .. } => CommandDescriptor::new("stripe telemetry status"),
                TelemetryAction::Send { .. } => CommandDescriptor::new("stripe telemetry send"),
            },
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,stripe_telemetry=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A bad telemetry setting must not fail the command
    let (mut config, config_err) = match load_telemetry_config() {
        Ok(config) => (config, None),
        Err(err) => (fallback_config(), Some(err)),
    };
    config.verbose |= cli.verbose;
    init_tracing(config.verbose);
    if let Some(err) = config_err {
        tracing::warn!("ignoring telemetry configuration: {err:#}");
    }

    let telemetry = TelemetryClient::with_config(config)?;

    let metadata = InvocationMetadata {
        merchant: cli.merchant.clone().unwrap_or_default(),
        live_mode: cli.live,
        ..InvocationMetadata::new(env!("CARGO_PKG_VERSION"))
    };
    let ctx = telemetry.begin_invocation(&cli.cmd.descriptor(), &metadata);

    match cli.cmd {
        Command::Telemetry { action } => match action {
            TelemetryAction::Status { json } => print_status(&telemetry, &ctx, json)?,
            TelemetryAction::Send {
                event_name,
                event_value,
                timeout,
            } => {
                let token = timeout.map(|secs| CancellationToken::with_timeout(Duration::from_secs(secs)));
                let outcome = telemetry
                    .send_event(token.as_ref(), &event_name, &event_value)
                    .await;
                report(&outcome);
            }
        },
    }
    Ok(())
}

fn print_status(telemetry: &TelemetryClient, ctx: &EventContext, json: bool) -> Result<()> {
    let config = telemetry.config();

    if json {
        let status = serde_json::json!({
            "config": config,
            "context": ctx,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let state = if config.enabled { "enabled" } else { "disabled" };
    println!("Telemetry: {state}");
    println!("Endpoint: {}", config.endpoint);
    println!("Pre-send delay: {}ms", config.pre_send_delay_ms);
    println!("Verbose: {}", config.verbose);
    println!("Invocation ID: {}", ctx.invocation_id);
    println!("Command: {}", ctx.command_path);
    println!("CLI version: {}", ctx.cli_version);
    println!("OS: {}", ctx.os);
    Ok(())
}

// Telemetry never changes the exit status
fn report(outcome: &SendOutcome) {
    match outcome {
        SendOutcome::Sent(response) => println!("Sent telemetry event ({})", response.status),
        SendOutcome::Skipped(SkipReason::OptedOut) => {
            println!("Telemetry is opted out; event skipped")
        }
        SendOutcome::Skipped(SkipReason::Disabled) => {
            println!("Telemetry is disabled; event skipped")
        }
        SendOutcome::Failed(err) => println!("Telemetry event not delivered: {err}"),
    }
}
