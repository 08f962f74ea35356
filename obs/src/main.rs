//! obs - send test events to an obs collector
//!
//! Commands:
//! - `check`: resolve the configured DSN and show the agent settings
//! - `message`: report a message and wait for delivery
//! - `error`: report an error (with stack) and wait for delivery
//!
//! Settings come from `$XDG_CONFIG_HOME/obs/config.toml`, then `OBS_DSN`,
//! `OBS_ENVIRONMENT` and `OBS_SERVER_NAME`, then command-line flags.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use obs_core::{Agent, Config, EventId, Level, Options};

#[derive(Parser)]
#[command(name = "obs")]
#[command(about = "Send test events to an obs collector")]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Connection string, scheme://apikey@host[:port]
    #[arg(long, env = obs_core::config::ENV_DSN)]
    dsn: Option<String>,

    /// Environment label stamped on events
    #[arg(long, env = obs_core::config::ENV_ENVIRONMENT)]
    environment: Option<String>,

    /// Server label stamped on events (default: host name)
    #[arg(long, env = obs_core::config::ENV_SERVER_NAME)]
    server_name: Option<String>,

    /// Seconds to wait for delivery before giving up
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved agent configuration
    Check,

    /// Report a message
    Message {
        /// Message text
        text: String,

        /// Severity (info, warning, error)
        #[arg(short, long, default_value = "info")]
        level: Level,
    },

    /// Report an error with a stacktrace
    Error {
        /// Error message
        text: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    let _log_guard =
        obs_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let options = merge_options(config.agent, &args);
    let timeout = Duration::from_secs(args.timeout);

    match args.command {
        Command::Check => cmd_check(options),
        Command::Message { text, level } => cmd_send(options, timeout, |_| {
            obs_core::capture_message_with_level(&text, level)
        }),
        Command::Error { text } => cmd_send(options, timeout, |_| {
            let err = anyhow::anyhow!(text.clone());
            let err: &(dyn std::error::Error + 'static) = err.as_ref();
            obs_core::capture_exception(err)
        }),
    }
}

/// Flags win over environment, environment over the config file.
fn merge_options(mut options: Options, args: &Args) -> Options {
    if let Some(dsn) = &args.dsn {
        options.dsn = dsn.clone();
    }
    if let Some(environment) = &args.environment {
        options.environment = environment.clone();
    }
    if let Some(server_name) = &args.server_name {
        options.server_name = server_name.clone();
    }
    options
}

fn cmd_check(options: Options) -> Result<()> {
    if options.dsn.is_empty() {
        bail!("no DSN configured (use --dsn or OBS_DSN)");
    }
    let agent = Agent::new(options).context("invalid configuration")?;

    println!("obs Agent Configuration");
    println!("=======================");
    println!();
    println!("Endpoint:        {}", agent.endpoint());
    println!("API Key:         {}", mask(agent.api_key()));
    println!(
        "Environment:     {}",
        if agent.environment().is_empty() {
            "<not set>"
        } else {
            agent.environment()
        }
    );
    println!("Server Name:     {}", agent.server_name());
    println!("Queue Capacity:  {}", agent.queue_capacity());

    agent.shutdown();
    Ok(())
}

fn cmd_send(
    options: Options,
    timeout: Duration,
    capture: impl FnOnce(&Agent) -> EventId,
) -> Result<()> {
    if options.dsn.is_empty() {
        bail!("no DSN configured (use --dsn or OBS_DSN)");
    }
    let agent = Agent::new(options).context("invalid configuration")?;
    obs_core::install(agent.clone());

    let id = capture(&agent);
    tracing::debug!(event_id = %id, "Captured event");

    let flushed = obs_core::flush(timeout);
    let stats = agent.stats();

    println!("Event ID: {}", id);
    if !flushed {
        bail!("timed out after {}s waiting for delivery", timeout.as_secs());
    }
    if stats.sent == 0 {
        bail!("event was not accepted by {}", agent.endpoint());
    }
    println!("Delivered to {}", agent.endpoint());
    Ok(())
}

/// Show only the first few characters of an API key.
fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    if visible.len() == key.len() {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
