//! envoy-agent
//!
//! Stands up an echo service behind a local envoy and keeps it running until
//! interrupted.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  envoy-agent                  │
//!                    │                                               │
//!   client ──────────┼─▶ envoy :<envoy_port> ──▶ echo :<service_port>│
//!                    │   envoy admin :<admin_port>                   │
//!                    │                                               │
//!                    │   /tmp/.../envoy-<id>/envoy.json (removed on  │
//!                    │   shutdown)                                   │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use serde_json::json;

use envoy_agent::config::loader::load_config;
use envoy_agent::lifecycle::wait_for_shutdown;
use envoy_agent::observability::logging::init_logging;
use envoy_agent::Agent;

#[derive(Parser)]
#[command(name = "envoy-agent")]
#[command(about = "Run a local echo service behind envoy", long_about = None)]
struct Cli {
    /// Harness configuration file (TOML).
    #[arg(short, long, default_value = "envoy-agent.toml")]
    config: PathBuf,

    /// Override the envoy binary from the config file.
    #[arg(long)]
    envoy_binary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(binary) = cli.envoy_binary {
        config.envoy.binary = binary;
    }

    init_logging(&config.observability)?;
    tracing::info!(config = %cli.config.display(), "envoy-agent starting");

    let mut agent = Agent::with_echo_backend(config.agent, config.envoy);

    if let Err(e) = agent.start().await {
        // Unwind whatever came up before the failure.
        if let Err(stop_err) = agent.stop().await {
            tracing::error!(error = %stop_err, "Cleanup after failed start was incomplete");
        }
        return Err(e.into());
    }

    let mapping = json!({
        "service": agent.config().service_name,
        "envoy_admin_port": agent.envoy_admin_port(),
        "ports": agent.ports(),
    });
    println!("{}", serde_json::to_string_pretty(&mapping)?);

    let waited = wait_for_shutdown().await;
    agent.stop().await?;
    waited?;

    tracing::info!("Shutdown complete");
    Ok(())
}
