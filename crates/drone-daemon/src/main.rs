//! Drone Daemon - fleet convergence controller
//!
//! The daemon provides:
//! - Swarm and Drone reconcilers over an in-memory cluster store
//! - A scheduler simulator so the cluster converges end to end
//! - Structured logging of every reconciler decision

use clap::Parser;
use drone_controller::StrategyKind;
use drone_daemon::{Daemon, DaemonConfig, DaemonError, DaemonResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Drone Daemon CLI
#[derive(Parser)]
#[command(name = "droned")]
#[command(about = "Drone Daemon - fleet convergence controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DRONE_CONFIG")]
    config: Option<String>,

    /// Workload strategy (pod-per-node or replicated)
    #[arg(short, long, env = "DRONE_STRATEGY")]
    strategy: Option<String>,

    /// Log level
    #[arg(long, env = "DRONE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DRONE_LOG_JSON")]
    json: bool,

    /// Do not run the scheduler simulator
    #[arg(long)]
    no_simulator: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(strategy) = cli.strategy.as_deref() {
        config.controller.strategy = strategy.parse::<StrategyKind>()?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.no_simulator {
        config.simulator.enabled = false;
    }

    if cli.print_config {
        let rendered = serde_json::to_string_pretty(&config)
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        strategy = %config.controller.strategy,
        workers = config.runtime.workers,
        "Starting drone daemon"
    );

    let daemon = Daemon::new(config)?;
    daemon.run().await
}
