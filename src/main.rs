//! mmosim - multiplayer test driver for the game server

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use mmosim::logging::{self, LogLevel};
use mmosim::{Config, GameClient, Step, StepRunner};
use tracing::info;

/// Multiplayer test driver for the game server HTTP API
#[derive(Parser, Debug)]
#[command(name = "mmosim", version, about)]
struct Args {
    /// Server URL [default: http://localhost:3000]
    #[arg(long)]
    server: Option<String>,

    /// Run a specific test step
    #[arg(long, value_enum, default_value_t = Step::All)]
    step: Step,

    /// Number of players for simulation [default: 2]
    #[arg(long)]
    players: Option<u32>,

    /// Duration of simulation in seconds [default: 30]
    #[arg(long)]
    duration: Option<u64>,

    /// Set the logging level
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Maximum number of request retries [default: 3]
    #[arg(long)]
    max_retries: Option<u32>,

    /// Base delay between retries in seconds [default: 2]
    #[arg(long)]
    retry_delay: Option<f64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    /// Apply flags given on the command line over the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(players) = self.players {
            config.simulation.players = players;
        }
        if let Some(duration) = self.duration {
            config.simulation.duration_secs = duration as f64;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.retry_delay_secs = retry_delay;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init(args.log_level, args.json_logs);

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    config.validate()?;

    info!("Multiplayer test driver");
    info!("Server: {}", config.server_url);
    info!("Step: {}", args.step);

    let client = GameClient::new(&config).context("creating HTTP client")?;
    let mut runner = StepRunner::new(client, config);
    let status = runner.run(args.step).await;

    Ok(status.exit_code())
}
