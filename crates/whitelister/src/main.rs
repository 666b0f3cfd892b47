//! Whitelister command line entry point
//!
//! Loads the configuration, sets up logging and runs one command against the
//! configured game servers. Every open RCON session is closed before exit.

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{anyhow, Result};
use app::Application;
use clap::Parser;
use cli::Args;
use config::AppConfig;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Configuration comes first so logging can honor it.
    let mut config = AppConfig::load_from_file(&args.config).await?;

    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    logging::setup_logging(&config.logging)?;
    info!(
        "📂 Config: {} | Servers: {}",
        args.config.display(),
        config.servers.len()
    );

    let app = Application::new(config);
    let result = app.execute(args.command).await;
    app.shutdown().await;

    let report = result?;
    if !report.output.is_empty() {
        println!("{}", report.output);
    }

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
