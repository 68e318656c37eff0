//! autostate server
//!
//! Loads the item configuration, builds a controller for every object item
//! and keeps evaluating them until interrupted.
//!
//! ```text
//! autostate [--check] [CONFIG]
//! ```
//!
//! The configuration file defaults to `$AUTOSTATE_CONFIG`, then
//! `autostate.yaml`. With `--check` the controllers are built and described
//! without being started.

mod app;

use anyhow::Result;
use app::AutoState;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG_ENV: &str = "AUTOSTATE_CONFIG";
const DEFAULT_CONFIG: &str = "autostate.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut check = false;
    let mut config = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--check" => check = true,
            _ => config = Some(PathBuf::from(arg)),
        }
    }
    let config = config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    info!(config = %config.display(), "Starting autostate");
    let app = AutoState::load(&config)?;

    if check {
        print!("{}", app.describe());
        return Ok(());
    }

    app.manager.start().await;
    info!("autostate is running with {} controllers", app.manager.len());
    for line in app.manager.cli_list().lines() {
        info!("{}", line);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    app.manager.stop();

    Ok(())
}
