#![cfg(not(tarpaulin_include))]

use std::path::PathBuf;

use feetrack::{app, config::Cfg};

/// Main entry point for the console server
///
/// Reads the configuration file named by the first argument (or
/// `feetrack.toml` in the working directory, or built-in defaults), then
/// serves the console until stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Cfg::load(config_path.as_deref())?;
    log::debug!("Configuration: {:?}", &cfg);

    app::run(cfg).await
}
