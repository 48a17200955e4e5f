#![cfg(not(tarpaulin_include))]

use std::path::PathBuf;
use std::sync::Arc;

use feetrack::auth::LocalAuth;
use feetrack::config::Cfg;
use feetrack::store::{DataService, LocalStore};

/// Fills the configured data directory with demo users, schools, courses and
/// payments. Takes the same optional config path as the server.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Cfg::load(config_path.as_deref())?;

    let data: Arc<dyn DataService> = Arc::new(LocalStore::open(&cfg.data_dir)?);
    let auth = LocalAuth::open(&cfg.data_dir)?;

    let report = feetrack::seed::seed(&auth, data)?;
    log::info!(
        "Seeded {} users, {} schools, {} courses, {} payments into {}",
        report.users,
        report.schools,
        report.courses,
        report.payments,
        cfg.data_dir.display()
    );

    Ok(())
}
