//! Subcommand implementations.

pub mod config;
pub mod history;
pub mod run;
pub mod sync;
pub mod users;

use std::sync::Arc;

use aical_gateway::CalendarGateway;
use aical_store::SqliteStore;
use tracing::info;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

/// Opens the configured SQLite store, creating it on first use.
pub fn open_store(config: &DaemonConfig) -> DaemonResult<Arc<SqliteStore>> {
    let path = config.store_path();
    let store = SqliteStore::open(&path)?;
    info!(path = %path.display(), "store opened");
    Ok(Arc::new(store))
}

/// Builds the provider gateway from the `[google]` section.
#[cfg(feature = "google")]
pub fn build_gateway(config: &DaemonConfig) -> DaemonResult<Arc<dyn CalendarGateway>> {
    let gateway_config = config.google.to_gateway_config()?;
    let gateway = aical_gateway::google::GoogleGateway::new(gateway_config)?;
    info!(gateway = gateway.name(), "gateway initialized");
    Ok(Arc::new(gateway))
}

#[cfg(not(feature = "google"))]
pub fn build_gateway(_config: &DaemonConfig) -> DaemonResult<Arc<dyn CalendarGateway>> {
    Err(DaemonError::config(
        "aical was built without a calendar provider; enable the `google` feature",
    ))
}

pub(crate) fn write_line<W: std::io::Write>(
    out: &mut W,
    line: impl AsRef<str>,
) -> DaemonResult<()> {
    writeln!(out, "{}", line.as_ref()).map_err(DaemonError::from)
}
