//! CLI and daemon for the aical calendar mirror.
//!
//! Reads `config.toml`, opens the SQLite store, wires the Google gateway into
//! the sync orchestrator and runs the scheduler until a termination signal.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod signals;

pub use cli::Cli;
pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
