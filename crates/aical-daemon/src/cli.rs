//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// aical - mirror provider calendars into a local store
#[derive(Debug, Parser)]
#[command(name = "aical")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "AICAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sync daemon in the foreground
    Run,

    /// Run one sync cycle and exit
    SyncOnce,

    /// Print the event history of a calendar
    History {
        /// Local calendar id
        calendar_id: String,

        /// Delete the printed history afterwards
        #[arg(long)]
        ack: bool,
    },

    /// Seed and inspect mirrored accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Account actions.
#[derive(Debug, Subcommand)]
pub enum UsersAction {
    /// Register an account to mirror
    Add {
        /// Provider account identifier
        #[arg(long)]
        account: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Refresh token; `env::` and `pass::` references are resolved
        #[arg(long, env = "AICAL_REFRESH_TOKEN")]
        refresh_token: String,
    },

    /// List accounts with their mirrored calendars
    List,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration with literal secrets masked
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_with_ack() {
        let cli = Cli::parse_from(["aical", "history", "abc", "--ack"]);
        match cli.command {
            Command::History { calendar_id, ack } => {
                assert_eq!(calendar_id, "abc");
                assert!(ack);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["aical", "sync-once", "--debug", "--config", "/tmp/a.toml"]);
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.toml")));
        assert!(matches!(cli.command, Command::SyncOnce));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["aical"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
