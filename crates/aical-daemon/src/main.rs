//! aical CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use aical_core::init_tracing;
use aical_daemon::cli::{Cli, Command, ConfigAction, UsersAction};
use aical_daemon::commands;
use aical_daemon::{DaemonConfig, DaemonResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> DaemonResult<()> {
    let config = match cli.config {
        Some(ref path) => DaemonConfig::load_from(path)?,
        None => DaemonConfig::load()?,
    };

    let daemon = matches!(cli.command, Command::Run);
    init_tracing(config.tracing_config(daemon, cli.debug)?)?;

    match cli.command {
        Command::Run => commands::run::run(&config).await,
        Command::SyncOnce => commands::sync::run(&config).await,
        Command::History { calendar_id, ack } => {
            commands::history::run(&config, &calendar_id, ack).await
        }
        Command::Users { action } => match action {
            UsersAction::Add {
                account,
                name,
                email,
                refresh_token,
            } => commands::users::add(&config, account, name, email, &refresh_token).await,
            UsersAction::List => commands::users::list(&config).await,
        },
        Command::Config { action } => {
            let mut out = std::io::stdout();
            match action {
                ConfigAction::Dump => commands::config::dump(
                    &config,
                    &commands::config::source_path(cli.config.as_deref()),
                    &mut out,
                ),
                ConfigAction::Path => commands::config::path(cli.config.as_deref(), &mut out),
            }
        }
    }
}
