//! `aical users`: seed accounts and list what is mirrored.
//!
//! Onboarding proper lives elsewhere; this is the bootstrap path for a
//! refresh token obtained out of band.

use std::io::Write;
use std::sync::Arc;

use aical_core::User;
use aical_store::{CalendarRepo, Store, UserRepo};
use tracing::info;

use super::write_line;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

pub async fn add(
    config: &DaemonConfig,
    account: String,
    name: String,
    email: String,
    refresh_token: &str,
) -> DaemonResult<()> {
    let refresh = crate::secret::resolve(refresh_token)
        .map_err(|e| DaemonError::invalid_argument(format!("refresh token: {}", e)))?;
    let store = super::open_store(config)?;
    let user = store
        .create_user(User::new(account, name, email, refresh))
        .await?;
    info!(user_id = %user.id, "user registered");
    write_line(&mut std::io::stdout(), user.id.to_string())
}

pub async fn list(config: &DaemonConfig) -> DaemonResult<()> {
    let store = super::open_store(config)?;
    print_users(store, &mut std::io::stdout()).await
}

pub async fn print_users<W: Write>(store: Arc<dyn Store>, out: &mut W) -> DaemonResult<()> {
    let users = store.list_users().await?;
    if users.is_empty() {
        return write_line(out, "no users registered");
    }
    for user in users {
        write_line(out, format!("{} {} <{}>", user.id, user.name, user.email))?;
        for calendar in store.list_calendars(user.id).await? {
            write_line(out, format!("  {} {}", calendar.id, calendar.title))?;
        }
    }
    Ok(())
}
