//! `aical history`: print, and optionally acknowledge, a calendar's audit trail.

use std::io::Write;
use std::sync::Arc;

use aical_core::CalendarId;
use aical_store::Store;
use aical_sync::EventHistoryService;

use super::write_line;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

pub async fn run(config: &DaemonConfig, calendar_id: &str, ack: bool) -> DaemonResult<()> {
    let store = super::open_store(config)?;
    show(store, calendar_id, ack, &mut std::io::stdout()).await
}

pub async fn show<W: Write>(
    store: Arc<dyn Store>,
    calendar_id: &str,
    ack: bool,
    out: &mut W,
) -> DaemonResult<()> {
    let calendar_id: CalendarId = calendar_id.parse().map_err(|e| {
        DaemonError::invalid_argument(format!("bad calendar id {:?}: {}", calendar_id, e))
    })?;
    let service = EventHistoryService::new(store);

    let lines = service.describe_calendar_changes(calendar_id).await?;
    if lines.is_empty() {
        return write_line(out, "no recorded changes");
    }
    for line in &lines {
        write_line(out, line)?;
    }

    if ack {
        // Rows written after the listing are purged too.
        let removed = service.delete_calendar_event_history(calendar_id).await?;
        write_line(out, format!("acknowledged {} change(s)", removed))?;
    }
    Ok(())
}
