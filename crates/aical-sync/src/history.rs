//! Read and acknowledge access to the event audit trail.

use std::sync::Arc;

use aical_core::{CalendarId, EventHistory};
use aical_store::Store;
use tracing::info;

use crate::error::SyncResult;

/// Consumer-facing view of a calendar's event history.
#[derive(Clone)]
pub struct EventHistoryService {
    store: Arc<dyn Store>,
}

impl EventHistoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the calendar's history rows, oldest change first.
    ///
    /// Rows outlive the events and calendars they mention.
    pub async fn list_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> SyncResult<Vec<EventHistory>> {
        Ok(self.store.list_calendar_event_history(calendar_id).await?)
    }

    /// Purges the calendar's history once a consumer has processed it.
    pub async fn delete_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> SyncResult<usize> {
        let removed = self.store.delete_calendar_event_history(calendar_id).await?;
        info!(calendar_id = %calendar_id, removed, "acknowledged event history");
        Ok(removed)
    }

    /// Renders each history row as one line.
    pub async fn describe_calendar_changes(
        &self,
        calendar_id: CalendarId,
    ) -> SyncResult<Vec<String>> {
        let rows = self.list_calendar_event_history(calendar_id).await?;
        Ok(rows.iter().map(EventHistory::describe).collect())
    }
}
