//! Calendar reconciliation.
//!
//! Makes a user's local calendars match the provider's calendar list. Titles
//! are the only mutable field; calendars carry no provider timestamp, so an
//! update is written only when the title actually changed. Deleting a
//! calendar removes its events without writing history.

use std::ops::AddAssign;
use std::sync::Arc;

use aical_core::{Calendar, RemoteCalendar, UserId, diff_by_key};
use aical_store::Store;
use tracing::{debug, info};

use crate::deadline::Deadline;
use crate::error::SyncResult;

/// Outcome counts of one calendar reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarSyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Events removed together with deleted calendars.
    pub events_removed: usize,
}

impl CalendarSyncReport {
    /// Returns true if nothing was written.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl AddAssign for CalendarSyncReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.events_removed += other.events_removed;
    }
}

/// Applies the calendar diff of one user to the store.
#[derive(Clone)]
pub struct CalendarReconciler {
    store: Arc<dyn Store>,
}

impl CalendarReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reconciles `user_id`'s calendars against `remote`.
    ///
    /// Mutations run sequentially; the first failure aborts the rest and is
    /// returned. Mutations committed before the failure stay committed.
    pub async fn reconcile(
        &self,
        user_id: UserId,
        remote: Vec<RemoteCalendar>,
        deadline: &Deadline,
    ) -> SyncResult<CalendarSyncReport> {
        deadline.check()?;
        let local = self.store.list_calendars(user_id).await?;
        let diff = diff_by_key(
            local,
            remote,
            |c: &Calendar| c.external_id.clone(),
            |r: &RemoteCalendar| r.external_id.clone(),
        );
        let mut report = CalendarSyncReport::default();

        for calendar in diff.to_delete {
            deadline.check()?;
            let removed = self.store.delete_calendar(calendar.id).await?;
            info!(
                user_id = %user_id,
                calendar_id = %calendar.id,
                external_id = %calendar.external_id,
                events_removed = removed,
                "deleted calendar"
            );
            report.deleted += 1;
            report.events_removed += removed;
        }

        for (mut calendar, remote) in diff.to_update {
            if calendar.title == remote.title {
                report.unchanged += 1;
                continue;
            }
            deadline.check()?;
            debug!(
                calendar_id = %calendar.id,
                from = %calendar.title,
                to = %remote.title,
                "renaming calendar"
            );
            calendar.title = remote.title;
            self.store.update_calendar(calendar).await?;
            report.updated += 1;
        }

        for remote in diff.to_create {
            deadline.check()?;
            let calendar = self
                .store
                .create_calendar(Calendar::new(user_id, remote.external_id, remote.title))
                .await?;
            info!(
                user_id = %user_id,
                calendar_id = %calendar.id,
                external_id = %calendar.external_id,
                "created calendar"
            );
            report.created += 1;
        }

        Ok(report)
    }
}
