//! Event reconciliation with audit trail.
//!
//! Every applied mutation goes through a store operation that writes the
//! event row and its [`EventHistory`](aical_core::EventHistory) row in one
//! transaction. Updates are gated on the provider timestamp: a remote event
//! replaces its local copy only if its `updated_at` is strictly newer.

use std::ops::AddAssign;
use std::sync::Arc;

use aical_core::{
    CalendarId, Event, EventIdentity, EventUpdate, NewEvent, RemoteEvent, diff_by_key,
};
use aical_store::Store;
use tracing::{debug, info, trace};

use crate::deadline::Deadline;
use crate::error::SyncResult;

/// Outcome counts of one event reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Matched events whose remote copy was not newer.
    pub skipped: usize,
}

impl EventSyncReport {
    /// Number of history rows written.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl AddAssign for EventSyncReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

/// Applies the event diff of one calendar to the store.
#[derive(Clone)]
pub struct EventReconciler {
    store: Arc<dyn Store>,
}

impl EventReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reconciles the events of `calendar_id` against the in-window `remote`
    /// events.
    ///
    /// Deletes run first, then updates, then creates. Processing is
    /// fail-fast: the first failing mutation aborts the remaining items.
    pub async fn reconcile(
        &self,
        calendar_id: CalendarId,
        remote: Vec<RemoteEvent>,
        deadline: &Deadline,
    ) -> SyncResult<EventSyncReport> {
        deadline.check()?;
        let local = self.store.list_events(calendar_id).await?;
        let diff = diff_by_key(local, remote, Event::identity, |r: &RemoteEvent| {
            EventIdentity::External(r.external_id.clone())
        });
        let (to_create, to_update, to_delete) = diff.counts();
        debug!(
            calendar_id = %calendar_id,
            to_create,
            to_update,
            to_delete,
            "event diff"
        );
        let mut report = EventSyncReport::default();

        for event in diff.to_delete {
            deadline.check()?;
            let history = self.store.delete_event(event.id).await?;
            info!(
                calendar_id = %calendar_id,
                event_id = %event.id,
                history_id = %history.id,
                "deleted event"
            );
            report.deleted += 1;
        }

        for (event, remote) in diff.to_update {
            if remote.updated_at <= event.updated_at {
                trace!(event_id = %event.id, "remote copy not newer, skipping");
                report.skipped += 1;
                continue;
            }
            deadline.check()?;
            let change = self
                .store
                .update_event(EventUpdate::from_remote(event.id, &remote))
                .await?;
            info!(
                calendar_id = %calendar_id,
                event_id = %change.event.id,
                history_id = %change.history.id,
                "updated event"
            );
            report.updated += 1;
        }

        for remote in diff.to_create {
            deadline.check()?;
            let change = self
                .store
                .create_event(NewEvent::from_remote(calendar_id, &remote))
                .await?;
            info!(
                calendar_id = %calendar_id,
                event_id = %change.event.id,
                external_id = %remote.external_id,
                "created event"
            );
            report.created += 1;
        }

        Ok(report)
    }
}
