//! Persistence contracts.
//!
//! The reconcilers talk to the store only through these traits. Every event
//! mutation and the history row describing it are committed in a single
//! transaction by the implementation: either both are visible afterwards, or
//! neither is.

use std::future::Future;
use std::pin::Pin;

use aical_core::{
    Calendar, CalendarId, Event, EventHistory, EventId, EventUpdate, NewEvent, User, UserId,
};

use crate::error::StoreResult;

/// A boxed future for async trait methods.
///
/// Boxing keeps the traits object safe so the store can be shared as
/// `Arc<dyn Store>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An event row together with the audit row written in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChange {
    pub event: Event,
    pub history: EventHistory,
}

/// Account rows.
pub trait UserRepo: Send + Sync {
    /// Inserts a user. Used by onboarding and tests.
    fn create_user(&self, user: User) -> BoxFuture<'_, StoreResult<User>>;

    fn get_user(&self, id: UserId) -> BoxFuture<'_, StoreResult<User>>;

    /// Lists all users in insertion order.
    fn list_users(&self) -> BoxFuture<'_, StoreResult<Vec<User>>>;
}

/// Calendar rows.
pub trait CalendarRepo: Send + Sync {
    /// Inserts a calendar.
    ///
    /// Fails with a conflict if the user already has a calendar with the same
    /// external id.
    fn create_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>>;

    /// Overwrites the mutable fields of an existing calendar.
    fn update_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>>;

    /// Deletes a calendar and all of its events.
    ///
    /// No history is written for the cascaded event removals. Returns the
    /// number of events removed.
    fn delete_calendar(&self, id: CalendarId) -> BoxFuture<'_, StoreResult<usize>>;

    /// Lists a user's calendars in insertion order.
    fn list_calendars(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<Calendar>>>;
}

/// Event rows and their transactional mutations.
pub trait EventRepo: Send + Sync {
    fn get_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<Event>>;

    /// Lists a calendar's events in insertion order.
    fn list_events(&self, calendar_id: CalendarId) -> BoxFuture<'_, StoreResult<Vec<Event>>>;

    /// Inserts an event and a `CREATED` history row.
    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, StoreResult<EventChange>>;

    /// Applies `update` and writes an `UPDATED` history row.
    ///
    /// The previous state recorded in the history row is read inside the same
    /// transaction as the write.
    fn update_event(&self, update: EventUpdate) -> BoxFuture<'_, StoreResult<EventChange>>;

    /// Deletes an event and writes a `DELETED` history row.
    fn delete_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<EventHistory>>;
}

/// Read and purge access to the audit trail.
pub trait EventHistoryRepo: Send + Sync {
    /// Lists a calendar's history rows ordered by change time.
    fn list_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<Vec<EventHistory>>>;

    /// Removes every history row of a calendar. Returns the number removed.
    fn delete_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<usize>>;
}

/// The full store used by the sync engine.
pub trait Store: UserRepo + CalendarRepo + EventRepo + EventHistoryRepo {}

impl<T> Store for T where T: UserRepo + CalendarRepo + EventRepo + EventHistoryRepo {}

/// Returns the change time for a new history row of one event.
///
/// History rows of an event must be ordered by change time, so the wall
/// clock is clamped to be strictly after the event's latest row.
pub fn next_change_time(
    now: chrono::DateTime<chrono::Utc>,
    latest: Option<chrono::DateTime<chrono::Utc>>,
) -> chrono::DateTime<chrono::Utc> {
    match latest {
        Some(latest) if now <= latest => latest + chrono::Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn change_time_uses_clock_when_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 5, 13, 9, 0, 0).unwrap();
        assert_eq!(next_change_time(now, None), now);
        assert_eq!(next_change_time(now, Some(now - Duration::seconds(1))), now);
    }

    #[test]
    fn change_time_never_goes_backwards() {
        let latest = Utc.with_ymd_and_hms(2024, 5, 13, 9, 0, 0).unwrap();
        let skewed = latest - Duration::minutes(5);
        let next = next_change_time(skewed, Some(latest));
        assert!(next > latest);
        assert!(next_change_time(latest, Some(latest)) > latest);
    }
}
