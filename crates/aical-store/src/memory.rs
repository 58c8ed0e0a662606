//! In-memory store.
//!
//! Each operation holds the table lock for its whole duration and validates
//! before it mutates, so a failed event mutation leaves neither the event row
//! nor the history row behind. Fault injection and an operation counter make
//! it the store of choice for exercising the reconcilers.

use std::sync::atomic::{AtomicUsize, Ordering};

use aical_core::{
    Calendar, CalendarId, Event, EventHistory, EventId, EventUpdate, NewEvent, User, UserId,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    BoxFuture, CalendarRepo, EventChange, EventHistoryRepo, EventRepo, UserRepo, next_change_time,
};

const UNLIMITED: usize = usize::MAX;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    calendars: Vec<Calendar>,
    events: Vec<Event>,
    history: Vec<EventHistory>,
}

impl Tables {
    fn calendar_exists(&self, id: CalendarId) -> bool {
        self.calendars.iter().any(|c| c.id == id)
    }

    fn event_index(&self, id: EventId) -> StoreResult<usize> {
        self.events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StoreError::not_found("event", id))
    }

    fn latest_change(&self, event_id: EventId) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .filter(|h| h.event_id == event_id)
            .map(|h| h.change_time)
            .max()
    }
}

/// A store that keeps every table in memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    operations: AtomicUsize,
    event_write_budget: AtomicUsize,
    calendar_write_budget: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            operations: AtomicUsize::new(0),
            event_write_budget: AtomicUsize::new(UNLIMITED),
            calendar_write_budget: AtomicUsize::new(UNLIMITED),
        }
    }

    /// Lets the next `n` event mutations succeed and fails every one after.
    pub fn fail_event_writes_after(&self, n: usize) {
        self.event_write_budget.store(n, Ordering::SeqCst);
    }

    /// Lets the next `n` calendar mutations succeed and fails every one after.
    pub fn fail_calendar_writes_after(&self, n: usize) {
        self.calendar_write_budget.store(n, Ordering::SeqCst);
    }

    /// Removes any injected write failure.
    pub fn clear_injected_failures(&self) {
        self.event_write_budget.store(UNLIMITED, Ordering::SeqCst);
        self.calendar_write_budget.store(UNLIMITED, Ordering::SeqCst);
    }

    /// Returns how many store operations have been issued so far.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Returns the total number of history rows across all calendars.
    pub async fn history_len(&self) -> usize {
        self.tables.read().await.history.len()
    }

    fn touch(&self, operation: &'static str) {
        let n = self.operations.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(operation, n, "memory store operation");
    }

    fn consume_event_write(&self) -> StoreResult<()> {
        consume(&self.event_write_budget, "injected event write failure")
    }

    fn consume_calendar_write(&self) -> StoreResult<()> {
        consume(&self.calendar_write_budget, "injected calendar write failure")
    }
}

fn consume(budget: &AtomicUsize, failure: &'static str) -> StoreResult<()> {
    let result = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
        UNLIMITED => Some(UNLIMITED),
        0 => None,
        n => Some(n - 1),
    });
    match result {
        Ok(_) => Ok(()),
        Err(_) => Err(StoreError::backend(failure)),
    }
}

impl UserRepo for MemoryStore {
    fn create_user(&self, user: User) -> BoxFuture<'_, StoreResult<User>> {
        Box::pin(async move {
            self.touch("create_user");
            let mut tables = self.tables.write().await;
            if tables.users.iter().any(|u| u.id == user.id) {
                return Err(StoreError::conflict(format!("user {} already exists", user.id)));
            }
            if tables
                .users
                .iter()
                .any(|u| u.external_account_id == user.external_account_id)
            {
                return Err(StoreError::conflict(format!(
                    "account {} already onboarded",
                    user.external_account_id
                )));
            }
            tables.users.push(user.clone());
            Ok(user)
        })
    }

    fn get_user(&self, id: UserId) -> BoxFuture<'_, StoreResult<User>> {
        Box::pin(async move {
            self.touch("get_user");
            let tables = self.tables.read().await;
            tables
                .users
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("user", id))
        })
    }

    fn list_users(&self) -> BoxFuture<'_, StoreResult<Vec<User>>> {
        Box::pin(async move {
            self.touch("list_users");
            Ok(self.tables.read().await.users.clone())
        })
    }
}

impl CalendarRepo for MemoryStore {
    fn create_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>> {
        Box::pin(async move {
            self.touch("create_calendar");
            let mut tables = self.tables.write().await;
            if !tables.users.iter().any(|u| u.id == calendar.user_id) {
                return Err(StoreError::not_found("user", calendar.user_id));
            }
            if tables.calendars.iter().any(|c| {
                c.id == calendar.id
                    || (c.user_id == calendar.user_id && c.external_id == calendar.external_id)
            }) {
                return Err(StoreError::conflict(format!(
                    "calendar {} already exists for user {}",
                    calendar.external_id, calendar.user_id
                )));
            }
            self.consume_calendar_write()?;
            tables.calendars.push(calendar.clone());
            Ok(calendar)
        })
    }

    fn update_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>> {
        Box::pin(async move {
            self.touch("update_calendar");
            let mut tables = self.tables.write().await;
            let row = tables
                .calendars
                .iter_mut()
                .find(|c| c.id == calendar.id)
                .ok_or_else(|| StoreError::not_found("calendar", calendar.id))?;
            self.consume_calendar_write()?;
            row.title.clone_from(&calendar.title);
            Ok(row.clone())
        })
    }

    fn delete_calendar(&self, id: CalendarId) -> BoxFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            self.touch("delete_calendar");
            let mut tables = self.tables.write().await;
            if !tables.calendar_exists(id) {
                return Err(StoreError::not_found("calendar", id));
            }
            self.consume_calendar_write()?;
            tables.calendars.retain(|c| c.id != id);
            let before = tables.events.len();
            tables.events.retain(|e| e.calendar_id != id);
            let removed = before - tables.events.len();
            debug!(calendar_id = %id, removed, "deleted calendar with its events");
            Ok(removed)
        })
    }

    fn list_calendars(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<Calendar>>> {
        Box::pin(async move {
            self.touch("list_calendars");
            let tables = self.tables.read().await;
            Ok(tables
                .calendars
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect())
        })
    }
}

impl EventRepo for MemoryStore {
    fn get_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<Event>> {
        Box::pin(async move {
            self.touch("get_event");
            let tables = self.tables.read().await;
            let idx = tables.event_index(id)?;
            Ok(tables.events[idx].clone())
        })
    }

    fn list_events(&self, calendar_id: CalendarId) -> BoxFuture<'_, StoreResult<Vec<Event>>> {
        Box::pin(async move {
            self.touch("list_events");
            let tables = self.tables.read().await;
            Ok(tables
                .events
                .iter()
                .filter(|e| e.calendar_id == calendar_id)
                .cloned()
                .collect())
        })
    }

    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, StoreResult<EventChange>> {
        Box::pin(async move {
            self.touch("create_event");
            let mut tables = self.tables.write().await;
            if !tables.calendar_exists(event.calendar_id) {
                return Err(StoreError::not_found("calendar", event.calendar_id));
            }
            if let Some(ref external_id) = event.external_id
                && tables.events.iter().any(|e| {
                    e.calendar_id == event.calendar_id
                        && e.external_id.as_deref() == Some(external_id.as_str())
                })
            {
                return Err(StoreError::conflict(format!(
                    "event {} already exists in calendar {}",
                    external_id, event.calendar_id
                )));
            }
            self.consume_event_write()?;

            let now = Utc::now();
            let event = event.into_event(EventId::new(), now);
            let change_time = next_change_time(now, tables.latest_change(event.id));
            let history = EventHistory::created(&event, change_time);
            tables.events.push(event.clone());
            tables.history.push(history.clone());
            Ok(EventChange { event, history })
        })
    }

    fn update_event(&self, update: EventUpdate) -> BoxFuture<'_, StoreResult<EventChange>> {
        Box::pin(async move {
            self.touch("update_event");
            let mut tables = self.tables.write().await;
            let idx = tables.event_index(update.id)?;
            self.consume_event_write()?;

            let prev = tables.events[idx].clone();
            let mut next = prev.clone();
            next.apply(&update);
            let change_time = next_change_time(Utc::now(), tables.latest_change(prev.id));
            let history = EventHistory::updated(&prev, &next, change_time);
            tables.events[idx] = next.clone();
            tables.history.push(history.clone());
            Ok(EventChange {
                event: next,
                history,
            })
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<EventHistory>> {
        Box::pin(async move {
            self.touch("delete_event");
            let mut tables = self.tables.write().await;
            let idx = tables.event_index(id)?;
            self.consume_event_write()?;

            let change_time = next_change_time(Utc::now(), tables.latest_change(id));
            let prev = tables.events.remove(idx);
            let history = EventHistory::deleted(&prev, change_time);
            tables.history.push(history.clone());
            Ok(history)
        })
    }
}

impl EventHistoryRepo for MemoryStore {
    fn list_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<Vec<EventHistory>>> {
        Box::pin(async move {
            self.touch("list_calendar_event_history");
            let tables = self.tables.read().await;
            let mut rows: Vec<EventHistory> = tables
                .history
                .iter()
                .filter(|h| h.calendar_id == calendar_id)
                .cloned()
                .collect();
            rows.sort_by_key(|h| h.change_time);
            Ok(rows)
        })
    }

    fn delete_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            self.touch("delete_calendar_event_history");
            let mut tables = self.tables.write().await;
            let before = tables.history.len();
            tables.history.retain(|h| h.calendar_id != calendar_id);
            Ok(before - tables.history.len())
        })
    }
}
