//! SQLite-backed store.
//!
//! Timestamps are stored as nanoseconds since the epoch so that provider
//! modification times read back exactly as written. History snapshots are
//! JSON text. Each event mutation runs in one transaction that also reads the
//! pre-image and writes the history row.
//!
//! rusqlite is blocking; every call runs on tokio's blocking pool.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use aical_core::{
    Calendar, CalendarId, ChangeType, Event, EventHistory, EventId, EventSnapshot, EventUpdate,
    HistoryId, NewEvent, User, UserId,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    BoxFuture, CalendarRepo, EventChange, EventHistoryRepo, EventRepo, UserRepo, next_change_time,
};

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        external_account_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        refresh_credential TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS calendars (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        external_id TEXT NOT NULL,
        title TEXT NOT NULL,
        UNIQUE (user_id, external_id)
    );

    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
        external_id TEXT,
        title TEXT NOT NULL,
        location TEXT NOT NULL,
        start_ns INTEGER NOT NULL,
        end_ns INTEGER NOT NULL,
        is_all_day INTEGER NOT NULL,
        created_ns INTEGER NOT NULL,
        updated_ns INTEGER NOT NULL,
        UNIQUE (calendar_id, external_id)
    );

    CREATE TABLE IF NOT EXISTS event_history (
        id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL,
        calendar_id TEXT NOT NULL,
        change_type TEXT NOT NULL,
        change_time_ns INTEGER NOT NULL,
        prev_event TEXT,
        new_event TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_events_calendar ON events(calendar_id);
    CREATE INDEX IF NOT EXISTS idx_history_calendar ON event_history(calendar_id);
    CREATE INDEX IF NOT EXISTS idx_history_event ON event_history(event_id);
"#;

const EVENT_COLUMNS: &str = "id, calendar_id, external_id, title, location, start_ns, end_ns, \
                             is_all_day, created_ns, updated_ns";

const HISTORY_COLUMNS: &str =
    "id, event_id, calendar_id, change_type, change_time_ns, prev_event, new_event";

/// A store persisted in a single SQLite database file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                message: format!("failed to create {}", parent.display()),
                source: Some(Box::new(e)),
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    fn with_conn<T, F>(&self, f: F) -> BoxFuture<'static, StoreResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = conn
                    .lock()
                    .map_err(|_| StoreError::backend("sqlite connection mutex poisoned"))?;
                f(&mut conn)
            })
            .await
            .map_err(|e| StoreError::Backend {
                message: "sqlite task failed".to_string(),
                source: Some(Box::new(e)),
            })?
        })
    }
}

fn to_nanos(t: DateTime<Utc>) -> StoreResult<i64> {
    t.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::backend(format!("timestamp out of range: {}", t)))
}

fn from_nanos(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}

fn parse_text<T>(idx: usize, text: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_snapshot(idx: usize, json: Option<String>) -> rusqlite::Result<Option<EventSnapshot>> {
    json.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_text(0, row.get(0)?)?,
        external_account_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        refresh_credential: row.get(4)?,
    })
}

fn calendar_from_row(row: &Row<'_>) -> rusqlite::Result<Calendar> {
    Ok(Calendar {
        id: parse_text(0, row.get(0)?)?,
        user_id: parse_text(1, row.get(1)?)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: parse_text(0, row.get(0)?)?,
        calendar_id: parse_text(1, row.get(1)?)?,
        external_id: row.get(2)?,
        title: row.get(3)?,
        location: row.get(4)?,
        start_time: from_nanos(row.get(5)?),
        end_time: from_nanos(row.get(6)?),
        is_all_day: row.get(7)?,
        created_at: from_nanos(row.get(8)?),
        updated_at: from_nanos(row.get(9)?),
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<EventHistory> {
    Ok(EventHistory {
        id: parse_text::<HistoryId>(0, row.get(0)?)?,
        event_id: parse_text(1, row.get(1)?)?,
        calendar_id: parse_text(2, row.get(2)?)?,
        change_type: parse_text::<ChangeType>(3, row.get(3)?)?,
        change_time: from_nanos(row.get(4)?),
        prev_event: parse_snapshot(5, row.get(5)?)?,
        new_event: parse_snapshot(6, row.get(6)?)?,
    })
}

fn find_event(tx: &Transaction<'_>, id: EventId) -> StoreResult<Event> {
    tx.query_row(
        &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
        params![id.to_string()],
        event_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("event", id))
}

fn latest_change(tx: &Transaction<'_>, event_id: EventId) -> StoreResult<Option<DateTime<Utc>>> {
    let latest: Option<i64> = tx.query_row(
        "SELECT MAX(change_time_ns) FROM event_history WHERE event_id = ?1",
        params![event_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(latest.map(from_nanos))
}

fn insert_history(tx: &Transaction<'_>, history: &EventHistory) -> StoreResult<()> {
    let prev = history
        .prev_event
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let new = history
        .new_event
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    tx.execute(
        &format!(
            "INSERT INTO event_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            HISTORY_COLUMNS
        ),
        params![
            history.id.to_string(),
            history.event_id.to_string(),
            history.calendar_id.to_string(),
            history.change_type.as_str(),
            to_nanos(history.change_time)?,
            prev,
            new,
        ],
    )?;
    Ok(())
}

fn write_event(tx: &Transaction<'_>, sql: &str, event: &Event) -> StoreResult<()> {
    tx.execute(
        sql,
        params![
            event.id.to_string(),
            event.calendar_id.to_string(),
            event.external_id,
            event.title,
            event.location,
            to_nanos(event.start_time)?,
            to_nanos(event.end_time)?,
            event.is_all_day,
            to_nanos(event.created_at)?,
            to_nanos(event.updated_at)?,
        ],
    )?;
    Ok(())
}

impl UserRepo for SqliteStore {
    fn create_user(&self, user: User) -> BoxFuture<'_, StoreResult<User>> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, external_account_id, name, email, refresh_credential) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.to_string(),
                    user.external_account_id,
                    user.name,
                    user.email,
                    user.refresh_credential,
                ],
            )?;
            Ok(user)
        })
    }

    fn get_user(&self, id: UserId) -> BoxFuture<'_, StoreResult<User>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, external_account_id, name, email, refresh_credential \
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("user", id))
        })
    }

    fn list_users(&self) -> BoxFuture<'_, StoreResult<Vec<User>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, external_account_id, name, email, refresh_credential \
                 FROM users ORDER BY rowid",
            )?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }
}

impl CalendarRepo for SqliteStore {
    fn create_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let owner: Option<String> = tx
                .query_row(
                    "SELECT id FROM users WHERE id = ?1",
                    params![calendar.user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.is_none() {
                return Err(StoreError::not_found("user", calendar.user_id));
            }
            tx.execute(
                "INSERT INTO calendars (id, user_id, external_id, title) VALUES (?1, ?2, ?3, ?4)",
                params![
                    calendar.id.to_string(),
                    calendar.user_id.to_string(),
                    calendar.external_id,
                    calendar.title,
                ],
            )?;
            tx.commit()?;
            Ok(calendar)
        })
    }

    fn update_calendar(&self, calendar: Calendar) -> BoxFuture<'_, StoreResult<Calendar>> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE calendars SET title = ?2 WHERE id = ?1",
                params![calendar.id.to_string(), calendar.title],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("calendar", calendar.id));
            }
            conn.query_row(
                "SELECT id, user_id, external_id, title FROM calendars WHERE id = ?1",
                params![calendar.id.to_string()],
                calendar_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    fn delete_calendar(&self, id: CalendarId) -> BoxFuture<'_, StoreResult<usize>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM events WHERE calendar_id = ?1",
                params![id.to_string()],
            )?;
            let deleted =
                tx.execute("DELETE FROM calendars WHERE id = ?1", params![id.to_string()])?;
            if deleted == 0 {
                return Err(StoreError::not_found("calendar", id));
            }
            tx.commit()?;
            debug!(calendar_id = %id, removed, "deleted calendar with its events");
            Ok(removed)
        })
    }

    fn list_calendars(&self, user_id: UserId) -> BoxFuture<'_, StoreResult<Vec<Calendar>>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, external_id, title FROM calendars \
                 WHERE user_id = ?1 ORDER BY rowid",
            )?;
            let calendars = stmt
                .query_map(params![user_id.to_string()], calendar_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(calendars)
        })
    }
}

impl EventRepo for SqliteStore {
    fn get_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<Event>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            find_event(&tx, id)
        })
    }

    fn list_events(&self, calendar_id: CalendarId) -> BoxFuture<'_, StoreResult<Vec<Event>>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events WHERE calendar_id = ?1 ORDER BY rowid",
                EVENT_COLUMNS
            ))?;
            let events = stmt
                .query_map(params![calendar_id.to_string()], event_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, StoreResult<EventChange>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let calendar: Option<String> = tx
                .query_row(
                    "SELECT id FROM calendars WHERE id = ?1",
                    params![event.calendar_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if calendar.is_none() {
                return Err(StoreError::not_found("calendar", event.calendar_id));
            }

            let now = Utc::now();
            let event = event.into_event(EventId::new(), now);
            write_event(
                &tx,
                &format!(
                    "INSERT INTO events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    EVENT_COLUMNS
                ),
                &event,
            )?;
            let change_time = next_change_time(now, latest_change(&tx, event.id)?);
            let history = EventHistory::created(&event, change_time);
            insert_history(&tx, &history)?;
            tx.commit()?;
            Ok(EventChange { event, history })
        })
    }

    fn update_event(&self, update: EventUpdate) -> BoxFuture<'_, StoreResult<EventChange>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let prev = find_event(&tx, update.id)?;
            let mut next = prev.clone();
            next.apply(&update);

            tx.execute(
                "UPDATE events SET title = ?2, location = ?3, start_ns = ?4, end_ns = ?5, \
                 is_all_day = ?6, updated_ns = ?7 WHERE id = ?1",
                params![
                    next.id.to_string(),
                    next.title,
                    next.location,
                    to_nanos(next.start_time)?,
                    to_nanos(next.end_time)?,
                    next.is_all_day,
                    to_nanos(next.updated_at)?,
                ],
            )?;
            let change_time = next_change_time(Utc::now(), latest_change(&tx, prev.id)?);
            let history = EventHistory::updated(&prev, &next, change_time);
            insert_history(&tx, &history)?;
            tx.commit()?;
            Ok(EventChange {
                event: next,
                history,
            })
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<EventHistory>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let prev = find_event(&tx, id)?;
            tx.execute("DELETE FROM events WHERE id = ?1", params![id.to_string()])?;
            let change_time = next_change_time(Utc::now(), latest_change(&tx, id)?);
            let history = EventHistory::deleted(&prev, change_time);
            insert_history(&tx, &history)?;
            tx.commit()?;
            Ok(history)
        })
    }
}

impl EventHistoryRepo for SqliteStore {
    fn list_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<Vec<EventHistory>>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM event_history WHERE calendar_id = ?1 \
                 ORDER BY change_time_ns, rowid",
                HISTORY_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![calendar_id.to_string()], history_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn delete_calendar_event_history(
        &self,
        calendar_id: CalendarId,
    ) -> BoxFuture<'_, StoreResult<usize>> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM event_history WHERE calendar_id = ?1",
                params![calendar_id.to_string()],
            )?;
            Ok(removed)
        })
    }
}
