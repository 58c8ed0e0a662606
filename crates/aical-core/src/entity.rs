//! Mirrored entities and their audit records.
//!
//! The store owns four kinds of rows: [`User`], [`Calendar`], [`Event`] and the
//! append-only [`EventHistory`]. History rows embed [`EventSnapshot`] copies of
//! the event taken at write time, so a row stays readable after the event it
//! describes has been deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::RemoteEvent;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifier of a local [`User`] row.
    UserId
);
id_type!(
    /// Identifier of a local [`Calendar`] row.
    CalendarId
);
id_type!(
    /// Identifier of a local [`Event`] row.
    EventId
);
id_type!(
    /// Identifier of an [`EventHistory`] row.
    HistoryId
);

/// An account whose calendars are mirrored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Account identifier assigned by the calendar provider.
    pub external_account_id: String,
    pub name: String,
    pub email: String,
    /// Long-lived credential exchanged for an access credential each cycle.
    pub refresh_credential: String,
}

impl User {
    /// Creates a user with a fresh id.
    pub fn new(
        external_account_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        refresh_credential: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(),
            external_account_id: external_account_id.into(),
            name: name.into(),
            email: email.into(),
            refresh_credential: refresh_credential.into(),
        }
    }
}

// The refresh credential never ends up in logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("external_account_id", &self.external_account_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("refresh_credential", &"<redacted>")
            .finish()
    }
}

/// A calendar owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: CalendarId,
    pub user_id: UserId,
    /// Calendar identifier assigned by the provider.
    pub external_id: String,
    pub title: String,
}

impl Calendar {
    /// Creates a calendar row with a fresh id.
    pub fn new(user_id: UserId, external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: CalendarId::new(),
            user_id,
            external_id: external_id.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (external_id={})", self.title, self.external_id)
    }
}

/// The key used to correlate a local event with its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventIdentity {
    /// Provider-assigned id.
    External(String),
    /// Local id, for events that were never pushed upstream.
    Local(EventId),
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(id) => write!(f, "external:{}", id),
            Self::Local(id) => write!(f, "local:{}", id),
        }
    }
}

/// A mirrored calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub calendar_id: CalendarId,
    /// Provider-assigned id, absent until the event is first pushed upstream.
    pub external_id: Option<String>,
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub created_at: DateTime<Utc>,
    /// Last modification time as reported by the provider.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Returns the identity used when diffing against remote events.
    pub fn identity(&self) -> EventIdentity {
        match &self.external_id {
            Some(external_id) => EventIdentity::External(external_id.clone()),
            None => EventIdentity::Local(self.id),
        }
    }

    /// Copies the current field values into an audit snapshot.
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot::from(self)
    }

    /// Overwrites the mutable fields with the values of `update`.
    pub fn apply(&mut self, update: &EventUpdate) {
        self.title.clone_from(&update.title);
        self.location.clone_from(&update.location);
        self.start_time = update.start_time;
        self.end_time = update.end_time;
        self.is_all_day = update.is_all_day;
        self.updated_at = update.updated_at;
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

/// Field values for an event about to be inserted.
///
/// The store assigns the id and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub calendar_id: CalendarId,
    pub external_id: Option<String>,
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub updated_at: DateTime<Utc>,
}

impl NewEvent {
    /// Builds an insert for a remote event.
    ///
    /// `calendar_id` always comes from the caller; remote payloads do not
    /// carry local calendar ids.
    pub fn from_remote(calendar_id: CalendarId, remote: &RemoteEvent) -> Self {
        Self {
            calendar_id,
            external_id: Some(remote.external_id.clone()),
            title: remote.title.clone(),
            location: remote.location.clone(),
            start_time: remote.start_time,
            end_time: remote.end_time,
            is_all_day: remote.is_all_day,
            updated_at: remote.updated_at,
        }
    }

    /// Materializes the row the store will persist.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            calendar_id: self.calendar_id,
            external_id: self.external_id,
            title: self.title,
            location: self.location,
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
            created_at,
            updated_at: self.updated_at,
        }
    }
}

/// New field values for an existing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventUpdate {
    pub id: EventId,
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub updated_at: DateTime<Utc>,
}

impl EventUpdate {
    /// Builds an update of local event `id` from its remote counterpart.
    pub fn from_remote(id: EventId, remote: &RemoteEvent) -> Self {
        Self {
            id,
            title: remote.title.clone(),
            location: remote.location.clone(),
            start_time: remote.start_time,
            end_time: remote.end_time,
            is_all_day: remote.is_all_day,
            updated_at: remote.updated_at,
        }
    }
}

/// By-value copy of an event's fields, embedded in history rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: EventId,
    pub calendar_id: CalendarId,
    pub external_id: Option<String>,
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            calendar_id: event.calendar_id,
            external_id: event.external_id.clone(),
            title: event.title.clone(),
            location: event.location.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            is_all_day: event.is_all_day,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

impl fmt::Display for EventSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(format!("{:?}", self.title));
        }
        if let Some(ref external_id) = self.external_id {
            parts.push(format!("external_id={}", external_id));
        }
        if !self.location.is_empty() {
            parts.push(format!("location={}", self.location));
        }
        parts.push(format!("start={}", self.start_time.to_rfc3339()));
        parts.push(format!("end={}", self.end_time.to_rfc3339()));
        if self.is_all_day {
            parts.push("all_day".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Kind of mutation recorded by a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    /// Returns the persisted name of this change type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown change type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown change type: {0}")]
pub struct UnknownChangeType(pub String);

impl FromStr for ChangeType {
    type Err = UnknownChangeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            "DELETED" => Ok(Self::Deleted),
            other => Err(UnknownChangeType(other.to_string())),
        }
    }
}

/// One immutable audit row describing an applied event mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHistory {
    pub id: HistoryId,
    pub event_id: EventId,
    pub calendar_id: CalendarId,
    pub change_type: ChangeType,
    pub change_time: DateTime<Utc>,
    /// State before the change; absent for creations.
    pub prev_event: Option<EventSnapshot>,
    /// State after the change; absent for deletions.
    pub new_event: Option<EventSnapshot>,
}

impl EventHistory {
    /// Records the creation of `event`.
    pub fn created(event: &Event, change_time: DateTime<Utc>) -> Self {
        Self {
            id: HistoryId::new(),
            event_id: event.id,
            calendar_id: event.calendar_id,
            change_type: ChangeType::Created,
            change_time,
            prev_event: None,
            new_event: Some(event.snapshot()),
        }
    }

    /// Records an update from `prev` to `new`.
    pub fn updated(prev: &Event, new: &Event, change_time: DateTime<Utc>) -> Self {
        Self {
            id: HistoryId::new(),
            event_id: new.id,
            calendar_id: new.calendar_id,
            change_type: ChangeType::Updated,
            change_time,
            prev_event: Some(prev.snapshot()),
            new_event: Some(new.snapshot()),
        }
    }

    /// Records the deletion of `prev`.
    pub fn deleted(prev: &Event, change_time: DateTime<Utc>) -> Self {
        Self {
            id: HistoryId::new(),
            event_id: prev.id,
            calendar_id: prev.calendar_id,
            change_type: ChangeType::Deleted,
            change_time,
            prev_event: Some(prev.snapshot()),
            new_event: None,
        }
    }

    /// Renders the change as a single human-readable line.
    pub fn describe(&self) -> String {
        fn show(snapshot: &Option<EventSnapshot>) -> String {
            snapshot
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<missing snapshot>".to_string())
        }

        match self.change_type {
            ChangeType::Created => {
                format!("event {} created: {}", self.event_id, show(&self.new_event))
            }
            ChangeType::Updated => format!(
                "event {} updated: {} -> {}",
                self.event_id,
                show(&self.prev_event),
                show(&self.new_event)
            ),
            ChangeType::Deleted => {
                format!("event {} deleted: {}", self.event_id, show(&self.prev_event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 13, h, m, 0).unwrap()
    }

    fn sample_event() -> Event {
        let id: EventId = "6f0c9d0e-3a1b-4c55-9a25-0b9d6f3e8a11".parse().unwrap();
        let calendar_id: CalendarId = "1d2c3b4a-0000-4000-8000-000000000001".parse().unwrap();
        Event {
            id,
            calendar_id,
            external_id: Some("evt-1".to_string()),
            title: "Standup".to_string(),
            location: String::new(),
            start_time: at(9, 0),
            end_time: at(9, 15),
            is_all_day: false,
            created_at: at(8, 0),
            updated_at: at(8, 0),
        }
    }

    #[test]
    fn identity_prefers_external_id() {
        let mut event = sample_event();
        assert_eq!(event.identity(), EventIdentity::External("evt-1".to_string()));

        event.external_id = None;
        assert_eq!(event.identity(), EventIdentity::Local(event.id));
    }

    #[test]
    fn local_identity_never_equals_external() {
        let mut event = sample_event();
        event.external_id = None;
        let local = event.identity();
        let external = EventIdentity::External(event.id.to_string());
        assert_ne!(local, external);
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let mut event = sample_event();
        let snapshot = event.snapshot();
        event.title = "Changed".to_string();
        assert_eq!(snapshot.title, "Standup");
    }

    #[test]
    fn apply_update_overwrites_mutable_fields() {
        let mut event = sample_event();
        let original_id = event.id;
        let update = EventUpdate {
            id: event.id,
            title: "Standup*".to_string(),
            location: "Room 4".to_string(),
            start_time: at(10, 0),
            end_time: at(10, 30),
            is_all_day: false,
            updated_at: at(9, 30),
        };

        event.apply(&update);

        assert_eq!(event.id, original_id);
        assert_eq!(event.title, "Standup*");
        assert_eq!(event.location, "Room 4");
        assert_eq!(event.start_time, at(10, 0));
        assert_eq!(event.updated_at, at(9, 30));
        assert_eq!(event.created_at, at(8, 0));
    }

    #[test]
    fn change_type_round_trips_through_str() {
        for kind in [ChangeType::Created, ChangeType::Updated, ChangeType::Deleted] {
            assert_eq!(kind.as_str().parse::<ChangeType>().unwrap(), kind);
        }
        assert!("RENAMED".parse::<ChangeType>().is_err());
    }

    #[test]
    fn change_type_serializes_uppercase() {
        let json = serde_json::to_string(&ChangeType::Deleted).unwrap();
        assert_eq!(json, "\"DELETED\"");
    }

    #[test]
    fn user_debug_redacts_credential() {
        let user = User::new("acct-1", "Ada", "ada@example.com", "secret-refresh");
        let debug = format!("{:?}", user);
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn describe_created() {
        let event = sample_event();
        let history = EventHistory::created(&event, at(9, 0));
        insta::assert_snapshot!(
            history.describe(),
            @r#"event 6f0c9d0e-3a1b-4c55-9a25-0b9d6f3e8a11 created: "Standup", external_id=evt-1, start=2024-05-13T09:00:00+00:00, end=2024-05-13T09:15:00+00:00"#
        );
    }

    #[test]
    fn describe_updated_shows_both_sides() {
        let prev = sample_event();
        let mut new = prev.clone();
        new.title = "Standup*".to_string();
        let history = EventHistory::updated(&prev, &new, at(9, 0));

        let text = history.describe();
        assert!(text.contains("updated"));
        assert!(text.contains("\"Standup\""));
        assert!(text.contains("\"Standup*\""));
        assert_eq!(history.prev_event.unwrap().title, "Standup");
    }

    #[test]
    fn describe_deleted_uses_prev_snapshot() {
        let mut event = sample_event();
        event.location = "HQ".to_string();
        event.is_all_day = true;
        let history = EventHistory::deleted(&event, at(9, 0));

        assert!(history.new_event.is_none());
        let text = history.describe();
        assert!(text.contains("deleted"));
        assert!(text.contains("location=HQ"));
        assert!(text.ends_with("all_day"));
    }
}
