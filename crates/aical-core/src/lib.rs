//! Core types: entities, audit records, diff engine, time windows, tracing

pub mod diff;
pub mod entity;
pub mod remote;
pub mod time;
pub mod tracing;

pub use diff::{DiffKind, SetDiff, diff_by_key};
pub use entity::{
    Calendar, CalendarId, ChangeType, Event, EventHistory, EventId, EventIdentity, EventSnapshot,
    EventUpdate, HistoryId, NewEvent, UnknownChangeType, User, UserId,
};
pub use remote::{RemoteCalendar, RemoteEvent};
pub use time::TimeWindow;
pub use crate::tracing::{LogFormat, TracingConfig, TracingError, init_tracing, parse_level};
