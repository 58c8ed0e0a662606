//! Provider-side payloads.
//!
//! These are what a calendar gateway returns. They only carry
//! provider-assigned ids; correlating them with local rows is the job of the
//! reconcilers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCalendar {
    pub external_id: String,
    pub title: String,
}

impl RemoteCalendar {
    /// Creates a remote calendar.
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
        }
    }
}

/// A concrete event instance as listed by the provider.
///
/// Recurring series arrive pre-expanded: each occurrence has its own
/// `external_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub external_id: String,
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    /// Last modification time on the provider side.
    pub updated_at: DateTime<Utc>,
}

impl RemoteEvent {
    /// Creates a timed remote event with an empty location.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            location: String::new(),
            start_time,
            end_time,
            is_all_day: false,
            updated_at,
        }
    }

    /// Builder: set location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Builder: mark as all-day.
    pub fn with_all_day(mut self, is_all_day: bool) -> Self {
        self.is_all_day = is_all_day;
        self
    }
}
