//! CalendarGateway trait definition.
//!
//! A gateway is the only path to the remote calendar provider. Reconciliation
//! uses the read side: credential exchange, calendar listing and windowed
//! event listing. The write side exists for event planning and is optional.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use aical_core::{RemoteCalendar, RemoteEvent, TimeWindow};
use chrono::{DateTime, Utc};

use crate::error::{GatewayError, GatewayResult};

/// A boxed future for async trait methods.
///
/// Boxing keeps the trait object safe, so gateways can be shared as
/// `Arc<dyn CalendarGateway>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Short-lived credential obtained from a user's refresh credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessCredential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Returns the bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the credential is known to be expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Field values for an event pushed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
}

impl EventDraft {
    pub fn new(
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            location: String::new(),
            start_time,
            end_time,
            is_all_day: false,
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

/// The contract the sync engine needs from a calendar provider.
///
/// # Implementation Notes
///
/// - `list_events` returns concrete instances: recurring series are expanded
///   and every instance carries its own external id.
/// - Only events overlapping the requested window are returned.
/// - Pagination is handled internally.
pub trait CalendarGateway: Send + Sync {
    /// Returns the name of this gateway (e.g., "google", "static").
    fn name(&self) -> &str;

    /// Exchanges a long-lived refresh credential for an access credential.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the provider rejects the
    /// credential.
    fn exchange_credential<'a>(
        &'a self,
        refresh_credential: &'a str,
    ) -> BoxFuture<'a, GatewayResult<AccessCredential>>;

    /// Lists the calendars visible to the account.
    fn list_calendars<'a>(
        &'a self,
        access: &'a AccessCredential,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteCalendar>>>;

    /// Lists event instances of one calendar within `window`.
    fn list_events<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteEvent>>>;

    /// Creates an event upstream.
    ///
    /// The default implementation reports an unsupported operation.
    fn create_event<'a>(
        &'a self,
        _access: &'a AccessCredential,
        _calendar_external_id: &'a str,
        _draft: &'a EventDraft,
    ) -> BoxFuture<'a, GatewayResult<RemoteEvent>> {
        let error = GatewayError::unsupported("create_event").with_gateway(self.name());
        Box::pin(async move { Err(error) })
    }

    /// Overwrites an upstream event.
    ///
    /// The default implementation reports an unsupported operation.
    fn update_event<'a>(
        &'a self,
        _access: &'a AccessCredential,
        _calendar_external_id: &'a str,
        _event_external_id: &'a str,
        _draft: &'a EventDraft,
    ) -> BoxFuture<'a, GatewayResult<RemoteEvent>> {
        let error = GatewayError::unsupported("update_event").with_gateway(self.name());
        Box::pin(async move { Err(error) })
    }

    /// Deletes an upstream event.
    ///
    /// The default implementation reports an unsupported operation.
    fn delete_event<'a>(
        &'a self,
        _access: &'a AccessCredential,
        _calendar_external_id: &'a str,
        _event_external_id: &'a str,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        let error = GatewayError::unsupported("delete_event").with_gateway(self.name());
        Box::pin(async move { Err(error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn access_credential_debug_is_redacted() {
        let access = AccessCredential::new("ya29.secret", None);
        let debug = format!("{:?}", access);
        assert!(!debug.contains("ya29.secret"));
        assert_eq!(access.token(), "ya29.secret");
    }

    #[test]
    fn access_credential_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 5, 13, 9, 0, 0).unwrap();
        let access = AccessCredential::new("t", Some(now + Duration::minutes(5)));
        assert!(!access.is_expired_at(now));
        assert!(access.is_expired_at(now + Duration::minutes(5)));
        assert!(!AccessCredential::new("t", None).is_expired_at(now));
    }

    #[test]
    fn event_draft_builder() {
        let start = Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap();
        let draft = EventDraft::new("Offsite", start, start + Duration::days(1))
            .with_location("Lisbon")
            .with_all_day(true);
        assert_eq!(draft.location, "Lisbon");
        assert!(draft.is_all_day);
    }
}
