//! [`CalendarGateway`] implementation for Google Calendar.

use aical_core::{RemoteCalendar, RemoteEvent, TimeWindow};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AccessCredential, BoxFuture, CalendarGateway, EventDraft};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;

const NAME: &str = "google";

/// Google Calendar gateway.
///
/// Holds no per-account state: every call carries the credential it acts
/// with, so one instance serves all users.
#[derive(Debug)]
pub struct GoogleGateway {
    client: GoogleCalendarClient,
}

impl GoogleGateway {
    /// Creates a gateway for the given configuration.
    pub fn new(config: GoogleConfig) -> GatewayResult<Self> {
        let client = GoogleCalendarClient::new(config).map_err(|e| e.with_gateway(NAME))?;
        Ok(Self { client })
    }
}

fn tag<T>(result: GatewayResult<T>) -> GatewayResult<T> {
    result.map_err(|e: GatewayError| e.with_gateway(NAME))
}

impl CalendarGateway for GoogleGateway {
    fn name(&self) -> &str {
        NAME
    }

    fn exchange_credential<'a>(
        &'a self,
        refresh_credential: &'a str,
    ) -> BoxFuture<'a, GatewayResult<AccessCredential>> {
        Box::pin(async move { tag(self.client.refresh_access(refresh_credential).await) })
    }

    fn list_calendars<'a>(
        &'a self,
        access: &'a AccessCredential,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteCalendar>>> {
        Box::pin(async move { tag(self.client.list_calendars(access).await) })
    }

    fn list_events<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            tag(self
                .client
                .list_events(access, calendar_external_id, window)
                .await)
        })
    }

    fn create_event<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, GatewayResult<RemoteEvent>> {
        Box::pin(async move {
            tag(self
                .client
                .insert_event(access, calendar_external_id, draft)
                .await)
        })
    }

    fn update_event<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        event_external_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, GatewayResult<RemoteEvent>> {
        Box::pin(async move {
            tag(self
                .client
                .patch_event(access, calendar_external_id, event_external_id, draft)
                .await)
        })
    }

    fn delete_event<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        event_external_id: &'a str,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            tag(self
                .client
                .delete_event(access, calendar_external_id, event_external_id)
                .await)
        })
    }
}
