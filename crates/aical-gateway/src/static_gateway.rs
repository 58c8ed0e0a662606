//! A gateway that serves canned data.
//!
//! Accounts are keyed by refresh credential. The access credential handed out
//! for an account is `access:<refresh credential>`, and calendars and events
//! are looked up by that token. Failures can be injected per operation and an
//! artificial latency applied to every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aical_core::{RemoteCalendar, RemoteEvent, TimeWindow};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AccessCredential, BoxFuture, CalendarGateway};

const NAME: &str = "static";

/// Operations whose outcome can be overridden with an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticOperation {
    ExchangeCredential,
    ListCalendars,
    ListEvents,
}

#[derive(Debug, Default)]
struct Account {
    calendars: Vec<RemoteCalendar>,
    events: HashMap<String, Vec<RemoteEvent>>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    failures: HashMap<StaticOperation, GatewayError>,
}

/// In-memory [`CalendarGateway`].
#[derive(Debug, Default)]
pub struct StaticGateway {
    state: Mutex<State>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

fn access_token(refresh_credential: &str) -> String {
    format!("access:{}", refresh_credential)
}

impl StaticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Registers an account, replacing its calendars.
    pub async fn set_calendars(&self, refresh_credential: &str, calendars: Vec<RemoteCalendar>) {
        let mut state = self.state.lock().await;
        state
            .accounts
            .entry(access_token(refresh_credential))
            .or_default()
            .calendars = calendars;
    }

    /// Replaces the events of one calendar of an account.
    pub async fn set_events(
        &self,
        refresh_credential: &str,
        calendar_external_id: &str,
        events: Vec<RemoteEvent>,
    ) {
        let mut state = self.state.lock().await;
        state
            .accounts
            .entry(access_token(refresh_credential))
            .or_default()
            .events
            .insert(calendar_external_id.to_string(), events);
    }

    /// Makes every later call of `operation` fail with `error`.
    pub async fn fail(&self, operation: StaticOperation, error: GatewayError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Returns how many gateway calls have been made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: StaticOperation) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.state.lock().await.failures.get(&operation) {
            Some(error) => Err(error.clone().with_gateway(NAME)),
            None => Ok(()),
        }
    }
}

impl CalendarGateway for StaticGateway {
    fn name(&self) -> &str {
        NAME
    }

    fn exchange_credential<'a>(
        &'a self,
        refresh_credential: &'a str,
    ) -> BoxFuture<'a, GatewayResult<AccessCredential>> {
        Box::pin(async move {
            self.enter(StaticOperation::ExchangeCredential).await?;
            let token = access_token(refresh_credential);
            if !self.state.lock().await.accounts.contains_key(&token) {
                return Err(
                    GatewayError::authentication("unknown refresh credential").with_gateway(NAME)
                );
            }
            Ok(AccessCredential::new(token, None))
        })
    }

    fn list_calendars<'a>(
        &'a self,
        access: &'a AccessCredential,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteCalendar>>> {
        Box::pin(async move {
            self.enter(StaticOperation::ListCalendars).await?;
            let state = self.state.lock().await;
            let account = state.accounts.get(access.token()).ok_or_else(|| {
                GatewayError::authentication("access credential not recognized").with_gateway(NAME)
            })?;
            Ok(account.calendars.clone())
        })
    }

    fn list_events<'a>(
        &'a self,
        access: &'a AccessCredential,
        calendar_external_id: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, GatewayResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            self.enter(StaticOperation::ListEvents).await?;
            let state = self.state.lock().await;
            let account = state.accounts.get(access.token()).ok_or_else(|| {
                GatewayError::authentication("access credential not recognized").with_gateway(NAME)
            })?;
            if !account
                .calendars
                .iter()
                .any(|c| c.external_id == calendar_external_id)
            {
                return Err(GatewayError::not_found(format!(
                    "calendar {} not found",
                    calendar_external_id
                ))
                .with_gateway(NAME));
            }
            let events: Vec<RemoteEvent> = account
                .events
                .get(calendar_external_id)
                .map(|events| {
                    events
                        .iter()
                        .filter(|e| window.overlaps(e.start_time, e.end_time))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            debug!(
                calendar = calendar_external_id,
                count = events.len(),
                "served canned events"
            );
            Ok(events)
        })
    }
}
