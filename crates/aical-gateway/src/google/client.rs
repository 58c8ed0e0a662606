//! Google Calendar API client.
//!
//! Low-level HTTP access to the token endpoint and the Calendar API v3:
//! request building, pagination, status mapping and payload conversion.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use aical_core::{RemoteCalendar, RemoteEvent, TimeWindow};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AccessCredential, EventDraft};

use super::config::GoogleConfig;

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    config: GoogleConfig,
    api_base: String,
}

impl GoogleCalendarClient {
    /// Creates a client for a validated configuration.
    pub fn new(config: GoogleConfig) -> GatewayResult<Self> {
        config.validate().map_err(GatewayError::internal)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::internal("failed to create HTTP client").with_source(e))?;
        let api_base = config.api_base.trim_end_matches('/').to_string();
        Ok(Self {
            http_client,
            config,
            api_base,
        })
    }

    /// Runs the refresh-token grant.
    pub async fn refresh_access(&self, refresh_token: &str) -> GatewayResult<AccessCredential> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error("token refresh request failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("failed to read response", e))?;

        // The token endpoint answers 400 invalid_grant for revoked credentials.
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(GatewayError::authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(status_error(status, &body, None));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::invalid_response(format!("invalid token response: {}", e))
        })?;

        info!("refreshed access token");
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        Ok(AccessCredential::new(token.access_token, expires_at))
    }

    /// Lists every calendar of the account, following pagination.
    pub async fn list_calendars(
        &self,
        access: &AccessCredential,
    ) -> GatewayResult<Vec<RemoteCalendar>> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access.token())
                .query(&[("maxResults", self.config.page_size.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let body = self.send(request).await?;
            let page: CalendarListResponse = parse_body(&body)?;
            calendars.extend(
                page.items
                    .into_iter()
                    .map(|c| RemoteCalendar::new(c.id, c.summary.unwrap_or_default())),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = calendars.len(), "fetched calendar list");
        Ok(calendars)
    }

    /// Lists event instances of a calendar inside `window`.
    ///
    /// Recurring series are expanded server-side; cancelled instances are
    /// dropped. An instance missing its id or a time fails the whole listing,
    /// since leaving it out would read as a remote deletion.
    pub async fn list_events(
        &self,
        access: &AccessCredential,
        calendar_id: &str,
        window: TimeWindow,
    ) -> GatewayResult<Vec<RemoteEvent>> {
        let url = self.events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access.token())
                .query(&[
                    ("timeMin", window.start.to_rfc3339()),
                    ("timeMax", window.end.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", self.config.page_size.to_string()),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let body = self.send(request).await?;
            let page: EventListResponse = parse_body(&body)?;
            for item in page.items {
                if let Some(event) = convert_event(item)? {
                    events.push(event);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = calendar_id, count = events.len(), "fetched events");
        Ok(events)
    }

    /// Inserts an event.
    pub async fn insert_event(
        &self,
        access: &AccessCredential,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> GatewayResult<RemoteEvent> {
        let request = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(access.token());
        self.write_event(request, draft).await
    }

    /// Patches the fields of an existing event.
    pub async fn patch_event(
        &self,
        access: &AccessCredential,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> GatewayResult<RemoteEvent> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        let request = self.http_client.patch(url).bearer_auth(access.token());
        self.write_event(request, draft).await
    }

    /// Deletes an event.
    pub async fn delete_event(
        &self,
        access: &AccessCredential,
        calendar_id: &str,
        event_id: &str,
    ) -> GatewayResult<()> {
        let url = format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        );
        let request = self.http_client.delete(url).bearer_auth(access.token());
        self.send(request).await?;
        Ok(())
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    async fn write_event(
        &self,
        request: reqwest::RequestBuilder,
        draft: &EventDraft,
    ) -> GatewayResult<RemoteEvent> {
        let payload = serde_json::to_string(&ApiEventWrite::from(draft))
            .map_err(|e| GatewayError::internal("failed to encode event").with_source(e))?;
        let request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        let body = self.send(request).await?;
        let event: ApiEvent = parse_body(&body)?;
        convert_event(event)?
            .ok_or_else(|| GatewayError::invalid_response("provider returned a cancelled event"))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> GatewayResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, retry_after));
        }

        response
            .text()
            .await
            .map_err(|e| transport_error("failed to read response", e))
    }
}

fn transport_error(context: &str, err: reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("{}: timeout", context)
    } else if err.is_connect() {
        format!("{}: connection failed", context)
    } else {
        context.to_string()
    };
    GatewayError::network(message).with_source(err)
}

/// Maps a non-success HTTP status to a gateway error.
fn status_error(status: reqwest::StatusCode, body: &str, retry_after: Option<u64>) -> GatewayError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED => {
            GatewayError::authentication("access token expired or invalid")
        }
        reqwest::StatusCode::FORBIDDEN => GatewayError::authorization("access denied"),
        reqwest::StatusCode::NOT_FOUND => GatewayError::not_found(format!("not found: {}", body)),
        reqwest::StatusCode::TOO_MANY_REQUESTS => GatewayError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        _ => GatewayError::server(format!("API error ({}): {}", status, body)),
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> GatewayResult<T> {
    serde_json::from_str(body)
        .map_err(|e| GatewayError::invalid_response(format!("failed to parse response: {}", e)))
}

fn parse_time(time: &ApiEventTime) -> Result<(DateTime<Utc>, bool), String> {
    match (&time.date_time, &time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
            .map(|parsed| (parsed.with_timezone(&Utc), false))
            .map_err(|e| format!("bad dateTime {:?}: {}", dt, e)),
        (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|parsed| (parsed.and_time(NaiveTime::MIN).and_utc(), true))
            .map_err(|e| format!("bad date {:?}: {}", date, e)),
        (None, None) => Err("missing".to_string()),
    }
}

/// Converts an API event. Cancelled instances yield `None`.
fn convert_event(event: ApiEvent) -> GatewayResult<Option<RemoteEvent>> {
    if event.status.as_deref() == Some("cancelled") {
        return Ok(None);
    }

    let Some(id) = event.id else {
        return Err(GatewayError::invalid_response("event without id"));
    };
    let malformed = |field: &str, reason: String| {
        warn!(event = %id, field, %reason, "malformed event");
        GatewayError::invalid_response(format!("event {}: {} {}", id, field, reason))
    };
    let (start_time, is_all_day) = parse_time(&event.start).map_err(|e| malformed("start", e))?;
    let (end_time, _) = parse_time(&event.end).map_err(|e| malformed("end", e))?;
    let updated_at = match event.updated.as_deref() {
        Some(updated) => DateTime::parse_from_rfc3339(updated)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|e| malformed("updated", e.to_string()))?,
        None => return Err(malformed("updated", "missing".to_string())),
    };

    Ok(Some(
        RemoteEvent::new(id, event.summary.unwrap_or_default(), start_time, end_time, updated_at)
            .with_location(event.location.unwrap_or_default())
            .with_all_day(is_all_day),
    ))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    status: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiEventWrite {
    summary: String,
    location: String,
    start: ApiEventTime,
    end: ApiEventTime,
}

impl From<&EventDraft> for ApiEventWrite {
    fn from(draft: &EventDraft) -> Self {
        let time = |t: DateTime<Utc>| {
            if draft.is_all_day {
                ApiEventTime {
                    date: Some(t.date_naive().format("%Y-%m-%d").to_string()),
                    date_time: None,
                }
            } else {
                ApiEventTime {
                    date: None,
                    date_time: Some(t.to_rfc3339()),
                }
            }
        };
        Self {
            summary: draft.title.clone(),
            location: draft.location.clone(),
            start: time(draft.start_time),
            end: time(draft.end_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorCode;
    use chrono::TimeZone;

    fn api_event(json: &str) -> ApiEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_event_list_response() {
        let json = r#"{
            "items": [
                {
                    "id": "event1",
                    "summary": "Test Meeting",
                    "location": "Room 1",
                    "start": { "dateTime": "2024-03-15T10:00:00Z" },
                    "end": { "dateTime": "2024-03-15T11:00:00Z" },
                    "status": "confirmed",
                    "updated": "2024-03-01T08:30:00.000Z"
                }
            ],
            "nextPageToken": "page-2"
        }"#;

        let page: EventListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));

        let events: Vec<_> = page
            .items
            .into_iter()
            .filter_map(|e| convert_event(e).unwrap())
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Test Meeting");
        assert_eq!(events[0].location, "Room 1");
        assert!(!events[0].is_all_day);
        assert_eq!(
            events[0].updated_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn all_day_event_from_date() {
        let event = convert_event(api_event(
            r#"{
                "id": "e",
                "summary": "Holiday",
                "start": { "date": "2024-03-15" },
                "end": { "date": "2024-03-16" },
                "updated": "2024-03-01T00:00:00Z"
            }"#,
        ))
        .unwrap()
        .unwrap();

        assert!(event.is_all_day);
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(event.end_time - event.start_time, Duration::days(1));
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let cancelled = api_event(
            r#"{
                "id": "e", "status": "cancelled",
                "start": { "dateTime": "2024-03-15T10:00:00Z" },
                "end": { "dateTime": "2024-03-15T11:00:00Z" },
                "updated": "2024-03-01T00:00:00Z"
            }"#,
        );
        assert!(convert_event(cancelled).unwrap().is_none());

        // Cancelled instances carry only an id and status.
        let bare = api_event(r#"{ "id": "e", "status": "cancelled" }"#);
        assert!(convert_event(bare).unwrap().is_none());
    }

    #[test]
    fn malformed_events_are_errors() {
        let cases = [
            r#"{
                "id": "e",
                "start": { "dateTime": "2024-03-15T10:00:00Z" },
                "end": { "dateTime": "2024-03-15T11:00:00Z" }
            }"#,
            r#"{ "id": "e", "updated": "2024-03-01T00:00:00Z" }"#,
            r#"{
                "start": { "dateTime": "2024-03-15T10:00:00Z" },
                "end": { "dateTime": "2024-03-15T11:00:00Z" },
                "updated": "2024-03-01T00:00:00Z"
            }"#,
            r#"{
                "id": "e",
                "start": { "dateTime": "tomorrow" },
                "end": { "dateTime": "2024-03-15T11:00:00Z" },
                "updated": "2024-03-01T00:00:00Z"
            }"#,
        ];

        for json in cases {
            let err = convert_event(api_event(json)).unwrap_err();
            assert_eq!(err.code(), GatewayErrorCode::InvalidResponse, "{}", json);
        }
    }

    #[test]
    fn parse_calendar_list() {
        let json = r#"{
            "items": [
                { "id": "primary", "summary": "My Calendar", "primary": true },
                { "id": "work@example.com" }
            ]
        }"#;

        let page: CalendarListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_page_token.is_none());
        assert!(page.items[1].summary.is_none());
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        let code = |status| status_error(status, "", None).code();
        assert_eq!(code(StatusCode::UNAUTHORIZED), GatewayErrorCode::AuthenticationFailed);
        assert_eq!(code(StatusCode::FORBIDDEN), GatewayErrorCode::AuthorizationFailed);
        assert_eq!(code(StatusCode::NOT_FOUND), GatewayErrorCode::NotFound);
        assert_eq!(code(StatusCode::TOO_MANY_REQUESTS), GatewayErrorCode::RateLimited);
        assert_eq!(code(StatusCode::BAD_GATEWAY), GatewayErrorCode::ServerError);

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "", Some(30));
        assert!(limited.message().contains("retry after 30 seconds"));
    }

    #[test]
    fn write_payload_shapes() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let timed = EventDraft::new("Sync", start, start + Duration::hours(1));
        let json = serde_json::to_value(ApiEventWrite::from(&timed)).unwrap();
        assert_eq!(json["start"]["dateTime"], "2024-03-15T10:00:00+00:00");
        assert!(json["start"].get("date").is_none());

        let all_day = timed.with_all_day(true);
        let json = serde_json::to_value(ApiEventWrite::from(&all_day)).unwrap();
        assert_eq!(json["start"]["date"], "2024-03-15");
    }

    mod http {
        use super::*;
        use crate::google::OAuthCredentials;
        use wiremock::matchers::{
            body_string_contains, header, method, path, query_param, query_param_is_missing,
        };
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client(server: &MockServer) -> GoogleCalendarClient {
            let config = GoogleConfig::new(OAuthCredentials::new(
                "123.apps.googleusercontent.com",
                "shh",
            ))
            .with_api_base(server.uri())
            .with_token_url(format!("{}/token", server.uri()))
            .with_page_size(2);
            GoogleCalendarClient::new(config).unwrap()
        }

        fn access() -> AccessCredential {
            AccessCredential::new("tok", None)
        }

        fn window() -> TimeWindow {
            let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
            TimeWindow::rolling_fortnight(now, &Utc)
        }

        fn event_json(id: &str) -> serde_json::Value {
            serde_json::json!({
                "id": id,
                "summary": format!("Meeting {}", id),
                "start": { "dateTime": "2024-03-15T10:00:00Z" },
                "end": { "dateTime": "2024-03-15T11:00:00Z" },
                "updated": "2024-03-01T08:30:00.123456789Z"
            })
        }

        #[tokio::test]
        async fn list_events_follows_page_tokens() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/calendars/work/events"))
                .and(header("authorization", "Bearer tok"))
                .and(query_param("singleEvents", "true"))
                .and(query_param("maxResults", "2"))
                .and(query_param_is_missing("pageToken"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": [event_json("e1"), event_json("e2")],
                    "nextPageToken": "p2"
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/calendars/work/events"))
                .and(query_param("pageToken", "p2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": [
                        event_json("e3"),
                        { "id": "gone", "status": "cancelled" }
                    ]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let events = client(&server)
                .list_events(&access(), "work", window())
                .await
                .unwrap();

            let ids: Vec<_> = events.iter().map(|e| e.external_id.as_str()).collect();
            assert_eq!(ids, ["e1", "e2", "e3"]);
            assert_eq!(events[0].updated_at.timestamp_subsec_nanos(), 123_456_789);
        }

        #[tokio::test]
        async fn malformed_event_fails_the_listing() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/calendars/work/events"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": [
                        event_json("e1"),
                        { "id": "e2", "start": { "dateTime": "2024-03-15T10:00:00Z" } }
                    ]
                })))
                .mount(&server)
                .await;

            let err = client(&server)
                .list_events(&access(), "work", window())
                .await
                .unwrap_err();

            assert_eq!(err.code(), GatewayErrorCode::InvalidResponse);
            assert!(err.message().contains("e2"));
        }

        #[tokio::test]
        async fn list_calendars_follows_page_tokens() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/users/me/calendarList"))
                .and(query_param_is_missing("pageToken"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": [{ "id": "primary", "summary": "Me" }],
                    "nextPageToken": "next"
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/users/me/calendarList"))
                .and(query_param("pageToken", "next"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": [{ "id": "team@example.com" }]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let calendars = client(&server).list_calendars(&access()).await.unwrap();

            assert_eq!(
                calendars,
                vec![
                    RemoteCalendar::new("primary", "Me"),
                    RemoteCalendar::new("team@example.com", ""),
                ]
            );
        }

        #[tokio::test]
        async fn refresh_grant_returns_access_token() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/token"))
                .and(body_string_contains("grant_type=refresh_token"))
                .and(body_string_contains("refresh_token=r1"))
                .and(body_string_contains("client_id=123.apps.googleusercontent.com"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "fresh",
                    "expires_in": 3600,
                    "token_type": "Bearer"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let access = client(&server).refresh_access("r1").await.unwrap();

            assert_eq!(access.token(), "fresh");
            assert!(access.expires_at().is_some_and(|at| at > Utc::now()));
        }

        #[tokio::test]
        async fn invalid_grant_is_an_authentication_failure() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/token"))
                .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Token has been expired or revoked."
                })))
                .mount(&server)
                .await;

            let err = client(&server).refresh_access("revoked").await.unwrap_err();

            assert_eq!(err.code(), GatewayErrorCode::AuthenticationFailed);
            assert!(err.is_credential());
            assert!(err.message().contains("invalid_grant"));
        }

        #[tokio::test]
        async fn token_endpoint_outage_is_retryable() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/token"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let err = client(&server).refresh_access("r1").await.unwrap_err();

            assert_eq!(err.code(), GatewayErrorCode::ServerError);
            assert!(!err.is_credential());
        }
    }
}
