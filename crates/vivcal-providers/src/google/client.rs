//! Google Calendar API v3 over HTTP.
//!
//! Request building, status mapping and payload conversion. Authentication
//! is the caller's business: every method takes the bearer token to use.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vivcal_core::{Attendee, CalendarEvent, ConferenceData, EntryPoint, EventTime, ResponseStatus};

use crate::error::{ProviderError, ProviderResult};
use crate::upstream::{ListQuery, Subscription};

/// Low-level Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration, user_agent: &str) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration("failed to create HTTP client").with_source(e)
            })?;

        Ok(Self {
            http_client,
            api_base: api_base.into(),
        })
    }

    /// Lists event instances ordered by start time, following pagination until
    /// the result limit or the last page.
    pub async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        query: &ListQuery,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(token, calendar_id, query, page_token.as_deref())
                .await?;

            events.extend(page.items.into_iter().filter_map(convert_event));

            if let Some(max) = query.max_results
                && events.len() >= max
            {
                events.truncate(max);
                break;
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(calendar = calendar_id, count = events.len(), "listed events");
        Ok(events)
    }

    async fn list_events_page(
        &self,
        token: &str,
        calendar_id: &str,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut request = self.http_client.get(&url).bearer_auth(token).query(&[
            ("timeMin", query.time_min.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);
        if let Some(time_max) = query.time_max {
            request = request.query(&[("timeMax", time_max.to_rfc3339())]);
        }
        if let Some(max) = query.max_results {
            request = request.query(&[("maxResults", max.min(2500).to_string())]);
        }
        if let Some(page) = page_token {
            request = request.query(&[("pageToken", page)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let body = read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse event list: {}", e))
        })
    }

    /// Opens a watch channel delivering change notifications to `address`.
    pub async fn watch_events(
        &self,
        token: &str,
        calendar_id: &str,
        channel_id: &str,
        address: &str,
    ) -> ProviderResult<Subscription> {
        let url = format!(
            "{}/calendars/{}/events/watch",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let body = WatchRequest {
            id: channel_id,
            kind: "web_hook",
            address,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let body = read_body(response).await?;
        parse_watch_response(&body, channel_id)
    }

    /// Stops a watch channel.
    pub async fn stop_channel(&self, token: &str, subscription: &Subscription) -> ProviderResult<()> {
        let url = format!("{}/channels/stop", self.api_base);
        let body = StopRequest {
            id: &subscription.channel_id,
            resource_id: subscription.resource_id.as_deref(),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await.map(|_| ())
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::network("request timeout")
    } else if e.is_connect() {
        ProviderError::network(format!("connection failed: {}", e))
    } else {
        ProviderError::network(format!("request failed: {}", e))
    }
}

/// Maps error statuses to provider errors and returns the body of a
/// successful response.
async fn read_body(response: reqwest::Response) -> ProviderResult<String> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

    if status.is_success() {
        return Ok(body);
    }
    Err(error_for_status(status.as_u16(), &body))
}

fn error_for_status(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::authentication("access token expired or revoked"),
        403 => ProviderError::authorization(format!("access denied: {}", body)),
        404 => ProviderError::not_found(format!("not found: {}", body)),
        400 => ProviderError::bad_request(format!("request rejected: {}", body)),
        _ => ProviderError::server(format!("API error ({}): {}", status, body)),
    }
}

fn parse_watch_response(body: &str, channel_id: &str) -> ProviderResult<Subscription> {
    let channel: WatchResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse watch response: {}", e))
    })?;

    let expiration = channel
        .expiration
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| ProviderError::invalid_response("watch response has no valid expiration"))?;

    Ok(Subscription {
        channel_id: channel.id.unwrap_or_else(|| channel_id.to_string()),
        resource_id: channel.resource_id,
        expiration,
    })
}

/// Converts an API event. Cancelled or timeless events yield `None`.
fn convert_event(event: ApiEvent) -> Option<CalendarEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let start = convert_time(&event.start, &id, "start")?;
    let end = convert_time(&event.end, &id, "end")?;

    let updated = event
        .updated
        .as_deref()
        .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
        .map_or(DateTime::UNIX_EPOCH, |dt| dt.with_timezone(&Utc));

    let mut converted = CalendarEvent::new(id, event.summary.unwrap_or_default(), start, end, updated);
    converted.attendees = event
        .attendees
        .unwrap_or_default()
        .into_iter()
        .map(convert_person)
        .collect();
    converted.organizer = event.organizer.map(convert_person);
    converted.conference = event.conference_data.map(convert_conference);
    converted.hangout_link = event.hangout_link;
    converted.location = event.location;
    converted.description = event.description;
    converted.html_link = event.html_link;
    Some(converted)
}

fn convert_time(time: &ApiEventTime, id: &str, which: &str) -> Option<EventTime> {
    match (&time.date_time, &time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
            .map(|parsed| EventTime::from_utc(parsed.with_timezone(&Utc)))
            .map_err(|e| warn!(event_id = id, which, error = %e, "unparseable event time"))
            .ok(),
        (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(EventTime::from_date)
            .map_err(|e| warn!(event_id = id, which, error = %e, "unparseable event date"))
            .ok(),
        (None, None) => {
            warn!(event_id = id, which, "event has no time");
            None
        }
    }
}

fn convert_person(person: ApiPerson) -> Attendee {
    let response_status = match person.response_status.as_deref() {
        Some("accepted") => ResponseStatus::Accepted,
        Some("declined") => ResponseStatus::Declined,
        Some("tentative") => ResponseStatus::Tentative,
        Some("needsAction") => ResponseStatus::NeedsAction,
        _ => ResponseStatus::Unknown,
    };
    Attendee {
        email: person.email,
        display_name: person.display_name,
        response_status,
        is_self: person.is_self.unwrap_or(false),
    }
}

fn convert_conference(data: ApiConferenceData) -> ConferenceData {
    let (conference_type, solution_name) = match data.conference_solution {
        Some(solution) => (solution.key.and_then(|k| k.kind), solution.name),
        None => (None, None),
    };
    ConferenceData {
        conference_type,
        solution_name,
        entry_points: data
            .entry_points
            .unwrap_or_default()
            .into_iter()
            .filter_map(|ep| {
                Some(EntryPoint {
                    entry_point_type: ep.entry_point_type,
                    uri: ep.uri?,
                    label: ep.label,
                })
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct WatchRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    address: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<&'a str>,
}

/// Channel resource returned by `events.watch`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    id: Option<String>,
    resource_id: Option<String>,
    /// Epoch milliseconds, encoded as a string.
    expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    html_link: Option<String>,
    hangout_link: Option<String>,
    updated: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
    attendees: Option<Vec<ApiPerson>>,
    organizer: Option<ApiPerson>,
    conference_data: Option<ApiConferenceData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPerson {
    email: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "self")]
    is_self: Option<bool>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiConferenceData {
    conference_solution: Option<ApiConferenceSolution>,
    entry_points: Option<Vec<ApiEntryPoint>>,
}

#[derive(Debug, Deserialize)]
struct ApiConferenceSolution {
    key: Option<ApiSolutionKey>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSolutionKey {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEntryPoint {
    entry_point_type: String,
    uri: Option<String>,
    label: Option<String>,
}
