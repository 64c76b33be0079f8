//! Calendar provider contract.
//!
//! A provider lists events of one calendar, either everything, a delta since
//! a sync token, or a time window, and manages push-notification channels.
//! `roomsync-provider-google` implements it against Google Calendar;
//! [`crate::memory::MemoryCalendar`] implements it in memory for tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PROVIDER_PAGE_SIZE;
use crate::error::RoomSyncResult;
use crate::window::TimeWindow;

/// Start or end of a provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    /// All-day marker without a time of day.
    Date(NaiveDate),
}

impl EventTime {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::DateTime(dt) => Some(*dt),
            EventTime::Date(_) => None,
        }
    }
}

/// One event as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl ProviderEvent {
    /// Start and end instants, when both are concrete date-times.
    pub fn concrete_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.as_ref()?.instant()?;
        let end = self.end.as_ref()?.instant()?;
        Some((start, end))
    }

    pub fn timed(
        id: impl Into<String>,
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        ProviderEvent {
            id: id.into(),
            summary: summary.into(),
            description: String::new(),
            start: Some(EventTime::DateTime(start)),
            end: Some(EventTime::DateTime(end)),
            cancelled: false,
            updated: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A cancellation marker carrying only the id, as delta listings report them.
    pub fn cancelled(id: impl Into<String>) -> Self {
        ProviderEvent {
            id: id.into(),
            summary: String::new(),
            description: String::new(),
            start: None,
            end: None,
            cancelled: true,
            updated: None,
        }
    }
}

/// What to enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListQuery {
    /// Every event, ending with a fresh sync token.
    Full,
    /// Changes since a sync token, cancellations included.
    Delta { sync_token: String },
    /// Events overlapping a window, expanded to single instances.
    Window(TimeWindow),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: ListQuery,
    pub page_token: Option<String>,
    pub max_results: u32,
}

impl ListRequest {
    pub fn new(query: ListQuery) -> Self {
        ListRequest {
            query,
            page_token: None,
            max_results: PROVIDER_PAGE_SIZE,
        }
    }

    pub fn page(&self, page_token: Option<String>) -> Self {
        ListRequest {
            page_token,
            ..self.clone()
        }
    }
}

/// One page of a listing. `next_sync_token` only appears on the last page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<ProviderEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Every page of a listing, collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub events: Vec<ProviderEvent>,
    pub next_sync_token: Option<String>,
}

/// Channel registration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub channel_id: String,
    pub callback_url: String,
    /// Echoed back on every notification. Set to the room id.
    pub token: String,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(&self, calendar_id: &str, request: &ListRequest)
    -> RoomSyncResult<EventPage>;

    async fn watch(
        &self,
        calendar_id: &str,
        request: &ChannelRequest,
    ) -> RoomSyncResult<WatchResponse>;

    /// Stop a channel. Stopping an unknown channel succeeds.
    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> RoomSyncResult<()>;

    /// Follow page tokens until the listing is exhausted.
    async fn list_all(&self, calendar_id: &str, query: ListQuery) -> RoomSyncResult<Listing> {
        let first = ListRequest::new(query);
        let mut request = first.clone();
        let mut listing = Listing::default();

        loop {
            let page = self.list_events(calendar_id, &request).await?;
            listing.events.extend(page.events);
            if page.next_sync_token.is_some() {
                listing.next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(token) => request = first.page(Some(token)),
                None => break,
            }
        }

        tracing::debug!(
            calendar_id,
            events = listing.events.len(),
            has_sync_token = listing.next_sync_token.is_some(),
            "listing complete"
        );
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_all_day_events_have_no_concrete_span() {
        let day = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let event = ProviderEvent {
            id: "holiday".into(),
            summary: "휴무".into(),
            description: String::new(),
            start: Some(EventTime::Date(day)),
            end: Some(EventTime::Date(day.succ_opt().unwrap())),
            cancelled: false,
            updated: None,
        };
        assert!(event.concrete_span().is_none());
        assert!(ProviderEvent::cancelled("x").concrete_span().is_none());
    }

    #[test]
    fn test_concrete_span() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 0, 0, 0).unwrap();
        let end = start + Duration::hours(2);
        let event = ProviderEvent::timed("e1", "", start, end);
        assert_eq!(event.concrete_span(), Some((start, end)));
    }
}
