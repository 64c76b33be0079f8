//! Google Calendar v3 JSON shapes and their conversion to provider types.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use roomsync_core::provider::{EventPage, EventTime, ProviderEvent};
use roomsync_core::{RoomSyncError, RoomSyncResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEventList {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEventTime {
    pub date_time: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
}

pub(crate) trait FromGoogle<T> {
    fn from_google(value: T) -> Self;
}

impl FromGoogle<GoogleEventTime> for Option<EventTime> {
    fn from_google(time: GoogleEventTime) -> Self {
        match (time.date_time, time.date) {
            (Some(dt), _) => Some(EventTime::DateTime(dt)),
            (None, Some(d)) => Some(EventTime::Date(d)),
            (None, None) => None,
        }
    }
}

impl FromGoogle<GoogleEvent> for ProviderEvent {
    fn from_google(event: GoogleEvent) -> Self {
        ProviderEvent {
            id: event.id,
            summary: event.summary,
            description: event.description,
            start: event.start.and_then(Option::<EventTime>::from_google),
            end: event.end.and_then(Option::<EventTime>::from_google),
            cancelled: event.status == "cancelled",
            updated: event.updated,
        }
    }
}

impl FromGoogle<GoogleEventList> for EventPage {
    fn from_google(list: GoogleEventList) -> Self {
        EventPage {
            events: list
                .items
                .into_iter()
                .map(ProviderEvent::from_google)
                .collect(),
            next_page_token: list.next_page_token,
            next_sync_token: list.next_sync_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchBody<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: &'a str,
    pub token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<WatchParams>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchParams {
    /// Seconds, as a string.
    pub ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelResource {
    pub resource_id: String,
    /// Milliseconds since the epoch, as a string.
    pub expiration: Option<String>,
}

impl ChannelResource {
    pub fn expiration(&self) -> RoomSyncResult<DateTime<Utc>> {
        let raw = self
            .expiration
            .as_deref()
            .ok_or_else(|| RoomSyncError::Serialization("channel has no expiration".into()))?;
        let millis: i64 = raw
            .parse()
            .map_err(|_| RoomSyncError::Serialization(format!("bad channel expiration {raw:?}")))?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| RoomSyncError::Serialization(format!("bad channel expiration {raw:?}")))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopBody<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ProviderEvent {
        let event: GoogleEvent = serde_json::from_value(value).unwrap();
        ProviderEvent::from_google(event)
    }

    #[test]
    fn test_timed_event_with_local_offset() {
        let event = parse(json!({
            "id": "evt1",
            "status": "confirmed",
            "summary": "밴드 합주",
            "description": "예약번호: 12345",
            "start": { "dateTime": "2025-11-03T10:00:00+09:00" },
            "end": { "dateTime": "2025-11-03T12:00:00+09:00" },
            "updated": "2025-11-01T03:00:00.000Z"
        }));

        let start = Utc.with_ymd_and_hms(2025, 11, 3, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 11, 3, 3, 0, 0).unwrap();
        assert_eq!(event.concrete_span(), Some((start, end)));
        assert_eq!(event.summary, "밴드 합주");
        assert!(!event.cancelled);
        assert!(event.updated.is_some());
    }

    #[test]
    fn test_cancelled_marker_has_only_an_id() {
        let event = parse(json!({ "id": "gone", "status": "cancelled" }));
        assert!(event.cancelled);
        assert!(event.start.is_none());
        assert!(event.summary.is_empty());
    }

    #[test]
    fn test_all_day_event() {
        let event = parse(json!({
            "id": "day",
            "start": { "date": "2025-12-25" },
            "end": { "date": "2025-12-26" }
        }));
        assert_eq!(
            event.start,
            Some(EventTime::Date(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()))
        );
        assert!(event.concrete_span().is_none());
    }

    #[test]
    fn test_channel_expiration_millis() {
        let resource: ChannelResource = serde_json::from_value(json!({
            "kind": "api#channel",
            "id": "chan",
            "resourceId": "res-1",
            "expiration": "1762560000000"
        }))
        .unwrap();
        assert_eq!(
            resource.expiration().unwrap(),
            Utc.timestamp_millis_opt(1_762_560_000_000).unwrap()
        );

        let missing = ChannelResource {
            resource_id: "res".into(),
            expiration: None,
        };
        assert!(missing.expiration().is_err());
    }

    #[test]
    fn test_watch_body_shape() {
        let body = WatchBody {
            id: "chan-1",
            kind: "web_hook",
            address: "https://rooms.example.com/webhook/google",
            token: "a",
            params: Some(WatchParams { ttl: "604800".into() }),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "id": "chan-1",
                "type": "web_hook",
                "address": "https://rooms.example.com/webhook/google",
                "token": "a",
                "params": { "ttl": "604800" }
            })
        );
    }
}
