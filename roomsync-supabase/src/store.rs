use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use roomsync_core::booking::Booking;
use roomsync_core::config::SupabaseSettings;
use roomsync_core::price_text::StatedPriceKind;
use roomsync_core::pricing::PriceClass;
use roomsync_core::store::{
    BookingStore, ChannelStore, PricePolicyStore, SyncCursor, SyncStateStore, WebhookChannel,
};
use roomsync_core::tariff::PricePolicy;
use roomsync_core::{RoomId, RoomSyncResult, TimeWindow};
use serde::{Deserialize, Deserializer};

use crate::rest::{Filters, PostgrestClient, in_list};

const BOOKINGS: &str = "booking_events";
const SYNC_STATE: &str = "calendar_sync_state";
const CHANNELS: &str = "calendar_channels";
const POLICIES: &str = "price_policies";

/// Event ids per delete request, keeping the URL short.
const DELETE_CHUNK: usize = 100;

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// `price_type` as written by this crate or by the older importer, which
/// stored Korean labels. Anything else reads as unpriced.
fn price_class_from_label(label: &str) -> Option<PriceClass> {
    match label {
        "일반" => Some(PriceClass::General),
        "저녁" => Some(PriceClass::Evening),
        "주말/공휴일" => Some(PriceClass::WeekendHoliday),
        "새벽" => Some(PriceClass::Dawn),
        "새벽통대관" => Some(PriceClass::OvernightBlock),
        other => serde_json::from_value(serde_json::Value::String(other.to_string())).ok(),
    }
}

fn lenient_price_class<'de, D>(deserializer: D) -> Result<Option<PriceClass>, D::Error>
where
    D: Deserializer<'de>,
{
    let label: Option<String> = Option::deserialize(deserializer)?;
    Ok(label.as_deref().and_then(|label| {
        let class = price_class_from_label(label);
        if class.is_none() {
            tracing::debug!(label, "unrecognized price_type, reading as unpriced");
        }
        class
    }))
}

/// A stored booking row. Rows written by older importers carry nulls where
/// [`Booking`] has defaults.
#[derive(Debug, Deserialize)]
struct BookingRow {
    id: Option<i64>,
    room_id: RoomId,
    google_event_id: String,
    title: Option<String>,
    description: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price: Option<i64>,
    #[serde(default, deserialize_with = "lenient_price_class")]
    price_type: Option<PriceClass>,
    is_naver: Option<bool>,
    stated_price: Option<i64>,
    #[serde(default)]
    stated_price_kind: Option<StatedPriceKind>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            room_id: row.room_id,
            event_id: row.google_event_id,
            title: row.title.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            start: row.start_time,
            end: row.end_time,
            price: row.price,
            price_class: row.price_type,
            partner: row.is_naver.unwrap_or(false),
            stated_price: row.stated_price,
            stated_kind: row.stated_price_kind,
            updated_at: row.updated_at.unwrap_or(row.start_time),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CursorRow {
    room_id: RoomId,
    sync_token: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// All four stores over one Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    rest: PostgrestClient,
}

impl SupabaseStore {
    pub fn new(settings: &SupabaseSettings) -> Self {
        SupabaseStore {
            rest: PostgrestClient::new(&settings.url, &settings.service_role_key),
        }
    }

    async fn select_bookings(&self, filters: Filters) -> RoomSyncResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = self.rest.select(BOOKINGS, &filters).await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    async fn select_channels(&self, mut filters: Filters) -> RoomSyncResult<Vec<WebhookChannel>> {
        filters.push(("select", "*".into()));
        filters.push(("order", "room_id.asc".into()));
        self.rest.select(CHANNELS, &filters).await
    }
}

#[async_trait]
impl BookingStore for SupabaseStore {
    async fn upsert_bookings(&self, bookings: &[Booking]) -> RoomSyncResult<usize> {
        self.rest
            .upsert(BOOKINGS, "google_event_id", bookings)
            .await?;
        Ok(bookings.len())
    }

    async fn delete_by_event_ids(
        &self,
        room: RoomId,
        event_ids: &[String],
    ) -> RoomSyncResult<usize> {
        let mut deleted = 0;
        for chunk in event_ids.chunks(DELETE_CHUNK) {
            let filters = vec![
                ("room_id", eq(room)),
                ("google_event_id", in_list(chunk.iter().map(String::as_str))),
            ];
            deleted += self.rest.delete(BOOKINGS, &filters).await?;
        }
        Ok(deleted)
    }

    async fn delete_in_window(&self, room: RoomId, window: &TimeWindow) -> RoomSyncResult<usize> {
        let filters = vec![
            ("room_id", eq(room)),
            ("start_time", format!("gte.{}", timestamp(window.start))),
            ("end_time", format!("lte.{}", timestamp(window.end))),
        ];
        self.rest.delete(BOOKINGS, &filters).await
    }

    async fn bookings_in_range(
        &self,
        rooms: &[RoomId],
        window: &TimeWindow,
    ) -> RoomSyncResult<Vec<Booking>> {
        if rooms.is_empty() {
            return Ok(Vec::new());
        }
        self.select_bookings(vec![
            ("select", "*".into()),
            ("room_id", in_list(rooms.iter().map(RoomId::as_str))),
            ("start_time", format!("gte.{}", timestamp(window.start))),
            ("start_time", format!("lt.{}", timestamp(window.end))),
            ("order", "start_time.asc,id.asc".into()),
        ])
        .await
    }

    async fn all_bookings(&self) -> RoomSyncResult<Vec<Booking>> {
        self.select_bookings(vec![
            ("select", "*".into()),
            ("order", "start_time.asc,id.asc".into()),
        ])
        .await
    }
}

#[async_trait]
impl SyncStateStore for SupabaseStore {
    async fn cursor(&self, room: RoomId) -> RoomSyncResult<Option<SyncCursor>> {
        let rows: Vec<CursorRow> = self
            .rest
            .select(
                SYNC_STATE,
                &vec![
                    ("select", "room_id,sync_token,last_synced_at".into()),
                    ("room_id", eq(room)),
                ],
            )
            .await?;

        Ok(rows.into_iter().next().and_then(|row| {
            Some(SyncCursor {
                room_id: row.room_id,
                sync_token: row.sync_token?,
                last_synced_at: row.last_synced_at.unwrap_or_else(Utc::now),
            })
        }))
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> RoomSyncResult<()> {
        self.rest
            .upsert(SYNC_STATE, "room_id", std::slice::from_ref(cursor))
            .await
    }

    async fn clear_cursor(&self, room: RoomId) -> RoomSyncResult<()> {
        self.rest
            .delete(SYNC_STATE, &vec![("room_id", eq(room))])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SupabaseStore {
    async fn channel(&self, room: RoomId) -> RoomSyncResult<Option<WebhookChannel>> {
        Ok(self
            .select_channels(vec![("room_id", eq(room))])
            .await?
            .into_iter()
            .next())
    }

    async fn channel_by_id(&self, channel_id: &str) -> RoomSyncResult<Option<WebhookChannel>> {
        Ok(self
            .select_channels(vec![("channel_id", eq(channel_id))])
            .await?
            .into_iter()
            .next())
    }

    async fn channels(&self) -> RoomSyncResult<Vec<WebhookChannel>> {
        self.select_channels(Vec::new()).await
    }

    async fn save_channel(&self, channel: &WebhookChannel) -> RoomSyncResult<()> {
        self.rest
            .upsert(CHANNELS, "room_id", std::slice::from_ref(channel))
            .await
    }

    async fn remove_channel(&self, room: RoomId) -> RoomSyncResult<()> {
        self.rest
            .delete(CHANNELS, &vec![("room_id", eq(room))])
            .await?;
        Ok(())
    }

    async fn channels_expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> RoomSyncResult<Vec<WebhookChannel>> {
        self.select_channels(vec![(
            "expiration",
            format!("lte.{}", deadline.timestamp_millis()),
        )])
        .await
    }
}

#[async_trait]
impl PricePolicyStore for SupabaseStore {
    async fn policies(&self) -> RoomSyncResult<Vec<PricePolicy>> {
        self.rest
            .select(
                POLICIES,
                &vec![
                    ("select", "id,effective_from,effective_to,room_prices".into()),
                    ("order", "effective_from.desc,id.desc".into()),
                ],
            )
            .await
    }

    async fn insert_policy(&self, policy: &PricePolicy) -> RoomSyncResult<PricePolicy> {
        let stored: PricePolicy = self.rest.insert(POLICIES, policy).await?;
        tracing::info!(
            id = ?stored.id,
            effective_from = %stored.effective_from,
            "price policy stored"
        );
        Ok(stored)
    }
}
