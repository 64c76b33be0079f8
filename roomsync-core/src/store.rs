//! Persistence contracts: bookings, sync cursors, webhook channels and
//! price policies.
//!
//! `roomsync-supabase` implements these over PostgREST and
//! [`crate::memory::MemoryStore`] implements them in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::Booking;
use crate::error::RoomSyncResult;
use crate::room::RoomId;
use crate::tariff::PricePolicy;
use crate::window::TimeWindow;

/// Continuation token of one room's differential sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub room_id: RoomId,
    pub sync_token: String,
    pub last_synced_at: DateTime<Utc>,
}

/// A registered push-notification channel. At most one per room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub room_id: RoomId,
    pub calendar_id: String,
    pub channel_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiration: DateTime<Utc>,
}

impl WebhookChannel {
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expiration <= now + margin
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert or replace by `event_id`. Returns the number of rows written.
    async fn upsert_bookings(&self, bookings: &[Booking]) -> RoomSyncResult<usize>;

    /// Delete a room's bookings with these event ids. Unknown ids are ignored.
    async fn delete_by_event_ids(&self, room: RoomId, event_ids: &[String])
    -> RoomSyncResult<usize>;

    /// Delete every booking of the room lying entirely inside the window.
    async fn delete_in_window(&self, room: RoomId, window: &TimeWindow) -> RoomSyncResult<usize>;

    /// Bookings of the given rooms starting inside the window, by start time.
    async fn bookings_in_range(
        &self,
        rooms: &[RoomId],
        window: &TimeWindow,
    ) -> RoomSyncResult<Vec<Booking>>;

    async fn all_bookings(&self) -> RoomSyncResult<Vec<Booking>>;
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn cursor(&self, room: RoomId) -> RoomSyncResult<Option<SyncCursor>>;

    async fn save_cursor(&self, cursor: &SyncCursor) -> RoomSyncResult<()>;

    async fn clear_cursor(&self, room: RoomId) -> RoomSyncResult<()>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn channel(&self, room: RoomId) -> RoomSyncResult<Option<WebhookChannel>>;

    async fn channel_by_id(&self, channel_id: &str) -> RoomSyncResult<Option<WebhookChannel>>;

    async fn channels(&self) -> RoomSyncResult<Vec<WebhookChannel>>;

    /// Insert or replace the room's channel.
    async fn save_channel(&self, channel: &WebhookChannel) -> RoomSyncResult<()>;

    async fn remove_channel(&self, room: RoomId) -> RoomSyncResult<()>;

    async fn channels_expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> RoomSyncResult<Vec<WebhookChannel>> {
        Ok(self
            .channels()
            .await?
            .into_iter()
            .filter(|c| c.expiration <= deadline)
            .collect())
    }
}

#[async_trait]
pub trait PricePolicyStore: Send + Sync {
    async fn policies(&self) -> RoomSyncResult<Vec<PricePolicy>>;

    /// Store a new policy and return it with its assigned id.
    async fn insert_policy(&self, policy: &PricePolicy) -> RoomSyncResult<PricePolicy>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_channel_expiration_is_stored_as_millis() {
        let channel = WebhookChannel {
            room_id: RoomId::B,
            calendar_id: "cal-b".into(),
            channel_id: "ch".into(),
            resource_id: "res".into(),
            callback_url: String::new(),
            expiration: Utc.timestamp_millis_opt(1_762_000_000_000).unwrap(),
        };
        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(json["expiration"], 1_762_000_000_000_i64);

        let now = channel.expiration - Duration::days(2);
        assert!(channel.expires_within(now, Duration::days(3)));
        assert!(!channel.expires_within(now, Duration::days(1)));
    }
}
