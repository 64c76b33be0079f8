//! Push-notification channels, one per room.
//!
//! Channels expire on the provider side, so a sweep renews every channel
//! that expires within a margin. Registering a room also rebuilds its sync
//! cursor, since notifications on a new channel say nothing about changes
//! made before it existed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{RoomSyncError, RoomSyncResult};
use crate::provider::{CalendarProvider, ChannelRequest};
use crate::room::RoomId;
use crate::store::{ChannelStore, WebhookChannel};
use crate::sync::Synchronizer;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Public URL the provider posts notifications to.
    pub callback_url: String,
    /// Stop the room's current channel before registering a new one.
    pub stop_previous: bool,
    /// Requested lifetime. The provider may shorten it.
    pub ttl: Option<Duration>,
}

/// Result of one room inside a multi-room channel operation.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub room: RoomId,
    pub result: RoomSyncResult<WebhookChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppedChannel {
    pub room: Option<RoomId>,
    pub channel_id: String,
    pub resource_id: String,
}

pub struct ChannelManager {
    provider: Arc<dyn CalendarProvider>,
    channels: Arc<dyn ChannelStore>,
    sync: Arc<Synchronizer>,
    options: ChannelOptions,
}

impl ChannelManager {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        channels: Arc<dyn ChannelStore>,
        sync: Arc<Synchronizer>,
        options: ChannelOptions,
    ) -> Self {
        ChannelManager {
            provider,
            channels,
            sync,
            options,
        }
    }

    /// Register a new channel for the room and rebuild its cursor.
    pub async fn register(&self, room: RoomId) -> RoomSyncResult<WebhookChannel> {
        if self.options.stop_previous {
            if let Some(previous) = self.channels.channel(room).await? {
                self.stop_quietly(&previous).await;
            }
        }

        let channel = self.open(room).await?;

        if let Err(err) = self.sync.resync(room).await {
            tracing::warn!(room = %room, error = %err, "channel registered but cursor baseline failed");
        }
        Ok(channel)
    }

    /// Register every listed room, or every configured room.
    pub async fn register_all(&self, rooms: Option<&[RoomId]>) -> RoomSyncResult<Vec<ChannelOutcome>> {
        let rooms = self.sync.rooms().select(rooms)?;
        let mut outcomes = Vec::with_capacity(rooms.len());
        for room in rooms {
            let result = self.register(room).await;
            if let Err(err) = &result {
                tracing::error!(room = %room, error = %err, "channel registration failed");
            }
            outcomes.push(ChannelOutcome { room, result });
        }
        Ok(outcomes)
    }

    /// Replace a channel with a fresh one. The old channel is stopped
    /// best-effort.
    pub async fn renew(&self, existing: &WebhookChannel) -> RoomSyncResult<WebhookChannel> {
        self.stop_quietly(existing).await;
        let channel = self.open(existing.room_id).await?;
        tracing::info!(
            room = %existing.room_id,
            old_channel = %existing.channel_id,
            new_channel = %channel.channel_id,
            "channel renewed"
        );
        Ok(channel)
    }

    /// Renew every channel expiring within `margin`. Rooms are handled
    /// independently.
    pub async fn sweep_expiring(&self, margin: Duration) -> RoomSyncResult<Vec<ChannelOutcome>> {
        let deadline = Utc::now() + margin;
        let expiring = self.channels.channels_expiring_before(deadline).await?;
        tracing::info!(count = expiring.len(), "renewing expiring channels");

        let mut outcomes = Vec::with_capacity(expiring.len());
        for channel in expiring {
            let result = self.renew(&channel).await;
            if let Err(err) = &result {
                tracing::error!(room = %channel.room_id, error = %err, "channel renewal failed");
            }
            outcomes.push(ChannelOutcome {
                room: channel.room_id,
                result,
            });
        }
        Ok(outcomes)
    }

    /// Stop the room's channel and forget it.
    pub async fn stop(&self, room: RoomId) -> RoomSyncResult<WebhookChannel> {
        let channel = self
            .channels
            .channel(room)
            .await?
            .ok_or_else(|| RoomSyncError::ChannelNotFound(room.to_string()))?;
        self.provider
            .stop_channel(&channel.channel_id, &channel.resource_id)
            .await?;
        self.channels.remove_channel(room).await?;
        tracing::info!(room = %room, channel = %channel.channel_id, "channel stopped");
        Ok(channel)
    }

    /// Stop a channel known only by its ids, e.g. one left behind by an
    /// earlier registration. A stored record for it is removed as well.
    pub async fn stop_unregistered(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> RoomSyncResult<StoppedChannel> {
        self.provider.stop_channel(channel_id, resource_id).await?;
        let stored = self.channels.channel_by_id(channel_id).await?;
        if let Some(stored) = &stored {
            self.channels.remove_channel(stored.room_id).await?;
        }
        Ok(StoppedChannel {
            room: stored.map(|c| c.room_id),
            channel_id: channel_id.to_string(),
            resource_id: resource_id.to_string(),
        })
    }

    pub async fn channels(&self) -> RoomSyncResult<Vec<WebhookChannel>> {
        self.channels.channels().await
    }

    /// Room a notification belongs to: the stored channel first, then the
    /// token the channel was registered with.
    pub async fn resolve_room(
        &self,
        channel_id: &str,
        token: Option<&str>,
    ) -> RoomSyncResult<Option<RoomId>> {
        if let Some(channel) = self.channels.channel_by_id(channel_id).await? {
            return Ok(Some(channel.room_id));
        }
        let room = token
            .and_then(|t| t.parse::<RoomId>().ok())
            .filter(|room| self.sync.rooms().get(*room).is_ok());
        Ok(room)
    }

    async fn open(&self, room: RoomId) -> RoomSyncResult<WebhookChannel> {
        let calendar_id = self.sync.rooms().get(room)?.calendar_id.clone();
        let request = ChannelRequest {
            channel_id: Uuid::new_v4().to_string(),
            callback_url: self.options.callback_url.clone(),
            token: room.to_string(),
            ttl: self.options.ttl,
        };
        let response = self.provider.watch(&calendar_id, &request).await?;

        let channel = WebhookChannel {
            room_id: room,
            calendar_id,
            channel_id: request.channel_id,
            resource_id: response.resource_id,
            callback_url: request.callback_url,
            expiration: response.expiration,
        };
        self.channels.save_channel(&channel).await?;
        tracing::info!(
            room = %room,
            channel = %channel.channel_id,
            expires = %channel.expiration,
            "channel registered"
        );
        Ok(channel)
    }

    async fn stop_quietly(&self, channel: &WebhookChannel) {
        if let Err(err) = self
            .provider
            .stop_channel(&channel.channel_id, &channel.resource_id)
            .await
        {
            tracing::warn!(
                room = %channel.room_id,
                channel = %channel.channel_id,
                error = %err,
                "could not stop previous channel"
            );
        }
    }
}
