//! Webhook channel setup, renewal and cleanup.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use roomsync_core::channels::{ChannelOutcome, StoppedChannel};
use roomsync_core::store::WebhookChannel;
use roomsync_core::{RoomId, RoomSyncError};
use serde::{Deserialize, Serialize};

use crate::routes::{AppError, RoomResult, parse_rooms};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/setup", post(setup))
        .route("/channels/renew", post(renew))
        .route("/channels/stop", post(stop_unregistered))
        .route("/channels/{room}", delete(stop_room))
}

#[derive(Debug, Default, Deserialize)]
pub struct SetupRequest {
    #[serde(default)]
    pub rooms: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenewRequest {
    /// humantime, e.g. "3days". Defaults to `webhook.renew_margin`.
    #[serde(default)]
    pub margin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub channel_id: String,
    pub resource_id: String,
}

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub success: bool,
    pub results: Vec<RoomResult<WebhookChannel>>,
}

impl ChannelsResponse {
    fn from_outcomes(outcomes: Vec<ChannelOutcome>) -> Self {
        let results: Vec<_> = outcomes
            .into_iter()
            .map(|o| RoomResult::from_result(o.room, o.result))
            .collect();
        ChannelsResponse {
            success: results.iter().all(|r| r.success),
            results,
        }
    }
}

/// GET /channels - registered channels
async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<WebhookChannel>>, AppError> {
    Ok(Json(state.channels.channels().await?))
}

/// POST /channels/setup - register channels and rebuild cursors
async fn setup(
    State(state): State<AppState>,
    request: Option<Json<SetupRequest>>,
) -> Result<Json<ChannelsResponse>, AppError> {
    state.require_callback_url()?;
    let Json(request) = request.unwrap_or_default();
    let rooms = request.rooms.as_deref().map(parse_rooms).transpose()?;

    let outcomes = state.channels.register_all(rooms.as_deref()).await?;
    Ok(Json(ChannelsResponse::from_outcomes(outcomes)))
}

/// POST /channels/renew - renew channels close to expiry
async fn renew(
    State(state): State<AppState>,
    request: Option<Json<RenewRequest>>,
) -> Result<Json<ChannelsResponse>, AppError> {
    state.require_callback_url()?;
    let Json(request) = request.unwrap_or_default();
    let margin = match request.margin {
        Some(text) => humantime::parse_duration(&text)
            .map_err(|e| RoomSyncError::InvalidArgument(format!("margin: {e}")))?,
        None => state.settings.webhook.renew_margin,
    };
    let margin = chrono::Duration::from_std(margin)
        .map_err(|e| RoomSyncError::InvalidArgument(format!("margin: {e}")))?;

    let outcomes = state.channels.sweep_expiring(margin).await?;
    Ok(Json(ChannelsResponse::from_outcomes(outcomes)))
}

/// DELETE /channels/{room} - stop and forget a room's channel
async fn stop_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<Json<WebhookChannel>, AppError> {
    let room: RoomId = room.parse()?;
    let stopped = state
        .channels
        .stop(room)
        .await
        .map_err(|e| AppError::from(e).for_room(room))?;
    Ok(Json(stopped))
}

/// POST /channels/stop - stop a channel known only by its ids
async fn stop_unregistered(
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> Result<Json<StoppedChannel>, AppError> {
    let stopped = state
        .channels
        .stop_unregistered(&request.channel_id, &request.resource_id)
        .await?;
    Ok(Json(stopped))
}
