//! Manual sync passes over several rooms, bounded by the configured deadline.

use axum::{Json, Router, extract::State, routing::post};
use roomsync_core::sync::{RoomOutcome, SyncReport};
use roomsync_core::{RoomId, RoomSyncResult, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::routes::{AppError, RoomResult, parse_instant, parse_rooms};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_rooms))
        .route("/sync/window", post(sync_window))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub rooms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    #[serde(default)]
    pub rooms: Option<Vec<String>>,
    pub start: String,
    pub end: String,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub results: Vec<RoomResult<SyncReport>>,
}

impl SyncResponse {
    fn from_outcomes(outcomes: Vec<RoomOutcome>) -> Self {
        let results: Vec<_> = outcomes
            .into_iter()
            .map(|o| RoomResult::from_result(o.room, o.result))
            .collect();
        SyncResponse {
            success: results.iter().all(|r| r.success),
            results,
        }
    }
}

fn selected_rooms(state: &AppState, rooms: Option<&[String]>) -> RoomSyncResult<Vec<RoomId>> {
    let requested = rooms.map(parse_rooms).transpose()?;
    state.sync.rooms().select(requested.as_deref())
}

/// POST /sync - cursor pass for all (or the listed) rooms
async fn sync_rooms(
    State(state): State<AppState>,
    request: Option<Json<SyncRequest>>,
) -> Result<Json<SyncResponse>, AppError> {
    let Json(request) = request.unwrap_or_default();
    let rooms = selected_rooms(&state, request.rooms.as_deref())?;

    tracing::info!(rooms = rooms.len(), "manual sync requested");
    let outcomes = state
        .sync
        .sync_rooms(&rooms, state.settings.sync.timeout)
        .await;
    Ok(Json(SyncResponse::from_outcomes(outcomes)))
}

/// POST /sync/window - windowed pass with deletion reconciliation
async fn sync_window(
    State(state): State<AppState>,
    Json(request): Json<WindowRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let window = TimeWindow::new(
        parse_instant("start", &request.start)?,
        parse_instant("end", &request.end)?,
    )?;
    let rooms = selected_rooms(&state, request.rooms.as_deref())?;

    tracing::info!(rooms = rooms.len(), start = %window.start, end = %window.end, "window sync requested");
    let outcomes = state
        .sync
        .sync_windows(&rooms, window, state.settings.sync.timeout)
        .await;
    Ok(Json(SyncResponse::from_outcomes(outcomes)))
}
