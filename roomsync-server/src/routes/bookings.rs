//! Stored bookings by room and range.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use roomsync_core::{Booking, RoomId, RoomSyncError, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::routes::{AppError, parse_instant};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings/{room}", get(room_bookings))
        .route("/events", get(week_events))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub room_ids: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub success: bool,
    pub start_date: String,
    pub end_date: String,
    pub events: BTreeMap<RoomId, Vec<Booking>>,
    pub timestamp: DateTime<Utc>,
}

fn required<'a>(name: &str, value: &'a Option<String>) -> Result<&'a str, RoomSyncError> {
    value
        .as_deref()
        .ok_or_else(|| RoomSyncError::InvalidArgument(format!("missing parameter '{name}'")))
}

/// GET /bookings/{room} - one room's bookings, the upcoming window by default
async fn room_bookings(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let room: RoomId = room.parse()?;
    let window = match (&query.start, &query.end) {
        (None, None) => TimeWindow::upcoming(Utc::now(), state.settings.sync.upcoming_weeks),
        (start, end) => TimeWindow::new(
            parse_instant("start", required("start", start)?)?,
            parse_instant("end", required("end", end)?)?,
        )?,
    };

    let bookings = state
        .bookings
        .bookings_in_range(&[room], &window)
        .await
        .map_err(|e| AppError::from(e).for_room(room))?;
    Ok(Json(bookings))
}

/// GET /events?roomIds=a,b&startDate&endDate - bookings grouped by room.
/// Unknown room ids are skipped.
async fn week_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, AppError> {
    let room_ids = required("roomIds", &query.room_ids)?;
    let start_date = required("startDate", &query.start_date)?;
    let end_date = required("endDate", &query.end_date)?;
    let window = TimeWindow::new(
        parse_instant("startDate", start_date)?,
        parse_instant("endDate", end_date)?,
    )?;

    let mut rooms = Vec::new();
    for id in room_ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match id.parse::<RoomId>() {
            Ok(room) if state.sync.rooms().get(room).is_ok() => rooms.push(room),
            _ => tracing::warn!(room = id, "skipping unknown room"),
        }
    }

    let mut events: BTreeMap<RoomId, Vec<Booking>> =
        rooms.iter().map(|room| (*room, Vec::new())).collect();
    for booking in state.bookings.bookings_in_range(&rooms, &window).await? {
        events.entry(booking.room_id).or_default().push(booking);
    }

    Ok(Json(EventsResponse {
        success: true,
        start_date: start_date.to_string(),
        end_date: end_date.to_string(),
        events,
        timestamp: Utc::now(),
    }))
}
