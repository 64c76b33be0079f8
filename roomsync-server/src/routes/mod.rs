pub mod admin;
pub mod bookings;
pub mod channels;
pub mod health;
pub mod prices;
pub mod stats;
pub mod sync;
pub mod webhook;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use roomsync_core::civil_time::local_midnight;
use roomsync_core::{RoomId, RoomSyncError, RoomSyncResult};
use serde::Serialize;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
}

/// Convert anyhow errors to HTTP responses. The status follows the
/// [`RoomSyncError`] kind when there is one.
pub struct AppError {
    error: anyhow::Error,
    room: Option<RoomId>,
}

impl AppError {
    pub fn for_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }

    fn status(&self) -> StatusCode {
        match self.error.downcast_ref::<RoomSyncError>() {
            Some(err) => status_for(err),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn status_for(err: &RoomSyncError) -> StatusCode {
    match err {
        RoomSyncError::UnknownRoom(_) | RoomSyncError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        RoomSyncError::InvalidRange { .. } | RoomSyncError::InvalidArgument(_) => {
            StatusCode::BAD_REQUEST
        }
        RoomSyncError::ProviderTransient(_)
        | RoomSyncError::ProviderRejected { .. }
        | RoomSyncError::CursorInvalid(_) => StatusCode::BAD_GATEWAY,
        RoomSyncError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, room = ?self.room, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.error.to_string(),
            room: self.room,
        });
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            error: err.into(),
            room: None,
        }
    }
}

/// Per-room entry of a multi-room response.
#[derive(Serialize)]
pub struct RoomResult<T: Serialize> {
    pub room: RoomId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RoomResult<T> {
    pub fn from_result(room: RoomId, result: RoomSyncResult<T>) -> Self {
        match result {
            Ok(value) => RoomResult {
                room,
                success: true,
                result: Some(value),
                error: None,
            },
            Err(err) => RoomResult {
                room,
                success: false,
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Room ids from a request. Case-insensitive; anything outside a..e is an
/// unknown room.
pub fn parse_rooms(ids: &[String]) -> RoomSyncResult<Vec<RoomId>> {
    ids.iter().map(|id| id.trim().parse()).collect()
}

/// An RFC 3339 instant, or a plain date meaning local midnight.
pub fn parse_instant(field: &str, text: &str) -> RoomSyncResult<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    text.parse()
        .map(local_midnight)
        .map_err(|_| RoomSyncError::InvalidArgument(format!("{field}: cannot parse '{text}'")))
}
