use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{Datelike, Utc};
use roomsync_core::civil_time::to_local;
use roomsync_core::room::RoomId;
use roomsync_core::stats::{self, Stats, StatsKind, StatsQuery};
use serde::Deserialize;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/stats", get(admin_stats))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// GET /admin/stats?type=summary|monthly|room|daily|weekly|hourly&year&month
async fn admin_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Stats>, AppError> {
    let kind = match params.kind.as_deref() {
        Some(kind) => kind.parse()?,
        None => StatsKind::Summary,
    };
    let query = StatsQuery {
        kind,
        year: params.year.unwrap_or_else(|| to_local(Utc::now()).year()),
        month: params.month,
    };
    let window = query.window()?;

    let bookings = state
        .bookings
        .bookings_in_range(&RoomId::ALL, &window)
        .await?;
    tracing::debug!(kind = ?query.kind, year = query.year, bookings = bookings.len(), "computing statistics");

    Ok(Json(stats::compute(&query, &bookings)?))
}
