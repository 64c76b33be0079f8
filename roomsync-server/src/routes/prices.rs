//! Effective-dated price policies, estimates and recalculation.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::NaiveDate;
use roomsync_core::civil_time::local_date;
use roomsync_core::policy::RecalculationReport;
use roomsync_core::price_text::estimate_default_price;
use roomsync_core::pricing::PriceQuote;
use roomsync_core::tariff::{PricePolicy, TariffTable};
use roomsync_core::{RoomId, RoomSyncError};
use serde::{Deserialize, Serialize};

use crate::routes::{AppError, parse_instant};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prices", get(list_policies).post(create_policy))
        .route("/prices/estimate", get(estimate))
        .route("/prices/recalculate", post(recalculate))
}

/// Accepts both `effective_from` and the browser's `effectiveFrom`.
#[derive(Debug, Deserialize)]
pub struct NewPolicy {
    #[serde(alias = "effectiveFrom")]
    pub effective_from: NaiveDate,
    #[serde(default, alias = "effectiveTo")]
    pub effective_to: Option<NaiveDate>,
    #[serde(alias = "roomPrices")]
    pub room_prices: TariffTable,
}

#[derive(Debug, Deserialize)]
pub struct EstimateQuery {
    pub room: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
pub struct Estimate {
    pub room: RoomId,
    /// Tariff price with the policy in force on the start date.
    pub quote: PriceQuote,
    /// Rough band estimate, for comparison.
    pub estimate: i64,
}

/// GET /prices - stored policies
async fn list_policies(
    State(state): State<AppState>,
) -> Result<Json<Vec<PricePolicy>>, AppError> {
    let policies = state.pricer.policies().stored_policies().await?;
    Ok(Json((*policies).clone()))
}

/// POST /prices - add a policy
async fn create_policy(
    State(state): State<AppState>,
    Json(request): Json<NewPolicy>,
) -> Result<Json<PricePolicy>, AppError> {
    if let Some(to) = request.effective_to
        && to < request.effective_from
    {
        return Err(RoomSyncError::InvalidArgument(format!(
            "effective_to {to} is before effective_from {}",
            request.effective_from
        ))
        .into());
    }
    if request.room_prices.0.is_empty() {
        return Err(RoomSyncError::InvalidArgument("room_prices is empty".into()).into());
    }

    let policy = PricePolicy {
        id: None,
        effective_from: request.effective_from,
        effective_to: request.effective_to,
        tariffs: request.room_prices,
    };
    let stored = state.pricer.policies().insert(&policy).await?;
    Ok(Json(stored))
}

/// GET /prices/estimate?room&start&end
async fn estimate(
    State(state): State<AppState>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<Estimate>, AppError> {
    let room: RoomId = query.room.parse()?;
    let start = parse_instant("start", &query.start)?;
    let end = parse_instant("end", &query.end)?;

    let tariffs = state.pricer.policies().tariffs_on(local_date(start)).await;
    let quote = state
        .pricer
        .calculator()
        .quote(room, start, end, "", &tariffs)?;
    let estimate = estimate_default_price(start, end, room, &tariffs)?;

    Ok(Json(Estimate {
        room,
        quote,
        estimate,
    }))
}

/// POST /prices/recalculate - reprice every stored booking
async fn recalculate(
    State(state): State<AppState>,
) -> Result<Json<RecalculationReport>, AppError> {
    let report = state.pricer.recalculate(state.bookings.as_ref()).await?;
    Ok(Json(report))
}
