//! Prices written by hand into event titles and descriptions, and the rough
//! time-band estimator used when neither a tariff nor a stated price exists.
//!
//! A stated price is informational. It is stored next to the computed price
//! and never replaces it.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::civil_time::local_hour;
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::room::RoomId;
use crate::tariff::TariffTable;

static WON_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:,?\d{3})*)\s*원").expect("won pattern"));

/// "3만원", "5만5천원", "3만 5천원"
static MAN_CHEON_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*만\s*(\d*)\s*천?\s*원").expect("man-cheon pattern")
});

static DESCRIPTION_AMOUNTS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(\d{1,3}(?:,?\d{3})*)\s*원").expect("won pattern"),
        Regex::new(r"(\d{1,3}(?:,?\d{3})*)\s*/").expect("slash pattern"),
        Regex::new(r"가격[:\s]*(\d{1,3}(?:,?\d{3})*)").expect("label pattern"),
    ]
});

/// Keyword hint found next to a stated price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatedPriceKind {
    /// 심야 / 야간
    LateNight,
    /// 새벽
    Dawn,
    /// 할인 / 특가
    Discount,
    General,
}

impl StatedPriceKind {
    fn from_text(text: &str) -> Self {
        if text.contains("심야") || text.contains("야간") {
            StatedPriceKind::LateNight
        } else if text.contains("새벽") {
            StatedPriceKind::Dawn
        } else if text.contains("할인") || text.contains("특가") {
            StatedPriceKind::Discount
        } else {
            StatedPriceKind::General
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatedPrice {
    pub amount: Option<i64>,
    pub kind: StatedPriceKind,
}

fn parse_amount(digits: &str) -> Option<i64> {
    digits.replace(',', "").parse().ok()
}

/// Amount written in units of 10,000 (만) and 1,000 (천).
fn parse_man_cheon(text: &str) -> Option<i64> {
    let caps = MAN_CHEON_AMOUNT.captures(text)?;
    let man: i64 = caps.get(1)?.as_str().parse().ok()?;
    let cheon: i64 = match caps.get(2).map(|m| m.as_str()) {
        Some(digits) if !digits.is_empty() => digits.parse().ok()?,
        _ => 0,
    };
    Some(man * 10_000 + cheon * 1_000)
}

/// Look for an explicit amount in the title or description: "30,000원"
/// first, then the "3만원" / "5만5천원" form.
pub fn parse_stated_price(title: &str, description: &str) -> StatedPrice {
    let text = format!("{title} {description}");
    let amount = WON_AMOUNT
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_amount(m.as_str()))
        .or_else(|| parse_man_cheon(&text));

    StatedPrice {
        amount,
        kind: StatedPriceKind::from_text(&text),
    }
}

/// First amount written as "N원", "N/" or "가격: N" in a description.
pub fn extract_description_price(description: &str) -> Option<i64> {
    DESCRIPTION_AMOUNTS.iter().find_map(|pattern| {
        pattern
            .captures(description)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_amount(m.as_str()))
    })
}

fn estimator_hourly_rate(hour: u32) -> f64 {
    match hour {
        0..6 => 15000.0,
        6..16 => 20000.0,
        16..22 => 25000.0,
        _ => 30000.0,
    }
}

/// Rough estimate: one band picked by the start hour, times the duration in
/// hours, times the room multiplier.
pub fn estimate_default_price(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    room: RoomId,
    tariffs: &TariffTable,
) -> RoomSyncResult<i64> {
    if start >= end {
        return Err(RoomSyncError::InvalidRange { start, end });
    }
    let multiplier = tariffs.get(room).map(|t| t.multiplier).unwrap_or(1.0);
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    let rate = estimator_hourly_rate(local_hour(start));
    Ok((rate * hours * multiplier).round() as i64)
}
