//! Per-room rate bands, holidays and effective-dated price policies.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::civil_time::is_weekend;
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::room::RoomId;

fn default_multiplier() -> f64 {
    1.0
}

/// Hourly rates for one room, in KRW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    /// Weekday hours before 16:00.
    pub before16: i64,
    /// Weekday hours from 16:00, and every non-dawn weekend/holiday hour.
    pub after16: i64,
    /// Flat rate for an exact 00:00–06:00 block. Dawn hours cost a sixth of it.
    pub overnight: i64,
    /// Only used by the rough fallback estimator.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Tariff {
    pub fn new(before16: i64, after16: i64, overnight: i64) -> Self {
        Tariff {
            before16,
            after16,
            overnight,
            multiplier: default_multiplier(),
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Hourly rate of a dawn hour.
    pub fn dawn_hourly(&self) -> f64 {
        self.overnight as f64 / 6.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TariffTable(pub BTreeMap<RoomId, Tariff>);

impl TariffTable {
    pub fn get(&self, room: RoomId) -> RoomSyncResult<&Tariff> {
        self.0
            .get(&room)
            .ok_or_else(|| RoomSyncError::UnknownRoom(room.to_string()))
    }

    pub fn insert(&mut self, room: RoomId, tariff: Tariff) {
        self.0.insert(room, tariff);
    }
}

impl Default for TariffTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(RoomId::A, Tariff::new(10000, 13000, 30000));
        table.insert(RoomId::B, Tariff::new(9000, 11000, 20000).with_multiplier(1.2));
        table.insert(RoomId::C, Tariff::new(4000, 6000, 15000));
        table.insert(RoomId::D, Tariff::new(3000, 5000, 15000).with_multiplier(1.1));
        table.insert(RoomId::E, Tariff::new(8000, 10000, 20000).with_multiplier(0.9));
        TariffTable(table)
    }
}

const KOREAN_HOLIDAYS_2025: [(u32, u32); 17] = [
    (1, 1),
    (1, 28),
    (1, 29),
    (1, 30),
    (3, 1),
    (3, 3),
    (5, 5),
    (5, 6),
    (6, 6),
    (8, 15),
    (9, 6),
    (9, 7),
    (9, 8),
    (9, 9),
    (10, 3),
    (10, 9),
    (12, 25),
];

/// Public holidays, charged like weekends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolidayCalendar(BTreeSet<NaiveDate>);

impl HolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        HolidayCalendar(dates.into_iter().collect())
    }

    pub fn korean_2025() -> Self {
        HolidayCalendar::new(
            KOREAN_HOLIDAYS_2025
                .iter()
                .filter_map(|(m, d)| NaiveDate::from_ymd_opt(2025, *m, *d)),
        )
    }

    pub fn extend(&mut self, dates: impl IntoIterator<Item = NaiveDate>) {
        self.0.extend(dates);
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }

    pub fn is_weekend_or_holiday(&self, date: NaiveDate) -> bool {
        is_weekend(date) || self.contains(date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A tariff table valid from `effective_from` (inclusive) until
/// `effective_to` (inclusive, open-ended when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    #[serde(rename = "room_prices")]
    pub tariffs: TariffTable,
}

impl PricePolicy {
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.is_none_or(|to| to >= date)
    }
}

/// The most recent policy applicable on `date`.
pub fn resolve_policy(policies: &[PricePolicy], date: NaiveDate) -> Option<&PricePolicy> {
    policies
        .iter()
        .filter(|p| p.applies_on(date))
        .max_by_key(|p| p.effective_from)
}
