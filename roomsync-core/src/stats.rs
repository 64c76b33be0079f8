//! Revenue statistics over stored bookings, bucketed in local civil time.
//!
//! Unpriced bookings count as bookings with zero revenue, except in the
//! hourly view which only looks at priced ones.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Timelike};
use serde::Serialize;

use crate::booking::Booking;
use crate::civil_time::{local_year_bounds, to_local};
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::room::RoomId;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsKind {
    Summary,
    Monthly,
    Room,
    Daily,
    Weekly,
    Hourly,
}

impl FromStr for StatsKind {
    type Err = RoomSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(StatsKind::Summary),
            "monthly" => Ok(StatsKind::Monthly),
            "room" => Ok(StatsKind::Room),
            "daily" => Ok(StatsKind::Daily),
            "weekly" => Ok(StatsKind::Weekly),
            "hourly" => Ok(StatsKind::Hourly),
            other => Err(RoomSyncError::InvalidArgument(format!(
                "unknown stats type '{other}'"
            ))),
        }
    }
}

/// What to aggregate: a whole local year, or one month of it for `daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery {
    pub kind: StatsKind,
    pub year: i32,
    pub month: Option<u32>,
}

impl StatsQuery {
    /// Bookings starting in this window are the input.
    pub fn window(&self) -> RoomSyncResult<TimeWindow> {
        match (self.kind, self.month) {
            (StatsKind::Daily, None) => Err(RoomSyncError::InvalidArgument(
                "daily statistics need a month".into(),
            )),
            (StatsKind::Daily, Some(month)) => {
                let first = month_start(self.year, month)?;
                let last = month_end(first)?;
                TimeWindow::local_days(first, last)
            }
            _ => {
                let (start, end) = local_year_bounds(self.year);
                TimeWindow::new(start, end)
            }
        }
    }
}

fn month_start(year: i32, month: u32) -> RoomSyncResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| RoomSyncError::InvalidArgument(format!("invalid month {year}-{month}")))
}

fn month_end(first: NaiveDate) -> RoomSyncResult<NaiveDate> {
    first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| RoomSyncError::InvalidArgument(format!("month out of range: {first}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoomTotals {
    pub count: usize,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopRoom {
    pub room_id: RoomId,
    pub count: usize,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub year: i32,
    pub total_revenue: i64,
    pub total_bookings: usize,
    pub average_price: i64,
    pub top_room: Option<TopRoom>,
    pub room_stats: BTreeMap<RoomId, RoomTotals>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub revenue: i64,
    pub bookings: usize,
    pub by_room: BTreeMap<RoomId, i64>,
}

impl Bucket {
    fn empty() -> Self {
        Bucket {
            revenue: 0,
            bookings: 0,
            by_room: RoomId::ALL.iter().map(|r| (*r, 0)).collect(),
        }
    }

    fn add(&mut self, booking: &Booking) {
        self.revenue += booking.revenue();
        self.bookings += 1;
        *self.by_room.entry(booking.room_id).or_default() += booking.revenue();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub month: u32,
    #[serde(flatten)]
    pub totals: Bucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBreakdown {
    pub name: String,
    pub bookings: usize,
    pub revenue: i64,
    pub average_price: i64,
    pub by_price_type: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayBucket {
    pub day: u32,
    #[serde(flatten)]
    pub totals: Bucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBucket {
    pub iso_year: i32,
    pub week: u32,
    #[serde(flatten)]
    pub totals: Bucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourBucket {
    pub hour: u32,
    pub revenue: i64,
    pub bookings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Stats {
    Summary(Summary),
    Monthly(Vec<MonthBucket>),
    Room(BTreeMap<RoomId, RoomBreakdown>),
    Daily(Vec<DayBucket>),
    Weekly(Vec<WeekBucket>),
    Hourly(Vec<HourBucket>),
}

fn average(revenue: i64, count: usize) -> i64 {
    if count == 0 {
        0
    } else {
        (revenue as f64 / count as f64).round() as i64
    }
}

pub fn summary(year: i32, bookings: &[Booking]) -> Summary {
    let mut room_stats: BTreeMap<RoomId, RoomTotals> = BTreeMap::new();
    let mut total_revenue = 0;
    for booking in bookings {
        total_revenue += booking.revenue();
        let totals = room_stats.entry(booking.room_id).or_default();
        totals.count += 1;
        totals.revenue += booking.revenue();
    }

    // Ties go to the earlier room.
    let top_room = room_stats
        .iter()
        .max_by(|(ra, a), (rb, b)| a.count.cmp(&b.count).then(rb.cmp(ra)))
        .map(|(room, totals)| TopRoom {
            room_id: *room,
            count: totals.count,
            revenue: totals.revenue,
        });

    Summary {
        year,
        total_revenue,
        total_bookings: bookings.len(),
        average_price: average(total_revenue, bookings.len()),
        top_room,
        room_stats,
    }
}

pub fn monthly(bookings: &[Booking]) -> Vec<MonthBucket> {
    let mut months: Vec<MonthBucket> = (1..=12)
        .map(|month| MonthBucket {
            month,
            totals: Bucket::empty(),
        })
        .collect();
    for booking in bookings {
        let month = to_local(booking.start).month();
        months[(month - 1) as usize].totals.add(booking);
    }
    months
}

pub fn by_room(bookings: &[Booking]) -> BTreeMap<RoomId, RoomBreakdown> {
    RoomId::ALL
        .iter()
        .map(|room| {
            let mut revenue = 0;
            let mut count = 0;
            let mut by_price_type: BTreeMap<String, i64> = BTreeMap::new();
            for booking in bookings.iter().filter(|b| b.room_id == *room) {
                revenue += booking.revenue();
                count += 1;
                let label = booking
                    .price_class
                    .map(|c| c.as_str())
                    .unwrap_or("general");
                *by_price_type.entry(label.to_string()).or_default() += booking.revenue();
            }
            let breakdown = RoomBreakdown {
                name: room.display_name(),
                bookings: count,
                revenue,
                average_price: average(revenue, count),
                by_price_type,
            };
            (*room, breakdown)
        })
        .collect()
}

/// One bucket per day of the month. Bookings from other months are ignored.
pub fn daily(year: i32, month: u32, bookings: &[Booking]) -> RoomSyncResult<Vec<DayBucket>> {
    let last = month_end(month_start(year, month)?)?;
    let mut days: Vec<DayBucket> = (1..=last.day())
        .map(|day| DayBucket {
            day,
            totals: Bucket::empty(),
        })
        .collect();
    for booking in bookings {
        let date = to_local(booking.start).date_naive();
        if date.year() == year && date.month() == month {
            days[(date.day() - 1) as usize].totals.add(booking);
        }
    }
    Ok(days)
}

/// ISO weeks that have bookings, in order.
pub fn weekly(bookings: &[Booking]) -> Vec<WeekBucket> {
    let mut weeks: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();
    for booking in bookings {
        let iso = to_local(booking.start).iso_week();
        weeks
            .entry((iso.year(), iso.week()))
            .or_insert_with(Bucket::empty)
            .add(booking);
    }
    weeks
        .into_iter()
        .map(|((iso_year, week), totals)| WeekBucket {
            iso_year,
            week,
            totals,
        })
        .collect()
}

pub fn hourly(bookings: &[Booking]) -> Vec<HourBucket> {
    let mut hours: Vec<HourBucket> = (0..24)
        .map(|hour| HourBucket {
            hour,
            revenue: 0,
            bookings: 0,
        })
        .collect();
    for booking in bookings {
        let Some(price) = booking.price else {
            continue;
        };
        let bucket = &mut hours[to_local(booking.start).hour() as usize];
        bucket.revenue += price;
        bucket.bookings += 1;
    }
    hours
}

/// Aggregate bookings already selected with [`StatsQuery::window`].
pub fn compute(query: &StatsQuery, bookings: &[Booking]) -> RoomSyncResult<Stats> {
    Ok(match query.kind {
        StatsKind::Summary => Stats::Summary(summary(query.year, bookings)),
        StatsKind::Monthly => Stats::Monthly(monthly(bookings)),
        StatsKind::Room => Stats::Room(by_room(bookings)),
        StatsKind::Daily => {
            let month = query.month.ok_or_else(|| {
                RoomSyncError::InvalidArgument("daily statistics need a month".into())
            })?;
            Stats::Daily(daily(query.year, month, bookings)?)
        }
        StatsKind::Weekly => Stats::Weekly(weekly(bookings)),
        StatsKind::Hourly => Stats::Hourly(hourly(bookings)),
    })
}
