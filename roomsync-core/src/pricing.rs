//! Booking price calculation.
//!
//! A booking is priced hour by hour in local civil time. Each step point
//! falls into one band: dawn (00–06, a sixth of the overnight rate),
//! weekend/holiday (after-16 rate), or weekday (before-16 / after-16 split
//! at 16:00). A trailing partial hour is charged as a full hour. An exact
//! 00:00–06:00 booking is charged the flat overnight rate instead.
//!
//! The nominal total is then reduced to the share the booking channel lets
//! us keep and rounded to whole won.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Timelike, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::civil_time::{local_date, local_hour, to_local};
use crate::constants::{
    DAWN_END_HOUR, DIRECT_RETAINED_FRACTION, EVENING_START_HOUR, OVERNIGHT_BLOCK_HOURS,
    PARTNER_RETAINED_FRACTION,
};
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::room::RoomId;
use crate::tariff::{HolidayCalendar, Tariff, TariffTable};

static RESERVATION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"예약번호:\s*\d+").expect("reservation number pattern"));

/// Label attached to a priced booking. Decided from the start instant only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceClass {
    #[serde(rename = "general")]
    General,
    #[serde(rename = "evening")]
    Evening,
    #[serde(rename = "weekend/holiday")]
    WeekendHoliday,
    #[serde(rename = "dawn")]
    Dawn,
    #[serde(rename = "overnight-block")]
    OvernightBlock,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PriceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceClass::General => "general",
            PriceClass::Evening => "evening",
            PriceClass::WeekendHoliday => "weekend/holiday",
            PriceClass::Dawn => "dawn",
            PriceClass::OvernightBlock => "overnight-block",
            PriceClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PriceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PriceClass {
    type Err = RoomSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(PriceClass::General),
            "evening" => Ok(PriceClass::Evening),
            "weekend/holiday" => Ok(PriceClass::WeekendHoliday),
            "dawn" => Ok(PriceClass::Dawn),
            "overnight-block" => Ok(PriceClass::OvernightBlock),
            "unknown" => Ok(PriceClass::Unknown),
            other => Err(RoomSyncError::Serialization(format!(
                "unknown price class '{other}'"
            ))),
        }
    }
}

/// Rate band of a single hour step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HourBand {
    Dawn,
    WeekendHoliday,
    WeekdayDay,
    WeekdayEvening,
}

impl HourBand {
    fn of(instant: DateTime<Utc>, holidays: &HolidayCalendar) -> Self {
        let hour = local_hour(instant);
        if hour < DAWN_END_HOUR {
            HourBand::Dawn
        } else if holidays.is_weekend_or_holiday(local_date(instant)) {
            HourBand::WeekendHoliday
        } else if hour < EVENING_START_HOUR {
            HourBand::WeekdayDay
        } else {
            HourBand::WeekdayEvening
        }
    }

    fn hourly_rate(&self, tariff: &Tariff) -> f64 {
        match self {
            HourBand::Dawn => tariff.dawn_hourly(),
            HourBand::WeekendHoliday | HourBand::WeekdayEvening => tariff.after16 as f64,
            HourBand::WeekdayDay => tariff.before16 as f64,
        }
    }

    fn class(&self) -> PriceClass {
        match self {
            HourBand::Dawn => PriceClass::Dawn,
            HourBand::WeekendHoliday => PriceClass::WeekendHoliday,
            HourBand::WeekdayDay => PriceClass::General,
            HourBand::WeekdayEvening => PriceClass::Evening,
        }
    }
}

/// Computed price of one booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: i64,
    pub class: PriceClass,
    /// Booked through the partner reservation platform.
    pub partner: bool,
}

impl PriceQuote {
    pub fn unknown(partner: bool) -> Self {
        PriceQuote {
            price: 0,
            class: PriceClass::Unknown,
            partner,
        }
    }
}

/// Partner bookings carry a "예약번호: 123" reservation number.
pub fn is_partner_booking(description: &str) -> bool {
    RESERVATION_NUMBER.is_match(description)
}

pub fn retained_fraction(partner: bool) -> f64 {
    if partner {
        PARTNER_RETAINED_FRACTION
    } else {
        DIRECT_RETAINED_FRACTION
    }
}

fn is_overnight_block(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let local_start = to_local(start);
    local_start.hour() == 0
        && local_start.minute() == 0
        && local_start.second() == 0
        && local_start.nanosecond() == 0
        && end - start == Duration::hours(OVERNIGHT_BLOCK_HOURS)
}

/// Nominal (pre-commission) total and label for `[start, end)`.
fn nominal_total(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tariff: &Tariff,
    holidays: &HolidayCalendar,
) -> (f64, PriceClass) {
    if is_overnight_block(start, end) {
        return (tariff.overnight as f64, PriceClass::OvernightBlock);
    }

    let mut total = 0.0;
    let mut step = start;
    while step < end {
        total += HourBand::of(step, holidays).hourly_rate(tariff);
        step += Duration::hours(1);
    }

    (total, HourBand::of(start, holidays).class())
}

/// Price a booking against one room's tariff.
pub fn calculate_price(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tariff: &Tariff,
    holidays: &HolidayCalendar,
    description: &str,
) -> RoomSyncResult<PriceQuote> {
    if start >= end {
        return Err(RoomSyncError::InvalidRange { start, end });
    }

    let partner = is_partner_booking(description);
    let (nominal, class) = nominal_total(start, end, tariff, holidays);
    let price = (nominal * retained_fraction(partner)).round() as i64;

    Ok(PriceQuote {
        price,
        class,
        partner,
    })
}

/// Prices bookings for any room from a tariff snapshot.
#[derive(Debug, Clone)]
pub struct PriceCalculator {
    holidays: HolidayCalendar,
}

impl PriceCalculator {
    pub fn new(holidays: HolidayCalendar) -> Self {
        PriceCalculator { holidays }
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    pub fn quote(
        &self,
        room: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: &str,
        tariffs: &TariffTable,
    ) -> RoomSyncResult<PriceQuote> {
        let tariff = tariffs.get(room)?;
        calculate_price(start, end, tariff, &self.holidays, description)
    }
}

impl Default for PriceCalculator {
    fn default() -> Self {
        PriceCalculator::new(HolidayCalendar::korean_2025())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Local (UTC+9) wall-clock time as a UTC instant.
    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        crate::civil_time::local_offset()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn room_d() -> Tariff {
        Tariff::new(3000, 5000, 15000)
    }

    fn quote(start: DateTime<Utc>, end: DateTime<Utc>, description: &str) -> PriceQuote {
        calculate_price(start, end, &room_d(), &HolidayCalendar::korean_2025(), description)
            .unwrap()
    }

    #[test]
    fn test_weekday_morning_direct_booking() {
        // Monday 09:00–10:00
        let q = quote(local(2025, 11, 3, 9, 0), local(2025, 11, 3, 10, 0), "일반 예약");
        assert_eq!(q.price, 2700);
        assert_eq!(q.class, PriceClass::General);
        assert!(!q.partner);
    }

    #[test]
    fn test_weekday_morning_partner_booking() {
        let q = quote(
            local(2025, 11, 3, 9, 0),
            local(2025, 11, 3, 10, 0),
            "예약번호: 12345",
        );
        assert_eq!(q.price, 2941);
        assert!(q.partner);
    }

    #[test]
    fn test_saturday_morning_uses_after16_rate() {
        let q = quote(local(2025, 11, 1, 9, 0), local(2025, 11, 1, 10, 0), "");
        assert_eq!(q.price, 4500);
        assert_eq!(q.class, PriceClass::WeekendHoliday);
    }

    #[test]
    fn test_whole_weekend_day_is_weekend_priced_every_hour() {
        // Sunday 08:00–14:00, six hours at 5000
        let q = quote(local(2025, 11, 2, 8, 0), local(2025, 11, 2, 14, 0), "");
        assert_eq!(q.price, 27000);
    }

    #[test]
    fn test_holiday_overrides_weekday_band() {
        // Thursday 2025-10-09 is Hangul Day
        let q = quote(local(2025, 10, 9, 10, 0), local(2025, 10, 9, 12, 0), "");
        assert_eq!(q.price, 9000);
        assert_eq!(q.class, PriceClass::WeekendHoliday);
    }

    #[test]
    fn test_weekday_evening() {
        let q = quote(local(2025, 11, 3, 18, 0), local(2025, 11, 3, 19, 0), "");
        assert_eq!(q.price, 4500);
        assert_eq!(q.class, PriceClass::Evening);
    }

    #[test]
    fn test_crossing_16h_is_priced_per_hour_but_labelled_by_start() {
        // 15:00–17:00 → 3000 + 5000
        let q = quote(local(2025, 11, 3, 15, 0), local(2025, 11, 3, 17, 0), "");
        assert_eq!(q.price, 7200);
        assert_eq!(q.class, PriceClass::General);
    }

    #[test]
    fn test_partial_last_hour_counts_as_full_hour() {
        let q = quote(local(2025, 11, 3, 9, 0), local(2025, 11, 3, 10, 30), "");
        assert_eq!(q.price, 5400);
    }

    #[test]
    fn test_exact_overnight_block_is_flat_rate() {
        let q = quote(local(2025, 11, 4, 0, 0), local(2025, 11, 4, 6, 0), "");
        assert_eq!(q.price, 13500);
        assert_eq!(q.class, PriceClass::OvernightBlock);
    }

    #[test]
    fn test_near_overnight_spans_fall_through_to_hourly() {
        let block = quote(local(2025, 11, 4, 0, 0), local(2025, 11, 4, 6, 0), "");
        let short = quote(local(2025, 11, 4, 0, 0), local(2025, 11, 4, 5, 30), "");
        let late = quote(local(2025, 11, 4, 0, 30), local(2025, 11, 4, 6, 0), "");

        assert_eq!(short.class, PriceClass::Dawn);
        assert_eq!(late.class, PriceClass::Dawn);
        assert!(block.price <= short.price);
        assert!(block.price <= late.price);

        // Running past 06:00 picks up a daytime hour on top of the dawn hours.
        let longer = quote(local(2025, 11, 4, 0, 0), local(2025, 11, 4, 7, 0), "");
        assert_eq!(longer.price, ((15000.0 + 3000.0) * 0.9_f64).round() as i64);
        assert!(block.price < longer.price);
    }

    #[test]
    fn test_dawn_rate_is_fractional_and_rounded_once() {
        // Room b: overnight 20000 → 3333.33/hour
        let tariff = Tariff::new(9000, 11000, 20000);
        let q = calculate_price(
            local(2025, 11, 4, 1, 0),
            local(2025, 11, 4, 2, 0),
            &tariff,
            &HolidayCalendar::default(),
            "",
        )
        .unwrap();
        assert_eq!(q.price, 3000);
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        let start = local(2025, 11, 3, 9, 0);
        let result = calculate_price(
            start,
            start,
            &room_d(),
            &HolidayCalendar::default(),
            "",
        );
        assert!(matches!(result, Err(RoomSyncError::InvalidRange { .. })));
    }

    #[test]
    fn test_unknown_room_in_table() {
        let mut table = TariffTable::default();
        table.0.remove(&RoomId::E);
        let calc = PriceCalculator::default();
        let result = calc.quote(
            RoomId::E,
            local(2025, 11, 3, 9, 0),
            local(2025, 11, 3, 10, 0),
            "",
            &table,
        );
        assert!(matches!(result, Err(RoomSyncError::UnknownRoom(_))));
    }

    #[test]
    fn test_partner_pattern_requires_colon_and_digits() {
        assert!(is_partner_booking("네이버 예약번호:998877 홍길동"));
        assert!(is_partner_booking("예약번호:   42"));
        assert!(!is_partner_booking("예약번호 없음"));
        assert!(!is_partner_booking(""));
    }

    #[test]
    fn test_price_class_round_trips_through_str() {
        for class in [
            PriceClass::General,
            PriceClass::Evening,
            PriceClass::WeekendHoliday,
            PriceClass::Dawn,
            PriceClass::OvernightBlock,
            PriceClass::Unknown,
        ] {
            assert_eq!(class.as_str().parse::<PriceClass>().unwrap(), class);
        }
    }
}
