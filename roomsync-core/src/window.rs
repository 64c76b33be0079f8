//! Half-open time windows for range queries and windowed syncs.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::civil_time::local_midnight;
use crate::error::{RoomSyncError, RoomSyncResult};

/// `[start, end)` in absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> RoomSyncResult<Self> {
        if start >= end {
            return Err(RoomSyncError::InvalidRange { start, end });
        }
        Ok(TimeWindow { start, end })
    }

    /// From one day before `now` to `weeks` weeks after it.
    pub fn upcoming(now: DateTime<Utc>, weeks: u32) -> Self {
        TimeWindow {
            start: now - Duration::days(1),
            end: now + Duration::weeks(i64::from(weeks)),
        }
    }

    /// Local (UTC+9) calendar days `from..=to`.
    pub fn local_days(from: NaiveDate, to: NaiveDate) -> RoomSyncResult<Self> {
        let next = to
            .succ_opt()
            .ok_or_else(|| RoomSyncError::Config(format!("date out of range: {to}")))?;
        TimeWindow::new(local_midnight(from), local_midnight(next))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether `[start, end)` lies entirely inside this window.
    pub fn encloses(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}
