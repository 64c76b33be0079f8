//! Shared constants.

use std::time::Duration;

/// Local civil time is a fixed UTC+9 offset (no DST).
pub const LOCAL_UTC_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Weekday hours from this local hour on are charged at the after-16 rate.
pub const EVENING_START_HOUR: u32 = 16;

/// Local hours `[0, DAWN_END_HOUR)` form the midnight band.
pub const DAWN_END_HOUR: u32 = 6;

/// Length of the flat-rate overnight block.
pub const OVERNIGHT_BLOCK_HOURS: i64 = 6;

/// Share of the nominal price kept for direct bookings.
pub const DIRECT_RETAINED_FRACTION: f64 = 0.9;

/// Share of the nominal price kept for partner-platform bookings.
pub const PARTNER_RETAINED_FRACTION: f64 = 0.9802;

/// Rows per booking upsert batch.
pub const UPSERT_BATCH_SIZE: usize = 200;

/// Max events per provider page.
pub const PROVIDER_PAGE_SIZE: u32 = 2500;

/// How many times a rejected cursor may fall back to a full resync per call.
pub const MAX_CURSOR_RETRIES: u32 = 1;

pub const DEFAULT_WEBHOOK_COOLDOWN: Duration = Duration::from_secs(5);

pub const DEFAULT_RENEW_MARGIN: Duration = Duration::from_secs(3 * 24 * 60 * 60);

pub const DEFAULT_POLICY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
