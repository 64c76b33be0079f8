//! In-memory provider and stores.
//!
//! Used when no Supabase project is configured, and by tests. The calendar
//! keeps a version counter so that delta listings and sync tokens behave
//! like the real provider's.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::booking::Booking;
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::provider::{
    CalendarProvider, ChannelRequest, EventPage, ListQuery, ListRequest, ProviderEvent,
    WatchResponse,
};
use crate::room::RoomId;
use crate::store::{
    BookingStore, ChannelStore, PricePolicyStore, SyncCursor, SyncStateStore, WebhookChannel,
};
use crate::tariff::PricePolicy;
use crate::window::TimeWindow;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

const DEFAULT_CHANNEL_TTL_DAYS: i64 = 7;

#[derive(Debug, Default)]
struct CalendarData {
    /// event id → (event, version of its last change)
    events: BTreeMap<String, (ProviderEvent, u64)>,
    /// Tokens issued before this version are refused.
    min_valid_version: u64,
    failing: bool,
    latency: Option<StdDuration>,
}

#[derive(Debug, Clone)]
struct ActiveChannel {
    calendar_id: String,
    resource_id: String,
    token: String,
}

#[derive(Debug, Default)]
struct CalendarState {
    version: u64,
    calendars: HashMap<String, CalendarData>,
    channels: HashMap<String, ActiveChannel>,
    next_resource: u64,
}

/// A provider whose calendars live in memory.
#[derive(Debug, Default)]
pub struct MemoryCalendar {
    state: Mutex<CalendarState>,
    list_calls: AtomicUsize,
}

impl MemoryCalendar {
    pub fn new() -> Self {
        MemoryCalendar::default()
    }

    /// Create or replace an event.
    pub fn put_event(&self, calendar_id: &str, event: ProviderEvent) {
        let mut state = lock(&self.state);
        state.version += 1;
        let version = state.version;
        let calendar = state.calendars.entry(calendar_id.to_string()).or_default();
        calendar.events.insert(event.id.clone(), (event, version));
    }

    /// Mark an event cancelled. Delta listings report it once; full and
    /// window listings omit it.
    pub fn cancel_event(&self, calendar_id: &str, event_id: &str) {
        let mut state = lock(&self.state);
        state.version += 1;
        let version = state.version;
        let calendar = state.calendars.entry(calendar_id.to_string()).or_default();
        calendar
            .events
            .insert(event_id.to_string(), (ProviderEvent::cancelled(event_id), version));
    }

    /// Drop an event without leaving a cancellation behind, as happens when
    /// a change falls outside what the provider still tracks.
    pub fn forget_event(&self, calendar_id: &str, event_id: &str) {
        let mut state = lock(&self.state);
        if let Some(calendar) = state.calendars.get_mut(calendar_id) {
            calendar.events.remove(event_id);
        }
    }

    /// Refuse every sync token issued so far for this calendar.
    pub fn invalidate_tokens(&self, calendar_id: &str) {
        let mut state = lock(&self.state);
        state.version += 1;
        let version = state.version;
        state
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .min_valid_version = version;
    }

    /// Make every call for this calendar fail as a transient error.
    pub fn set_failing(&self, calendar_id: &str, failing: bool) {
        lock(&self.state)
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .failing = failing;
    }

    pub fn set_latency(&self, calendar_id: &str, latency: Option<StdDuration>) {
        lock(&self.state)
            .calendars
            .entry(calendar_id.to_string())
            .or_default()
            .latency = latency;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn active_channel_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.state).channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The token the channel was registered with.
    pub fn channel_token(&self, channel_id: &str) -> Option<String> {
        lock(&self.state)
            .channels
            .get(channel_id)
            .map(|c| c.token.clone())
    }

    fn check_calendar(&self, calendar_id: &str) -> RoomSyncResult<Option<StdDuration>> {
        let state = lock(&self.state);
        match state.calendars.get(calendar_id) {
            Some(calendar) if calendar.failing => Err(RoomSyncError::ProviderTransient(format!(
                "calendar {calendar_id} unavailable"
            ))),
            Some(calendar) => Ok(calendar.latency),
            None => Ok(None),
        }
    }

    fn select_events(
        &self,
        calendar_id: &str,
        query: &ListQuery,
    ) -> RoomSyncResult<(Vec<ProviderEvent>, Option<String>)> {
        let state = lock(&self.state);
        let current = state.version.to_string();
        let Some(calendar) = state.calendars.get(calendar_id) else {
            return match query {
                ListQuery::Window(_) => Ok((Vec::new(), None)),
                _ => Ok((Vec::new(), Some(current))),
            };
        };

        match query {
            ListQuery::Full => {
                let events = calendar
                    .events
                    .values()
                    .filter(|(e, _)| !e.cancelled)
                    .map(|(e, _)| e.clone())
                    .collect();
                Ok((events, Some(current)))
            }
            ListQuery::Delta { sync_token } => {
                let since: u64 = sync_token.parse().map_err(|_| {
                    RoomSyncError::CursorInvalid(format!("malformed token {sync_token}"))
                })?;
                if since < calendar.min_valid_version {
                    return Err(RoomSyncError::CursorInvalid(format!(
                        "token {sync_token} expired"
                    )));
                }
                let events = calendar
                    .events
                    .values()
                    .filter(|(_, version)| *version > since)
                    .map(|(e, _)| e.clone())
                    .collect();
                Ok((events, Some(current)))
            }
            ListQuery::Window(window) => {
                let events = calendar
                    .events
                    .values()
                    .filter(|(e, _)| !e.cancelled)
                    .filter(|(e, _)| {
                        e.concrete_span()
                            .is_some_and(|(start, end)| start < window.end && end > window.start)
                    })
                    .map(|(e, _)| e.clone())
                    .collect();
                Ok((events, None))
            }
        }
    }
}

#[async_trait]
impl CalendarProvider for MemoryCalendar {
    async fn list_events(
        &self,
        calendar_id: &str,
        request: &ListRequest,
    ) -> RoomSyncResult<EventPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.check_calendar(calendar_id)? {
            tokio::time::sleep(latency).await;
        }

        let (events, sync_token) = self.select_events(calendar_id, &request.query)?;
        let offset: usize = match &request.page_token {
            Some(token) => token
                .parse()
                .map_err(|_| RoomSyncError::ProviderRejected {
                    status: 400,
                    message: format!("bad page token {token}"),
                })?,
            None => 0,
        };
        let page_size = request.max_results.max(1) as usize;
        let end = (offset + page_size).min(events.len());
        let last_page = end >= events.len();

        Ok(EventPage {
            events: events.get(offset..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_page_token: (!last_page).then(|| end.to_string()),
            next_sync_token: if last_page { sync_token } else { None },
        })
    }

    async fn watch(
        &self,
        calendar_id: &str,
        request: &ChannelRequest,
    ) -> RoomSyncResult<WatchResponse> {
        self.check_calendar(calendar_id)?;
        let mut state = lock(&self.state);
        state.next_resource += 1;
        let resource_id = format!("res-{}", state.next_resource);
        state.channels.insert(
            request.channel_id.clone(),
            ActiveChannel {
                calendar_id: calendar_id.to_string(),
                resource_id: resource_id.clone(),
                token: request.token.clone(),
            },
        );
        let ttl = request
            .ttl
            .unwrap_or_else(|| Duration::days(DEFAULT_CHANNEL_TTL_DAYS));
        Ok(WatchResponse {
            resource_id,
            expiration: Utc::now() + ttl,
        })
    }

    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> RoomSyncResult<()> {
        let mut state = lock(&self.state);
        if let Some(active) = state.channels.get(channel_id) {
            self.check_failing(&state, &active.calendar_id)?;
            if active.resource_id == resource_id {
                state.channels.remove(channel_id);
            }
        }
        Ok(())
    }
}

impl MemoryCalendar {
    fn check_failing(&self, state: &CalendarState, calendar_id: &str) -> RoomSyncResult<()> {
        if state.calendars.get(calendar_id).is_some_and(|c| c.failing) {
            return Err(RoomSyncError::ProviderTransient(format!(
                "calendar {calendar_id} unavailable"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    bookings: BTreeMap<String, Booking>,
    next_booking_id: i64,
    cursors: HashMap<RoomId, SyncCursor>,
    channels: BTreeMap<RoomId, WebhookChannel>,
    policies: Vec<PricePolicy>,
    next_policy_id: i64,
}

/// Every store contract over one in-memory state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_writes: AtomicBool,
    fail_policy_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_policy_reads(&self, fail: bool) {
        self.fail_policy_reads.store(fail, Ordering::SeqCst);
    }

    pub fn booking(&self, event_id: &str) -> Option<Booking> {
        lock(&self.state).bookings.get(event_id).cloned()
    }

    pub fn booking_count(&self) -> usize {
        lock(&self.state).bookings.len()
    }

    fn check_writable(&self) -> RoomSyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RoomSyncError::StoreWrite("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn upsert_bookings(&self, bookings: &[Booking]) -> RoomSyncResult<usize> {
        self.check_writable()?;
        let mut state = lock(&self.state);
        for booking in bookings {
            let id = match state.bookings.get(&booking.event_id).and_then(|b| b.id) {
                Some(id) => id,
                None => {
                    state.next_booking_id += 1;
                    state.next_booking_id
                }
            };
            let mut stored = booking.clone();
            stored.id = Some(id);
            state.bookings.insert(stored.event_id.clone(), stored);
        }
        Ok(bookings.len())
    }

    async fn delete_by_event_ids(
        &self,
        room: RoomId,
        event_ids: &[String],
    ) -> RoomSyncResult<usize> {
        self.check_writable()?;
        let mut state = lock(&self.state);
        let mut deleted = 0;
        for event_id in event_ids {
            if state
                .bookings
                .get(event_id)
                .is_some_and(|b| b.room_id == room)
            {
                state.bookings.remove(event_id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_in_window(&self, room: RoomId, window: &TimeWindow) -> RoomSyncResult<usize> {
        self.check_writable()?;
        let mut state = lock(&self.state);
        let before = state.bookings.len();
        state
            .bookings
            .retain(|_, b| b.room_id != room || !window.encloses(b.start, b.end));
        Ok(before - state.bookings.len())
    }

    async fn bookings_in_range(
        &self,
        rooms: &[RoomId],
        window: &TimeWindow,
    ) -> RoomSyncResult<Vec<Booking>> {
        let state = lock(&self.state);
        let mut found: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| rooms.contains(&b.room_id) && window.contains(b.start))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start);
        Ok(found)
    }

    async fn all_bookings(&self) -> RoomSyncResult<Vec<Booking>> {
        let mut all: Vec<Booking> = lock(&self.state).bookings.values().cloned().collect();
        all.sort_by_key(|b| b.start);
        Ok(all)
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn cursor(&self, room: RoomId) -> RoomSyncResult<Option<SyncCursor>> {
        Ok(lock(&self.state).cursors.get(&room).cloned())
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> RoomSyncResult<()> {
        self.check_writable()?;
        lock(&self.state)
            .cursors
            .insert(cursor.room_id, cursor.clone());
        Ok(())
    }

    async fn clear_cursor(&self, room: RoomId) -> RoomSyncResult<()> {
        lock(&self.state).cursors.remove(&room);
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn channel(&self, room: RoomId) -> RoomSyncResult<Option<WebhookChannel>> {
        Ok(lock(&self.state).channels.get(&room).cloned())
    }

    async fn channel_by_id(&self, channel_id: &str) -> RoomSyncResult<Option<WebhookChannel>> {
        Ok(lock(&self.state)
            .channels
            .values()
            .find(|c| c.channel_id == channel_id)
            .cloned())
    }

    async fn channels(&self) -> RoomSyncResult<Vec<WebhookChannel>> {
        Ok(lock(&self.state).channels.values().cloned().collect())
    }

    async fn save_channel(&self, channel: &WebhookChannel) -> RoomSyncResult<()> {
        self.check_writable()?;
        lock(&self.state)
            .channels
            .insert(channel.room_id, channel.clone());
        Ok(())
    }

    async fn remove_channel(&self, room: RoomId) -> RoomSyncResult<()> {
        lock(&self.state).channels.remove(&room);
        Ok(())
    }
}

#[async_trait]
impl PricePolicyStore for MemoryStore {
    async fn policies(&self) -> RoomSyncResult<Vec<PricePolicy>> {
        if self.fail_policy_reads.load(Ordering::SeqCst) {
            return Err(RoomSyncError::StoreRead("policy table unavailable".into()));
        }
        Ok(lock(&self.state).policies.clone())
    }

    async fn insert_policy(&self, policy: &PricePolicy) -> RoomSyncResult<PricePolicy> {
        self.check_writable()?;
        let mut state = lock(&self.state);
        state.next_policy_id += 1;
        let mut stored = policy.clone();
        stored.id = Some(state.next_policy_id);
        state.policies.push(stored.clone());
        Ok(stored)
    }
}
