//! Mirrors provider calendars into the booking store.
//!
//! Each room is either without a cursor, in which case the next pass lists
//! the whole calendar and stores the sync token it ends with, or has one,
//! in which case only the changes since that token are fetched. A refused
//! cursor is dropped and the pass restarts once from scratch.
//!
//! The windowed sync is separate from the cursor: it lists an explicit
//! window and deletes stored bookings inside that window the provider no
//! longer reports.

mod locks;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::booking::Booking;
use crate::constants::{MAX_CURSOR_RETRIES, UPSERT_BATCH_SIZE};
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::policy::Pricer;
use crate::provider::{CalendarProvider, ListQuery, ProviderEvent};
use crate::room::{RoomDirectory, RoomId};
use crate::store::{BookingStore, SyncCursor, SyncStateStore};
use crate::window::TimeWindow;

pub use locks::RoomLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Delta,
    Window,
}

/// What one pass did to one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub room: RoomId,
    pub mode: SyncMode,
    pub upserted: usize,
    pub deleted: usize,
    /// Rows whose write failed. They are retried by the next pass.
    pub skipped: usize,
    /// The stored cursor was refused and dropped during this pass.
    pub cursor_reset: bool,
}

impl SyncReport {
    fn new(room: RoomId, mode: SyncMode) -> Self {
        SyncReport {
            room,
            mode,
            upserted: 0,
            deleted: 0,
            skipped: 0,
            cursor_reset: false,
        }
    }
}

/// Result of one room inside a multi-room pass.
#[derive(Debug)]
pub struct RoomOutcome {
    pub room: RoomId,
    pub result: RoomSyncResult<SyncReport>,
}

pub struct Synchronizer {
    provider: Arc<dyn CalendarProvider>,
    rooms: RoomDirectory,
    bookings: Arc<dyn BookingStore>,
    cursors: Arc<dyn SyncStateStore>,
    pricer: Arc<Pricer>,
    locks: RoomLocks,
    batch_size: usize,
}

impl Synchronizer {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        rooms: RoomDirectory,
        bookings: Arc<dyn BookingStore>,
        cursors: Arc<dyn SyncStateStore>,
        pricer: Arc<Pricer>,
    ) -> Self {
        Synchronizer {
            provider,
            rooms,
            bookings,
            cursors,
            pricer,
            locks: RoomLocks::new(),
            batch_size: UPSERT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn is_syncing(&self, room: RoomId) -> bool {
        self.locks.is_locked(room)
    }

    /// Bring one room up to date using its cursor.
    pub async fn sync_room(&self, room: RoomId) -> RoomSyncResult<SyncReport> {
        let calendar_id = self.rooms.get(room)?.calendar_id.clone();
        let _guard = self.locks.lock(room).await;
        self.cursor_pass(room, &calendar_id, MAX_CURSOR_RETRIES).await
    }

    /// Drop the room's cursor and rebuild it with a full listing.
    pub async fn resync(&self, room: RoomId) -> RoomSyncResult<SyncReport> {
        let calendar_id = self.rooms.get(room)?.calendar_id.clone();
        let _guard = self.locks.lock(room).await;
        self.cursors.clear_cursor(room).await?;
        self.cursor_pass(room, &calendar_id, MAX_CURSOR_RETRIES).await
    }

    /// List one window and reconcile the room's bookings inside it.
    pub async fn sync_window(&self, room: RoomId, window: TimeWindow) -> RoomSyncResult<SyncReport> {
        let calendar_id = self.rooms.get(room)?.calendar_id.clone();
        let _guard = self.locks.lock(room).await;

        let listing = self
            .provider
            .list_all(&calendar_id, ListQuery::Window(window))
            .await?;

        let mut report = SyncReport::new(room, SyncMode::Window);
        let seen: HashSet<String> = listing
            .events
            .iter()
            .filter(|e| !e.cancelled)
            .map(|e| e.id.clone())
            .collect();

        self.apply_changes(room, &listing.events, &mut report).await;

        if seen.is_empty() {
            // Nothing live in the window, so everything stored inside it goes.
            report.deleted += self.bookings.delete_in_window(room, &window).await?;
            tracing::info!(room = %room, deleted = report.deleted, "window sync finished, window empty");
            return Ok(report);
        }

        let stale: Vec<String> = self
            .bookings
            .bookings_in_range(&[room], &window)
            .await?
            .into_iter()
            .filter(|b| window.encloses(b.start, b.end) && !seen.contains(&b.event_id))
            .map(|b| b.event_id)
            .collect();
        report.deleted += self.delete(room, &stale, &mut report.skipped).await;

        tracing::info!(
            room = %room,
            upserted = report.upserted,
            deleted = report.deleted,
            skipped = report.skipped,
            "window sync finished"
        );
        Ok(report)
    }

    /// Sync several rooms concurrently. Rooms still running when `timeout`
    /// elapses are aborted and reported as timed out; finished rooms keep
    /// their results.
    pub async fn sync_rooms(self: &Arc<Self>, rooms: &[RoomId], timeout: Duration) -> Vec<RoomOutcome> {
        self.run_rooms(rooms, timeout, |sync, room| async move { sync.sync_room(room).await })
            .await
    }

    pub async fn sync_windows(
        self: &Arc<Self>,
        rooms: &[RoomId],
        window: TimeWindow,
        timeout: Duration,
    ) -> Vec<RoomOutcome> {
        self.run_rooms(rooms, timeout, move |sync, room| async move {
            sync.sync_window(room, window).await
        })
        .await
    }

    async fn run_rooms<F, Fut>(self: &Arc<Self>, rooms: &[RoomId], timeout: Duration, pass: F) -> Vec<RoomOutcome>
    where
        F: Fn(Arc<Self>, RoomId) -> Fut,
        Fut: Future<Output = RoomSyncResult<SyncReport>> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let tasks: Vec<_> = rooms
            .iter()
            .map(|room| (*room, tokio::spawn(pass(self.clone(), *room))))
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (room, mut task) in tasks {
            let result = match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(RoomSyncError::TaskFailed(join_err.to_string())),
                Err(_) => {
                    task.abort();
                    tracing::warn!(room = %room, "room sync aborted at deadline");
                    Err(RoomSyncError::Timeout(timeout.as_secs()))
                }
            };
            match &result {
                Err(err) if err.is_retryable() => {
                    tracing::warn!(room = %room, error = %err, "room sync failed, next trigger retries")
                }
                Err(err) => tracing::error!(room = %room, error = %err, "room sync failed"),
                Ok(_) => {}
            }
            outcomes.push(RoomOutcome { room, result });
        }
        outcomes
    }

    /// Run the cursor state machine. A refused cursor is cleared and the
    /// pass repeated, at most `retries` times.
    async fn cursor_pass(
        &self,
        room: RoomId,
        calendar_id: &str,
        retries: u32,
    ) -> RoomSyncResult<SyncReport> {
        let mut retries_left = retries;
        let mut cursor_reset = false;

        loop {
            let cursor = self.cursors.cursor(room).await?;
            let result = match cursor {
                Some(cursor) => self.delta_pass(room, calendar_id, cursor.sync_token).await,
                None => self.full_pass(room, calendar_id).await,
            };

            match result {
                Err(RoomSyncError::CursorInvalid(reason)) if retries_left > 0 => {
                    tracing::warn!(room = %room, reason = %reason, "sync cursor refused, falling back to full sync");
                    self.cursors.clear_cursor(room).await?;
                    retries_left -= 1;
                    cursor_reset = true;
                }
                Ok(mut report) => {
                    report.cursor_reset = cursor_reset;
                    return Ok(report);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn full_pass(&self, room: RoomId, calendar_id: &str) -> RoomSyncResult<SyncReport> {
        let started = std::time::Instant::now();
        let listing = self.provider.list_all(calendar_id, ListQuery::Full).await?;

        let mut report = SyncReport::new(room, SyncMode::Full);
        self.apply_changes(room, &listing.events, &mut report).await;
        self.advance_cursor(room, listing.next_sync_token, &report).await?;

        tracing::info!(
            room = %room,
            events = listing.events.len(),
            upserted = report.upserted,
            skipped = report.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "full sync finished"
        );
        Ok(report)
    }

    async fn delta_pass(
        &self,
        room: RoomId,
        calendar_id: &str,
        sync_token: String,
    ) -> RoomSyncResult<SyncReport> {
        let listing = self
            .provider
            .list_all(calendar_id, ListQuery::Delta { sync_token })
            .await?;

        let mut report = SyncReport::new(room, SyncMode::Delta);
        self.apply_changes(room, &listing.events, &mut report).await;
        self.advance_cursor(room, listing.next_sync_token, &report).await?;

        tracing::info!(
            room = %room,
            changes = listing.events.len(),
            upserted = report.upserted,
            deleted = report.deleted,
            skipped = report.skipped,
            "delta sync finished"
        );
        Ok(report)
    }

    /// Store the new token, unless some write failed: keeping the old
    /// cursor makes the next pass replay the same changes.
    async fn advance_cursor(
        &self,
        room: RoomId,
        next_sync_token: Option<String>,
        report: &SyncReport,
    ) -> RoomSyncResult<()> {
        if report.skipped > 0 {
            tracing::warn!(room = %room, skipped = report.skipped, "keeping previous cursor after failed writes");
            return Ok(());
        }
        let Some(sync_token) = next_sync_token else {
            tracing::warn!(room = %room, "provider returned no sync token");
            return Ok(());
        };
        self.cursors
            .save_cursor(&SyncCursor {
                room_id: room,
                sync_token,
                last_synced_at: Utc::now(),
            })
            .await
    }

    /// Upsert live events, delete cancelled ones. Events without a concrete
    /// span are ignored.
    async fn apply_changes(&self, room: RoomId, events: &[ProviderEvent], report: &mut SyncReport) {
        let now = Utc::now();
        let mut upserts = Vec::new();
        let mut cancelled = Vec::new();

        for event in events {
            if event.cancelled {
                cancelled.push(event.id.clone());
                continue;
            }
            if let Some(mut booking) = Booking::from_event(room, event, now) {
                self.pricer.price(&mut booking).await;
                upserts.push(booking);
            }
        }

        for batch in upserts.chunks(self.batch_size) {
            match self.bookings.upsert_bookings(batch).await {
                Ok(written) => report.upserted += written,
                Err(err) => {
                    tracing::error!(room = %room, rows = batch.len(), error = %err, "booking batch not written");
                    report.skipped += batch.len();
                }
            }
        }

        report.deleted += self.delete(room, &cancelled, &mut report.skipped).await;
    }

    async fn delete(&self, room: RoomId, event_ids: &[String], skipped: &mut usize) -> usize {
        if event_ids.is_empty() {
            return 0;
        }
        match self.bookings.delete_by_event_ids(room, event_ids).await {
            Ok(deleted) => deleted,
            Err(err) => {
                tracing::error!(room = %room, rows = event_ids.len(), error = %err, "booking deletes failed");
                *skipped += event_ids.len();
                0
            }
        }
    }
}

#[cfg(test)]
mod tests;
