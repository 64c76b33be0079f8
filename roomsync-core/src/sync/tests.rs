use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone};

use super::*;
use crate::civil_time::local_offset;
use crate::memory::{MemoryCalendar, MemoryStore};
use crate::policy::PolicyResolver;
use crate::pricing::{PriceCalculator, PriceClass};
use crate::provider::{ChannelRequest, EventPage, EventTime, ListRequest, WatchResponse};
use crate::tariff::TariffTable;

fn local(d: u32, h: u32, min: u32) -> DateTime<Utc> {
    local_offset()
        .with_ymd_and_hms(2025, 11, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn calendar(room: RoomId) -> String {
    format!("cal-{room}")
}

struct Fixture {
    calendar: Arc<MemoryCalendar>,
    store: Arc<MemoryStore>,
    sync: Arc<Synchronizer>,
}

fn synchronizer(provider: Arc<dyn CalendarProvider>, store: Arc<MemoryStore>) -> Synchronizer {
    let rooms = RoomDirectory::new(RoomId::ALL.iter().map(|r| (*r, calendar(*r))));
    let resolver = Arc::new(PolicyResolver::new(
        store.clone(),
        TariffTable::default(),
        Duration::from_secs(3600),
    ));
    let pricer = Arc::new(Pricer::new(resolver, PriceCalculator::default()));
    Synchronizer::new(provider, rooms, store.clone(), store, pricer)
}

fn fixture() -> Fixture {
    let calendar = Arc::new(MemoryCalendar::new());
    let store = Arc::new(MemoryStore::new());
    let sync = Arc::new(synchronizer(calendar.clone(), store.clone()));
    Fixture {
        calendar,
        store,
        sync,
    }
}

#[tokio::test]
async fn test_first_pass_is_full_and_stores_cursor() {
    let f = fixture();
    let cal = calendar(RoomId::D);
    f.calendar.put_event(
        &cal,
        ProviderEvent::timed("morning", "개인연습", local(3, 9, 0), local(3, 10, 0)),
    );
    f.calendar.put_event(
        &cal,
        ProviderEvent::timed("naver", "합주", local(3, 9, 0), local(3, 10, 0))
            .with_description("예약번호: 55"),
    );

    let report = f.sync.sync_room(RoomId::D).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.upserted, 2);

    let morning = f.store.booking("morning").unwrap();
    assert_eq!(morning.price, Some(2700));
    assert_eq!(morning.price_class, Some(PriceClass::General));
    assert_eq!(f.store.booking("naver").unwrap().price, Some(2941));

    assert!(f.store.cursor(RoomId::D).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delta_pass_applies_updates_and_cancellations() {
    let f = fixture();
    let cal = calendar(RoomId::A);
    f.calendar
        .put_event(&cal, ProviderEvent::timed("keep", "", local(4, 10, 0), local(4, 11, 0)));
    f.calendar
        .put_event(&cal, ProviderEvent::timed("drop", "", local(4, 12, 0), local(4, 13, 0)));
    f.sync.sync_room(RoomId::A).await.unwrap();

    f.calendar.put_event(
        &cal,
        ProviderEvent::timed("keep", "moved", local(4, 18, 0), local(4, 19, 0)),
    );
    f.calendar.cancel_event(&cal, "drop");

    let report = f.sync.sync_room(RoomId::A).await.unwrap();
    assert_eq!(report.mode, SyncMode::Delta);
    assert_eq!(report.upserted, 1);
    assert_eq!(report.deleted, 1);
    assert!(f.store.booking("drop").is_none());
    let kept = f.store.booking("keep").unwrap();
    assert_eq!(kept.title, "moved");
    assert_eq!(kept.price_class, Some(PriceClass::Evening));
}

#[tokio::test]
async fn test_replaying_a_delta_is_idempotent() {
    let f = fixture();
    let cal = calendar(RoomId::B);
    f.calendar
        .put_event(&cal, ProviderEvent::timed("e1", "", local(5, 10, 0), local(5, 11, 0)));
    f.sync.sync_room(RoomId::B).await.unwrap();
    let before = f.store.cursor(RoomId::B).await.unwrap().unwrap();

    f.calendar
        .put_event(&cal, ProviderEvent::timed("e2", "", local(5, 12, 0), local(5, 13, 0)));
    f.calendar.cancel_event(&cal, "e1");

    f.sync.sync_room(RoomId::B).await.unwrap();
    let once = f.store.all_bookings().await.unwrap();

    f.store.save_cursor(&before).await.unwrap();
    f.sync.sync_room(RoomId::B).await.unwrap();
    let twice = f.store.all_bookings().await.unwrap();

    let strip = |bookings: Vec<Booking>| -> Vec<(Option<i64>, String, Option<i64>)> {
        bookings
            .into_iter()
            .map(|b| (b.id, b.event_id, b.price))
            .collect()
    };
    assert_eq!(strip(once), strip(twice));
}

#[tokio::test]
async fn test_refused_cursor_falls_back_to_one_full_sync() {
    let f = fixture();
    let cal = calendar(RoomId::C);
    f.calendar
        .put_event(&cal, ProviderEvent::timed("e1", "", local(6, 10, 0), local(6, 11, 0)));
    f.sync.sync_room(RoomId::C).await.unwrap();

    f.calendar
        .put_event(&cal, ProviderEvent::timed("e2", "", local(6, 12, 0), local(6, 13, 0)));
    f.calendar.invalidate_tokens(&cal);

    let report = f.sync.sync_room(RoomId::C).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert!(report.cursor_reset);
    assert_eq!(report.upserted, 2);

    let again = f.sync.sync_room(RoomId::C).await.unwrap();
    assert_eq!(again.mode, SyncMode::Delta);
    assert!(!again.cursor_reset);
}

/// Refuses every listing as if the cursor were always expired.
#[derive(Default)]
struct AlwaysRefused {
    calls: AtomicUsize,
}

#[async_trait]
impl CalendarProvider for AlwaysRefused {
    async fn list_events(&self, _: &str, _: &ListRequest) -> RoomSyncResult<EventPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoomSyncError::CursorInvalid("gone".into()))
    }

    async fn watch(&self, _: &str, _: &ChannelRequest) -> RoomSyncResult<WatchResponse> {
        unreachable!()
    }

    async fn stop_channel(&self, _: &str, _: &str) -> RoomSyncResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_persistently_refused_cursor_does_not_loop() {
    let provider = Arc::new(AlwaysRefused::default());
    let store = Arc::new(MemoryStore::new());
    store
        .save_cursor(&SyncCursor {
            room_id: RoomId::E,
            sync_token: "stale".into(),
            last_synced_at: Utc::now(),
        })
        .await
        .unwrap();
    let sync = synchronizer(provider.clone(), store.clone());

    let err = sync.sync_room(RoomId::E).await.unwrap_err();
    assert!(matches!(err, RoomSyncError::CursorInvalid(_)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert!(store.cursor(RoomId::E).await.unwrap().is_none());
}

/// Holds the first listing of `cal-a` open until released and records when
/// each listing starts and ends.
#[derive(Default)]
struct GatedCalendar {
    release: Notify,
    log: std::sync::Mutex<Vec<String>>,
}

impl GatedCalendar {
    fn started(&self, calendar_id: &str) -> usize {
        let entry = format!("start {calendar_id}");
        self.log.lock().unwrap().iter().filter(|e| **e == entry).count()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for GatedCalendar {
    async fn list_events(&self, calendar_id: &str, _: &ListRequest) -> RoomSyncResult<EventPage> {
        let first = self.started(calendar_id) == 0;
        self.log.lock().unwrap().push(format!("start {calendar_id}"));
        if first && calendar_id == "cal-a" {
            self.release.notified().await;
        }
        self.log.lock().unwrap().push(format!("end {calendar_id}"));
        Ok(EventPage {
            next_sync_token: Some(format!("tok-{calendar_id}")),
            ..EventPage::default()
        })
    }

    async fn watch(&self, _: &str, _: &ChannelRequest) -> RoomSyncResult<WatchResponse> {
        unreachable!()
    }

    async fn stop_channel(&self, _: &str, _: &str) -> RoomSyncResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_passes_on_one_room_run_one_at_a_time() {
    let provider = Arc::new(GatedCalendar::default());
    let store = Arc::new(MemoryStore::new());
    let sync = Arc::new(synchronizer(provider.clone(), store.clone()));

    let first = tokio::spawn({
        let sync = sync.clone();
        async move { sync.sync_room(RoomId::A).await }
    });
    while provider.started("cal-a") == 0 {
        tokio::task::yield_now().await;
    }

    let second = tokio::spawn({
        let sync = sync.clone();
        async move { sync.sync_room(RoomId::A).await }
    });
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(sync.is_syncing(RoomId::A));
    assert_eq!(provider.started("cal-a"), 1);

    // Another room is not held up by the pass on A.
    let other = sync.sync_room(RoomId::B).await.unwrap();
    assert_eq!(other.mode, SyncMode::Full);
    assert!(!sync.is_syncing(RoomId::B));
    assert_eq!(provider.started("cal-a"), 1);

    provider.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap().mode, SyncMode::Full);
    // The queued pass sees the cursor the first one stored.
    assert_eq!(second.await.unwrap().unwrap().mode, SyncMode::Delta);
    assert!(!sync.is_syncing(RoomId::A));

    assert_eq!(
        provider.log(),
        vec![
            "start cal-a",
            "start cal-b",
            "end cal-b",
            "end cal-a",
            "start cal-a",
            "end cal-a",
        ]
    );
}

#[tokio::test]
async fn test_all_day_events_are_not_bookings() {
    let f = fixture();
    let cal = calendar(RoomId::A);
    let day = NaiveDate::from_ymd_opt(2025, 11, 7).unwrap();
    f.calendar.put_event(
        &cal,
        ProviderEvent {
            id: "closed".into(),
            summary: "휴관".into(),
            description: String::new(),
            start: Some(EventTime::Date(day)),
            end: Some(EventTime::Date(day.succ_opt().unwrap())),
            cancelled: false,
            updated: None,
        },
    );
    let report = f.sync.sync_room(RoomId::A).await.unwrap();
    assert_eq!(report.upserted, 0);
    assert_eq!(f.store.booking_count(), 0);
}

#[tokio::test]
async fn test_window_sync_deletes_only_vanished_bookings_inside_window() {
    let f = fixture();
    let cal = calendar(RoomId::D);
    let window = TimeWindow::new(local(10, 0, 0), local(17, 0, 0)).unwrap();

    for (id, start, end) in [
        ("inside-kept", local(11, 10, 0), local(11, 11, 0)),
        ("inside-gone", local(12, 10, 0), local(12, 11, 0)),
        ("straddles-edge", local(9, 23, 0), local(10, 1, 0)),
        ("outside", local(20, 10, 0), local(20, 11, 0)),
    ] {
        f.calendar.put_event(&cal, ProviderEvent::timed(id, "", start, end));
    }
    f.sync.sync_room(RoomId::D).await.unwrap();
    assert_eq!(f.store.booking_count(), 4);

    for id in ["inside-gone", "straddles-edge", "outside"] {
        f.calendar.forget_event(&cal, id);
    }
    f.calendar.put_event(
        &cal,
        ProviderEvent::timed("inside-new", "", local(13, 10, 0), local(13, 11, 0)),
    );

    let report = f.sync.sync_window(RoomId::D, window).await.unwrap();
    assert_eq!(report.mode, SyncMode::Window);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.deleted, 1);

    assert!(f.store.booking("inside-gone").is_none());
    assert!(f.store.booking("inside-kept").is_some());
    assert!(f.store.booking("inside-new").is_some());
    assert!(f.store.booking("straddles-edge").is_some());
    assert!(f.store.booking("outside").is_some());
}

#[tokio::test]
async fn test_window_sync_leaves_other_rooms_alone() {
    let f = fixture();
    let window = TimeWindow::new(local(10, 0, 0), local(17, 0, 0)).unwrap();
    f.calendar.put_event(
        &calendar(RoomId::A),
        ProviderEvent::timed("a-booking", "", local(11, 10, 0), local(11, 11, 0)),
    );
    f.sync.sync_room(RoomId::A).await.unwrap();

    let report = f.sync.sync_window(RoomId::B, window).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert!(f.store.booking("a-booking").is_some());
}

#[tokio::test]
async fn test_emptied_window_clears_only_enclosed_bookings() {
    let f = fixture();
    let cal = calendar(RoomId::C);
    let window = TimeWindow::new(local(10, 0, 0), local(17, 0, 0)).unwrap();
    for (id, start, end) in [
        ("first", local(11, 10, 0), local(11, 11, 0)),
        ("second", local(14, 20, 0), local(14, 22, 0)),
        ("straddles-end", local(16, 23, 0), local(17, 1, 0)),
    ] {
        f.calendar.put_event(&cal, ProviderEvent::timed(id, "", start, end));
    }
    f.sync.sync_room(RoomId::C).await.unwrap();

    for id in ["first", "second", "straddles-end"] {
        f.calendar.forget_event(&cal, id);
    }
    let report = f.sync.sync_window(RoomId::C, window).await.unwrap();

    assert_eq!(report.upserted, 0);
    assert_eq!(report.deleted, 2);
    assert!(f.store.booking("straddles-end").is_some());
}

#[tokio::test]
async fn test_failed_writes_keep_previous_cursor() {
    let f = fixture();
    let cal = calendar(RoomId::E);
    f.calendar
        .put_event(&cal, ProviderEvent::timed("e1", "", local(3, 9, 0), local(3, 10, 0)));

    f.store.set_fail_writes(true);
    let report = f.sync.sync_room(RoomId::E).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(f.store.cursor(RoomId::E).await.unwrap().is_none());

    f.store.set_fail_writes(false);
    let report = f.sync.sync_room(RoomId::E).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.upserted, 1);
    assert!(f.store.cursor(RoomId::E).await.unwrap().is_some());
}

#[tokio::test]
async fn test_small_batches_cover_every_booking() {
    let calendar_provider = Arc::new(MemoryCalendar::new());
    let store = Arc::new(MemoryStore::new());
    let sync = synchronizer(calendar_provider.clone(), store.clone()).with_batch_size(2);
    for i in 0..5 {
        let start = local(3, 9, 0) + ChronoDuration::hours(i);
        calendar_provider.put_event(
            &calendar(RoomId::A),
            ProviderEvent::timed(format!("e{i}"), "", start, start + ChronoDuration::hours(1)),
        );
    }
    let report = sync.sync_room(RoomId::A).await.unwrap();
    assert_eq!(report.upserted, 5);
    assert_eq!(store.booking_count(), 5);
}

#[tokio::test]
async fn test_one_failing_room_does_not_abort_the_others() {
    let f = fixture();
    f.calendar.put_event(
        &calendar(RoomId::A),
        ProviderEvent::timed("a1", "", local(3, 9, 0), local(3, 10, 0)),
    );
    f.calendar.set_failing(&calendar(RoomId::B), true);

    let outcomes = f
        .sync
        .sync_rooms(&[RoomId::A, RoomId::B], Duration::from_secs(20))
        .await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(RoomSyncError::ProviderTransient(_))
    ));
    assert!(f.store.booking("a1").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_aborts_slow_rooms_and_keeps_finished_ones() {
    let f = fixture();
    f.calendar.put_event(
        &calendar(RoomId::A),
        ProviderEvent::timed("a1", "", local(3, 9, 0), local(3, 10, 0)),
    );
    f.calendar
        .set_latency(&calendar(RoomId::C), Some(Duration::from_secs(60)));

    let outcomes = f
        .sync
        .sync_rooms(&[RoomId::A, RoomId::C], Duration::from_secs(20))
        .await;
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(RoomSyncError::Timeout(20))));
    assert!(f.store.booking("a1").is_some());
}

#[tokio::test]
async fn test_unconfigured_room_is_rejected() {
    let calendar_provider = Arc::new(MemoryCalendar::new());
    let store = Arc::new(MemoryStore::new());
    let resolver = Arc::new(PolicyResolver::new(
        store.clone(),
        TariffTable::default(),
        Duration::from_secs(3600),
    ));
    let pricer = Arc::new(Pricer::new(resolver, PriceCalculator::default()));
    let rooms = RoomDirectory::new([(RoomId::A, "cal-a".to_string())]);
    let sync = Synchronizer::new(calendar_provider, rooms, store.clone(), store, pricer);

    let err = sync.sync_room(RoomId::B).await.unwrap_err();
    assert!(matches!(err, RoomSyncError::UnknownRoom(_)));
}
