use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use chrono_tz::Europe::Moscow;
use chrono_tz::Tz;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use super::*;
use crate::calendar::{EventDraft, MemoryCalendar};
use crate::store::{StoreError, WalStore};

const HALL: ServiceId = 1;
const LOFT: ServiceId = 2;
const ARCHIVED: ServiceId = 5;
const MAKEUP: ServiceId = 9;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 20).unwrap() // Tuesday
}

fn t(h: u32, m: u32) -> DateTime<Tz> {
    localize(Moscow, day(), NaiveTime::from_hms_opt(h, m, 0).unwrap()).unwrap()
}

fn span(h1: u32, m1: u32, h2: u32, m2: u32) -> Span {
    Span::new(t(h1, m1), t(h2, m2))
}

fn service(id: ServiceId, name: &str, occupancy: OccupancyRule, linked_extra: Option<ServiceId>) -> Service {
    Service {
        id,
        name: name.into(),
        description: String::new(),
        max_num_clients: 4,
        min_duration_minutes: 60,
        duration_step_minutes: 60,
        pricing: Pricing {
            price_min: 3000.0,
            price_min_weekend: 3500.0,
            fix_price: false,
            price_for_extra_client: 500.0,
            price_for_extra_client_weekend: 700.0,
        },
        occupancy,
        linked_extra,
        is_active: id != ARCHIVED,
    }
}

fn catalog() -> Vec<Service> {
    vec![
        service(
            HALL,
            "White hall",
            OccupancyRule::exclusive().with_pre_window(PreWindowRule::new(MAKEUP)),
            Some(MAKEUP),
        ),
        service(LOFT, "Loft", OccupancyRule::exclusive(), None),
        service(ARCHIVED, "Old hall", OccupancyRule::exclusive(), None),
        service(MAKEUP, "Makeup room", OccupancyRule::shared(1), None),
    ]
}

fn test_log_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("studiobook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

struct Studio {
    cal: Arc<MemoryCalendar>,
    store: Arc<WalStore>,
    scheduler: Scheduler,
}

async fn studio(name: &str) -> Studio {
    studio_with(name, Config::default()).await
}

async fn studio_with(name: &str, config: Config) -> Studio {
    let cal = Arc::new(MemoryCalendar::new());
    let store = Arc::new(WalStore::open(&test_log_path(name)).unwrap());
    for s in catalog() {
        store.upsert_service(s).await.unwrap();
    }
    let scheduler = Scheduler::new(cal.clone(), store.clone(), config);
    Studio { cal, store, scheduler }
}

async fn occupy(cal: &MemoryCalendar, resource: ServiceId, busy: Span) -> EventRef {
    let draft = EventDraft {
        title: "Existing booking".into(),
        description: String::new(),
        span: busy,
        linked_to: None,
    };
    cal.create_event(resource, draft).await.unwrap()
}

fn query(service_id: ServiceId) -> SlotQuery {
    SlotQuery {
        service_id,
        day: day(),
        duration_minutes: None,
        rest_of_day: false,
    }
}

fn request(service_id: ServiceId, slot: Span, user_id: i64) -> BookingRequest {
    BookingRequest {
        service_id,
        slot,
        num_clients: 2,
        contact: Contact {
            platform: Platform::Telegram,
            user_id,
            name: "Anna".into(),
            phone: Some("+7 (916) 123-45-67".into()),
            email: None,
        },
        with_linked_extra: false,
        need_photographer: false,
        notes: None,
    }
}

// ── Literal scenarios ────────────────────────────────────

#[tokio::test]
async fn free_day_yields_twelve_hourly_slots() {
    let s = studio("scenario_free_day.log").await;
    let availability = assert_ok!(s.scheduler.available_slots(&query(LOFT)).await);
    assert!(availability.verified);
    assert_eq!(availability.slots.len(), 12);
    assert_eq!(availability.slots[0], span(9, 0, 10, 0));
    assert_eq!(availability.slots[11], span(20, 0, 21, 0));
}

#[tokio::test]
async fn busy_interval_excludes_two_slots() {
    let s = studio("scenario_busy.log").await;
    occupy(&s.cal, LOFT, span(12, 0, 13, 30)).await;

    let slots = assert_ok!(s.scheduler.available_slots(&query(LOFT)).await).slots;
    assert_eq!(slots.len(), 10);
    assert!(!slots.contains(&span(12, 0, 13, 0)));
    assert!(!slots.contains(&span(13, 0, 14, 0)));
}

#[tokio::test]
async fn shared_resource_excludes_only_double_overlap() {
    let s = studio("scenario_shared.log").await;
    occupy(&s.cal, MAKEUP, span(12, 0, 13, 0)).await;
    occupy(&s.cal, MAKEUP, span(12, 30, 13, 30)).await;

    let slots = assert_ok!(s.scheduler.available_slots(&query(MAKEUP)).await).slots;
    assert!(!slots.contains(&span(12, 0, 13, 0)));
    assert!(slots.contains(&span(11, 0, 12, 0)));
    assert!(slots.contains(&span(13, 0, 14, 0)));
    assert_eq!(slots.len(), 11);
}

#[tokio::test]
async fn full_makeup_room_rejects_free_hall_slot() {
    let s = studio("scenario_pre_window.log").await;
    occupy(&s.cal, MAKEUP, span(14, 0, 15, 0)).await;
    occupy(&s.cal, MAKEUP, span(14, 0, 15, 0)).await;

    let slots = assert_ok!(s.scheduler.available_slots(&query(HALL)).await).slots;
    assert!(!slots.contains(&span(15, 0, 16, 0)));
    assert!(slots.contains(&span(14, 0, 15, 0)));
    assert!(slots.contains(&span(16, 0, 17, 0)));

    let err = assert_err!(s.scheduler.revalidate(HALL, &span(15, 0, 16, 0)).await);
    assert!(matches!(
        err,
        EngineError::SlotConflict(ConflictReason::PreWindow { resource: MAKEUP, .. })
    ));
}

#[tokio::test]
async fn slot_taken_between_listing_and_confirmation() {
    let s = studio("scenario_race.log").await;
    let chosen = span(10, 0, 11, 0);
    let slots = assert_ok!(s.scheduler.available_slots(&query(LOFT)).await).slots;
    assert!(slots.contains(&chosen));

    occupy(&s.cal, LOFT, span(10, 30, 10, 45)).await;

    let err = assert_err!(s.scheduler.revalidate(LOFT, &chosen).await);
    assert!(matches!(
        err,
        EngineError::SlotConflict(ConflictReason::Primary {
            overlapping: 1,
            tolerance: 0
        })
    ));
    let err = assert_err!(s.scheduler.confirm_booking(&request(LOFT, chosen, 1)).await);
    assert!(matches!(err, EngineError::SlotConflict(_)));
    assert_eq!(s.cal.len(), 1);
}

/// Listing degrades to an unverified grid during an outage; confirmation must
/// refuse instead. Making confirmation fail open would allow double bookings.
#[tokio::test]
async fn outage_fails_open_for_listing_and_closed_for_confirmation() {
    let s = studio("scenario_outage.log").await;
    s.cal.set_offline(true);

    let availability = assert_ok!(s.scheduler.available_slots(&query(HALL)).await);
    assert!(!availability.verified);
    assert!(matches!(availability.degraded_reason, Some(CalendarError::Unreachable(_))));
    assert_eq!(availability.slots.len(), 12);
    assert_eq!(availability.slots[0], span(9, 0, 10, 0));

    let chosen = availability.slots[3];
    let err = assert_err!(s.scheduler.revalidate(HALL, &chosen).await);
    assert!(matches!(err, EngineError::BookingUnconfirmable(_)));
    assert!(err.is_retryable());

    let err = assert_err!(s.scheduler.confirm_booking(&request(HALL, chosen, 1)).await);
    assert!(matches!(err, EngineError::BookingUnconfirmable(_)));
    assert!(assert_ok!(s.scheduler.client_bookings(Platform::Telegram, 1).await).is_empty());

    s.cal.set_offline(false);
    assert!(s.cal.is_empty());
}

// ── Properties ───────────────────────────────────────────

#[tokio::test]
async fn revalidation_agrees_with_generation() {
    let s = studio("agreement.log").await;
    occupy(&s.cal, HALL, span(11, 0, 12, 30)).await;
    occupy(&s.cal, MAKEUP, span(16, 0, 17, 0)).await;
    occupy(&s.cal, MAKEUP, span(16, 30, 17, 30)).await;

    let offered = assert_ok!(s.scheduler.available_slots(&query(HALL)).await).slots;
    let grid = default_grid(Moscow, day(), SlotMode::Fixed, 60).unwrap();
    for slot in &grid {
        let result = s.scheduler.revalidate(HALL, slot).await;
        assert_eq!(offered.contains(slot), result.is_ok(), "{slot:?}: {result:?}");
    }
}

#[tokio::test]
async fn rest_of_day_slots_end_at_closing() {
    let s = studio("rest_of_day.log").await;
    occupy(&s.cal, LOFT, span(17, 0, 18, 0)).await;
    let mut q = query(LOFT);
    q.rest_of_day = true;

    let slots = assert_ok!(s.scheduler.available_slots(&q).await).slots;
    assert_eq!(slots, vec![span(18, 0, 21, 0), span(19, 0, 21, 0), span(20, 0, 21, 0)]);
    assert_ok!(s.scheduler.revalidate(LOFT, &span(18, 0, 21, 0)).await);
}

#[tokio::test]
async fn longer_duration_shrinks_the_grid() {
    let s = studio("duration.log").await;
    let mut q = query(LOFT);
    q.duration_minutes = Some(180);
    let slots = assert_ok!(s.scheduler.available_slots(&q).await).slots;
    assert_eq!(slots.len(), 10);
    assert!(slots.iter().all(|slot| slot.duration_minutes() == 180));

    q.duration_minutes = Some(30);
    assert!(matches!(
        s.scheduler.available_slots(&q).await,
        Err(EngineError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn unknown_and_inactive_services() {
    let s = studio("unknown_service.log").await;
    assert!(matches!(
        s.scheduler.available_slots(&query(77)).await,
        Err(EngineError::NotFound(77))
    ));
    assert!(matches!(
        s.scheduler.available_slots(&query(ARCHIVED)).await,
        Err(EngineError::InvalidRequest(_))
    ));
    let services: Vec<ServiceId> = assert_ok!(s.scheduler.services().await).iter().map(|s| s.id).collect();
    assert_eq!(services, vec![HALL, LOFT, MAKEUP]);
}

// ── Booking lifecycle ────────────────────────────────────

#[tokio::test]
async fn confirm_writes_event_link_and_rows() {
    let s = studio("confirm.log").await;
    let mut req = request(HALL, span(15, 0, 16, 0), 42);
    req.with_linked_extra = true;
    req.num_clients = 6;
    req.notes = Some("Bring the white backdrop".into());

    let confirmation = assert_ok!(s.scheduler.confirm_booking(&req).await);
    let booking = &confirmation.booking;
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.duration_minutes, 60);
    assert_eq!(confirmation.quote.total, 4000.0);
    assert_eq!(booking.total_price, 4000.0);

    let linked = booking.linked_extra.clone().unwrap();
    assert_eq!(linked.resource, MAKEUP);
    assert_eq!(s.cal.linked_to(&booking.calendar_event), vec![linked.event.clone()]);
    let extra = s.cal.get_event(MAKEUP, &linked.event).await.unwrap().unwrap();
    assert_eq!(extra.span, span(14, 0, 15, 0));

    let snap = assert_ok!(s.scheduler.booking_snapshot(booking.id).await).unwrap();
    assert_eq!(snap.tags.service_id, Some(HALL));
    assert!(snap.description.contains("Phone: +7 916 123 45 67"));
    assert!(snap.description.contains("Notes: Bring the white backdrop"));

    let client = s.store.find_client(Platform::Telegram, 42).await.unwrap().unwrap();
    assert_eq!(client.phone.as_deref(), Some("9161234567"));
    assert_eq!(booking.client_id, client.id);
    assert_eq!(s.store.get_booking(booking.id).await.unwrap().as_ref(), Some(booking));
}

#[tokio::test]
async fn booked_slot_disappears_and_makeup_room_fills() {
    let s = studio("fill.log").await;
    let mut req = request(HALL, span(15, 0, 16, 0), 1);
    req.with_linked_extra = true;
    assert_ok!(s.scheduler.confirm_booking(&req).await);

    let hall = assert_ok!(s.scheduler.available_slots(&query(HALL)).await).slots;
    assert!(!hall.contains(&span(15, 0, 16, 0)));
    assert!(hall.contains(&span(16, 0, 17, 0)));

    // One prep reservation leaves the makeup room with spare capacity.
    let makeup = assert_ok!(s.scheduler.available_slots(&query(MAKEUP)).await).slots;
    assert!(makeup.contains(&span(14, 0, 15, 0)));

    occupy(&s.cal, MAKEUP, span(14, 0, 15, 0)).await;
    let makeup = assert_ok!(s.scheduler.available_slots(&query(MAKEUP)).await).slots;
    assert!(!makeup.contains(&span(14, 0, 15, 0)));
}

#[tokio::test]
async fn repeat_client_is_updated_not_duplicated() {
    let s = studio("repeat_client.log").await;
    let first = assert_ok!(s.scheduler.confirm_booking(&request(LOFT, span(10, 0, 11, 0), 7)).await);

    let mut again = request(LOFT, span(12, 0, 13, 0), 7);
    again.contact.name = "Anna K.".into();
    again.contact.phone = None;
    let second = assert_ok!(s.scheduler.confirm_booking(&again).await);

    assert_eq!(first.booking.client_id, second.booking.client_id);
    let client = s.store.get_client(first.booking.client_id).await.unwrap().unwrap();
    assert_eq!(client.name, "Anna K.");
    assert_eq!(client.phone.as_deref(), Some("9161234567"));
    let mine = assert_ok!(s.scheduler.client_bookings(Platform::Telegram, 7).await);
    assert_eq!(mine.len(), 2);
    assert!(assert_ok!(s.scheduler.client_bookings(Platform::Vk, 7).await).is_empty());
}

#[tokio::test]
async fn selection_outside_hours_is_malformed() {
    let s = studio("malformed.log").await;
    let late = Span::new(t(20, 30), t(21, 30));
    let err = assert_err!(s.scheduler.confirm_booking(&request(LOFT, late, 1)).await);
    assert!(matches!(err, EngineError::MalformedSelection(_)));

    let inverted = Span { start: t(12, 0), end: t(11, 0) };
    let err = assert_err!(s.scheduler.confirm_booking(&request(LOFT, inverted, 1)).await);
    assert!(matches!(err, EngineError::MalformedSelection(_)));
    assert!(s.cal.is_empty());
}

#[tokio::test]
async fn invalid_requests_touch_nothing() {
    let s = studio("invalid_request.log").await;
    let slot = span(10, 0, 11, 0);

    let mut req = request(LOFT, slot, 1);
    req.num_clients = 0;
    assert!(matches!(s.scheduler.confirm_booking(&req).await, Err(EngineError::InvalidRequest(_))));

    let mut req = request(LOFT, slot, 1);
    req.contact.phone = Some("12345".into());
    assert!(matches!(s.scheduler.confirm_booking(&req).await, Err(EngineError::InvalidRequest(_))));

    let mut req = request(LOFT, slot, 1);
    req.with_linked_extra = true;
    assert!(matches!(s.scheduler.confirm_booking(&req).await, Err(EngineError::InvalidRequest(_))));

    let req = request(LOFT, span(10, 0, 10, 30), 1);
    assert!(matches!(s.scheduler.confirm_booking(&req).await, Err(EngineError::InvalidRequest(_))));

    assert!(s.cal.is_empty());
}

#[tokio::test]
async fn off_step_lengths_are_refused() {
    let s = studio("off_step.log").await;
    let mut q = query(LOFT);
    q.duration_minutes = Some(90);
    assert!(matches!(
        s.scheduler.available_slots(&q).await,
        Err(EngineError::InvalidRequest(_))
    ));

    let req = request(LOFT, span(10, 0, 11, 30), 1);
    assert!(matches!(s.scheduler.confirm_booking(&req).await, Err(EngineError::InvalidRequest(_))));
    assert!(s.cal.is_empty());

    // Running to closing is always a valid length.
    assert_ok!(s.scheduler.confirm_booking(&request(LOFT, span(18, 30, 21, 0), 1)).await);
}

#[tokio::test]
async fn tag_lines_in_notes_do_not_move_the_booking() {
    let s = studio("forged_tag.log").await;
    let mut req = request(LOFT, span(10, 0, 11, 0), 1);
    req.notes = Some("see you\nService ID: 5\nLinked event: nope".into());
    let booking = assert_ok!(s.scheduler.confirm_booking(&req).await).booking;

    let snap = assert_ok!(s.scheduler.booking_snapshot(booking.id).await).unwrap();
    assert_eq!(snap.tags.service_id, Some(LOFT));
    assert_eq!(snap.tags.linked_event, None);
    let slots = assert_ok!(s.scheduler.available_slots(&query(LOFT)).await).slots;
    assert!(!slots.contains(&span(10, 0, 11, 0)));

    let err = assert_err!(s.scheduler.confirm_booking(&request(LOFT, span(10, 0, 11, 0), 2)).await);
    assert!(matches!(err, EngineError::SlotConflict(_)));
    assert_eq!(s.cal.len(), 1);
}

#[tokio::test]
async fn linked_extra_alone_guards_the_makeup_room() {
    const STUDIO: ServiceId = 3;
    let s = studio("linked_only.log").await;
    s.store
        .upsert_service(service(STUDIO, "Studio", OccupancyRule::exclusive(), Some(MAKEUP)))
        .await
        .unwrap();
    occupy(&s.cal, MAKEUP, span(14, 0, 15, 0)).await;
    occupy(&s.cal, MAKEUP, span(14, 0, 15, 0)).await;

    let slots = assert_ok!(s.scheduler.available_slots(&query(STUDIO)).await).slots;
    assert!(!slots.contains(&span(15, 0, 16, 0)));
    assert!(slots.contains(&span(16, 0, 17, 0)));

    let mut req = request(STUDIO, span(15, 0, 16, 0), 1);
    req.with_linked_extra = true;
    let err = assert_err!(s.scheduler.confirm_booking(&req).await);
    assert!(matches!(
        err,
        EngineError::SlotConflict(ConflictReason::PreWindow { resource: MAKEUP, .. })
    ));
    assert_eq!(s.cal.len(), 2);
}

#[tokio::test]
async fn cancel_follows_the_recorded_linked_resource() {
    let s = studio("cancel_catalog_change.log").await;
    let mut req = request(HALL, span(15, 0, 16, 0), 3);
    req.with_linked_extra = true;
    let booking = assert_ok!(s.scheduler.confirm_booking(&req).await).booking;
    assert_eq!(s.cal.len(), 2);

    // The hall loses its makeup room after the booking was made.
    s.store
        .upsert_service(service(HALL, "White hall", OccupancyRule::exclusive(), None))
        .await
        .unwrap();
    assert_ok!(s.scheduler.cancel_booking(booking.id).await);
    assert!(s.cal.is_empty());
}

#[tokio::test]
async fn cancel_releases_events_and_is_terminal() {
    let s = studio("cancel.log").await;
    let mut req = request(HALL, span(15, 0, 16, 0), 3);
    req.with_linked_extra = true;
    let booking = assert_ok!(s.scheduler.confirm_booking(&req).await).booking;
    assert_eq!(s.cal.len(), 2);

    let cancelled = assert_ok!(s.scheduler.cancel_booking(booking.id).await);
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(s.cal.is_empty());
    assert!(assert_ok!(s.scheduler.available_slots(&query(HALL)).await).slots.contains(&span(15, 0, 16, 0)));

    let err = assert_err!(s.scheduler.cancel_booking(booking.id).await);
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Cancelled
        }
    ));
    assert!(matches!(
        s.scheduler.complete_booking(booking.id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancel_survives_calendar_outage() {
    let s = studio("cancel_outage.log").await;
    let booking = assert_ok!(s.scheduler.confirm_booking(&request(LOFT, span(10, 0, 11, 0), 3)).await).booking;
    s.cal.set_offline(true);

    let cancelled = assert_ok!(s.scheduler.cancel_booking(booking.id).await);
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    s.cal.set_offline(false);
    assert_eq!(s.cal.len(), 1);
}

#[tokio::test]
async fn complete_then_nothing() {
    let s = studio("complete.log").await;
    let booking = assert_ok!(s.scheduler.confirm_booking(&request(LOFT, span(10, 0, 11, 0), 3)).await).booking;
    let done = assert_ok!(s.scheduler.complete_booking(booking.id).await);
    assert_eq!(done.status, BookingStatus::Completed);
    assert!(matches!(
        s.scheduler.cancel_booking(booking.id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        s.scheduler.complete_booking(Ulid::new()).await,
        Err(EngineError::BookingNotFound(_))
    ));
}

#[tokio::test]
async fn admin_allowlist_then_store() {
    let config = Config {
        admin_ids_tg: vec![100],
        ..Config::default()
    };
    let s = studio_with("admins.log", config).await;
    s.store
        .upsert_admin(Admin {
            telegram_id: None,
            vk_id: Some(5),
            is_active: true,
        })
        .await
        .unwrap();
    s.store
        .upsert_admin(Admin {
            telegram_id: None,
            vk_id: Some(6),
            is_active: false,
        })
        .await
        .unwrap();

    assert!(assert_ok!(s.scheduler.is_admin(Platform::Telegram, 100).await));
    assert!(assert_ok!(s.scheduler.is_admin(Platform::Vk, 5).await));
    assert!(!assert_ok!(s.scheduler.is_admin(Platform::Vk, 6).await));
    assert!(!assert_ok!(s.scheduler.is_admin(Platform::Vk, 100).await));
}

// ── Persistence failure after the calendar write ─────────

/// Delegates to a real store but refuses to record bookings.
struct BookingsReadOnly(WalStore);

#[async_trait]
impl BookingStore for BookingsReadOnly {
    async fn upsert_service(&self, service: Service) -> Result<(), StoreError> {
        self.0.upsert_service(service).await
    }
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StoreError> {
        self.0.get_service(id).await
    }
    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, StoreError> {
        self.0.list_services(active_only).await
    }
    async fn upsert_client(&self, client: Client) -> Result<(), StoreError> {
        self.0.upsert_client(client).await
    }
    async fn get_client(&self, id: Ulid) -> Result<Option<Client>, StoreError> {
        self.0.get_client(id).await
    }
    async fn find_client(&self, platform: Platform, user_id: i64) -> Result<Option<Client>, StoreError> {
        self.0.find_client(platform, user_id).await
    }
    async fn create_booking(&self, _booking: Booking) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }
    async fn get_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        self.0.get_booking(id).await
    }
    async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<(), StoreError> {
        self.0.set_booking_status(id, status).await
    }
    async fn bookings_for_client(&self, client_id: Ulid) -> Result<Vec<Booking>, StoreError> {
        self.0.bookings_for_client(client_id).await
    }
    async fn upsert_admin(&self, admin: Admin) -> Result<(), StoreError> {
        self.0.upsert_admin(admin).await
    }
    async fn list_admins(&self) -> Result<Vec<Admin>, StoreError> {
        self.0.list_admins().await
    }
}

#[tokio::test]
async fn store_failure_after_event_keeps_the_event() {
    let cal = Arc::new(MemoryCalendar::new());
    let inner = WalStore::open(&test_log_path("persistence_failure.log")).unwrap();
    for s in catalog() {
        inner.upsert_service(s).await.unwrap();
    }
    let scheduler = Scheduler::new(cal.clone(), Arc::new(BookingsReadOnly(inner)), Config::default());

    let err = assert_err!(scheduler.confirm_booking(&request(LOFT, span(10, 0, 11, 0), 9)).await);
    let EngineError::PersistenceFailure { event, .. } = &err else {
        panic!("expected PersistenceFailure, got {err:?}");
    };
    assert!(cal.get_event(LOFT, event).await.unwrap().is_some());
    assert!(!err.is_retryable());

    // The slot is taken in the calendar even though no booking row exists.
    let slots = assert_ok!(scheduler.available_slots(&query(LOFT)).await).slots;
    assert!(!slots.contains(&span(10, 0, 11, 0)));
}
