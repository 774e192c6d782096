use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Catalog id of a bookable service (hall, makeup room, ...). Also the tag
/// written into calendar event descriptions.
pub type ServiceId = u32;

pub const DEFAULT_PRE_WINDOW_LEAD_MINUTES: u32 = 60;
pub const DEFAULT_PRE_WINDOW_CAPACITY: u32 = 2;

/// Half-open interval `[start, end)` pinned to an explicit IANA zone.
///
/// Comparisons between spans in different zones compare instants, so mixing
/// zones is safe; mixing naive and aware values is impossible by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

/// A range during which a resource is already committed.
pub type BusyInterval = Span;

/// A candidate bookable range. Never persisted on its own.
pub type Slot = Span;

impl Span {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for values coming from outside the crate.
    pub fn try_new(start: DateTime<Tz>, end: DateTime<Tz>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The same instants expressed in `tz`.
    pub fn in_zone(&self, tz: Tz) -> Span {
        Span {
            start: self.start.with_timezone(&tz),
            end: self.end.with_timezone(&tz),
        }
    }
}

/// Resolve a local wall-clock time in `tz`. `None` inside a DST gap.
pub fn localize(tz: Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&day.and_time(time)).earliest()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    /// Every slot lasts exactly `slot_minutes`.
    Fixed,
    /// Every slot runs from its start to the end of the working day.
    RestOfDay,
}

/// The universe of candidate slots for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRequest {
    pub day: NaiveDate,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub slot_minutes: u32,
    pub step_minutes: u32,
    pub tz: Tz,
    pub mode: SlotMode,
}

impl SlotRequest {
    /// The working window as zone-aware instants. `None` when either end falls
    /// into a DST gap or the window is empty.
    pub fn window(&self) -> Option<Span> {
        let start = localize(self.tz, self.day, self.work_start)?;
        let end = localize(self.tz, self.day, self.work_end)?;
        Span::try_new(start, end)
    }
}

/// Pre-booking window on another resource that must be free before a slot starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreWindowRule {
    pub resource: ServiceId,
    #[serde(default = "default_lead")]
    pub lead_minutes: u32,
    /// Concurrent pre-bookings the resource holds; a full window rejects the slot.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_lead() -> u32 {
    DEFAULT_PRE_WINDOW_LEAD_MINUTES
}

fn default_capacity() -> u32 {
    DEFAULT_PRE_WINDOW_CAPACITY
}

impl PreWindowRule {
    pub fn new(resource: ServiceId) -> Self {
        Self {
            resource,
            lead_minutes: DEFAULT_PRE_WINDOW_LEAD_MINUTES,
            capacity: DEFAULT_PRE_WINDOW_CAPACITY,
        }
    }

    pub fn lead(&self) -> Duration {
        Duration::minutes(self.lead_minutes as i64)
    }

    /// `[start - lead, start)`. `None` for a zero lead.
    pub fn window_before(&self, start: DateTime<Tz>) -> Option<Span> {
        Span::try_new(start - self.lead(), start)
    }
}

/// How many overlapping busy intervals a resource tolerates before a slot is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OccupancyRule {
    /// 0 for ordinary resources; 1 lets two bookings share the resource.
    #[serde(default)]
    pub tolerance: u32,
    #[serde(default)]
    pub pre_window: Option<PreWindowRule>,
}

impl OccupancyRule {
    pub fn exclusive() -> Self {
        Self::default()
    }

    pub fn shared(tolerance: u32) -> Self {
        Self {
            tolerance,
            pre_window: None,
        }
    }

    pub fn with_pre_window(mut self, pre_window: PreWindowRule) -> Self {
        self.pre_window = Some(pre_window);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub price_min: f64,
    pub price_min_weekend: f64,
    #[serde(default)]
    pub fix_price: bool,
    #[serde(default)]
    pub price_for_extra_client: f64,
    #[serde(default)]
    pub price_for_extra_client_weekend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base: f64,
    pub extra_clients: f64,
    pub discount: f64,
    pub total: f64,
}

impl Pricing {
    /// Base price for the day type plus extra guests beyond `included_clients`,
    /// minus a percentage discount.
    pub fn quote(
        &self,
        included_clients: u32,
        num_clients: u32,
        is_weekend: bool,
        discount_percent: u8,
    ) -> PriceQuote {
        let base = if is_weekend { self.price_min_weekend } else { self.price_min };
        let extra_clients = if self.fix_price {
            0.0
        } else {
            let extra = num_clients.saturating_sub(included_clients) as f64;
            let per_client = if is_weekend {
                self.price_for_extra_client_weekend
            } else {
                self.price_for_extra_client
            };
            extra * per_client
        };
        let gross = base + extra_clients;
        let discount = gross * f64::from(discount_percent.min(100)) / 100.0;
        PriceQuote {
            base,
            extra_clients,
            discount,
            total: gross - discount,
        }
    }
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub max_num_clients: u32,
    pub min_duration_minutes: u32,
    pub duration_step_minutes: u32,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub occupancy: OccupancyRule,
    /// Extra resource (e.g. makeup room) a booking may reserve ahead of its start.
    #[serde(default)]
    pub linked_extra: Option<ServiceId>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Service {
    /// Lead time of the linked extra resource, taken from the pre-window rule
    /// when it names the same resource.
    pub fn linked_pre_window(&self) -> Option<PreWindowRule> {
        let extra = self.linked_extra?;
        match self.occupancy.pre_window {
            Some(rule) if rule.resource == extra => Some(rule),
            _ => Some(PreWindowRule::new(extra)),
        }
    }

    /// Bookable lengths are `min_duration_minutes + k * duration_step_minutes`.
    pub fn accepts_duration(&self, minutes: u32) -> bool {
        minutes >= self.min_duration_minutes
            && (minutes - self.min_duration_minutes)
                .checked_rem(self.duration_step_minutes)
                .map_or(minutes == self.min_duration_minutes, |rem| rem == 0)
    }

    /// Shortest bookable length of at least `minutes`.
    pub fn round_duration(&self, minutes: u32) -> u32 {
        let step = self.duration_step_minutes.max(1);
        let extra = minutes.saturating_sub(self.min_duration_minutes);
        self.min_duration_minutes + extra.div_ceil(step) * step
    }

    /// The occupancy rule bookings are checked against. A linked extra
    /// resource implies a pre-window on it even when none is declared.
    pub fn effective_occupancy(&self) -> OccupancyRule {
        OccupancyRule {
            pre_window: self.occupancy.pre_window.or_else(|| self.linked_pre_window()),
            ..self.occupancy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Telegram,
    Vk,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Telegram => write!(f, "Telegram"),
            Platform::Vk => write!(f, "VK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub telegram_id: Option<i64>,
    pub vk_id: Option<i64>,
    pub name: String,
    /// 10 national digits, see `contact::normalize_phone`.
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Discount in percent.
    pub sale: u8,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn platform_id(&self, platform: Platform) -> Option<i64> {
        match platform {
            Platform::Telegram => self.telegram_id,
            Platform::Vk => self.vk_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Forward-only lifecycle; cancelled and completed are terminal.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

/// Identifier of an event in the external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef(pub String);

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub client_id: Ulid,
    pub service_id: ServiceId,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub num_clients: u32,
    pub status: BookingStatus,
    pub need_photographer: bool,
    pub calendar_event: EventRef,
    pub linked_extra: Option<LinkedEvent>,
    pub notes: Option<String>,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

/// An event on an extra resource written for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEvent {
    /// The resource the event was written to, independent of later catalog edits.
    pub resource: ServiceId,
    pub event: EventRef,
}

impl Booking {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn span(&self, tz: Tz) -> Span {
        Span::new(self.start.with_timezone(&tz), self.end().with_timezone(&tz))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub telegram_id: Option<i64>,
    pub vk_id: Option<i64>,
    pub is_active: bool,
}

impl Admin {
    pub fn matches(&self, platform: Platform, user_id: i64) -> bool {
        match platform {
            Platform::Telegram => self.telegram_id == Some(user_id),
            Platform::Vk => self.vk_id == Some(user_id),
        }
    }
}

/// Store log records. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    ServiceUpserted(Service),
    ClientUpserted(Client),
    BookingCreated(Booking),
    BookingStatusChanged { id: Ulid, status: BookingStatus },
    AdminUpserted(Admin),
}
