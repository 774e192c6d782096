//! External calendar collaborator.
//!
//! The hosted calendar is the availability authority. Every event carries a
//! `Service ID: <id>` line in its description naming the resource it occupies;
//! linked events additionally carry `Linked event: <event-id>`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::{EventRef, ServiceId, Span};

pub const SERVICE_TAG: &str = "Service ID:";
pub const LINK_TAG: &str = "Linked event:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// Network failure, timeout or missing configuration.
    Unreachable(String),
    Unauthorized,
    /// The calendar answered but refused the request.
    Rejected(String),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::Unreachable(e) => write!(f, "calendar unreachable: {e}"),
            CalendarError::Unauthorized => write!(f, "calendar credentials rejected"),
            CalendarError::Rejected(e) => write!(f, "calendar rejected request: {e}"),
        }
    }
}

impl std::error::Error for CalendarError {}

/// A calendar entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    /// Start, end and the zone the event is written in.
    pub span: Span,
    /// Back-reference for linked events.
    pub linked_to: Option<EventRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub id: EventRef,
    pub title: String,
    pub description: String,
    pub span: Span,
    pub tags: EventTags,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals of `resource` overlapping `window`, expressed in `tz`.
    async fn list_busy(&self, resource: ServiceId, window: &Span, tz: Tz) -> Result<Vec<Span>, CalendarError>;

    async fn create_event(&self, resource: ServiceId, draft: EventDraft) -> Result<EventRef, CalendarError>;

    async fn get_event(&self, resource: ServiceId, id: &EventRef) -> Result<Option<EventSnapshot>, CalendarError>;

    /// Returns false if the event did not exist.
    async fn delete_event(&self, resource: ServiceId, id: &EventRef) -> Result<bool, CalendarError>;
}

// ── Description tags ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTags {
    pub service_id: Option<ServiceId>,
    pub linked_event: Option<EventRef>,
}

pub fn parse_tags(description: &str) -> EventTags {
    let mut tags = EventTags::default();
    for line in description.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(SERVICE_TAG) {
            if tags.service_id.is_none() {
                tags.service_id = rest.trim().parse().ok();
            }
        } else if let Some(rest) = line.strip_prefix(LINK_TAG) {
            let rest = rest.trim();
            if tags.linked_event.is_none() && !rest.is_empty() {
                tags.linked_event = Some(EventRef(rest.to_string()));
            }
        }
    }
    tags
}

fn is_tag_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with(SERVICE_TAG) || line.starts_with(LINK_TAG)
}

/// The body with any tag-looking lines dropped, followed by the resource tag
/// and back-reference. Tags inside user-supplied text never survive.
pub fn with_tags(resource: ServiceId, linked_to: Option<&EventRef>, body: &str) -> String {
    let mut description = body
        .lines()
        .filter(|line| !is_tag_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string();
    push_line(&mut description, &format!("{SERVICE_TAG} {resource}"));
    if let Some(link) = linked_to {
        push_line(&mut description, &format!("{LINK_TAG} {link}"));
    }
    description
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

// ── In-memory calendar ───────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredEvent {
    title: String,
    description: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tags: EventTags,
}

/// Single shared calendar held in memory. Events are assigned to resources by
/// their description tags, the same way the studio's hosted calendar is read.
pub struct MemoryCalendar {
    events: DashMap<EventRef, StoredEvent>,
    offline: AtomicBool,
}

impl Default for MemoryCalendar {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCalendar {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `Unreachable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events linked to `primary`, e.g. makeup room reservations.
    pub fn linked_to(&self, primary: &EventRef) -> Vec<EventRef> {
        self.events
            .iter()
            .filter(|e| e.value().tags.linked_event.as_ref() == Some(primary))
            .map(|e| e.key().clone())
            .collect()
    }

    fn ensure_online(&self) -> Result<(), CalendarError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CalendarError::Unreachable("calendar offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarProvider for MemoryCalendar {
    async fn list_busy(&self, resource: ServiceId, window: &Span, tz: Tz) -> Result<Vec<Span>, CalendarError> {
        self.ensure_online()?;
        let mut busy = Vec::new();
        for entry in self.events.iter() {
            let event = entry.value();
            if event.tags.service_id != Some(resource) {
                continue;
            }
            let Some(span) = Span::try_new(event.start.with_timezone(&tz), event.end.with_timezone(&tz)) else {
                warn!("skipping event {} with empty interval", entry.key());
                continue;
            };
            if span.overlaps(window) {
                busy.push(span);
            }
        }
        busy.sort_by_key(|s| s.start);
        Ok(busy)
    }

    async fn create_event(&self, resource: ServiceId, draft: EventDraft) -> Result<EventRef, CalendarError> {
        self.ensure_online()?;
        let description = with_tags(resource, draft.linked_to.as_ref(), &draft.description);
        let tags = parse_tags(&description);
        let id = EventRef(Ulid::new().to_string());
        self.events.insert(
            id.clone(),
            StoredEvent {
                title: draft.title,
                description,
                start: draft.span.start.with_timezone(&Utc),
                end: draft.span.end.with_timezone(&Utc),
                tags,
            },
        );
        debug!("created event {id} on resource {resource}");
        Ok(id)
    }

    async fn get_event(&self, resource: ServiceId, id: &EventRef) -> Result<Option<EventSnapshot>, CalendarError> {
        self.ensure_online()?;
        let Some(entry) = self.events.get(id) else {
            return Ok(None);
        };
        let event = entry.value();
        if event.tags.service_id != Some(resource) {
            return Ok(None);
        }
        let span = Span::try_new(
            event.start.with_timezone(&chrono_tz::UTC),
            event.end.with_timezone(&chrono_tz::UTC),
        )
        .ok_or_else(|| CalendarError::Rejected(format!("event {id} has an empty interval")))?;
        Ok(Some(EventSnapshot {
            id: id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            span,
            tags: event.tags.clone(),
        }))
    }

    async fn delete_event(&self, resource: ServiceId, id: &EventRef) -> Result<bool, CalendarError> {
        self.ensure_online()?;
        let removed = self
            .events
            .remove_if(id, |_, e| e.tags.service_id == Some(resource))
            .is_some();
        if removed {
            debug!("deleted event {id} on resource {resource}");
        }
        Ok(removed)
    }
}
