mod availability;
mod conflict;
mod error;
mod linker;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{default_grid, generate_slots, merge_overlapping, overlap_count};
pub use conflict::{check_slot, filter_slots, Occupancy};
pub use error::{ConflictReason, EngineError};
pub use linker::link_extra;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::warn;

use crate::calendar::{CalendarError, CalendarProvider};
use crate::config::Config;
use crate::model::*;
use crate::store::BookingStore;

/// What the user asked to see for one service on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub service_id: ServiceId,
    pub day: NaiveDate,
    /// Defaults to the service's minimum duration.
    pub duration_minutes: Option<u32>,
    /// Offer open-ended slots running to the end of the working day.
    pub rest_of_day: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub slots: Vec<Slot>,
    /// False when the calendar could not be read and `slots` is the default grid.
    pub verified: bool,
    pub degraded_reason: Option<CalendarError>,
}

/// Who is booking, as reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub platform: Platform,
    pub user_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub service_id: ServiceId,
    pub slot: Slot,
    pub num_clients: u32,
    pub contact: Contact,
    /// Also reserve the service's linked extra resource ahead of the start.
    pub with_linked_extra: bool,
    pub need_photographer: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub booking: Booking,
    pub quote: PriceQuote,
}

/// Stateless booking engine over a calendar and a store.
pub struct Scheduler {
    pub(super) calendar: Arc<dyn CalendarProvider>,
    pub(super) store: Arc<dyn BookingStore>,
    pub(super) config: Config,
}

impl Scheduler {
    pub fn new(calendar: Arc<dyn CalendarProvider>, store: Arc<dyn BookingStore>, config: Config) -> Self {
        Self {
            calendar,
            store,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lookup + active check.
    pub(super) async fn active_service(&self, id: ServiceId) -> Result<Service, EngineError> {
        let service = self.store.get_service(id).await?.ok_or(EngineError::NotFound(id))?;
        if !service.is_active {
            return Err(EngineError::InvalidRequest("service is not bookable"));
        }
        Ok(service)
    }

    pub(super) fn slot_request(&self, day: NaiveDate, slot_minutes: u32, mode: SlotMode) -> SlotRequest {
        SlotRequest {
            day,
            work_start: self.config.work_start,
            work_end: self.config.work_end,
            slot_minutes,
            step_minutes: self.config.step_minutes,
            tz: self.config.tz,
            mode,
        }
    }

    /// Busy intervals of the service and, when `rule` has a pre-window, of
    /// the pre-window resource. Never cached.
    pub(super) async fn fetch_occupancy(
        &self,
        service: &Service,
        rule: &OccupancyRule,
        window: &Span,
    ) -> Result<(Vec<Span>, Option<Vec<Span>>), CalendarError> {
        let primary = self.list_busy(service.id, window).await?;
        let secondary = match rule.pre_window {
            Some(pre) => Some(self.list_busy(pre.resource, window).await?),
            None => None,
        };
        Ok((primary, secondary))
    }

    async fn list_busy(&self, resource: ServiceId, window: &Span) -> Result<Vec<Span>, CalendarError> {
        self.calendar
            .list_busy(resource, window, self.config.tz)
            .await
            .inspect_err(|e| {
                warn!("list_busy for resource {resource} failed: {e}");
                metrics::counter!(crate::observability::CALENDAR_FAILURES_TOTAL, "op" => "list_busy").increment(1);
            })
    }
}
