use std::time::Instant;

use tracing::{debug, warn};
use ulid::Ulid;

use crate::calendar::EventSnapshot;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{default_grid, generate_slots};
use super::conflict::{check_slot, filter_slots, validate_selection, Occupancy};
use super::{Availability, EngineError, Scheduler, SlotQuery};

impl Scheduler {
    /// Bookable slots for one service and day.
    ///
    /// A calendar failure does not fail the query: the default 09:00-21:00
    /// grid is returned with `verified = false` and the booking is checked
    /// again, fail-closed, by `revalidate` at confirmation.
    pub async fn available_slots(&self, query: &SlotQuery) -> Result<Availability, EngineError> {
        let started = Instant::now();
        let service = self.active_service(query.service_id).await?;
        let duration = query.duration_minutes.unwrap_or(service.min_duration_minutes);
        if !service.accepts_duration(duration) || duration > MAX_BOOKING_MINUTES {
            return Err(EngineError::InvalidRequest("duration is outside the service limits"));
        }
        let mode = if query.rest_of_day { SlotMode::RestOfDay } else { SlotMode::Fixed };
        let request = self.slot_request(query.day, duration, mode);
        let window = request
            .window()
            .ok_or(EngineError::InvalidRequest("working hours are not valid on this day"))?;

        let rule = service.effective_occupancy();
        let availability = match self.fetch_occupancy(&service, &rule, &window).await {
            Ok((primary, secondary)) => {
                // Shared resources defer every overlap decision to the filter.
                let generator_busy: &[Span] = if rule.tolerance == 0 { &primary } else { &[] };
                let candidates = generate_slots(&request, generator_busy)?;
                let occupancy = Occupancy {
                    window,
                    primary: &primary,
                    secondary: secondary.as_deref(),
                };
                Availability {
                    slots: filter_slots(&candidates, &occupancy, &rule),
                    verified: true,
                    degraded_reason: None,
                }
            }
            Err(e) => {
                warn!(
                    "service {} on {}: {e}, offering unverified default grid",
                    service.id, query.day
                );
                Availability {
                    slots: default_grid(self.config.tz, query.day, mode, duration)?,
                    verified: false,
                    degraded_reason: Some(e),
                }
            }
        };

        debug!(
            "service {} on {}: {} slots (verified={})",
            service.id,
            query.day,
            availability.slots.len(),
            availability.verified
        );
        let verified = if availability.verified { "true" } else { "false" };
        metrics::counter!(observability::SLOT_QUERIES_TOTAL, "verified" => verified).increment(1);
        metrics::histogram!(observability::SLOT_QUERY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(availability)
    }

    /// Authoritative check of a chosen slot against freshly read busy intervals.
    /// Fails closed: if the calendar cannot be read the booking is refused.
    pub async fn revalidate(&self, service_id: ServiceId, chosen: &Slot) -> Result<(), EngineError> {
        let service = self.active_service(service_id).await?;
        self.revalidate_service(&service, chosen).await
    }

    pub(super) async fn revalidate_service(&self, service: &Service, chosen: &Slot) -> Result<(), EngineError> {
        let result = self.check_selection(service, chosen).await;
        if let Err(e) = &result {
            debug!("revalidation of service {} rejected: {e}", service.id);
        }
        metrics::counter!(
            observability::REVALIDATIONS_TOTAL,
            "outcome" => observability::revalidation_label(&result)
        )
        .increment(1);
        result
    }

    async fn check_selection(&self, service: &Service, chosen: &Slot) -> Result<(), EngineError> {
        let local = chosen.in_zone(self.config.tz);
        let window = self
            .slot_request(local.start.date_naive(), service.min_duration_minutes, SlotMode::Fixed)
            .window()
            .ok_or(EngineError::MalformedSelection("working hours are not valid on this day"))?;
        validate_selection(&local, &window)?;

        let rule = service.effective_occupancy();
        let (primary, secondary) = self
            .fetch_occupancy(service, &rule, &window)
            .await
            .map_err(EngineError::BookingUnconfirmable)?;
        let occupancy = Occupancy {
            window,
            primary: &primary,
            secondary: secondary.as_deref(),
        };
        check_slot(&local, &occupancy, &rule).map_err(EngineError::SlotConflict)
    }

    /// The calendar's current view of a booking's primary event.
    pub async fn booking_snapshot(&self, id: Ulid) -> Result<Option<EventSnapshot>, EngineError> {
        let booking = self.store.get_booking(id).await?.ok_or(EngineError::BookingNotFound(id))?;
        self.calendar
            .get_event(booking.service_id, &booking.calendar_event)
            .await
            .map_err(|e| {
                metrics::counter!(observability::CALENDAR_FAILURES_TOTAL, "op" => "get_event").increment(1);
                EngineError::CalendarUnavailable(e)
            })
    }

    /// A platform user's bookings, oldest first. Unknown users have none.
    pub async fn client_bookings(&self, platform: Platform, user_id: i64) -> Result<Vec<Booking>, EngineError> {
        match self.store.find_client(platform, user_id).await? {
            Some(client) => Ok(self.store.bookings_for_client(client.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Configured allowlist first, then active admin rows in the store.
    pub async fn is_admin(&self, platform: Platform, user_id: i64) -> Result<bool, EngineError> {
        if self.config.is_listed_admin(platform, user_id) {
            return Ok(true);
        }
        let admins = self.store.list_admins().await?;
        Ok(admins.iter().any(|a| a.is_active && a.matches(platform, user_id)))
    }

    /// Active services, ordered by id.
    pub async fn services(&self) -> Result<Vec<Service>, EngineError> {
        Ok(self.store.list_services(true).await?)
    }
}
