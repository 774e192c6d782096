use chrono::Utc;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::calendar::{with_tags, EventDraft};
use crate::config::Config;
use crate::contact::{normalize_phone, ContactCard};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::linker::link_extra;
use super::{BookingRequest, Confirmation, Contact, EngineError, Scheduler};

impl Scheduler {
    /// Revalidate, write the calendar event, link the extra resource, then
    /// record client and booking.
    ///
    /// Once the calendar event exists the booking is not rolled back: a store
    /// failure surfaces as `PersistenceFailure` carrying the event id.
    pub async fn confirm_booking(&self, request: &BookingRequest) -> Result<Confirmation, EngineError> {
        let service = self.active_service(request.service_id).await?;
        let phone = validate_request(&service, request, &self.config)?;
        self.revalidate_service(&service, &request.slot).await?;

        let span = request.slot.in_zone(self.config.tz);
        let body = ContactCard {
            name: request.contact.name.trim(),
            phone: phone.as_deref(),
            email: request.contact.email.as_deref(),
            platform: request.contact.platform,
            user_id: request.contact.user_id,
            num_clients: request.num_clients,
            need_photographer: request.need_photographer,
            notes: request.notes.as_deref(),
        }
        .render();
        let draft = EventDraft {
            title: format!("{}: {}", service.name, request.contact.name.trim()),
            description: with_tags(service.id, None, &body),
            span,
            linked_to: None,
        };
        let event = self.calendar.create_event(service.id, draft).await.map_err(|e| {
            warn!("booking event for service {} not written: {e}", service.id);
            metrics::counter!(observability::CALENDAR_FAILURES_TOTAL, "op" => "create_event").increment(1);
            EngineError::BookingUnconfirmable(e)
        })?;
        info!("event {event} written for service {} at {}", service.id, span.start);

        let linked = if request.with_linked_extra {
            link_extra(self.calendar.as_ref(), &service, &event, &span, &body).await
        } else {
            None
        };

        let client = match self.upsert_client(&request.contact, phone).await {
            Ok(client) => client,
            Err(reason) => return Err(persistence_failure(event, reason)),
        };
        let quote = service.pricing.quote(
            service.max_num_clients,
            request.num_clients,
            is_weekend(span.start.date_naive()),
            client.sale,
        );
        let booking = Booking {
            id: Ulid::new(),
            client_id: client.id,
            service_id: service.id,
            start: span.start.with_timezone(&Utc),
            duration_minutes: span.duration_minutes() as u32,
            num_clients: request.num_clients,
            status: BookingStatus::Confirmed,
            need_photographer: request.need_photographer,
            calendar_event: event.clone(),
            linked_extra: linked,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            total_price: quote.total,
            created_at: Utc::now(),
        };
        if let Err(reason) = self.store.create_booking(booking.clone()).await {
            return Err(persistence_failure(event, reason));
        }

        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => BookingStatus::Confirmed.as_str()).increment(1);
        info!("booking {} confirmed for client {}", booking.id, client.id);
        Ok(Confirmation { booking, quote })
    }

    /// Cancel, then remove the primary and linked calendar events. Event
    /// deletion failures are logged; the cancellation stands.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let booking = self.transition(id, BookingStatus::Cancelled).await?;

        self.delete_event(booking.service_id, &booking.calendar_event).await;
        if let Some(linked) = &booking.linked_extra {
            self.delete_event(linked.resource, &linked.event).await;
        }
        Ok(booking)
    }

    pub async fn complete_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.transition(id, BookingStatus::Completed).await
    }

    async fn transition(&self, id: Ulid, to: BookingStatus) -> Result<Booking, EngineError> {
        let mut booking = self.store.get_booking(id).await?.ok_or(EngineError::BookingNotFound(id))?;
        if !booking.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to,
            });
        }
        self.store.set_booking_status(id, to).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => to.as_str()).increment(1);
        info!("booking {id}: {} -> {}", booking.status.as_str(), to.as_str());
        booking.status = to;
        Ok(booking)
    }

    async fn delete_event(&self, resource: ServiceId, event: &EventRef) {
        match self.calendar.delete_event(resource, event).await {
            Ok(true) => info!("deleted event {event} on resource {resource}"),
            Ok(false) => warn!("event {event} on resource {resource} was already gone"),
            Err(e) => {
                warn!("event {event} on resource {resource} not deleted: {e}");
                metrics::counter!(observability::CALENDAR_FAILURES_TOTAL, "op" => "delete_event").increment(1);
            }
        }
    }

    /// A repeat booking from the same platform user updates the existing row.
    async fn upsert_client(&self, contact: &Contact, phone: Option<String>) -> Result<Client, StoreError> {
        let name = contact.name.trim().to_string();
        let email = contact.email.clone();
        let client = match self.store.find_client(contact.platform, contact.user_id).await? {
            Some(mut existing) => {
                existing.name = name;
                existing.phone = phone.or(existing.phone);
                existing.email = email.or(existing.email);
                existing
            }
            None => {
                let (telegram_id, vk_id) = match contact.platform {
                    Platform::Telegram => (Some(contact.user_id), None),
                    Platform::Vk => (None, Some(contact.user_id)),
                };
                Client {
                    id: Ulid::new(),
                    telegram_id,
                    vk_id,
                    name,
                    phone,
                    email,
                    sale: 0,
                    created_at: Utc::now(),
                }
            }
        };
        self.store.upsert_client(client.clone()).await?;
        Ok(client)
    }
}

fn persistence_failure(event: EventRef, reason: StoreError) -> EngineError {
    error!("calendar event {event} written but booking not stored: {reason}");
    metrics::counter!(observability::PERSISTENCE_FAILURES_TOTAL).increment(1);
    EngineError::PersistenceFailure { event, reason }
}

/// Request checks that need no calendar. Returns the normalised phone.
fn validate_request(
    service: &Service,
    request: &BookingRequest,
    config: &Config,
) -> Result<Option<String>, EngineError> {
    if request.num_clients == 0 || request.num_clients > MAX_CLIENTS_PER_BOOKING {
        return Err(EngineError::InvalidRequest("number of guests is out of range"));
    }
    let name = request.contact.name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(EngineError::InvalidRequest("name is empty or too long"));
    }
    if let Some(notes) = &request.notes
        && notes.len() > MAX_NOTES_LEN
    {
        return Err(EngineError::InvalidRequest("notes are too long"));
    }
    if let Some(email) = &request.contact.email
        && (email.len() > MAX_EMAIL_LEN || !email.contains('@'))
    {
        return Err(EngineError::InvalidRequest("email is not valid"));
    }
    let phone = match request.contact.phone.as_deref() {
        Some(raw) => Some(normalize_phone(raw).ok_or(EngineError::InvalidRequest("phone number is not valid"))?),
        None => None,
    };

    // Non-positive lengths are left to selection validation.
    let minutes = request.slot.duration_minutes();
    if minutes > 0 {
        let minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
        if minutes < service.min_duration_minutes {
            return Err(EngineError::InvalidRequest("booking is shorter than the service minimum"));
        }
        // Rest-of-day bookings run to closing whatever the step.
        let to_closing = request.slot.in_zone(config.tz).end.time() == config.work_end;
        if !to_closing && !service.accepts_duration(minutes) {
            return Err(EngineError::InvalidRequest("booking length is not offered for this service"));
        }
    }
    if request.with_linked_extra && service.linked_extra.is_none() {
        return Err(EngineError::InvalidRequest("service has no linked resource"));
    }
    Ok(phone)
}
