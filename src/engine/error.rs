use ulid::Ulid;

use crate::calendar::CalendarError;
use crate::model::{BookingStatus, EventRef, ServiceId};
use crate::store::StoreError;

/// Which occupancy constraint a slot ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The resource itself already holds more overlapping bookings than it tolerates.
    Primary { overlapping: usize, tolerance: u32 },
    /// The linked resource is full during the lead window before the slot.
    PreWindow {
        resource: ServiceId,
        overlapping: usize,
        capacity: u32,
    },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::Primary { overlapping, tolerance } => {
                write!(f, "{overlapping} overlapping bookings, tolerance {tolerance}")
            }
            ConflictReason::PreWindow {
                resource,
                overlapping,
                capacity,
            } => write!(
                f,
                "resource {resource} holds {overlapping} of {capacity} bookings in the pre-window"
            ),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(ServiceId),
    BookingNotFound(Ulid),
    InvalidRequest(&'static str),
    /// Calendar unreachable or unconfigured while it was optional.
    CalendarUnavailable(CalendarError),
    SlotConflict(ConflictReason),
    MalformedSelection(&'static str),
    /// The final availability check could not run; the booking was not made.
    BookingUnconfirmable(CalendarError),
    /// The calendar event exists but the durable record could not be written.
    PersistenceFailure { event: EventRef, reason: StoreError },
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    Store(StoreError),
}

impl EngineError {
    /// Plain-language message for chat users. Never contains raw error text.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "This service is not available. Please choose another one.",
            EngineError::BookingNotFound(_) => "We could not find this booking.",
            EngineError::InvalidRequest(_) => {
                "Some booking details are not valid. Please start the booking again."
            }
            EngineError::CalendarUnavailable(_) => {
                "The schedule is temporarily unavailable. Please try again in a few minutes."
            }
            EngineError::SlotConflict(_) => {
                "This time just became unavailable. Please pick another time."
            }
            EngineError::MalformedSelection(_) => {
                "The selected time is outside working hours. Please pick a time from the list again."
            }
            EngineError::BookingUnconfirmable(_) => {
                "We could not confirm this time right now. Please try again or contact support."
            }
            EngineError::PersistenceFailure { .. } => {
                "Your time is reserved. We will contact you to confirm the details."
            }
            EngineError::InvalidTransition { .. } => "This booking can no longer be changed.",
            EngineError::Store(_) => "Something went wrong on our side. Please contact support.",
        }
    }

    /// True when asking the user to simply retry the same action makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::BookingUnconfirmable(_) | EngineError::CalendarUnavailable(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "service not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::CalendarUnavailable(e) => write!(f, "calendar unavailable: {e}"),
            EngineError::SlotConflict(reason) => write!(f, "slot conflict: {reason}"),
            EngineError::MalformedSelection(msg) => write!(f, "malformed selection: {msg}"),
            EngineError::BookingUnconfirmable(e) => write!(f, "booking unconfirmable: {e}"),
            EngineError::PersistenceFailure { event, reason } => {
                write!(f, "calendar event {event} written but not persisted: {reason}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {} to {}", from.as_str(), to.as_str())
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
