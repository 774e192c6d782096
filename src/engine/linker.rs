use tracing::{info, warn};

use crate::calendar::{with_tags, CalendarProvider, EventDraft};
use crate::model::*;
use crate::observability;

/// Reserve the service's linked extra resource on `[start - lead, start)` of
/// the primary booking, pointing back at the primary event.
///
/// Returns `None` when the service has no linked resource or the write failed;
/// the primary booking stands either way.
pub async fn link_extra(
    calendar: &dyn CalendarProvider,
    service: &Service,
    primary: &EventRef,
    primary_span: &Span,
    body: &str,
) -> Option<LinkedEvent> {
    let rule = service.linked_pre_window()?;
    let Some(span) = rule.window_before(primary_span.start) else {
        warn!("service {}: linked resource {} has no lead time", service.id, rule.resource);
        return None;
    };
    let draft = EventDraft {
        title: format!("Prep before {}", service.name),
        description: with_tags(rule.resource, Some(primary), body),
        span,
        linked_to: Some(primary.clone()),
    };

    match calendar.create_event(rule.resource, draft).await {
        Ok(id) => {
            info!("linked event {id} on resource {} for {primary}", rule.resource);
            Some(LinkedEvent {
                resource: rule.resource,
                event: id,
            })
        }
        Err(e) => {
            warn!("linked event on resource {} for {primary} failed: {e}", rule.resource);
            metrics::counter!(observability::LINKED_EVENT_FAILURES_TOTAL).increment(1);
            None
        }
    }
}
