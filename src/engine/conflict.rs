use crate::model::*;

use super::availability::overlap_count;
use super::error::ConflictReason;
use super::EngineError;

/// Busy intervals a slot is judged against.
#[derive(Debug, Clone, Copy)]
pub struct Occupancy<'a> {
    /// The queried working window. Pre-windows starting before it are not checked.
    pub window: Span,
    /// Raw (unmerged) busy intervals of the booked resource.
    pub primary: &'a [Span],
    /// Busy intervals of the pre-window resource, when the rule has one.
    pub secondary: Option<&'a [Span]>,
}

/// Single-slot occupancy check shared by generation-time filtering and
/// commit-time revalidation.
pub fn check_slot(slot: &Slot, occupancy: &Occupancy<'_>, rule: &OccupancyRule) -> Result<(), ConflictReason> {
    let overlapping = overlap_count(slot, occupancy.primary);
    if overlapping > rule.tolerance as usize {
        return Err(ConflictReason::Primary {
            overlapping,
            tolerance: rule.tolerance,
        });
    }

    if let (Some(pre), Some(secondary)) = (rule.pre_window, occupancy.secondary)
        && let Some(window) = pre.window_before(slot.start)
    {
        // No visibility before the queried window.
        if window.start < occupancy.window.start {
            return Ok(());
        }
        let overlapping = overlap_count(&window, secondary);
        if overlapping >= pre.capacity as usize {
            return Err(ConflictReason::PreWindow {
                resource: pre.resource,
                overlapping,
                capacity: pre.capacity,
            });
        }
    }
    Ok(())
}

/// Keep the candidates that pass `check_slot`, preserving order.
pub fn filter_slots(candidates: &[Slot], occupancy: &Occupancy<'_>, rule: &OccupancyRule) -> Vec<Slot> {
    candidates
        .iter()
        .filter(|slot| check_slot(slot, occupancy, rule).is_ok())
        .copied()
        .collect()
}

/// Reject selections that could not have come from the generator for `window`.
pub(crate) fn validate_selection(chosen: &Slot, window: &Span) -> Result<(), EngineError> {
    if chosen.end <= chosen.start {
        return Err(EngineError::MalformedSelection("slot ends before it starts"));
    }
    if !window.contains_span(chosen) {
        return Err(EngineError::MalformedSelection("slot is outside working hours"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveTime};
    use chrono_tz::Europe::Moscow;
    use chrono_tz::Tz;

    fn t(h: u32, m: u32) -> DateTime<Tz> {
        let day = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        localize(Moscow, day, NaiveTime::from_hms_opt(h, m, 0).unwrap()).unwrap()
    }

    fn span(h1: u32, m1: u32, h2: u32, m2: u32) -> Span {
        Span::new(t(h1, m1), t(h2, m2))
    }

    fn hourly() -> Vec<Slot> {
        (9..21).map(|h| span(h, 0, h + 1, 0)).collect()
    }

    fn occ<'a>(primary: &'a [Span], secondary: Option<&'a [Span]>) -> Occupancy<'a> {
        Occupancy {
            window: span(9, 0, 21, 0),
            primary,
            secondary,
        }
    }

    fn linked_rule() -> OccupancyRule {
        OccupancyRule::exclusive().with_pre_window(PreWindowRule::new(9))
    }

    #[test]
    fn exclusive_rejects_any_overlap() {
        let busy = vec![span(12, 0, 13, 30)];
        let kept = filter_slots(&hourly(), &occ(&busy, None), &OccupancyRule::exclusive());
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let busy = vec![span(10, 0, 11, 0)];
        let rule = OccupancyRule::exclusive();
        assert!(check_slot(&span(11, 0, 12, 0), &occ(&busy, None), &rule).is_ok());
        assert!(check_slot(&span(9, 0, 10, 0), &occ(&busy, None), &rule).is_ok());
    }

    #[test]
    fn shared_resource_tolerates_one_overlap() {
        let busy = vec![span(12, 0, 13, 0), span(12, 30, 13, 30)];
        let rule = OccupancyRule::shared(1);
        assert_eq!(
            check_slot(&span(12, 0, 13, 0), &occ(&busy, None), &rule),
            Err(ConflictReason::Primary {
                overlapping: 2,
                tolerance: 1
            })
        );
        assert!(check_slot(&span(13, 0, 14, 0), &occ(&busy, None), &rule).is_ok());
        assert!(check_slot(&span(11, 0, 12, 0), &occ(&busy, None), &rule).is_ok());
    }

    #[test]
    fn tolerance_boundary() {
        let slot = span(12, 0, 13, 0);
        for k in 0..4u32 {
            let busy: Vec<Span> = (0..k).map(|i| span(12, i * 10, 12, i * 10 + 5)).collect();
            let one_more: Vec<Span> = (0..=k).map(|i| span(12, i * 10, 12, i * 10 + 5)).collect();
            let rule = OccupancyRule::shared(k);
            assert!(check_slot(&slot, &occ(&busy, None), &rule).is_ok());
            assert!(check_slot(&slot, &occ(&one_more, None), &rule).is_err());
        }
    }

    #[test]
    fn full_pre_window_rejects_free_slot() {
        let secondary = vec![span(14, 0, 15, 0), span(14, 0, 15, 0)];
        let result = check_slot(&span(15, 0, 16, 0), &occ(&[], Some(&secondary)), &linked_rule());
        assert_eq!(
            result,
            Err(ConflictReason::PreWindow {
                resource: 9,
                overlapping: 2,
                capacity: 2
            })
        );
    }

    #[test]
    fn half_full_pre_window_is_fine() {
        let secondary = vec![span(14, 0, 15, 0)];
        assert!(check_slot(&span(15, 0, 16, 0), &occ(&[], Some(&secondary)), &linked_rule()).is_ok());
    }

    #[test]
    fn pre_window_before_day_start_is_never_rejected() {
        let secondary = vec![span(8, 0, 9, 0), span(8, 0, 9, 0)];
        let rule = linked_rule();
        assert!(check_slot(&span(9, 0, 10, 0), &occ(&[], Some(&secondary)), &rule).is_ok());
    }

    #[test]
    fn pre_window_ignored_without_secondary_data() {
        let rule = linked_rule();
        assert!(check_slot(&span(15, 0, 16, 0), &occ(&[], None), &rule).is_ok());
    }

    #[test]
    fn filter_is_subset_and_monotone() {
        let candidates = hourly();
        let narrow = vec![span(12, 0, 12, 30)];
        let wide = vec![span(11, 30, 13, 30)];
        let rule = OccupancyRule::exclusive();

        let a = filter_slots(&candidates, &occ(&narrow, None), &rule);
        let b = filter_slots(&candidates, &occ(&wide, None), &rule);
        assert!(a.iter().all(|s| candidates.contains(s)));
        assert!(b.iter().all(|s| a.contains(s)));
        assert!(b.len() < a.len());
    }

    #[test]
    fn selection_outside_hours_is_malformed() {
        let window = span(9, 0, 21, 0);
        assert!(validate_selection(&span(20, 30, 21, 0), &window).is_ok());
        let late = Span {
            start: t(20, 30),
            end: t(21, 30),
        };
        assert!(matches!(
            validate_selection(&late, &window),
            Err(EngineError::MalformedSelection(_))
        ));
        let inverted = Span {
            start: t(12, 0),
            end: t(11, 0),
        };
        assert!(matches!(
            validate_selection(&inverted, &window),
            Err(EngineError::MalformedSelection(_))
        ));
    }
}
