use chrono::{Duration, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::model::*;

use super::EngineError;

/// Fallback working day offered when the calendar cannot be consulted.
pub const DEFAULT_GRID_START_HOUR: u32 = 9;
pub const DEFAULT_GRID_END_HOUR: u32 = 21;
pub const DEFAULT_GRID_MIN_SLOT_MINUTES: u32 = 60;

// ── Slot Algorithm ────────────────────────────────────────────────

/// Merge overlapping/touching intervals into a sorted, disjoint, minimal set.
pub fn merge_overlapping(intervals: &[Span]) -> Vec<Span> {
    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|s| s.start);

    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Walk the working day in `step_minutes` increments and emit every candidate
/// that fits the window and misses all `busy` intervals.
///
/// Fixed: `[cursor, cursor + slot_minutes)`.
/// RestOfDay: `[cursor, work_end)`, offered while at least one step remains.
///
/// Pass an empty `busy` when the resource tolerates overlaps and let the
/// occupancy filter decide.
pub fn generate_slots(request: &SlotRequest, busy: &[Span]) -> Result<Vec<Slot>, EngineError> {
    if request.slot_minutes == 0 || request.step_minutes == 0 {
        return Err(EngineError::InvalidRequest(
            "slot length and step must be at least one minute",
        ));
    }
    let window = request.window().ok_or(EngineError::InvalidRequest(
        "working hours are not valid on this day",
    ))?;

    let merged = merge_overlapping(busy);
    let step = Duration::minutes(request.step_minutes as i64);
    let length = Duration::minutes(request.slot_minutes as i64);
    let min_length = match request.mode {
        SlotMode::Fixed => length,
        SlotMode::RestOfDay => step,
    };

    let mut slots = Vec::new();
    let mut cursor = window.start;
    while cursor + min_length <= window.end {
        let end = match request.mode {
            SlotMode::Fixed => cursor + length,
            SlotMode::RestOfDay => window.end,
        };
        let slot = Span::new(cursor, end);
        if !overlaps_merged(&merged, &slot) {
            slots.push(slot);
        }
        cursor = cursor + step;
    }
    Ok(slots)
}

/// The hourly 09:00–21:00 grid, slot length `max(60, duration_minutes)`.
pub fn default_grid(
    tz: Tz,
    day: NaiveDate,
    mode: SlotMode,
    duration_minutes: u32,
) -> Result<Vec<Slot>, EngineError> {
    let request = SlotRequest {
        day,
        work_start: hour(DEFAULT_GRID_START_HOUR)?,
        work_end: hour(DEFAULT_GRID_END_HOUR)?,
        slot_minutes: duration_minutes.max(DEFAULT_GRID_MIN_SLOT_MINUTES),
        step_minutes: 60,
        tz,
        mode,
    };
    generate_slots(&request, &[])
}

fn hour(h: u32) -> Result<NaiveTime, EngineError> {
    NaiveTime::from_hms_opt(h, 0, 0).ok_or(EngineError::InvalidRequest("grid hour out of range"))
}

/// Half-open overlap count of `span` against unmerged `intervals`.
pub fn overlap_count(span: &Span, intervals: &[Span]) -> usize {
    intervals.iter().filter(|b| span.overlaps(b)).count()
}

/// `merged` must be sorted and disjoint. Everything at index >= right_bound
/// starts at or after `span.end`, and only the last earlier one can reach it.
fn overlaps_merged(merged: &[Span], span: &Span) -> bool {
    let right_bound = merged.partition_point(|b| b.start < span.end);
    right_bound > 0 && merged[right_bound - 1].end > span.start
}
