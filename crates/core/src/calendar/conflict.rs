use chrono::{DateTime, Duration, Utc};

use crate::domain::calendar::{CalendarEvent, CalendarHold, TimeWindow};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

impl From<&CalendarHold> for Interval {
    fn from(hold: &CalendarHold) -> Self {
        Self::new(hold.start, hold.end)
    }
}

impl From<&CalendarEvent> for Interval {
    fn from(event: &CalendarEvent) -> Self {
        Self::new(event.start, event.end)
    }
}

/// `candidate` conflicts with `existing` when they come closer than `buffer` on either
/// boundary.
pub fn conflicts(candidate: Interval, existing: Interval, buffer: Duration) -> bool {
    candidate.start - buffer < existing.end && candidate.end + buffer > existing.start
}

pub fn conflicts_with_any<I>(candidate: Interval, reservations: I, buffer: Duration) -> bool
where
    I: IntoIterator<Item = Interval>,
{
    reservations.into_iter().any(|existing| conflicts(candidate, existing, buffer))
}

/// Whole `slot`-long segments starting at `window.from`; a trailing partial segment is
/// dropped.
pub fn slot_grid(window: TimeWindow, slot: Duration) -> Vec<Interval> {
    let mut slots = Vec::new();
    if slot <= Duration::zero() {
        return slots;
    }

    let mut start = window.from;
    while start + slot <= window.to {
        slots.push(Interval::new(start, start + slot));
        start += slot;
    }
    slots
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::{conflicts, slot_grid, Interval};
    use crate::domain::calendar::TimeWindow;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn existing() -> Interval {
        Interval::new(ts("2026-03-02T14:00:00Z"), ts("2026-03-02T14:30:00Z"))
    }

    #[test]
    fn buffer_applies_on_both_boundaries() {
        let buffer = Duration::minutes(10);
        let shift = |minutes: i64| {
            Interval::new(
                existing().start + Duration::minutes(minutes),
                existing().end + Duration::minutes(minutes),
            )
        };

        assert!(conflicts(shift(-9), existing(), buffer));
        assert!(conflicts(shift(9), existing(), buffer));
        assert!(conflicts(shift(-39), existing(), buffer));
        assert!(conflicts(shift(39), existing(), buffer));
        assert!(!conflicts(shift(41), existing(), buffer));
        assert!(!conflicts(shift(-41), existing(), buffer));
    }

    #[test]
    fn exact_buffer_gap_is_allowed() {
        let candidate = Interval::new(ts("2026-03-02T14:40:00Z"), ts("2026-03-02T15:10:00Z"));
        assert!(!conflicts(candidate, existing(), Duration::minutes(10)));

        let before = Interval::new(ts("2026-03-02T13:20:00Z"), ts("2026-03-02T13:50:00Z"));
        assert!(!conflicts(before, existing(), Duration::minutes(10)));
    }

    #[test]
    fn grid_keeps_only_whole_slots() {
        let window = TimeWindow { from: ts("2026-03-02T09:00:00Z"), to: ts("2026-03-02T10:45:00Z") };
        let slots = slot_grid(window, Duration::minutes(30));

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].start, ts("2026-03-02T09:00:00Z"));
        assert_eq!(slots[2].end, ts("2026-03-02T10:30:00Z"));
    }

    #[test]
    fn empty_or_inverted_window_has_no_slots() {
        let window = TimeWindow { from: ts("2026-03-02T10:00:00Z"), to: ts("2026-03-02T09:00:00Z") };
        assert!(slot_grid(window, Duration::minutes(30)).is_empty());
    }
}
