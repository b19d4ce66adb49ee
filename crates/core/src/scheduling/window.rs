//! Recurring daily contact windows per region, expressed in UTC hours.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A daily `[start_hour, end_hour)` window in UTC. `start_hour > end_hour` wraps past
/// midnight; `start_hour == end_hour` covers the whole day. Both hours are always in
/// `0..=23`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowHours", into = "WindowHours")]
pub struct RegionWindow {
    start_hour: u8,
    end_hour: u8,
}

/// Serialized form of a [`RegionWindow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("window hours {start_hour}..{end_hour} must both be in range 0..=23")]
pub struct InvalidWindowHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl TryFrom<WindowHours> for RegionWindow {
    type Error = InvalidWindowHours;

    fn try_from(hours: WindowHours) -> Result<Self, Self::Error> {
        Self::new(hours.start_hour, hours.end_hour).ok_or(InvalidWindowHours {
            start_hour: hours.start_hour,
            end_hour: hours.end_hour,
        })
    }
}

impl From<RegionWindow> for WindowHours {
    fn from(window: RegionWindow) -> Self {
        Self { start_hour: window.start_hour, end_hour: window.end_hour }
    }
}

impl RegionWindow {
    pub fn new(start_hour: u8, end_hour: u8) -> Option<Self> {
        (start_hour < 24 && end_hour < 24).then_some(Self { start_hour, end_hour })
    }

    pub fn start_hour(&self) -> u8 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u8 {
        self.end_hour
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }

    pub fn is_all_day(&self) -> bool {
        self.start_hour == self.end_hour
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let hour = ts.hour();
        let (start, end) = (u32::from(self.start_hour), u32::from(self.end_hour));

        if self.is_all_day() {
            true
        } else if self.wraps_midnight() {
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }

    pub fn start_on(&self, date: NaiveDate) -> DateTime<Utc> {
        let start = NaiveTime::MIN + Duration::hours(i64::from(self.start_hour));
        date.and_time(start).and_utc()
    }

    /// The first window opening strictly after `ts`: today's if `ts` precedes it,
    /// tomorrow's otherwise.
    pub fn next_start_after(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.start_on(ts.date_naive());
        if ts < today {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// `ts` itself when it is inside the window, otherwise the next window opening.
    pub fn advance_into(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        if self.contains(ts) {
            ts
        } else {
            self.next_start_after(ts)
        }
    }
}

impl Default for RegionWindow {
    fn default() -> Self {
        Self { start_hour: 9, end_hour: 17 }
    }
}

/// Resolves opaque region identifiers to contact windows. Unknown regions get the
/// default window rather than an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowCalculator {
    default_window: RegionWindow,
    regions: BTreeMap<String, RegionWindow>,
}

impl WindowCalculator {
    pub fn new(default_window: RegionWindow, regions: BTreeMap<String, RegionWindow>) -> Self {
        let regions =
            regions.into_iter().map(|(region, window)| (normalize_region(&region), window)).collect();
        Self { default_window, regions }
    }

    pub fn builtin() -> Self {
        Self::new(RegionWindow::default(), builtin_regions())
    }

    pub fn default_window(&self) -> RegionWindow {
        self.default_window
    }

    pub fn window_for(&self, region: &str) -> RegionWindow {
        self.regions.get(&normalize_region(region)).copied().unwrap_or(self.default_window)
    }

    pub fn is_known_region(&self, region: &str) -> bool {
        self.regions.contains_key(&normalize_region(region))
    }
}

impl Default for WindowCalculator {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_regions() -> BTreeMap<String, RegionWindow> {
    [
        ("us-east", 13, 22),
        ("us-central", 14, 23),
        ("us-west", 16, 1),
        ("eu-west", 8, 17),
        ("eu-central", 7, 16),
        ("apac", 0, 9),
    ]
    .into_iter()
    .map(|(region, start_hour, end_hour)| {
        (region.to_string(), RegionWindow { start_hour, end_hour })
    })
    .collect()
}

pub fn normalize_region(region: &str) -> String {
    region.trim().to_ascii_lowercase().replace('_', "-")
}
