use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::BookingId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open time range `[from, to)` used for availability queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub manager_id: ManagerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarHold {
    pub id: HoldId,
    pub manager_id: ManagerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ttl_secs: u32,
    pub created_at: DateTime<Utc>,
}

impl CalendarHold {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(i64::from(self.ttl_secs))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: EventId,
    pub manager_id: ManagerId,
    pub booking_id: BookingId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub invitees: Vec<String>,
    pub ical_uid: String,
    pub meeting_url: String,
    pub created_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// Whether `request` asks for this same booking over this same interval.
    pub fn is_replay_of(&self, request: &EventRequest) -> bool {
        self.booking_id == request.booking_id
            && self.start == request.start
            && self.end == request.end
    }
}

/// Input to `create_event`. Leaving `ical_uid` empty derives it from booking id and start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    pub booking_id: BookingId,
    pub manager_id: ManagerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub invitees: Vec<String>,
    pub ical_uid: Option<String>,
    pub hold_id: Option<HoldId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfirmation {
    pub event_id: EventId,
    pub meeting_url: String,
    pub ical_uid: String,
}

impl From<&CalendarEvent> for EventConfirmation {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            meeting_url: event.meeting_url.clone(),
            ical_uid: event.ical_uid.clone(),
        }
    }
}
