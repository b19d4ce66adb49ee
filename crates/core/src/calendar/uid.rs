use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::domain::conversation::BookingId;

/// iCalendar UID for a booking slot. One-way and stable: the same booking id and start
/// always give the same UID, which makes it the idempotency key for calendar writes.
pub fn derive_ical_uid(booking_id: &BookingId, start: DateTime<Utc>, domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(booking_id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(start.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes());
    format!("{:x}@{domain}", hasher.finalize())
}

pub fn meeting_url_for(base_url: &str, ical_uid: &str) -> String {
    let token: String = ical_uid
        .chars()
        .take_while(|ch| *ch != '@')
        .filter(char::is_ascii_alphanumeric)
        .take(12)
        .collect();
    format!("{}/{token}", base_url.trim_end_matches('/'))
}
