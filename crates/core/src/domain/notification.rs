use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::BookingId;
use crate::domain::lead::LeadId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboxMessageId(pub String);

/// Downstream work (CRM write, invite dispatch) queued after a booking completes.
/// `idempotency_key` is unique per outbox; the dispatcher may deliver at least once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxMessageId,
    pub idempotency_key: String,
    pub kind: String,
    pub lead_id: LeadId,
    pub booking_id: BookingId,
    pub payload_json: String,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}
