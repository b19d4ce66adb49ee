//! Call-level orchestration: gate a call through the scheduler, run conversation turns,
//! and materialise a confirmed intent as a calendar event plus an outbox message.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::calendar::{ReservationEngine, ReservationError};
use crate::domain::calendar::{EventConfirmation, EventRequest, HoldId, ManagerId};
use crate::domain::conversation::{BookingId, BookingIntent, CallContext};
use crate::domain::notification::{OutboxMessage, OutboxMessageId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{ConversationEngine, ConversationState, StateMachineInput};
use crate::repositories::{AttemptStore, NotificationOutbox, ReservationStore};
use crate::scheduling::{AttemptScheduler, ScheduleResult};

type HmacSha256 = Hmac<Sha256>;

pub const BOOKING_CONFIRMED_KIND: &str = "booking.confirmed";

#[derive(Clone, Debug)]
pub struct BookingSettings {
    pub meeting_length: Duration,
    pub hold_ttl_secs: u32,
    pub signing_secret: Option<SecretString>,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self { meeting_length: Duration::minutes(30), hold_ttl_secs: 600, signing_secret: None }
    }
}

/// Result of asking whether a call may start. `state` is only present when the
/// scheduler allowed the attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallGate {
    pub schedule: ScheduleResult,
    pub voicemail_allowed: bool,
    pub state: Option<ConversationState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: BookingId,
    pub manager_id: ManagerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event: EventConfirmation,
    pub hold_id: Option<HoldId>,
    /// False when the outbox already held a message for this event.
    pub outbox_enqueued: bool,
}

pub struct BookingCoordinator {
    scheduler: AttemptScheduler<dyn AttemptStore>,
    conversations: ConversationEngine,
    reservations: ReservationEngine<dyn ReservationStore>,
    outbox: Arc<dyn NotificationOutbox>,
    audit: Arc<dyn AuditSink>,
    settings: BookingSettings,
}

impl BookingCoordinator {
    pub fn new(
        scheduler: AttemptScheduler<dyn AttemptStore>,
        conversations: ConversationEngine,
        reservations: ReservationEngine<dyn ReservationStore>,
        outbox: Arc<dyn NotificationOutbox>,
        audit: Arc<dyn AuditSink>,
        settings: BookingSettings,
    ) -> Self {
        Self { scheduler, conversations, reservations, outbox, audit, settings }
    }

    pub fn scheduler(&self) -> &AttemptScheduler<dyn AttemptStore> {
        &self.scheduler
    }

    pub fn reservations(&self) -> &ReservationEngine<dyn ReservationStore> {
        &self.reservations
    }

    pub fn conversations(&self) -> &ConversationEngine {
        &self.conversations
    }

    pub async fn open_call(
        &self,
        context: CallContext,
        region: &str,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<CallGate, ApplicationError> {
        let schedule = self.scheduler.schedule(&context.lead_id, region, now).await?;
        let audit = self.audit_context(&context, correlation_id);

        if !schedule.eligible {
            let reason = schedule.block_reason.map(|reason| reason.as_str()).unwrap_or("unknown");
            self.audit.emit(
                AuditEvent::new(
                    &audit,
                    "call.blocked",
                    AuditCategory::Scheduling,
                    AuditOutcome::Rejected,
                )
                .with_metadata("block_reason", reason)
                .with_metadata("attempt_no", schedule.attempt_no.to_string()),
            );
            return Ok(CallGate { schedule, voicemail_allowed: false, state: None });
        }

        let voicemail_allowed =
            schedule.attempt_no == self.scheduler.policy().voicemail_attempt_no;
        self.audit.emit(
            AuditEvent::new(&audit, "call.opened", AuditCategory::Scheduling, AuditOutcome::Success)
                .with_metadata("attempt_no", schedule.attempt_no.to_string())
                .with_metadata("voicemail_allowed", voicemail_allowed.to_string()),
        );
        info!(
            event_name = "call.opened",
            correlation_id,
            lead_id = %context.lead_id.0,
            call_id = %context.call_id.0,
            attempt_no = schedule.attempt_no,
            voicemail_allowed,
            "call opened"
        );

        Ok(CallGate { schedule, voicemail_allowed, state: Some(ConversationState::new(context)) })
    }

    pub fn advance(
        &self,
        state: &ConversationState,
        input: &StateMachineInput,
        correlation_id: &str,
    ) -> ConversationState {
        let audit = self.audit_context(&state.context, correlation_id);
        self.conversations.apply_with_audit(state, input, self.audit.as_ref(), &audit)
    }

    /// Holds the confirmed slot, promotes it to an event and queues the downstream
    /// notification. Safe to repeat for the same intent: the event is replayed and the
    /// outbox ignores the duplicate key.
    pub async fn book(
        &self,
        intent: &BookingIntent,
        manager_id: &ManagerId,
        invitees: Vec<String>,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<BookingReceipt, ApplicationError> {
        let audit = AuditContext::new(
            Some(intent.lead_id().clone()),
            None,
            correlation_id,
            "booking-coordinator",
        );
        let start = intent.confirmed_start();
        let end = start + self.settings.meeting_length;

        let hold_id = match self
            .reservations
            .place_hold(manager_id, start, end, self.settings.hold_ttl_secs, now)
            .await
        {
            Ok(hold_id) => Some(hold_id),
            // Either someone else's reservation or this booking's own event from an earlier
            // run; create_event tells the two apart.
            Err(ApplicationError::Domain(DomainError::Reservation(
                ReservationError::Overlap { .. },
            ))) => None,
            Err(error) => return Err(self.reject(&audit, error)),
        };

        let request = EventRequest {
            booking_id: intent.booking_id().clone(),
            manager_id: manager_id.clone(),
            start,
            end,
            invitees: invitees.clone(),
            ical_uid: None,
            hold_id: hold_id.clone(),
        };
        let event = match self.reservations.create_event(request, now).await {
            Ok(event) => event,
            Err(error) => {
                if let Some(hold_id) = &hold_id {
                    if let Err(release_error) = self.reservations.release_hold(hold_id, now).await
                    {
                        warn!(
                            event_name = "booking.hold_release_failed",
                            correlation_id,
                            hold_id = %hold_id,
                            error = %release_error,
                            "could not release hold after failed booking"
                        );
                    }
                }
                return Err(self.reject(&audit, error));
            }
        };

        let message = self.outbox_message(intent, manager_id, start, end, &event, &invitees, now)?;
        let outbox_enqueued = self.outbox.enqueue(message).await?;

        self.audit.emit(
            AuditEvent::new(
                &audit,
                "booking.completed",
                AuditCategory::Calendar,
                AuditOutcome::Success,
            )
            .with_metadata("booking_id", intent.booking_id().0.clone())
            .with_metadata("manager_id", manager_id.0.clone())
            .with_metadata("ical_uid", event.ical_uid.clone())
            .with_metadata("outbox_enqueued", outbox_enqueued.to_string()),
        );
        info!(
            event_name = "booking.completed",
            correlation_id,
            booking_id = %intent.booking_id().0,
            manager_id = %manager_id,
            ical_uid = %event.ical_uid,
            outbox_enqueued,
            "booking completed"
        );

        Ok(BookingReceipt {
            booking_id: intent.booking_id().clone(),
            manager_id: manager_id.clone(),
            start,
            end,
            event,
            hold_id,
            outbox_enqueued,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn outbox_message(
        &self,
        intent: &BookingIntent,
        manager_id: &ManagerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event: &EventConfirmation,
        invitees: &[String],
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage, ApplicationError> {
        let payload = serde_json::json!({
            "booking_id": intent.booking_id().0,
            "lead_id": intent.lead_id().0,
            "manager_id": manager_id.0,
            "start": start.to_rfc3339_opts(SecondsFormat::Millis, true),
            "end": end.to_rfc3339_opts(SecondsFormat::Millis, true),
            "event_id": event.event_id.0,
            "ical_uid": event.ical_uid,
            "meeting_url": event.meeting_url,
            "invitees": invitees,
            "qualification": intent.qualification(),
        });
        let payload_json = serde_json::to_string(&payload)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let signature = match &self.settings.signing_secret {
            Some(secret) => Some(sign_payload(secret, &payload_json)?),
            None => None,
        };

        Ok(OutboxMessage {
            id: OutboxMessageId(format!("obx_{}", Uuid::new_v4().simple())),
            idempotency_key: event.ical_uid.clone(),
            kind: BOOKING_CONFIRMED_KIND.to_owned(),
            lead_id: intent.lead_id().clone(),
            booking_id: intent.booking_id().clone(),
            payload_json,
            signature,
            created_at: now,
        })
    }

    fn reject(&self, audit: &AuditContext, error: ApplicationError) -> ApplicationError {
        let reason = match &error {
            ApplicationError::Domain(domain) => domain.reason_code(),
            ApplicationError::Persistence(_) => "persistence",
            ApplicationError::Integration(_) => "integration",
            ApplicationError::Configuration(_) => "configuration",
        };
        self.audit.emit(
            AuditEvent::new(
                audit,
                "booking.rejected",
                AuditCategory::Calendar,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason_code", reason),
        );
        warn!(
            event_name = "booking.rejected",
            correlation_id = %audit.correlation_id,
            reason_code = reason,
            "booking rejected"
        );
        error
    }

    fn audit_context(&self, context: &CallContext, correlation_id: &str) -> AuditContext {
        AuditContext::new(
            Some(context.lead_id.clone()),
            Some(context.call_id.0.clone()),
            correlation_id,
            "booking-coordinator",
        )
    }
}

/// Hex HMAC-SHA256 over the serialised payload, for receivers to verify origin.
pub fn sign_payload(secret: &SecretString, payload: &str) -> Result<String, ApplicationError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}
