//! Per-manager reservation timelines: availability grids, buffered temporary holds, and
//! idempotent promotion of a hold into a confirmed event.
//!
//! Expired holds are purged lazily at the start of every operation that touches a
//! manager, inside the same per-manager critical section.

pub mod conflict;
pub mod uid;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::calendar::{
    AvailabilitySlot, CalendarEvent, CalendarHold, EventConfirmation, EventId, EventRequest,
    HoldId, ManagerId, TimeWindow,
};
use crate::errors::{ApplicationError, DomainError, RepositoryError};
use crate::locks::KeyedLocks;
use crate::repositories::ReservationStore;

use self::conflict::{conflicts_with_any, slot_grid, Interval};
use self::uid::{derive_ical_uid, meeting_url_for};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("hold ttl of {ttl_secs}s is outside the allowed range")]
    InvalidTtl { ttl_secs: u32 },
    #[error("reservation must end after it starts")]
    InvalidInterval,
    #[error("requested interval overlaps an existing reservation for manager `{manager_id}`")]
    Overlap { manager_id: ManagerId },
    #[error("hold `{0}` does not exist")]
    UnknownHold(HoldId),
    #[error("ical uid `{ical_uid}` is already used by a different booking or interval")]
    UidMismatch { ical_uid: String },
}

impl ReservationError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidTtl { .. } => "invalid_ttl",
            Self::InvalidInterval => "invalid_interval",
            Self::Overlap { .. } => "overlap",
            Self::UnknownHold(_) => "unknown_hold",
            Self::UidMismatch { .. } => "uid_mismatch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationPolicy {
    pub slot_length: Duration,
    pub buffer: Duration,
    pub min_hold_ttl_secs: u32,
    pub max_hold_ttl_secs: u32,
    /// How far a hold's start may drift from an event's start and still be promoted.
    pub hold_match_tolerance: Duration,
    pub conference_base_url: String,
    pub uid_domain: String,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            slot_length: Duration::minutes(30),
            buffer: Duration::minutes(10),
            min_hold_ttl_secs: 300,
            max_hold_ttl_secs: 1800,
            hold_match_tolerance: Duration::seconds(60),
            conference_base_url: "https://meet.booker.local".to_string(),
            uid_domain: "booker.local".to_string(),
        }
    }
}

pub struct ReservationEngine<S: ?Sized> {
    store: Arc<S>,
    policy: ReservationPolicy,
    locks: KeyedLocks,
}

impl<S> ReservationEngine<S>
where
    S: ReservationStore + ?Sized,
{
    pub fn new(store: Arc<S>, policy: ReservationPolicy) -> Self {
        Self { store, policy, locks: KeyedLocks::default() }
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    pub async fn get_availability(
        &self,
        manager_id: &ManagerId,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilitySlot>, RepositoryError> {
        let _guard = self.locks.acquire(&manager_id.0).await;
        let reserved = self.live_reservations(manager_id, now).await?;

        Ok(slot_grid(window, self.policy.slot_length)
            .into_iter()
            .map(|slot| AvailabilitySlot {
                manager_id: manager_id.clone(),
                start: slot.start,
                end: slot.end,
                available: !conflicts_with_any(
                    slot,
                    reserved.iter().copied(),
                    self.policy.buffer,
                ),
            })
            .collect())
    }

    pub async fn place_hold(
        &self,
        manager_id: &ManagerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ttl_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<HoldId, ApplicationError> {
        if ttl_secs < self.policy.min_hold_ttl_secs || ttl_secs > self.policy.max_hold_ttl_secs {
            return Err(ReservationError::InvalidTtl { ttl_secs }.into());
        }
        if end <= start {
            return Err(ReservationError::InvalidInterval.into());
        }

        let _guard = self.locks.acquire(&manager_id.0).await;
        let reserved = self.live_reservations(manager_id, now).await?;
        if conflicts_with_any(Interval::new(start, end), reserved, self.policy.buffer) {
            debug!(
                event_name = "calendar.hold_rejected",
                manager_id = %manager_id,
                start = %start,
                reason = "overlap",
                "hold overlaps existing reservation"
            );
            return Err(ReservationError::Overlap { manager_id: manager_id.clone() }.into());
        }

        let hold = CalendarHold {
            id: HoldId(format!("hold_{}", Uuid::new_v4().simple())),
            manager_id: manager_id.clone(),
            start,
            end,
            ttl_secs,
            created_at: now,
        };
        let hold_id = hold.id.clone();
        self.store.insert_hold(hold).await?;

        info!(
            event_name = "calendar.hold_placed",
            manager_id = %manager_id,
            hold_id = %hold_id,
            start = %start,
            ttl_secs,
            "temporary hold placed"
        );
        Ok(hold_id)
    }

    /// Confirms a reservation. Replaying a request whose UID is already stored returns
    /// the stored confirmation unchanged.
    pub async fn create_event(
        &self,
        request: EventRequest,
        now: DateTime<Utc>,
    ) -> Result<EventConfirmation, ApplicationError> {
        if request.end <= request.start {
            return Err(ReservationError::InvalidInterval.into());
        }

        let ical_uid = request
            .ical_uid
            .clone()
            .filter(|uid| !uid.trim().is_empty())
            .unwrap_or_else(|| {
                derive_ical_uid(&request.booking_id, request.start, &self.policy.uid_domain)
            });

        let _guard = self.locks.acquire(&request.manager_id.0).await;
        self.purge_expired(&request.manager_id, now).await?;

        if let Some(existing) = self.store.find_event_by_uid(&ical_uid).await? {
            if existing.manager_id != request.manager_id {
                return Err(DomainError::InvariantViolation(format!(
                    "ical uid `{ical_uid}` already belongs to manager `{}`",
                    existing.manager_id
                ))
                .into());
            }
            if !existing.is_replay_of(&request) {
                return Err(ReservationError::UidMismatch { ical_uid }.into());
            }
            debug!(
                event_name = "calendar.event_replayed",
                manager_id = %existing.manager_id,
                ical_uid = %existing.ical_uid,
                "event already exists for uid"
            );
            return Ok(EventConfirmation::from(&existing));
        }

        let holds = self.store.holds_for_manager(&request.manager_id).await?;
        let promoted =
            holds.iter().find(|hold| self.promotes(hold, &request)).map(|hold| hold.id.clone());
        let events = self.store.events_for_manager(&request.manager_id).await?;

        let reserved = events.iter().map(Interval::from).chain(
            holds
                .iter()
                .filter(|hold| Some(&hold.id) != promoted.as_ref())
                .map(Interval::from),
        );
        let candidate = Interval::new(request.start, request.end);
        if conflicts_with_any(candidate, reserved, self.policy.buffer) {
            return Err(ReservationError::Overlap { manager_id: request.manager_id.clone() }.into());
        }

        let event = CalendarEvent {
            id: EventId(format!("evt_{}", Uuid::new_v4().simple())),
            manager_id: request.manager_id.clone(),
            booking_id: request.booking_id,
            start: request.start,
            end: request.end,
            invitees: request.invitees,
            meeting_url: meeting_url_for(&self.policy.conference_base_url, &ical_uid),
            ical_uid,
            created_at: now,
        };
        let confirmation = EventConfirmation::from(&event);
        self.store.insert_event(event).await?;
        if let Some(hold_id) = &promoted {
            self.store.remove_hold(hold_id).await?;
        }

        info!(
            event_name = "calendar.event_created",
            manager_id = %request.manager_id,
            ical_uid = %confirmation.ical_uid,
            promoted_hold = promoted.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            "calendar event created"
        );
        Ok(confirmation)
    }

    /// Drops a hold before its TTL runs out, e.g. when the caller hangs up.
    pub async fn release_hold(
        &self,
        hold_id: &HoldId,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let Some(hold) = self.store.find_hold(hold_id).await? else {
            return Err(ReservationError::UnknownHold(hold_id.clone()).into());
        };

        let _guard = self.locks.acquire(&hold.manager_id.0).await;
        let purged = self.purge_expired(&hold.manager_id, now).await?;
        if purged.contains(hold_id) || !self.store.remove_hold(hold_id).await? {
            return Err(ReservationError::UnknownHold(hold_id.clone()).into());
        }
        Ok(())
    }

    pub async fn events_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarEvent>, RepositoryError> {
        self.store.events_for_manager(manager_id).await
    }

    pub async fn live_holds(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CalendarHold>, RepositoryError> {
        let _guard = self.locks.acquire(&manager_id.0).await;
        self.purge_expired(manager_id, now).await?;
        self.store.holds_for_manager(manager_id).await
    }

    fn promotes(&self, hold: &CalendarHold, request: &EventRequest) -> bool {
        match &request.hold_id {
            Some(hold_id) => &hold.id == hold_id,
            None => {
                let drift = if hold.start > request.start {
                    hold.start - request.start
                } else {
                    request.start - hold.start
                };
                hold.manager_id == request.manager_id && drift <= self.policy.hold_match_tolerance
            }
        }
    }

    /// Caller must hold the manager's lock.
    async fn purge_expired(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<HoldId>, RepositoryError> {
        let purged = self.store.purge_expired_holds(manager_id, now).await?;
        if !purged.is_empty() {
            debug!(
                event_name = "calendar.holds_expired",
                manager_id = %manager_id,
                count = purged.len(),
                "expired holds purged"
            );
        }
        Ok(purged)
    }

    /// Caller must hold the manager's lock.
    async fn live_reservations(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Interval>, RepositoryError> {
        self.purge_expired(manager_id, now).await?;
        let holds = self.store.holds_for_manager(manager_id).await?;
        let events = self.store.events_for_manager(manager_id).await?;

        Ok(events.iter().map(Interval::from).chain(holds.iter().map(Interval::from)).collect())
    }
}
