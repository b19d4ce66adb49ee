//! Storage seams for the booking core. Engines only rely on key-scoped reads and
//! writes; callers serialise access per key through [`crate::locks::KeyedLocks`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::calendar::{CalendarEvent, CalendarHold, HoldId, ManagerId};
use crate::domain::lead::{AttemptRecord, LeadId, NewAttempt};
use crate::domain::notification::OutboxMessage;
use crate::errors::RepositoryError;

pub mod memory;

pub use memory::{InMemoryAttemptStore, InMemoryNotificationOutbox, InMemoryReservationStore};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Attempts for one lead ordered by sequence.
    async fn attempts_for_lead(&self, lead_id: &LeadId)
        -> Result<Vec<AttemptRecord>, RepositoryError>;

    /// Appends with the next gapless sequence number for the lead.
    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptRecord, RepositoryError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn holds_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarHold>, RepositoryError>;

    async fn events_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarEvent>, RepositoryError>;

    async fn find_hold(&self, hold_id: &HoldId) -> Result<Option<CalendarHold>, RepositoryError>;

    async fn find_event_by_uid(
        &self,
        ical_uid: &str,
    ) -> Result<Option<CalendarEvent>, RepositoryError>;

    async fn insert_hold(&self, hold: CalendarHold) -> Result<(), RepositoryError>;

    /// Returns whether a hold was removed.
    async fn remove_hold(&self, hold_id: &HoldId) -> Result<bool, RepositoryError>;

    /// Deletes holds of `manager_id` whose TTL elapsed at `now`, returning their ids.
    async fn purge_expired_holds(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<HoldId>, RepositoryError>;

    async fn insert_event(&self, event: CalendarEvent) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    /// Returns `false` when a message with the same idempotency key is already queued.
    async fn enqueue(&self, message: OutboxMessage) -> Result<bool, RepositoryError>;

    async fn pending(&self) -> Result<Vec<OutboxMessage>, RepositoryError>;
}
