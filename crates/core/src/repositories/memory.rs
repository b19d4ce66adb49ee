use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::calendar::{CalendarEvent, CalendarHold, HoldId, ManagerId};
use crate::domain::lead::{AttemptRecord, LeadId, NewAttempt};
use crate::domain::notification::OutboxMessage;
use crate::errors::RepositoryError;

use super::{AttemptStore, NotificationOutbox, ReservationStore};

#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: RwLock<HashMap<String, Vec<AttemptRecord>>>,
}

#[async_trait::async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn attempts_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AttemptRecord>, RepositoryError> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(&lead_id.0).cloned().unwrap_or_default())
    }

    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptRecord, RepositoryError> {
        let mut attempts = self.attempts.write().await;
        let history = attempts.entry(attempt.lead_id.0.clone()).or_default();
        let sequence = u32::try_from(history.len())
            .map_err(|_| RepositoryError::Storage("attempt history overflow".to_string()))?
            + 1;
        let record = attempt.into_record(sequence);
        history.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct InMemoryReservationStore {
    holds: RwLock<HashMap<String, CalendarHold>>,
    events: RwLock<Vec<CalendarEvent>>,
}

#[async_trait::async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn holds_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarHold>, RepositoryError> {
        let holds = self.holds.read().await;
        let mut found: Vec<CalendarHold> =
            holds.values().filter(|hold| &hold.manager_id == manager_id).cloned().collect();
        found.sort_by_key(|hold| hold.start);
        Ok(found)
    }

    async fn events_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarEvent>, RepositoryError> {
        let events = self.events.read().await;
        let mut found: Vec<CalendarEvent> =
            events.iter().filter(|event| &event.manager_id == manager_id).cloned().collect();
        found.sort_by_key(|event| event.start);
        Ok(found)
    }

    async fn find_hold(&self, hold_id: &HoldId) -> Result<Option<CalendarHold>, RepositoryError> {
        let holds = self.holds.read().await;
        Ok(holds.get(&hold_id.0).cloned())
    }

    async fn find_event_by_uid(
        &self,
        ical_uid: &str,
    ) -> Result<Option<CalendarEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().find(|event| event.ical_uid == ical_uid).cloned())
    }

    async fn insert_hold(&self, hold: CalendarHold) -> Result<(), RepositoryError> {
        let mut holds = self.holds.write().await;
        holds.insert(hold.id.0.clone(), hold);
        Ok(())
    }

    async fn remove_hold(&self, hold_id: &HoldId) -> Result<bool, RepositoryError> {
        let mut holds = self.holds.write().await;
        Ok(holds.remove(&hold_id.0).is_some())
    }

    async fn purge_expired_holds(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<HoldId>, RepositoryError> {
        let mut holds = self.holds.write().await;
        let expired: Vec<HoldId> = holds
            .values()
            .filter(|hold| &hold.manager_id == manager_id && hold.is_expired(now))
            .map(|hold| hold.id.clone())
            .collect();
        for hold_id in &expired {
            holds.remove(&hold_id.0);
        }
        Ok(expired)
    }

    async fn insert_event(&self, event: CalendarEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if events.iter().any(|existing| existing.ical_uid == event.ical_uid) {
            return Err(RepositoryError::Storage(format!(
                "event with ical uid `{}` already stored",
                event.ical_uid
            )));
        }
        events.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationOutbox {
    messages: RwLock<Vec<OutboxMessage>>,
}

#[async_trait::async_trait]
impl NotificationOutbox for InMemoryNotificationOutbox {
    async fn enqueue(&self, message: OutboxMessage) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|queued| queued.idempotency_key == message.idempotency_key) {
            return Ok(false);
        }
        messages.push(message);
        Ok(true)
    }

    async fn pending(&self) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.clone())
    }
}
