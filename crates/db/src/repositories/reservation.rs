use booker_core::chrono::{DateTime, Utc};
use booker_core::domain::calendar::{CalendarEvent, CalendarHold, EventId, HoldId, ManagerId};
use booker_core::domain::conversation::BookingId;
use booker_core::errors::RepositoryError;
use booker_core::repositories::ReservationStore;
use sqlx::sqlite::SqliteRow;

use super::{column, format_timestamp, is_unique_violation, parse_timestamp, parse_u32, storage};
use crate::DbPool;

pub struct SqlReservationRepository {
    pool: DbPool,
}

impl SqlReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReservationStore for SqlReservationRepository {
    async fn holds_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarHold>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, manager_id, starts_at, ends_at, ttl_secs, created_at
             FROM calendar_hold
             WHERE manager_id = ?
             ORDER BY starts_at ASC, id ASC",
        )
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(hold_from_row).collect()
    }

    async fn events_for_manager(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<CalendarEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, manager_id, booking_id, starts_at, ends_at, invitees_json, ical_uid,
                    meeting_url, created_at
             FROM calendar_event
             WHERE manager_id = ?
             ORDER BY starts_at ASC, id ASC",
        )
        .bind(&manager_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn find_hold(&self, hold_id: &HoldId) -> Result<Option<CalendarHold>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, manager_id, starts_at, ends_at, ttl_secs, created_at
             FROM calendar_hold
             WHERE id = ?",
        )
        .bind(&hold_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(hold_from_row).transpose()
    }

    async fn find_event_by_uid(
        &self,
        ical_uid: &str,
    ) -> Result<Option<CalendarEvent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, manager_id, booking_id, starts_at, ends_at, invitees_json, ical_uid,
                    meeting_url, created_at
             FROM calendar_event
             WHERE ical_uid = ?",
        )
        .bind(ical_uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn insert_hold(&self, hold: CalendarHold) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO calendar_hold (id, manager_id, starts_at, ends_at, ttl_secs, created_at,
                                        expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&hold.id.0)
        .bind(&hold.manager_id.0)
        .bind(format_timestamp(hold.start))
        .bind(format_timestamp(hold.end))
        .bind(i64::from(hold.ttl_secs))
        .bind(format_timestamp(hold.created_at))
        .bind(format_timestamp(hold.expires_at()))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn remove_hold(&self, hold_id: &HoldId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM calendar_hold WHERE id = ?")
            .bind(&hold_id.0)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_holds(
        &self,
        manager_id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<HoldId>, RepositoryError> {
        let purged = sqlx::query_scalar::<_, String>(
            "DELETE FROM calendar_hold
             WHERE manager_id = ? AND expires_at <= ?
             RETURNING id",
        )
        .bind(&manager_id.0)
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(purged.into_iter().map(HoldId).collect())
    }

    async fn insert_event(&self, event: CalendarEvent) -> Result<(), RepositoryError> {
        let invitees_json = serde_json::to_string(&event.invitees)
            .map_err(|error| RepositoryError::Storage(format!("encode invitees: {error}")))?;

        sqlx::query(
            "INSERT INTO calendar_event (id, manager_id, booking_id, starts_at, ends_at,
                                         invitees_json, ical_uid, meeting_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id.0)
        .bind(&event.manager_id.0)
        .bind(&event.booking_id.0)
        .bind(format_timestamp(event.start))
        .bind(format_timestamp(event.end))
        .bind(invitees_json)
        .bind(&event.ical_uid)
        .bind(&event.meeting_url)
        .bind(format_timestamp(event.created_at))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Storage(format!("event uid `{}` already stored", event.ical_uid))
            } else {
                storage(error)
            }
        })?;

        Ok(())
    }
}

fn hold_from_row(row: &SqliteRow) -> Result<CalendarHold, RepositoryError> {
    Ok(CalendarHold {
        id: HoldId(column(row, "id")?),
        manager_id: ManagerId(column(row, "manager_id")?),
        start: parse_timestamp("starts_at", column(row, "starts_at")?)?,
        end: parse_timestamp("ends_at", column(row, "ends_at")?)?,
        ttl_secs: parse_u32("ttl_secs", column(row, "ttl_secs")?)?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<CalendarEvent, RepositoryError> {
    let invitees_json: String = column(row, "invitees_json")?;
    let invitees = serde_json::from_str(&invitees_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid `invitees_json`: {error}")))?;

    Ok(CalendarEvent {
        id: EventId(column(row, "id")?),
        manager_id: ManagerId(column(row, "manager_id")?),
        booking_id: BookingId(column(row, "booking_id")?),
        start: parse_timestamp("starts_at", column(row, "starts_at")?)?,
        end: parse_timestamp("ends_at", column(row, "ends_at")?)?,
        invitees,
        ical_uid: column(row, "ical_uid")?,
        meeting_url: column(row, "meeting_url")?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}
