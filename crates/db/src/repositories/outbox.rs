use booker_core::domain::conversation::BookingId;
use booker_core::domain::lead::LeadId;
use booker_core::domain::notification::{OutboxMessage, OutboxMessageId};
use booker_core::errors::RepositoryError;
use booker_core::repositories::NotificationOutbox;
use sqlx::sqlite::SqliteRow;

use super::{column, format_timestamp, parse_timestamp, storage};
use crate::DbPool;

pub struct SqlNotificationOutbox {
    pool: DbPool,
}

impl SqlNotificationOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationOutbox for SqlNotificationOutbox {
    async fn enqueue(&self, message: OutboxMessage) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO notification_outbox (id, idempotency_key, kind, lead_id, booking_id,
                                              payload_json, signature, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(idempotency_key) DO NOTHING",
        )
        .bind(&message.id.0)
        .bind(&message.idempotency_key)
        .bind(&message.kind)
        .bind(&message.lead_id.0)
        .bind(&message.booking_id.0)
        .bind(&message.payload_json)
        .bind(message.signature.as_deref())
        .bind(format_timestamp(message.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn pending(&self) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, idempotency_key, kind, lead_id, booking_id, payload_json, signature,
                    created_at
             FROM notification_outbox
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: &SqliteRow) -> Result<OutboxMessage, RepositoryError> {
    Ok(OutboxMessage {
        id: OutboxMessageId(column(row, "id")?),
        idempotency_key: column(row, "idempotency_key")?,
        kind: column(row, "kind")?,
        lead_id: LeadId(column(row, "lead_id")?),
        booking_id: BookingId(column(row, "booking_id")?),
        payload_json: column(row, "payload_json")?,
        signature: column(row, "signature")?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use booker_core::domain::conversation::BookingId;
    use booker_core::domain::lead::LeadId;
    use booker_core::domain::notification::{OutboxMessage, OutboxMessageId};
    use booker_core::repositories::NotificationOutbox;

    use super::SqlNotificationOutbox;
    use crate::repositories::test_support::{setup_pool, ts};

    fn message(id: &str, key: &str, created_at: &str) -> OutboxMessage {
        OutboxMessage {
            id: OutboxMessageId(id.to_owned()),
            idempotency_key: key.to_owned(),
            kind: "booking.confirmed".to_owned(),
            lead_id: LeadId("L-1".to_owned()),
            booking_id: BookingId("bk-1".to_owned()),
            payload_json: "{\"booking_id\":\"bk-1\"}".to_owned(),
            signature: Some("abc123".to_owned()),
            created_at: ts(created_at),
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_ignored() {
        let pool = setup_pool().await;
        let outbox = SqlNotificationOutbox::new(pool.clone());
        let first = message("msg-1", "uid-1@booker.local", "2026-03-04T10:00:00Z");

        assert!(outbox.enqueue(first.clone()).await.expect("enqueue"));
        assert!(!outbox
            .enqueue(message("msg-2", "uid-1@booker.local", "2026-03-04T10:01:00Z"))
            .await
            .expect("enqueue duplicate"));

        assert_eq!(outbox.pending().await.expect("pending"), vec![first]);
        pool.close().await;
    }

    #[tokio::test]
    async fn pending_is_ordered_by_creation_time() {
        let pool = setup_pool().await;
        let outbox = SqlNotificationOutbox::new(pool.clone());
        let later = message("msg-b", "uid-b", "2026-03-04T11:00:00Z");
        let mut earlier = message("msg-a", "uid-a", "2026-03-04T09:00:00Z");
        earlier.signature = None;

        outbox.enqueue(later.clone()).await.expect("enqueue");
        outbox.enqueue(earlier.clone()).await.expect("enqueue");

        assert_eq!(outbox.pending().await.expect("pending"), vec![earlier, later]);
        pool.close().await;
    }
}
