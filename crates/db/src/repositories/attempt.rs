use booker_core::domain::lead::{AttemptOutcome, AttemptRecord, LeadId, NewAttempt};
use booker_core::errors::RepositoryError;
use booker_core::repositories::AttemptStore;
use sqlx::sqlite::SqliteRow;

use super::{column, format_timestamp, parse_timestamp, parse_u32, storage};
use crate::DbPool;

pub struct SqlAttemptRepository {
    pool: DbPool,
}

impl SqlAttemptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttemptStore for SqlAttemptRepository {
    async fn attempts_for_lead(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AttemptRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT lead_id, sequence, attempt_no, attempted_at, outcome, region
             FROM attempt
             WHERE lead_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(attempt_from_row).collect()
    }

    async fn append_attempt(&self, attempt: NewAttempt) -> Result<AttemptRecord, RepositoryError> {
        // One statement, so the sequence read and the insert share SQLite's write lock.
        let sequence = sqlx::query_scalar::<_, i64>(
            "INSERT INTO attempt (lead_id, sequence, attempt_no, attempted_at, outcome, region)
             SELECT ?, COALESCE(MAX(sequence), 0) + 1, ?, ?, ?, ?
             FROM attempt
             WHERE lead_id = ?
             RETURNING sequence",
        )
        .bind(&attempt.lead_id.0)
        .bind(i64::from(attempt.attempt_no))
        .bind(format_timestamp(attempt.attempted_at))
        .bind(attempt.outcome.as_str())
        .bind(attempt.region.as_deref())
        .bind(&attempt.lead_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Ok(attempt.into_record(parse_u32("sequence", sequence)?))
    }
}

fn attempt_from_row(row: &SqliteRow) -> Result<AttemptRecord, RepositoryError> {
    let outcome_raw: String = column(row, "outcome")?;
    let outcome = AttemptOutcome::parse(&outcome_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown attempt outcome `{outcome_raw}`"))
    })?;

    Ok(AttemptRecord {
        lead_id: LeadId(column(row, "lead_id")?),
        sequence: parse_u32("sequence", column(row, "sequence")?)?,
        attempt_no: parse_u32("attempt_no", column(row, "attempt_no")?)?,
        attempted_at: parse_timestamp("attempted_at", column(row, "attempted_at")?)?,
        outcome,
        region: column(row, "region")?,
    })
}
