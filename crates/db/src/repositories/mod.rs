//! SQLite implementations of the booking core storage traits.
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision in UTC, so
//! lexicographic comparison in SQL matches chronological order.

use booker_core::chrono::{DateTime, SecondsFormat, Utc};
use booker_core::errors::RepositoryError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type};

pub mod attempt;
pub mod outbox;
pub mod reservation;

pub use attempt::SqlAttemptRepository;
pub use outbox::SqlNotificationOutbox;
pub use reservation::SqlReservationRepository;

pub(crate) fn storage(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(error.to_string())
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|database| database.is_unique_violation())
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|error| RepositoryError::Decode(format!("column `{name}`: {error}")))
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use booker_core::chrono::{DateTime, Utc};

    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp, parse_u32};
    use booker_core::chrono::{DateTime, Utc};

    #[test]
    fn timestamps_keep_milliseconds_and_sort_lexicographically() {
        let early = DateTime::parse_from_rfc3339("2026-03-04T09:00:00.250+01:00")
            .expect("valid")
            .with_timezone(&Utc);
        let late =
            DateTime::parse_from_rfc3339("2026-03-04T08:00:01Z").expect("valid").with_timezone(&Utc);

        let early_text = format_timestamp(early);
        assert_eq!(early_text, "2026-03-04T08:00:00.250Z");
        assert!(early_text < format_timestamp(late));
        assert_eq!(parse_timestamp("at", early_text).expect("parse"), early);
    }

    #[test]
    fn decode_failures_name_the_column() {
        let error = parse_timestamp("created_at", "yesterday".to_owned()).expect_err("invalid");
        assert!(error.to_string().contains("created_at"));
        assert!(parse_u32("ttl_secs", -1).is_err());
    }
}
