//! `schedule` and `record-attempt`: the attempt scheduler over the configured database.

use std::sync::Arc;

use booker_core::chrono::{DateTime, Utc};
use booker_core::config::{AppConfig, LoadOptions};
use booker_core::domain::lead::{AttemptOutcome, LeadId, NewAttempt};
use booker_core::errors::RepositoryError;
use booker_core::repositories::AttemptStore;
use booker_core::scheduling::{AttemptScheduler, ScheduleResult};
use booker_db::{DbPool, SqlAttemptRepository};
use serde::Serialize;

use crate::commands::{application_failure, load_config, open_pool, runtime, CommandResult};

#[derive(Debug, Serialize)]
struct ScheduleReport {
    lead_id: String,
    region: String,
    known_region: bool,
    evaluated_at: DateTime<Utc>,
    voicemail_allowed: bool,
    #[serde(flatten)]
    result: ScheduleResult,
}

pub fn schedule(
    options: &LoadOptions,
    lead_id: &str,
    region: &str,
    at: Option<DateTime<Utc>>,
) -> CommandResult {
    let config = match load_config("schedule", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("schedule") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let now = at.unwrap_or_else(Utc::now);
    let lead_id = LeadId(lead_id.to_owned());

    runtime.block_on(async {
        let pool = match open_pool("schedule", &config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };
        let scheduler = scheduler(&config, &pool);

        let outcome = async {
            let result = scheduler.schedule(&lead_id, region, now).await?;
            let voicemail_allowed = scheduler.is_voicemail_allowed(&lead_id, now).await?;
            Ok::<_, RepositoryError>(ScheduleReport {
                lead_id: lead_id.0.clone(),
                region: region.to_owned(),
                known_region: scheduler.windows().is_known_region(region),
                evaluated_at: now,
                voicemail_allowed,
                result,
            })
        }
        .await;
        pool.close().await;

        match outcome {
            Ok(report) => {
                let message = match report.result.block_reason {
                    Some(reason) => format!("attempt blocked: {}", reason.as_str()),
                    None => format!("attempt {} may proceed", report.result.attempt_no),
                };
                CommandResult::success_with("schedule", message, Some(report))
            }
            Err(error) => application_failure("schedule", error.into()),
        }
    })
}

pub fn record(
    options: &LoadOptions,
    lead_id: &str,
    attempt_no: u32,
    outcome: &str,
    region: Option<String>,
    at: Option<DateTime<Utc>>,
) -> CommandResult {
    let Some(outcome) = AttemptOutcome::parse(outcome) else {
        return CommandResult::failure(
            "record-attempt",
            "invalid_argument",
            format!(
                "unknown outcome `{outcome}` (expected answered, no_answer, busy, voicemail, \
                 failed or opt_out)"
            ),
            2,
        );
    };
    let config = match load_config("record-attempt", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("record-attempt") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let attempt = NewAttempt {
        lead_id: LeadId(lead_id.to_owned()),
        attempt_no,
        attempted_at: at.unwrap_or_else(Utc::now),
        outcome,
        region,
    };

    runtime.block_on(async {
        let pool = match open_pool("record-attempt", &config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };
        let recorded = scheduler(&config, &pool).record_attempt(attempt).await;
        pool.close().await;

        match recorded {
            Ok(record) => CommandResult::success_with(
                "record-attempt",
                format!("recorded attempt {} as sequence {}", record.attempt_no, record.sequence),
                Some(record),
            ),
            Err(error) => application_failure("record-attempt", error),
        }
    })
}

fn scheduler(config: &AppConfig, pool: &DbPool) -> AttemptScheduler<dyn AttemptStore> {
    let store: Arc<dyn AttemptStore> = Arc::new(SqlAttemptRepository::new(pool.clone()));
    AttemptScheduler::new(store, config.window_calculator(), config.schedule_policy())
}
