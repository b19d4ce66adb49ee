use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::lead::{AttemptOutcome, AttemptRecord, LeadId, NewAttempt};
use crate::errors::{ApplicationError, RepositoryError};
use crate::locks::KeyedLocks;
use crate::repositories::AttemptStore;
use crate::scheduling::window::{RegionWindow, WindowCalculator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub weekly_attempt_cap: u32,
    pub min_spacing: Duration,
    pub busy_retry_after: Duration,
    pub voicemail_attempt_no: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            weekly_attempt_cap: 3,
            min_spacing: Duration::hours(24),
            busy_retry_after: Duration::minutes(15),
            voicemail_attempt_no: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    OptedOut,
    WeeklyLimitExceeded,
    InsufficientSpacing,
    OutsideTimeWindow,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OptedOut => "OPTED_OUT",
            Self::WeeklyLimitExceeded => "WEEKLY_LIMIT_EXCEEDED",
            Self::InsufficientSpacing => "INSUFFICIENT_SPACING",
            Self::OutsideTimeWindow => "OUTSIDE_TIME_WINDOW",
        }
    }
}

/// Outcome of a scheduling check. A block is a normal result, not an error; blocked
/// results still report the attempt number the next contact would use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub eligible: bool,
    pub attempt_no: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_ts: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ts: Option<DateTime<Utc>>,
}

impl ScheduleResult {
    fn eligible(attempt_no: u32) -> Self {
        Self {
            eligible: true,
            attempt_no,
            block_reason: None,
            next_attempt_ts: None,
            retry_after_ts: None,
        }
    }

    fn blocked(
        attempt_no: u32,
        block_reason: BlockReason,
        next_attempt_ts: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            eligible: false,
            attempt_no,
            block_reason: Some(block_reason),
            next_attempt_ts,
            retry_after_ts: None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("attempt {received} for lead `{lead_id}` is out of order (expected {expected})")]
    NonSequentialAttempt { lead_id: String, expected: String, received: u32 },
}

/// Most recent attempt by store sequence.
pub fn latest_attempt(history: &[AttemptRecord]) -> Option<&AttemptRecord> {
    history.iter().max_by_key(|record| record.sequence)
}

pub fn next_attempt_no(history: &[AttemptRecord]) -> u32 {
    history.iter().map(|record| record.attempt_no).max().unwrap_or(0) + 1
}

/// The attempt number a contact placed at `now` would carry: the busy attempt again
/// while its short retry is open, otherwise the next sequential number.
pub fn granted_attempt_no(
    policy: &SchedulePolicy,
    history: &[AttemptRecord],
    now: DateTime<Utc>,
) -> u32 {
    match latest_attempt(history) {
        Some(last)
            if last.outcome == AttemptOutcome::Busy
                && now - last.attempted_at < policy.busy_retry_after =>
        {
            last.attempt_no
        }
        _ => next_attempt_no(history),
    }
}

/// Monday 00:00 UTC of the ISO week containing `now`.
pub fn iso_week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = i64::from(now.weekday().num_days_from_monday());
    (now.date_naive() - Duration::days(days_from_monday)).and_time(NaiveTime::MIN).and_utc()
}

/// Distinct attempt numbers recorded inside `[week_start, week_start + 7d)`. A busy
/// retry reuses its attempt number and therefore does not count twice.
pub fn attempts_in_week(history: &[AttemptRecord], week_start: DateTime<Utc>) -> usize {
    let week_end = week_start + Duration::days(7);
    history
        .iter()
        .filter(|record| record.attempted_at >= week_start && record.attempted_at < week_end)
        .map(|record| record.attempt_no)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Applies the contact rules in order; the first rule that matches decides.
pub fn evaluate(
    policy: &SchedulePolicy,
    history: &[AttemptRecord],
    window: RegionWindow,
    now: DateTime<Utc>,
) -> ScheduleResult {
    let next_no = next_attempt_no(history);

    if history.iter().any(|record| record.outcome == AttemptOutcome::OptOut) {
        return ScheduleResult::blocked(next_no, BlockReason::OptedOut, None);
    }

    let week_start = iso_week_start(now);
    let cap = usize::try_from(policy.weekly_attempt_cap).unwrap_or(usize::MAX);
    if attempts_in_week(history, week_start) >= cap {
        let next_week = week_start + Duration::days(7);
        return ScheduleResult::blocked(
            next_no,
            BlockReason::WeeklyLimitExceeded,
            Some(window.advance_into(next_week)),
        );
    }

    if let Some(last) = latest_attempt(history) {
        let elapsed = now - last.attempted_at;

        if last.outcome == AttemptOutcome::Busy && elapsed < policy.busy_retry_after {
            return ScheduleResult {
                retry_after_ts: Some(last.attempted_at + policy.busy_retry_after),
                ..ScheduleResult::eligible(last.attempt_no)
            };
        }

        if elapsed < policy.min_spacing {
            return ScheduleResult::blocked(
                next_no,
                BlockReason::InsufficientSpacing,
                Some(window.advance_into(last.attempted_at + policy.min_spacing)),
            );
        }
    }

    if window.contains(now) {
        ScheduleResult::eligible(next_no)
    } else {
        ScheduleResult::blocked(
            next_no,
            BlockReason::OutsideTimeWindow,
            Some(window.next_start_after(now)),
        )
    }
}

/// A new attempt must continue the lead's numbering: `last + 1`, or `last` again when
/// the previous attempt hit a busy line.
pub fn validate_new_attempt(
    history: &[AttemptRecord],
    attempt: &NewAttempt,
) -> Result<(), AttemptError> {
    let (allowed, expected) = match latest_attempt(history) {
        None => (attempt.attempt_no == 1, "1".to_string()),
        Some(last) if last.outcome == AttemptOutcome::Busy => (
            attempt.attempt_no == last.attempt_no || attempt.attempt_no == last.attempt_no + 1,
            format!("{} or {}", last.attempt_no, last.attempt_no + 1),
        ),
        Some(last) => (attempt.attempt_no == last.attempt_no + 1, (last.attempt_no + 1).to_string()),
    };

    if allowed {
        Ok(())
    } else {
        Err(AttemptError::NonSequentialAttempt {
            lead_id: attempt.lead_id.0.clone(),
            expected,
            received: attempt.attempt_no,
        })
    }
}

/// Gatekeeper deciding whether a lead may be called now, backed by an append-only
/// attempt log.
pub struct AttemptScheduler<S: ?Sized> {
    store: Arc<S>,
    windows: WindowCalculator,
    policy: SchedulePolicy,
    locks: KeyedLocks,
}

impl<S> AttemptScheduler<S>
where
    S: AttemptStore + ?Sized,
{
    pub fn new(store: Arc<S>, windows: WindowCalculator, policy: SchedulePolicy) -> Self {
        Self { store, windows, policy, locks: KeyedLocks::default() }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn windows(&self) -> &WindowCalculator {
        &self.windows
    }

    pub async fn schedule(
        &self,
        lead_id: &LeadId,
        region: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduleResult, RepositoryError> {
        let _guard = self.locks.acquire(&lead_id.0).await;
        let history = self.store.attempts_for_lead(lead_id).await?;
        let result = evaluate(&self.policy, &history, self.windows.window_for(region), now);

        match result.block_reason {
            Some(reason) => debug!(
                event_name = "scheduler.blocked",
                lead_id = %lead_id.0,
                region,
                block_reason = reason.as_str(),
                attempt_no = result.attempt_no,
                "contact attempt blocked"
            ),
            None => debug!(
                event_name = "scheduler.eligible",
                lead_id = %lead_id.0,
                region,
                attempt_no = result.attempt_no,
                busy_retry = result.retry_after_ts.is_some(),
                "contact attempt allowed"
            ),
        }

        Ok(result)
    }

    pub async fn record_attempt(
        &self,
        attempt: NewAttempt,
    ) -> Result<AttemptRecord, ApplicationError> {
        let _guard = self.locks.acquire(&attempt.lead_id.0).await;
        let history = self.store.attempts_for_lead(&attempt.lead_id).await?;
        validate_new_attempt(&history, &attempt)?;

        let record = self.store.append_attempt(attempt).await?;
        info!(
            event_name = "scheduler.attempt_recorded",
            lead_id = %record.lead_id.0,
            attempt_no = record.attempt_no,
            sequence = record.sequence,
            outcome = record.outcome.as_str(),
            "contact attempt recorded"
        );
        Ok(record)
    }

    /// Voicemail may only be left on the second attempt. A busy retry keeps the
    /// attempt number of the busy call.
    pub async fn is_voicemail_allowed(
        &self,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let _guard = self.locks.acquire(&lead_id.0).await;
        let history = self.store.attempts_for_lead(lead_id).await?;
        Ok(granted_attempt_no(&self.policy, &history, now) == self.policy.voicemail_attempt_no)
    }

    pub async fn attempt_history(
        &self,
        lead_id: &LeadId,
    ) -> Result<Vec<AttemptRecord>, RepositoryError> {
        let _guard = self.locks.acquire(&lead_id.0).await;
        self.store.attempts_for_lead(lead_id).await
    }
}
