use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Context};
use booker_agent::{CallSession, KeywordSignalExtractor};
use booker_core::audit::InMemoryAuditSink;
use booker_core::chrono::{DateTime, Duration, Utc};
use booker_core::config::{AppConfig, LoadOptions};
use booker_core::domain::calendar::ManagerId;
use booker_core::domain::conversation::{CallContext, CallId, ContactMetadata};
use booker_core::domain::lead::LeadId;
use booker_core::flows::{ConversationEngine, IntentTag, StateMachineInput};
use booker_core::repositories::{
    AttemptStore, InMemoryAttemptStore, InMemoryNotificationOutbox, InMemoryReservationStore,
    NotificationOutbox, ReservationStore,
};
use booker_core::scheduling::scheduler::iso_week_start;
use booker_core::{AttemptScheduler, BookingCoordinator, ReservationEngine};
use booker_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::CommandResult;

const SMOKE_REGION: &str = "eu-west";
const SMOKE_MANAGER: &str = "M-SMOKE";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(options.clone())) {
        Ok((elapsed_ms, config)) => {
            checks.push(pass(
                "config_validation",
                elapsed_ms,
                "configuration loaded and validated",
            ));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error.to_string()));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("booking_flow"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(fail(
                "db_connectivity",
                0,
                format!("failed to initialize async runtime: {error}"),
            ));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("booking_flow"));
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let db_started = Instant::now();
    match runtime.block_on(connect_with_config(&config.database)) {
        Ok(pool) => {
            checks.push(pass(
                "db_connectivity",
                elapsed_since(db_started),
                format!("connected using `{}`", config.database.url),
            ));

            let migration_started = Instant::now();
            let migration_result = runtime.block_on(migrations::run_pending(&pool));
            runtime.block_on(pool.close());
            checks.push(match migration_result {
                Ok(()) => pass(
                    "migration_visibility",
                    elapsed_since(migration_started),
                    "migrations are visible and executable",
                ),
                Err(error) => fail(
                    "migration_visibility",
                    elapsed_since(migration_started),
                    format!("migration execution failed: {error}"),
                ),
            });
        }
        Err(error) => {
            checks.push(fail(
                "db_connectivity",
                elapsed_since(db_started),
                format!("failed to connect: {error}"),
            ));
            checks.push(skipped("migration_visibility"));
        }
    }

    let flow_started = Instant::now();
    checks.push(match runtime.block_on(booking_flow(&config)) {
        Ok(message) => pass("booking_flow", elapsed_since(flow_started), message),
        Err(error) => fail("booking_flow", elapsed_since(flow_started), format!("{error:#}")),
    });

    finalize_report(checks, elapsed_since(started))
}

/// Scripted call against in-memory stores: scheduler gate, keyword-driven conversation,
/// booking and an idempotent replay of the same booking.
async fn booking_flow(config: &AppConfig) -> anyhow::Result<String> {
    let attempts: Arc<dyn AttemptStore> = Arc::new(InMemoryAttemptStore::default());
    let reservations: Arc<dyn ReservationStore> = Arc::new(InMemoryReservationStore::default());
    let outbox = Arc::new(InMemoryNotificationOutbox::default());
    let coordinator = BookingCoordinator::new(
        AttemptScheduler::new(attempts, config.window_calculator(), config.schedule_policy()),
        ConversationEngine::new(config.qualification_policy()),
        ReservationEngine::new(reservations, config.reservation_policy()),
        outbox.clone() as Arc<dyn NotificationOutbox>,
        Arc::new(InMemoryAuditSink::default()),
        config.booking_settings(),
    );

    let now = smoke_clock();
    let context = CallContext {
        call_id: CallId("call-smoke".to_owned()),
        lead_id: LeadId("L-SMOKE".to_owned()),
        contact: ContactMetadata::default(),
        recording_consent_required: true,
    };
    let gate = coordinator
        .open_call(context, SMOKE_REGION, now, "smoke")
        .await
        .context("opening the call")?;
    let state = gate.state.context("scheduler blocked the smoke lead")?;

    let mut session = CallSession::new(
        state,
        coordinator.conversations().clone(),
        KeywordSignalExtractor::default(),
    );
    session.say("Yes, this is Sam speaking");
    session.say("Sure, go ahead, recording is fine");
    session.say("We are struggling with churn, it's urgent.");
    session.say("I make the call, we have budget approved and want it this quarter");
    session.handle_turn(
        StateMachineInput::intent(IntentTag::Confirm).confirming(Some(now + Duration::days(1))),
    );
    session.handle_turn(StateMachineInput::utterance("Yes, confirmed").confirming(None));

    let intent = session
        .booking_intent()
        .cloned()
        .with_context(|| format!("conversation stopped at `{}`", session.stage().as_str()))?;

    let manager = ManagerId(SMOKE_MANAGER.to_owned());
    let invitees = vec!["lead@example.com".to_owned()];
    let receipt = coordinator
        .book(&intent, &manager, invitees.clone(), now, "smoke")
        .await
        .context("booking the confirmed slot")?;
    let replay = coordinator
        .book(&intent, &manager, invitees, now + Duration::minutes(1), "smoke-replay")
        .await
        .context("replaying the booking")?;

    ensure!(replay.event == receipt.event, "replayed booking produced a different event");
    ensure!(!replay.outbox_enqueued, "replayed booking queued a second notification");
    let pending = outbox.pending().await.context("reading the outbox")?;
    ensure!(pending.len() == 1, "expected one queued notification, found {}", pending.len());

    Ok(format!(
        "booked {} in {} turns; uid {}",
        receipt.booking_id.0,
        session.turns(),
        receipt.event.ical_uid
    ))
}

/// Monday 10:00 UTC of the current ISO week, inside the smoke region's window.
fn smoke_clock() -> DateTime<Utc> {
    iso_week_start(Utc::now()) + Duration::hours(10)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let output = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output }
}
