use std::sync::Arc;

use booker_core::audit::InMemoryAuditSink;
use booker_core::chrono::{DateTime, Utc};
use booker_core::domain::calendar::ManagerId;
use booker_core::domain::conversation::{
    BudgetIndicator, CallContext, CallId, ContactMetadata, Need, SlotUpdate, Timing,
};
use booker_core::domain::lead::{AttemptOutcome, LeadId, NewAttempt};
use booker_core::flows::{ConversationEngine, ConversationStage, IntentTag, StateMachineInput};
use booker_core::repositories::{AttemptStore, NotificationOutbox, ReservationStore};
use booker_core::scheduling::{AttemptScheduler, BlockReason, SchedulePolicy, WindowCalculator};
use booker_core::{BookingCoordinator, BookingSettings, ReservationEngine, ReservationPolicy};
use booker_db::{
    connect_with_settings, migrations, DbPool, SqlAttemptRepository, SqlNotificationOutbox,
    SqlReservationRepository,
};

fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}

async fn open(url: &str) -> DbPool {
    let pool = connect_with_settings(url, 2, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    pool
}

fn coordinator(pool: &DbPool, audit: &InMemoryAuditSink) -> BookingCoordinator {
    let attempts: Arc<dyn AttemptStore> = Arc::new(SqlAttemptRepository::new(pool.clone()));
    let reservations: Arc<dyn ReservationStore> =
        Arc::new(SqlReservationRepository::new(pool.clone()));
    let outbox: Arc<dyn NotificationOutbox> = Arc::new(SqlNotificationOutbox::new(pool.clone()));

    BookingCoordinator::new(
        AttemptScheduler::new(attempts, WindowCalculator::builtin(), SchedulePolicy::default()),
        ConversationEngine::default(),
        ReservationEngine::new(reservations, ReservationPolicy::default()),
        outbox,
        Arc::new(audit.clone()),
        BookingSettings::default(),
    )
}

fn context(lead: &str) -> CallContext {
    CallContext {
        call_id: CallId(format!("call-{lead}")),
        lead_id: LeadId(lead.to_owned()),
        contact: ContactMetadata::default(),
        recording_consent_required: false,
    }
}

#[tokio::test]
async fn booking_survives_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("booker.db").display());
    let audit = InMemoryAuditSink::default();

    let pool = open(&url).await;
    let booker = coordinator(&pool, &audit);
    let gate = booker
        .open_call(context("L-1"), "eu-west", ts("2026-03-02T10:00:00Z"), "req-1")
        .await
        .expect("gate");
    let mut state = gate.state.expect("eligible");

    let turns = [
        StateMachineInput::intent(IntentTag::Identify),
        StateMachineInput::intent(IntentTag::Consent),
        StateMachineInput::default().with_slots(SlotUpdate {
            authority: Some(true),
            need: Some(Need::High),
            timing: Some(Timing::ThisPeriod),
            budget_indicator: Some(BudgetIndicator::Present),
            pain_stated: Some(true),
        }),
        StateMachineInput::intent(IntentTag::Confirm).confirming(Some(ts("2026-03-03T14:00:00Z"))),
        StateMachineInput::default().confirming(None),
    ];
    for turn in &turns {
        state = booker.advance(&state, turn, "req-1");
    }
    assert_eq!(state.stage, ConversationStage::End);
    let intent = state.booking_intent.expect("intent");

    let receipt = booker
        .book(
            &intent,
            &ManagerId("M-1".to_owned()),
            vec!["lead@example.com".to_owned()],
            ts("2026-03-02T10:05:00Z"),
            "req-1",
        )
        .await
        .expect("book");
    pool.close().await;

    let reopened = open(&url).await;
    let stored = SqlReservationRepository::new(reopened.clone())
        .find_event_by_uid(&receipt.event.ical_uid)
        .await
        .expect("load event")
        .expect("event persisted");
    assert_eq!(stored.booking_id, receipt.booking_id);
    assert_eq!(stored.start, ts("2026-03-03T14:00:00Z"));

    let pending = SqlNotificationOutbox::new(reopened.clone()).pending().await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].idempotency_key, receipt.event.ical_uid);

    let replay = coordinator(&reopened, &audit)
        .book(
            &intent,
            &ManagerId("M-1".to_owned()),
            vec!["lead@example.com".to_owned()],
            ts("2026-03-02T10:06:00Z"),
            "req-2",
        )
        .await
        .expect("replay");
    assert_eq!(replay.event, receipt.event);
    assert!(!replay.outbox_enqueued);
    reopened.close().await;
}

#[tokio::test]
async fn opted_out_lead_stays_blocked_across_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("attempts.db").display());

    let pool = open(&url).await;
    SqlAttemptRepository::new(pool.clone())
        .append_attempt(NewAttempt {
            lead_id: LeadId("L-2".to_owned()),
            attempt_no: 1,
            attempted_at: ts("2026-03-02T14:00:00Z"),
            outcome: AttemptOutcome::OptOut,
            region: None,
        })
        .await
        .expect("append");
    pool.close().await;

    let reopened = open(&url).await;
    let audit = InMemoryAuditSink::default();
    let gate = coordinator(&reopened, &audit)
        .open_call(context("L-2"), "us-east", ts("2026-03-09T15:00:00Z"), "req-3")
        .await
        .expect("gate");

    assert!(gate.state.is_none());
    assert_eq!(gate.schedule.block_reason, Some(BlockReason::OptedOut));
    assert!(audit.event_types().contains(&"call.blocked".to_owned()));
    reopened.close().await;
}
