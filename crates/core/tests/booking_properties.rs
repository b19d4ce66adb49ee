use std::sync::Arc;

use booker_core::chrono::{DateTime, Duration, Utc};
use booker_core::domain::calendar::{EventRequest, ManagerId};
use booker_core::domain::conversation::{
    BookingId, BudgetIndicator, CallContext, CallId, ContactMetadata, Need, SlotUpdate, Timing,
};
use booker_core::flows::{
    qualifies, transition, ConversationStage, ConversationState, IntentTag, QualificationPolicy,
    StateMachineInput,
};
use booker_core::repositories::{InMemoryAttemptStore, InMemoryReservationStore};
use booker_core::{
    ApplicationError, AttemptOutcome, AttemptScheduler, BlockReason, ConversationSlots,
    DomainError, LeadId, NewAttempt, ReservationEngine, ReservationError, ReservationPolicy,
    SchedulePolicy, WindowCalculator,
};

fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}

fn lead() -> LeadId {
    LeadId("L-100".to_owned())
}

fn manager() -> ManagerId {
    ManagerId("M-100".to_owned())
}

fn scheduler() -> AttemptScheduler<InMemoryAttemptStore> {
    AttemptScheduler::new(
        Arc::new(InMemoryAttemptStore::default()),
        WindowCalculator::builtin(),
        SchedulePolicy::default(),
    )
}

fn reservations() -> ReservationEngine<InMemoryReservationStore> {
    ReservationEngine::new(
        Arc::new(InMemoryReservationStore::default()),
        ReservationPolicy::default(),
    )
}

async fn record(
    scheduler: &AttemptScheduler<InMemoryAttemptStore>,
    attempt_no: u32,
    at: &str,
    outcome: AttemptOutcome,
) {
    scheduler
        .record_attempt(NewAttempt {
            lead_id: lead(),
            attempt_no,
            attempted_at: ts(at),
            outcome,
            region: Some("us-east".to_owned()),
        })
        .await
        .expect("record attempt");
}

#[tokio::test]
async fn weekly_cap_counts_busy_retries_once() {
    let scheduler = scheduler();
    record(&scheduler, 1, "2026-03-02T14:00:00Z", AttemptOutcome::NoAnswer).await;
    record(&scheduler, 2, "2026-03-03T14:00:00Z", AttemptOutcome::Busy).await;

    let retry = scheduler.schedule(&lead(), "us-east", ts("2026-03-03T14:10:00Z")).await;
    let retry = retry.expect("schedule");
    assert!(retry.eligible);
    assert_eq!(retry.attempt_no, 2);
    assert_eq!(retry.retry_after_ts, Some(ts("2026-03-03T14:15:00Z")));

    record(&scheduler, 2, "2026-03-03T14:10:00Z", AttemptOutcome::NoAnswer).await;
    let third = scheduler.schedule(&lead(), "us-east", ts("2026-03-04T15:00:00Z")).await;
    assert!(third.expect("schedule").eligible, "busy retry must not consume the weekly cap");

    record(&scheduler, 3, "2026-03-04T15:00:00Z", AttemptOutcome::NoAnswer).await;
    let capped = scheduler
        .schedule(&lead(), "us-east", ts("2026-03-05T16:00:00Z"))
        .await
        .expect("schedule");
    assert!(!capped.eligible);
    assert_eq!(capped.block_reason, Some(BlockReason::WeeklyLimitExceeded));
    assert_eq!(capped.attempt_no, 4);
    assert_eq!(capped.next_attempt_ts, Some(ts("2026-03-09T13:00:00Z")));
}

#[tokio::test]
async fn voicemail_is_only_allowed_on_the_second_attempt() {
    let scheduler = scheduler();
    let lead_id = lead();
    let allowed = scheduler.is_voicemail_allowed(&lead_id, ts("2026-03-02T13:00:00Z"));
    assert!(!allowed.await.expect("check"));

    record(&scheduler, 1, "2026-03-02T14:00:00Z", AttemptOutcome::NoAnswer).await;
    let allowed = scheduler.is_voicemail_allowed(&lead_id, ts("2026-03-03T14:00:00Z"));
    assert!(allowed.await.expect("check"));

    record(&scheduler, 2, "2026-03-03T14:00:00Z", AttemptOutcome::Voicemail).await;
    let allowed = scheduler.is_voicemail_allowed(&lead_id, ts("2026-03-04T14:00:00Z"));
    assert!(!allowed.await.expect("check"));
}

#[tokio::test]
async fn event_uid_is_stable_across_independent_engines() {
    let request = EventRequest {
        booking_id: BookingId("bk-42".to_owned()),
        manager_id: manager(),
        start: ts("2026-03-04T15:00:00Z"),
        end: ts("2026-03-04T15:30:00Z"),
        invitees: vec!["lead@example.com".to_owned()],
        ical_uid: None,
        hold_id: None,
    };
    let now = ts("2026-03-04T09:00:00Z");

    let first = reservations().create_event(request.clone(), now).await.expect("create");
    let second = reservations().create_event(request, now).await.expect("create");

    assert_eq!(first.ical_uid, second.ical_uid);
    assert_ne!(first.event_id, second.event_id);
}

#[tokio::test]
async fn buffer_applies_symmetrically_around_events() {
    let engine = reservations();
    let now = ts("2026-03-04T09:00:00Z");
    engine
        .create_event(
            EventRequest {
                booking_id: BookingId("bk-1".to_owned()),
                manager_id: manager(),
                start: ts("2026-03-04T14:00:00Z"),
                end: ts("2026-03-04T14:30:00Z"),
                invitees: Vec::new(),
                ical_uid: None,
                hold_id: None,
            },
            now,
        )
        .await
        .expect("create");

    let cases = [
        ("2026-03-04T13:20:00Z", "2026-03-04T13:50:00Z", true),
        ("2026-03-04T13:21:00Z", "2026-03-04T13:51:00Z", false),
        ("2026-03-04T14:39:00Z", "2026-03-04T15:09:00Z", false),
        ("2026-03-04T14:40:00Z", "2026-03-04T15:10:00Z", true),
    ];
    for (start, end, accepted) in cases {
        let placed = hold_fits(&engine, start, end, now).await;
        assert_eq!(placed, accepted, "hold {start}..{end}");
    }
}

async fn hold_fits(
    engine: &ReservationEngine<InMemoryReservationStore>,
    start: &str,
    end: &str,
    now: DateTime<Utc>,
) -> bool {
    match engine.place_hold(&manager(), ts(start), ts(end), 300, now).await {
        Ok(hold_id) => {
            engine.release_hold(&hold_id, now).await.expect("release trial hold");
            true
        }
        Err(ApplicationError::Domain(DomainError::Reservation(ReservationError::Overlap {
            ..
        }))) => false,
        Err(other) => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_holds_admit_exactly_one() {
    let engine = Arc::new(reservations());
    let now = ts("2026-03-04T09:00:00Z");

    let tasks: Vec<_> = (0..16_i64)
        .map(|offset| {
            let engine = Arc::clone(&engine);
            let start = ts("2026-03-04T14:00:00Z") + Duration::minutes(offset);
            tokio::spawn(async move {
                engine.place_hold(&manager(), start, start + Duration::minutes(30), 600, now).await
            })
        })
        .collect();

    let mut placed = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_) => placed += 1,
            Err(ApplicationError::Domain(DomainError::Reservation(
                ReservationError::Overlap { .. },
            ))) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(engine.live_holds(&manager(), now).await.expect("holds").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_slot_create_one_event() {
    let engine = Arc::new(reservations());
    let now = ts("2026-03-04T09:00:00Z");
    let start = ts("2026-03-04T15:00:00Z");

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let request = EventRequest {
                    booking_id: BookingId(format!("bk-{n}")),
                    manager_id: manager(),
                    start,
                    end: start + Duration::minutes(30),
                    invitees: Vec::new(),
                    ical_uid: None,
                    hold_id: None,
                };
                engine.create_event(request, now).await
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.expect("join").is_ok() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(engine.events_for_manager(&manager()).await.expect("events").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_busy_attempts_keep_sequences_gapless() {
    let scheduler = Arc::new(scheduler());
    let busy_at = ts("2026-03-02T14:00:00Z");

    let tasks: Vec<_> = (0..12_i64)
        .map(|n| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .record_attempt(NewAttempt {
                        lead_id: lead(),
                        attempt_no: 1,
                        attempted_at: busy_at + Duration::seconds(n),
                        outcome: AttemptOutcome::Busy,
                        region: None,
                    })
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("busy repeat is accepted");
    }

    let mut sequences: Vec<u32> = scheduler
        .attempt_history(&lead())
        .await
        .expect("history")
        .iter()
        .map(|record| record.sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=12).collect::<Vec<u32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_attempts_accept_only_one() {
    let scheduler = Arc::new(scheduler());
    let at = ts("2026-03-02T14:00:00Z");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .record_attempt(NewAttempt {
                        lead_id: lead(),
                        attempt_no: 1,
                        attempted_at: at,
                        outcome: AttemptOutcome::NoAnswer,
                        region: None,
                    })
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(record) => {
                assert_eq!(record.sequence, 1);
                accepted += 1;
            }
            Err(ApplicationError::Domain(DomainError::Attempt(_))) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(accepted, 1);
}

#[test]
fn no_booking_without_explicit_confirmation() {
    let mut state = ConversationState::new(CallContext {
        call_id: CallId("call-100".to_owned()),
        lead_id: lead(),
        contact: ContactMetadata::default(),
        recording_consent_required: false,
    });
    for input in [
        StateMachineInput::intent(IntentTag::Identify),
        StateMachineInput::intent(IntentTag::Consent),
        StateMachineInput::default().with_slots(SlotUpdate {
            authority: Some(true),
            need: Some(Need::High),
            timing: Some(Timing::NextPeriod),
            budget_indicator: Some(BudgetIndicator::Present),
            pain_stated: None,
        }),
        StateMachineInput::intent(IntentTag::Confirm).confirming(Some(ts("2026-03-05T16:00:00Z"))),
    ] {
        state = transition(&state, &input);
    }
    assert_eq!(state.stage, ConversationStage::Confirm);

    let mut unconfirmed = StateMachineInput::intent(IntentTag::Confirm);
    unconfirmed.selected_time = Some(ts("2026-03-05T16:00:00Z"));
    let held = transition(&state, &unconfirmed);
    assert_eq!(held.stage, ConversationStage::Confirm);
    assert!(held.booking_intent.is_none());

    let booked = transition(&state, &StateMachineInput::default().confirming(None));
    assert_eq!(booked.stage, ConversationStage::End);
    assert_eq!(
        booked.booking_intent.map(|intent| intent.confirmed_start()),
        Some(ts("2026-03-05T16:00:00Z"))
    );
}

#[test]
fn medium_need_qualifies_only_with_stated_pain() {
    let policy = QualificationPolicy::default();
    let mut slots = ConversationSlots {
        authority: Some(true),
        need: Some(Need::Medium),
        timing: Some(Timing::ThisPeriod),
        budget_indicator: Some(BudgetIndicator::Present),
        pain_stated: Some(false),
        ..ConversationSlots::default()
    };
    assert!(!qualifies(&slots, &policy));

    slots.pain_stated = Some(true);
    assert!(qualifies(&slots, &policy));

    slots.budget_indicator = Some(BudgetIndicator::Unknown);
    assert!(!qualifies(&slots, &policy), "unknown budget only passes for high need");

    slots.need = Some(Need::High);
    assert!(qualifies(&slots, &policy));
    assert!(!qualifies(&slots, &QualificationPolicy { accept_unknown_budget_for_high_need: false }));
}

#[test]
fn every_open_stage_honours_opt_out() {
    let state = ConversationState::new(CallContext {
        call_id: CallId("call-101".to_owned()),
        lead_id: lead(),
        contact: ContactMetadata::default(),
        recording_consent_required: true,
    });
    let opted_out = transition(&state, &StateMachineInput::intent(IntentTag::OptOut));

    assert_eq!(opted_out.stage, ConversationStage::OptOut);
    assert!(opted_out.is_finished());
    assert_eq!(transition(&opted_out, &StateMachineInput::intent(IntentTag::Identify)), opted_out);
}

#[test]
fn booking_ids_do_not_depend_on_wall_clock() {
    let start = ts("2026-03-05T16:00:00Z");
    let first = BookingId::derive(&CallId("call-1".to_owned()), &lead(), start);
    let second = BookingId::derive(&CallId("call-1".to_owned()), &lead(), start);
    let later = start + Duration::minutes(30);
    let other_slot = BookingId::derive(&CallId("call-1".to_owned()), &lead(), later);

    assert_eq!(first, second);
    assert_ne!(first, other_slot);
}
