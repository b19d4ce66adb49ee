use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::conversation::{
    BookingId, BookingIntent, BookingIntentRecord, BudgetIndicator, ConversationSlots,
    MandatoryLineUpdate, Need, Timing,
};
use crate::flows::states::{ConversationStage, ConversationState, IntentTag, StateMachineInput};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationPolicy {
    /// Lets a high-need lead with authority qualify while budget is still unknown.
    pub accept_unknown_budget_for_high_need: bool,
}

impl Default for QualificationPolicy {
    fn default() -> Self {
        Self { accept_unknown_budget_for_high_need: true }
    }
}

pub fn qualifies(slots: &ConversationSlots, policy: &QualificationPolicy) -> bool {
    let authority = slots.authority == Some(true);
    let need_met = match slots.need {
        Some(Need::High) => true,
        Some(Need::Medium) => slots.pain_stated == Some(true),
        Some(Need::Low) | None => false,
    };
    let timing_met = matches!(slots.timing, Some(Timing::ThisPeriod | Timing::NextPeriod));
    let budget_met = match slots.budget_indicator {
        Some(BudgetIndicator::Present) => true,
        Some(BudgetIndicator::Unknown) => {
            policy.accept_unknown_budget_for_high_need
                && authority
                && slots.need == Some(Need::High)
        }
        Some(BudgetIndicator::Absent) | None => false,
    };

    authority && need_met && timing_met && budget_met
}

#[derive(Clone, Debug, Default)]
pub struct ConversationEngine {
    policy: QualificationPolicy,
}

impl ConversationEngine {
    pub fn new(policy: QualificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QualificationPolicy {
        &self.policy
    }

    /// Advances at most one stage. Terminal states are returned unchanged; input that
    /// does not satisfy the current stage's gate leaves the stage where it is.
    pub fn transition(
        &self,
        state: &ConversationState,
        input: &StateMachineInput,
    ) -> ConversationState {
        use ConversationStage::{
            Confirm, ConsentGate, End, IdentifyContact, OptOut, ProposeTime, Qualify, Transfer,
            Voicemail,
        };

        let mut next = state.clone();
        if next.stage.is_terminal() {
            return next;
        }

        next.slots.merge(&input.slots);
        next.lines.apply(&input.lines.clone().or(intent_lines(input.intent)));

        if let Some(exit) = input.intent.and_then(IntentTag::exit_stage) {
            next.enter(exit);
            return next;
        }

        match next.stage {
            IdentifyContact => {
                if next.lines.identification && next.lines.purpose {
                    next.enter(ConsentGate);
                }
            }
            ConsentGate => {
                let recording_ok =
                    !next.context.recording_consent_required || next.lines.recording_consent;
                if next.lines.consent_to_proceed && recording_ok {
                    next.enter(Qualify);
                }
            }
            Qualify => {
                if input.intent == Some(IntentTag::Disqualify) {
                    next.enter(End);
                } else if qualifies(&next.slots, &self.policy) {
                    next.enter(ProposeTime);
                }
            }
            ProposeTime => {
                if let (Some(IntentTag::Confirm), Some(selected), true) =
                    (input.intent, input.selected_time, input.explicit_confirmation)
                {
                    next.slots.confirm_start(selected);
                    next.enter(Confirm);
                }
            }
            Confirm => {
                if input.explicit_confirmation {
                    if let Some(intent) = synthesize_intent(&next) {
                        next.booking_intent = Some(intent);
                        next.enter(End);
                    }
                }
            }
            End | OptOut | Transfer | Voicemail => {}
        }

        next
    }

    pub fn apply_with_audit<S>(
        &self,
        state: &ConversationState,
        input: &StateMachineInput,
        sink: &S,
        audit: &AuditContext,
    ) -> ConversationState
    where
        S: AuditSink + ?Sized,
    {
        let next = self.transition(state, input);
        let intent = input.intent.map(|tag| format!("{tag:?}")).unwrap_or_else(|| "none".into());

        if next.stage != state.stage {
            let mut event = AuditEvent::new(
                audit,
                "conversation.transition_applied",
                AuditCategory::Conversation,
                AuditOutcome::Success,
            )
            .with_metadata("from", state.stage.as_str())
            .with_metadata("to", next.stage.as_str())
            .with_metadata("intent", intent);
            if let Some(booking) = &next.booking_intent {
                event = event.with_metadata("booking_id", booking.booking_id().0.clone());
            }
            sink.emit(event);
        } else {
            sink.emit(
                AuditEvent::new(
                    audit,
                    "conversation.transition_held",
                    AuditCategory::Conversation,
                    AuditOutcome::Rejected,
                )
                .with_metadata("stage", state.stage.as_str())
                .with_metadata("intent", intent),
            );
        }
        next
    }
}

/// Pure transition under the default qualification policy.
pub fn transition(state: &ConversationState, input: &StateMachineInput) -> ConversationState {
    ConversationEngine::default().transition(state, input)
}

fn intent_lines(intent: Option<IntentTag>) -> MandatoryLineUpdate {
    match intent {
        Some(IntentTag::Identify) => MandatoryLineUpdate {
            identification: Some(true),
            purpose: Some(true),
            ..MandatoryLineUpdate::default()
        },
        Some(IntentTag::Consent) => {
            MandatoryLineUpdate { consent_to_proceed: Some(true), ..MandatoryLineUpdate::default() }
        }
        _ => MandatoryLineUpdate::default(),
    }
}

fn synthesize_intent(state: &ConversationState) -> Option<BookingIntent> {
    let (date, time) = state.slots.confirmed_date.zip(state.slots.confirmed_time)?;
    let start = date.and_time(time).and_utc();
    let booking_id = BookingId::derive(&state.context.call_id, &state.context.lead_id, start);

    BookingIntent::new(BookingIntentRecord {
        booking_id,
        lead_id: state.context.lead_id.clone(),
        confirmed_date: date,
        confirmed_time: time,
        qualification: state.slots.clone(),
        explicit_confirmation: true,
    })
    .ok()
}
