use crate::flows::states::{ConversationState, StateMachineInput};

/// Turns raw utterance text into structured signals ahead of [`transition`].
///
/// Implementations only fill what the caller left unset: an explicit intent, slot or
/// line value always wins, and `explicit_confirmation` is never inferred.
///
/// [`transition`]: crate::flows::transition
pub trait SignalExtractor: Send + Sync {
    fn enrich(&self, state: &ConversationState, input: StateMachineInput) -> StateMachineInput;
}

/// Leaves every input as supplied; for callers that already classify turns upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughExtractor;

impl SignalExtractor for PassthroughExtractor {
    fn enrich(&self, _state: &ConversationState, input: StateMachineInput) -> StateMachineInput {
        input
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::conversation::{CallContext, CallId, ContactMetadata};
    use crate::domain::lead::LeadId;
    use crate::flows::signals::{PassthroughExtractor, SignalExtractor};
    use crate::flows::states::{ConversationState, StateMachineInput};

    #[test]
    fn passthrough_keeps_input_untouched() {
        let state = ConversationState::new(CallContext {
            call_id: CallId("call-1".to_owned()),
            lead_id: LeadId("L-1".to_owned()),
            contact: ContactMetadata::default(),
            recording_consent_required: false,
        });
        let input = StateMachineInput::utterance("yes, this is Dana");

        assert_eq!(PassthroughExtractor.enrich(&state, input.clone()), input);
    }
}
