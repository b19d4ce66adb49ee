use tracing::debug;

use booker_core::audit::{AuditContext, AuditSink};
use booker_core::domain::conversation::{BookingIntent, CallContext};
use booker_core::flows::{
    ConversationEngine, ConversationStage, ConversationState, SignalExtractor, StateMachineInput,
};

use crate::signals::KeywordSignalExtractor;

/// One live call: owns the conversation state and runs extraction plus a pure
/// transition for every caller turn.
pub struct CallSession<X = KeywordSignalExtractor> {
    state: ConversationState,
    engine: ConversationEngine,
    extractor: X,
    turns: u32,
}

impl CallSession<KeywordSignalExtractor> {
    pub fn with_keywords(context: CallContext, engine: ConversationEngine) -> Self {
        Self::new(ConversationState::new(context), engine, KeywordSignalExtractor::default())
    }
}

impl<X> CallSession<X>
where
    X: SignalExtractor,
{
    /// Resumes from `state`, e.g. the one handed out when the call was opened.
    pub fn new(state: ConversationState, engine: ConversationEngine, extractor: X) -> Self {
        Self { state, engine, extractor, turns: 0 }
    }

    pub fn handle_turn(&mut self, input: StateMachineInput) -> &ConversationState {
        let input = self.extractor.enrich(&self.state, input);
        let next = self.engine.transition(&self.state, &input);
        self.commit(next, &input)
    }

    pub fn handle_turn_with_audit<S>(
        &mut self,
        input: StateMachineInput,
        sink: &S,
        audit: &AuditContext,
    ) -> &ConversationState
    where
        S: AuditSink + ?Sized,
    {
        let input = self.extractor.enrich(&self.state, input);
        let next = self.engine.apply_with_audit(&self.state, &input, sink, audit);
        self.commit(next, &input)
    }

    /// Free-text turn with nothing classified upstream.
    pub fn say(&mut self, text: &str) -> &ConversationState {
        self.handle_turn(StateMachineInput::utterance(text))
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn stage(&self) -> ConversationStage {
        self.state.stage
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn booking_intent(&self) -> Option<&BookingIntent> {
        self.state.booking_intent.as_ref()
    }

    pub fn into_state(self) -> ConversationState {
        self.state
    }

    fn commit(&mut self, next: ConversationState, input: &StateMachineInput) -> &ConversationState {
        self.turns = self.turns.saturating_add(1);
        if next.stage != self.state.stage {
            debug!(
                event_name = "conversation.stage_changed",
                call_id = %next.context.call_id.0,
                from = self.state.stage.as_str(),
                to = next.stage.as_str(),
                turn = self.turns,
                intent = ?input.intent,
                "conversation advanced"
            );
        }
        self.state = next;
        &self.state
    }
}
