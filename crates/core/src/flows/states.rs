use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::{
    BookingIntent, CallContext, ConversationSlots, MandatoryLineUpdate, MandatoryLines,
    SlotUpdate,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    IdentifyContact,
    ConsentGate,
    Qualify,
    ProposeTime,
    Confirm,
    End,
    OptOut,
    Transfer,
    Voicemail,
}

impl ConversationStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::OptOut | Self::Transfer | Self::Voicemail)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentifyContact => "identify_contact",
            Self::ConsentGate => "consent_gate",
            Self::Qualify => "qualify",
            Self::ProposeTime => "propose_time",
            Self::Confirm => "confirm",
            Self::End => "end",
            Self::OptOut => "opt_out",
            Self::Transfer => "transfer",
            Self::Voicemail => "voicemail",
        }
    }
}

/// Coarse classification of one caller turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Identify,
    Consent,
    OptOut,
    Transfer,
    Voicemail,
    Confirm,
    Disqualify,
}

impl IntentTag {
    /// Terminal stage this intent exits to from any non-terminal stage, if any.
    pub fn exit_stage(self) -> Option<ConversationStage> {
        match self {
            Self::OptOut => Some(ConversationStage::OptOut),
            Self::Transfer => Some(ConversationStage::Transfer),
            Self::Voicemail => Some(ConversationStage::Voicemail),
            Self::Identify | Self::Consent | Self::Confirm | Self::Disqualify => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineInput {
    pub intent: Option<IntentTag>,
    pub text: String,
    pub slots: SlotUpdate,
    pub lines: MandatoryLineUpdate,
    pub explicit_confirmation: bool,
    pub selected_time: Option<DateTime<Utc>>,
}

impl StateMachineInput {
    pub fn utterance(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn intent(intent: IntentTag) -> Self {
        Self { intent: Some(intent), ..Self::default() }
    }

    pub fn with_slots(mut self, slots: SlotUpdate) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_lines(mut self, lines: MandatoryLineUpdate) -> Self {
        self.lines = lines;
        self
    }

    /// Marks the turn as an explicit, caller-stated confirmation of `selected_time`.
    pub fn confirming(mut self, selected_time: Option<DateTime<Utc>>) -> Self {
        self.explicit_confirmation = true;
        self.selected_time = selected_time.or(self.selected_time);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub stage: ConversationStage,
    pub slots: ConversationSlots,
    pub lines: MandatoryLines,
    pub context: CallContext,
    pub booking_intent: Option<BookingIntent>,
    pub history: Vec<ConversationStage>,
}

impl ConversationState {
    pub fn new(context: CallContext) -> Self {
        Self {
            stage: ConversationStage::IdentifyContact,
            slots: ConversationSlots::default(),
            lines: MandatoryLines::default(),
            context,
            booking_intent: None,
            history: vec![ConversationStage::IdentifyContact],
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    pub(crate) fn enter(&mut self, stage: ConversationStage) {
        if self.stage != stage {
            self.stage = stage;
            self.history.push(stage);
        }
    }
}
