use serde::{Deserialize, Serialize};

use booker_core::domain::conversation::{
    BudgetIndicator, MandatoryLineUpdate, Need, SlotUpdate, Timing,
};
use booker_core::flows::{ConversationStage, ConversationState, IntentTag, StateMachineInput};
use booker_core::SignalExtractor;

/// Phrase lists driving [`KeywordSignalExtractor`]. Matching is case-insensitive
/// substring search over whitespace-normalised text; earlier lists win.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordLexicon {
    pub opt_out: Vec<String>,
    pub transfer: Vec<String>,
    pub voicemail: Vec<String>,
    pub identify: Vec<String>,
    pub consent: Vec<String>,
    pub disqualify: Vec<String>,
    pub accept_time: Vec<String>,
    pub recording_consent: Vec<String>,
    pub authority_denied: Vec<String>,
    pub authority_confirmed: Vec<String>,
    pub need_low: Vec<String>,
    pub need_high: Vec<String>,
    pub need_medium: Vec<String>,
    pub pain: Vec<String>,
    pub timing_this_period: Vec<String>,
    pub timing_next_period: Vec<String>,
    pub timing_later: Vec<String>,
    pub budget_absent: Vec<String>,
    pub budget_unknown: Vec<String>,
    pub budget_present: Vec<String>,
}

impl Default for KeywordLexicon {
    fn default() -> Self {
        Self {
            opt_out: phrases(&[
                "do not call",
                "don't call",
                "stop calling",
                "remove me",
                "take me off",
                "unsubscribe",
                "opt out",
            ]),
            transfer: phrases(&[
                "transfer me",
                "real person",
                "speak to a human",
                "talk to someone else",
                "operator",
            ]),
            voicemail: phrases(&[
                "leave a message",
                "after the tone",
                "after the beep",
                "voicemail",
                "not available to take your call",
            ]),
            identify: phrases(&["this is", "speaking", "my name is", "yes it is", "that's me"]),
            consent: phrases(&[
                "go ahead",
                "sure",
                "okay",
                "ok",
                "yes",
                "i have a minute",
                "that's fine",
            ]),
            disqualify: phrases(&[
                "not interested",
                "not a fit",
                "no interest",
                "we already have",
                "no need for",
            ]),
            accept_time: phrases(&[
                "works for me",
                "that works",
                "book it",
                "let's do",
                "sounds good",
            ]),
            recording_consent: phrases(&[
                "you can record",
                "recording is fine",
                "okay to record",
                "fine to record",
            ]),
            authority_denied: phrases(&[
                "not my decision",
                "not the decision maker",
                "need to ask my",
                "my boss decides",
                "i don't decide",
            ]),
            authority_confirmed: phrases(&[
                "i decide",
                "decision maker",
                "i make the call",
                "i sign off",
                "my decision",
                "i own the budget",
            ]),
            need_low: phrases(&["not a priority", "no real need", "we're fine", "we are fine"]),
            need_high: phrases(&["urgent", "critical", "top priority", "badly need", "must fix"]),
            need_medium: phrases(&["would be nice", "somewhat", "exploring", "nice to have"]),
            pain: phrases(&[
                "struggling",
                "problem",
                "pain",
                "frustrat",
                "losing",
                "too slow",
            ]),
            timing_this_period: phrases(&[
                "this quarter",
                "this month",
                "asap",
                "right away",
                "immediately",
            ]),
            timing_next_period: phrases(&["next quarter", "next month", "in a few weeks"]),
            timing_later: phrases(&["next year", "someday", "eventually", "not anytime soon"]),
            budget_absent: phrases(&["no budget", "can't afford", "cannot afford"]),
            budget_unknown: phrases(&[
                "not sure about budget",
                "budget unclear",
                "don't know the budget",
                "budget is tbd",
            ]),
            budget_present: phrases(&[
                "budget approved",
                "have budget",
                "have a budget",
                "budget allocated",
                "budget set aside",
            ]),
        }
    }
}

/// Best-effort keyword heuristics. Only fills what the caller left unset, never sets
/// `explicit_confirmation`, and never infers a selected time.
#[derive(Clone, Debug, Default)]
pub struct KeywordSignalExtractor {
    lexicon: KeywordLexicon,
}

impl KeywordSignalExtractor {
    pub fn new(lexicon: KeywordLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &KeywordLexicon {
        &self.lexicon
    }

    pub fn detect_intent(&self, stage: ConversationStage, text: &str) -> Option<IntentTag> {
        let text = normalize_text(text);
        if text.is_empty() {
            return None;
        }

        if contains_any(&text, &self.lexicon.opt_out) {
            return Some(IntentTag::OptOut);
        }
        if contains_any(&text, &self.lexicon.transfer) {
            return Some(IntentTag::Transfer);
        }
        if contains_any(&text, &self.lexicon.voicemail) {
            return Some(IntentTag::Voicemail);
        }

        let (phrases, intent) = match stage {
            ConversationStage::IdentifyContact => (&self.lexicon.identify, IntentTag::Identify),
            ConversationStage::ConsentGate => (&self.lexicon.consent, IntentTag::Consent),
            ConversationStage::Qualify => (&self.lexicon.disqualify, IntentTag::Disqualify),
            ConversationStage::ProposeTime => (&self.lexicon.accept_time, IntentTag::Confirm),
            _ => return None,
        };
        contains_any(&text, phrases).then_some(intent)
    }

    pub fn detect_slots(&self, text: &str) -> SlotUpdate {
        let text = normalize_text(text);
        let lexicon = &self.lexicon;

        let authority = if contains_any(&text, &lexicon.authority_denied) {
            Some(false)
        } else if contains_any(&text, &lexicon.authority_confirmed) {
            Some(true)
        } else {
            None
        };
        let need = if contains_any(&text, &lexicon.need_low) {
            Some(Need::Low)
        } else if contains_any(&text, &lexicon.need_high) {
            Some(Need::High)
        } else if contains_any(&text, &lexicon.need_medium) {
            Some(Need::Medium)
        } else {
            None
        };
        let timing = if contains_any(&text, &lexicon.timing_this_period) {
            Some(Timing::ThisPeriod)
        } else if contains_any(&text, &lexicon.timing_next_period) {
            Some(Timing::NextPeriod)
        } else if contains_any(&text, &lexicon.timing_later) {
            Some(Timing::Later)
        } else {
            None
        };
        let budget_indicator = if contains_any(&text, &lexicon.budget_absent) {
            Some(BudgetIndicator::Absent)
        } else if contains_any(&text, &lexicon.budget_unknown) {
            Some(BudgetIndicator::Unknown)
        } else if contains_any(&text, &lexicon.budget_present) {
            Some(BudgetIndicator::Present)
        } else {
            None
        };
        let pain_stated = contains_any(&text, &lexicon.pain).then_some(true);

        SlotUpdate { authority, need, timing, budget_indicator, pain_stated }
    }

    pub fn detect_lines(&self, text: &str) -> MandatoryLineUpdate {
        let text = normalize_text(text);
        MandatoryLineUpdate {
            recording_consent: contains_any(&text, &self.lexicon.recording_consent).then_some(true),
            ..MandatoryLineUpdate::default()
        }
    }
}

impl SignalExtractor for KeywordSignalExtractor {
    fn enrich(&self, state: &ConversationState, input: StateMachineInput) -> StateMachineInput {
        if input.text.trim().is_empty() || state.stage.is_terminal() {
            return input;
        }

        let intent = input.intent.or_else(|| self.detect_intent(state.stage, &input.text));
        let slots = input.slots.clone().or(self.detect_slots(&input.text));
        let lines = input.lines.clone().or(self.detect_lines(&input.text));

        StateMachineInput { intent, slots, lines, ..input }
    }
}

fn phrases(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    let padded = lowered
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '\'' { ch } else { ' ' })
        .collect::<String>();
    let words = padded.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        String::new()
    } else {
        format!(" {} ", words.join(" "))
    }
}

/// Phrases match on word boundaries so `ok` does not fire inside `book`.
fn contains_any(normalized_text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| {
        let phrase = normalize_text(phrase);
        !phrase.trim().is_empty() && normalized_text.contains(phrase.as_str())
    })
}

#[cfg(test)]
mod tests {
    use booker_core::domain::conversation::{
        BudgetIndicator, CallContext, CallId, ContactMetadata, MandatoryLineUpdate, Need,
        SlotUpdate, Timing,
    };
    use booker_core::flows::{ConversationStage, ConversationState, IntentTag, StateMachineInput};
    use booker_core::{LeadId, SignalExtractor};

    use super::{KeywordLexicon, KeywordSignalExtractor};

    fn state_at(stage: ConversationStage) -> ConversationState {
        let mut state = ConversationState::new(CallContext {
            call_id: CallId("call-1".to_owned()),
            lead_id: LeadId("L-1".to_owned()),
            contact: ContactMetadata::default(),
            recording_consent_required: false,
        });
        state.stage = stage;
        state
    }

    #[test]
    fn exit_phrases_win_in_every_stage() {
        let extractor = KeywordSignalExtractor::default();
        for stage in [ConversationStage::IdentifyContact, ConversationStage::ProposeTime] {
            assert_eq!(
                extractor.detect_intent(stage, "Please stop calling me."),
                Some(IntentTag::OptOut)
            );
            assert_eq!(
                extractor.detect_intent(stage, "Can I speak to a human?"),
                Some(IntentTag::Transfer)
            );
        }
        assert_eq!(
            extractor.detect_intent(
                ConversationStage::IdentifyContact,
                "Please leave a message after the tone"
            ),
            Some(IntentTag::Voicemail)
        );
    }

    #[test]
    fn intents_depend_on_stage() {
        let extractor = KeywordSignalExtractor::default();

        assert_eq!(
            extractor.detect_intent(ConversationStage::IdentifyContact, "Yes, this is Dana"),
            Some(IntentTag::Identify)
        );
        assert_eq!(
            extractor.detect_intent(ConversationStage::ConsentGate, "Sure, go ahead"),
            Some(IntentTag::Consent)
        );
        assert_eq!(
            extractor.detect_intent(ConversationStage::Qualify, "Honestly we're not interested"),
            Some(IntentTag::Disqualify)
        );
        assert_eq!(extractor.detect_intent(ConversationStage::Qualify, "Sure, go ahead"), None);
    }

    #[test]
    fn short_phrases_match_whole_words_only() {
        let extractor = KeywordSignalExtractor::default();
        assert_eq!(extractor.detect_intent(ConversationStage::ConsentGate, "the notebook"), None);
        assert_eq!(
            extractor.detect_intent(ConversationStage::ConsentGate, "OK."),
            Some(IntentTag::Consent)
        );
    }

    #[test]
    fn qualification_slots_are_extracted() {
        let extractor = KeywordSignalExtractor::default();
        let slots = extractor.detect_slots(
            "I'm the decision maker, this is urgent, we're losing deals and need it this quarter. \
             We have budget approved.",
        );

        assert_eq!(slots.authority, Some(true));
        assert_eq!(slots.need, Some(Need::High));
        assert_eq!(slots.pain_stated, Some(true));
        assert_eq!(slots.timing, Some(Timing::ThisPeriod));
        assert_eq!(slots.budget_indicator, Some(BudgetIndicator::Present));
    }

    #[test]
    fn negative_phrases_take_precedence() {
        let extractor = KeywordSignalExtractor::default();
        let slots = extractor.detect_slots("It's not my decision and there is no budget");

        assert_eq!(slots.authority, Some(false));
        assert_eq!(slots.budget_indicator, Some(BudgetIndicator::Absent));
    }

    #[test]
    fn explicit_values_always_win() {
        let extractor = KeywordSignalExtractor::default();
        let input = StateMachineInput {
            intent: Some(IntentTag::Consent),
            text: "this is urgent, please stop calling".to_owned(),
            slots: SlotUpdate { need: Some(Need::Medium), ..SlotUpdate::default() },
            ..StateMachineInput::default()
        };

        let enriched = extractor.enrich(&state_at(ConversationStage::ConsentGate), input);

        assert_eq!(enriched.intent, Some(IntentTag::Consent));
        assert_eq!(enriched.slots.need, Some(Need::Medium));
    }

    #[test]
    fn confirmation_and_time_are_never_inferred() {
        let extractor = KeywordSignalExtractor::default();
        let enriched = extractor.enrich(
            &state_at(ConversationStage::ProposeTime),
            StateMachineInput::utterance("Yes! That works, book it, I confirm"),
        );

        assert_eq!(enriched.intent, Some(IntentTag::Confirm));
        assert!(!enriched.explicit_confirmation);
        assert!(enriched.selected_time.is_none());
    }

    #[test]
    fn recording_consent_is_detected() {
        let extractor = KeywordSignalExtractor::default();
        let enriched = extractor.enrich(
            &state_at(ConversationStage::ConsentGate),
            StateMachineInput::utterance("Okay, and recording is fine"),
        );

        assert_eq!(
            enriched.lines,
            MandatoryLineUpdate { recording_consent: Some(true), ..MandatoryLineUpdate::default() }
        );
        assert_eq!(enriched.intent, Some(IntentTag::Consent));
    }

    #[test]
    fn lexicon_can_be_loaded_partially_from_json() {
        let lexicon: KeywordLexicon =
            serde_json::from_str(r#"{ "opt_out": ["nein danke"] }"#).expect("lexicon");
        let extractor = KeywordSignalExtractor::new(lexicon);

        assert_eq!(
            extractor.detect_intent(ConversationStage::Qualify, "Nein danke!"),
            Some(IntentTag::OptOut)
        );
        assert!(!extractor.lexicon().consent.is_empty());
    }
}
