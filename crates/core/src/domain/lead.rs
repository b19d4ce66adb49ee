use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Answered,
    NoAnswer,
    Busy,
    Voicemail,
    Failed,
    OptOut,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Voicemail => "voicemail",
            Self::Failed => "failed",
            Self::OptOut => "opt_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "answered" => Some(Self::Answered),
            "no_answer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "voicemail" => Some(Self::Voicemail),
            "failed" => Some(Self::Failed),
            "opt_out" => Some(Self::OptOut),
            _ => None,
        }
    }
}

/// One historical contact attempt. `sequence` is assigned by the store and is gapless
/// per lead; `attempt_no` only repeats when a busy line is retried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub lead_id: LeadId,
    pub sequence: u32,
    pub attempt_no: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub region: Option<String>,
}

/// Attempt data supplied by a caller before the store assigns a sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttempt {
    pub lead_id: LeadId,
    pub attempt_no: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub region: Option<String>,
}

impl NewAttempt {
    pub fn into_record(self, sequence: u32) -> AttemptRecord {
        AttemptRecord {
            lead_id: self.lead_id,
            sequence,
            attempt_no: self.attempt_no,
            attempted_at: self.attempted_at,
            outcome: self.outcome,
            region: self.region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AttemptOutcome;

    #[test]
    fn attempt_outcome_parses_storage_and_hyphenated_forms() {
        let cases = [
            AttemptOutcome::Answered,
            AttemptOutcome::NoAnswer,
            AttemptOutcome::Busy,
            AttemptOutcome::Voicemail,
            AttemptOutcome::Failed,
            AttemptOutcome::OptOut,
        ];

        for outcome in cases {
            assert_eq!(AttemptOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(AttemptOutcome::parse("No-Answer"), Some(AttemptOutcome::NoAnswer));
        assert_eq!(AttemptOutcome::parse("opt-out"), Some(AttemptOutcome::OptOut));
        assert_eq!(AttemptOutcome::parse("hung-up"), None);
    }
}
