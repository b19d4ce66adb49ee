use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::lead::LeadId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl BookingId {
    /// Replaying the same call with the same confirmed start always yields the same id.
    pub fn derive(call_id: &CallId, lead_id: &LeadId, start: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(call_id.0.as_bytes());
        hasher.update(b"|");
        hasher.update(lead_id.0.as_bytes());
        hasher.update(b"|");
        hasher.update(start.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("bk_{}", &digest[..20]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Need {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    ThisPeriod,
    NextPeriod,
    Later,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetIndicator {
    Present,
    Unknown,
    Absent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSlots {
    pub authority: Option<bool>,
    pub need: Option<Need>,
    pub timing: Option<Timing>,
    pub budget_indicator: Option<BudgetIndicator>,
    pub pain_stated: Option<bool>,
    pub confirmed_date: Option<NaiveDate>,
    pub confirmed_time: Option<NaiveTime>,
}

/// Partial slot values carried by one conversation turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub authority: Option<bool>,
    pub need: Option<Need>,
    pub timing: Option<Timing>,
    pub budget_indicator: Option<BudgetIndicator>,
    pub pain_stated: Option<bool>,
}

impl SlotUpdate {
    pub fn is_empty(&self) -> bool {
        self.authority.is_none()
            && self.need.is_none()
            && self.timing.is_none()
            && self.budget_indicator.is_none()
            && self.pain_stated.is_none()
    }

    /// Fills unset fields from `fallback`; values already present are kept.
    pub fn or(self, fallback: SlotUpdate) -> SlotUpdate {
        SlotUpdate {
            authority: self.authority.or(fallback.authority),
            need: self.need.or(fallback.need),
            timing: self.timing.or(fallback.timing),
            budget_indicator: self.budget_indicator.or(fallback.budget_indicator),
            pain_stated: self.pain_stated.or(fallback.pain_stated),
        }
    }
}

impl ConversationSlots {
    /// Later writes override earlier ones; absent values never clear information.
    pub fn merge(&mut self, update: &SlotUpdate) {
        if let Some(authority) = update.authority {
            self.authority = Some(authority);
        }
        if let Some(need) = update.need {
            self.need = Some(need);
        }
        if let Some(timing) = update.timing {
            self.timing = Some(timing);
        }
        if let Some(budget_indicator) = update.budget_indicator {
            self.budget_indicator = Some(budget_indicator);
        }
        if let Some(pain_stated) = update.pain_stated {
            self.pain_stated = Some(pain_stated);
        }
    }

    pub fn confirm_start(&mut self, start: DateTime<Utc>) {
        self.confirmed_date = Some(start.date_naive());
        self.confirmed_time = Some(start.time());
    }

    pub fn confirmed_start(&self) -> Option<DateTime<Utc>> {
        match (self.confirmed_date, self.confirmed_time) {
            (Some(date), Some(time)) => Some(date.and_time(time).and_utc()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandatoryLines {
    pub identification: bool,
    pub purpose: bool,
    pub consent_to_proceed: bool,
    pub recording_consent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandatoryLineUpdate {
    pub identification: Option<bool>,
    pub purpose: Option<bool>,
    pub consent_to_proceed: Option<bool>,
    pub recording_consent: Option<bool>,
}

impl MandatoryLineUpdate {
    pub fn or(self, fallback: MandatoryLineUpdate) -> MandatoryLineUpdate {
        MandatoryLineUpdate {
            identification: self.identification.or(fallback.identification),
            purpose: self.purpose.or(fallback.purpose),
            consent_to_proceed: self.consent_to_proceed.or(fallback.consent_to_proceed),
            recording_consent: self.recording_consent.or(fallback.recording_consent),
        }
    }
}

impl MandatoryLines {
    /// Flags are set-once: an update can raise a line but never lower it.
    pub fn apply(&mut self, update: &MandatoryLineUpdate) {
        self.identification |= update.identification.unwrap_or(false);
        self.purpose |= update.purpose.unwrap_or(false);
        self.consent_to_proceed |= update.consent_to_proceed.unwrap_or(false);
        self.recording_consent |= update.recording_consent.unwrap_or(false);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMetadata {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub call_id: CallId,
    pub lead_id: LeadId,
    pub contact: ContactMetadata,
    pub recording_consent_required: bool,
}

/// Serialisable form of a [`BookingIntent`]; converting back re-checks confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingIntentRecord {
    pub booking_id: BookingId,
    pub lead_id: LeadId,
    pub confirmed_date: NaiveDate,
    pub confirmed_time: NaiveTime,
    pub qualification: ConversationSlots,
    pub explicit_confirmation: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BookingIntentRecord", into = "BookingIntentRecord")]
pub struct BookingIntent {
    booking_id: BookingId,
    lead_id: LeadId,
    confirmed_date: NaiveDate,
    confirmed_time: NaiveTime,
    qualification: ConversationSlots,
}

impl BookingIntent {
    pub fn new(record: BookingIntentRecord) -> Result<Self, DomainError> {
        if !record.explicit_confirmation {
            return Err(DomainError::MissingConfirmation {
                booking_id: record.booking_id.0.clone(),
            });
        }

        Ok(Self {
            booking_id: record.booking_id,
            lead_id: record.lead_id,
            confirmed_date: record.confirmed_date,
            confirmed_time: record.confirmed_time,
            qualification: record.qualification,
        })
    }

    pub fn booking_id(&self) -> &BookingId {
        &self.booking_id
    }

    pub fn lead_id(&self) -> &LeadId {
        &self.lead_id
    }

    pub fn confirmed_date(&self) -> NaiveDate {
        self.confirmed_date
    }

    pub fn confirmed_time(&self) -> NaiveTime {
        self.confirmed_time
    }

    pub fn confirmed_start(&self) -> DateTime<Utc> {
        self.confirmed_date.and_time(self.confirmed_time).and_utc()
    }

    pub fn qualification(&self) -> &ConversationSlots {
        &self.qualification
    }

    pub fn explicit_confirmation(&self) -> bool {
        true
    }
}

impl TryFrom<BookingIntentRecord> for BookingIntent {
    type Error = DomainError;

    fn try_from(record: BookingIntentRecord) -> Result<Self, Self::Error> {
        Self::new(record)
    }
}

impl From<BookingIntent> for BookingIntentRecord {
    fn from(intent: BookingIntent) -> Self {
        Self {
            booking_id: intent.booking_id,
            lead_id: intent.lead_id,
            confirmed_date: intent.confirmed_date,
            confirmed_time: intent.confirmed_time,
            qualification: intent.qualification,
            explicit_confirmation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

    use super::{
        BookingId, BookingIntent, BookingIntentRecord, CallId, ConversationSlots,
        MandatoryLineUpdate, MandatoryLines, Need, SlotUpdate,
    };
    use crate::domain::lead::LeadId;
    use crate::errors::DomainError;

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn record(explicit_confirmation: bool) -> BookingIntentRecord {
        BookingIntentRecord {
            booking_id: BookingId("bk_1".to_string()),
            lead_id: LeadId("L-1".to_string()),
            confirmed_date: NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
            confirmed_time: NaiveTime::from_hms_milli_opt(15, 30, 0, 250).expect("time"),
            qualification: ConversationSlots::default(),
            explicit_confirmation,
        }
    }

    #[test]
    fn slot_merge_overrides_but_never_clears() {
        let mut slots = ConversationSlots::default();
        slots.merge(&SlotUpdate {
            need: Some(Need::Medium),
            authority: Some(true),
            ..Default::default()
        });
        slots.merge(&SlotUpdate { need: Some(Need::High), ..Default::default() });

        assert_eq!(slots.need, Some(Need::High));
        assert_eq!(slots.authority, Some(true));
    }

    #[test]
    fn mandatory_lines_are_monotonic() {
        let mut lines = MandatoryLines::default();
        lines.apply(&MandatoryLineUpdate { identification: Some(true), ..Default::default() });
        lines.apply(&MandatoryLineUpdate { identification: Some(false), ..Default::default() });

        assert!(lines.identification);
        assert!(!lines.purpose);
    }

    #[test]
    fn booking_intent_requires_explicit_confirmation() {
        let error = BookingIntent::new(record(false)).expect_err("must reject");
        assert!(matches!(error, DomainError::MissingConfirmation { .. }));

        let intent = BookingIntent::new(record(true)).expect("confirmed intent");
        assert!(intent.explicit_confirmation());
        assert_eq!(intent.confirmed_start(), parse_ts("2026-03-02T15:30:00.250Z"));
    }

    #[test]
    fn booking_intent_deserialization_rechecks_confirmation() {
        let mut json = serde_json::to_value(record(true)).expect("serialize record");
        json["explicit_confirmation"] = serde_json::Value::Bool(false);

        let result = serde_json::from_value::<BookingIntent>(json);
        assert!(result.is_err());
    }

    #[test]
    fn booking_id_is_deterministic_and_start_sensitive() {
        let call = CallId("call-1".to_string());
        let lead = LeadId("L-1".to_string());
        let start = parse_ts("2026-03-02T15:30:00Z");

        let first = BookingId::derive(&call, &lead, start);
        let second = BookingId::derive(&call, &lead, start);
        let other = BookingId::derive(&call, &lead, parse_ts("2026-03-02T16:00:00Z"));

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.0.starts_with("bk_"));
    }
}
