pub mod audit;
pub mod calendar;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod locks;
pub mod repositories;
pub mod scheduling;

pub use chrono;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use calendar::{ReservationEngine, ReservationError, ReservationPolicy};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use coordinator::{BookingCoordinator, BookingReceipt, BookingSettings, CallGate};
pub use domain::calendar::{
    AvailabilitySlot, CalendarEvent, CalendarHold, EventConfirmation, EventRequest, HoldId,
    ManagerId, TimeWindow,
};
pub use domain::conversation::{BookingId, BookingIntent, CallContext, CallId, ConversationSlots};
pub use domain::lead::{AttemptOutcome, AttemptRecord, LeadId, NewAttempt};
pub use errors::{ApplicationError, DomainError, InterfaceError, RepositoryError};
pub use flows::{
    ConversationEngine, ConversationStage, ConversationState, IntentTag, QualificationPolicy,
    SignalExtractor, StateMachineInput,
};
pub use locks::KeyedLocks;
pub use scheduling::{
    AttemptError, AttemptScheduler, BlockReason, RegionWindow, SchedulePolicy, ScheduleResult,
    WindowCalculator,
};
