pub mod engine;
pub mod signals;
pub mod states;

pub use engine::{qualifies, transition, ConversationEngine, QualificationPolicy};
pub use signals::{PassthroughExtractor, SignalExtractor};
pub use states::{ConversationStage, ConversationState, IntentTag, StateMachineInput};
