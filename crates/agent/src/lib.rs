//! Call-side conversation driver.
//!
//! The state machine in `booker-core` never looks at raw text. This crate supplies the
//! pieces that sit in front of it on a live call:
//!
//! - `signals` - keyword heuristics that turn an utterance into intent, slot and
//!   mandatory-line signals (best effort; explicit caller values always win)
//! - `session` - `CallSession`, which owns one call's state and runs
//!   extract-then-transition per turn
//!
//! # Safety Principle
//!
//! Heuristics never confirm a booking. `explicit_confirmation` and the selected time
//! must come from the caller's own confirmation step.

pub mod session;
pub mod signals;

pub use session::CallSession;
pub use signals::{KeywordLexicon, KeywordSignalExtractor};
