//! Core types for reflex.

mod decision;
mod message;
mod pattern;

pub use decision::{Decision, MatchMethod, Outcome, RejectReason, Stage};
pub use message::{Message, MessageRole, TurnContext};
pub use pattern::{CachedResponse, ExampleQuery, Pattern};
