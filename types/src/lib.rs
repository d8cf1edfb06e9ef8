//! Core domain types for conversational memory.
//!
//! This crate contains pure domain types with no IO and no async. Constructors
//! that need a clock take the timestamp explicitly; callers own the clock.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod message;

pub use ids::{EmptySessionKey, MessageId, SessionKey};
pub use message::{ChatTurn, Message, Metadata, Role, UnknownRole};
