//! Core error types and the progress event model shared by every component.
//!
//! This module is the foundation every other module depends on: structural
//! errors ([`CoreError`]), a user-facing wrapper ([`ErrorContext`]), and the
//! event stream types ([`events::Event`], [`events::EventSink`]) that the
//! coordinator and build orchestrator emit.

pub mod error;
pub mod events;

pub use error::{user_friendly_error, CoreError, ErrorContext};
pub use events::{Event, EventSink, NullSink, RecordingSink};
