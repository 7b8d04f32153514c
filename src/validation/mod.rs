//! Composable request validation with localized messages
//!
//! Rules push failures into a `ValidationContext` and return whether the
//! field passed, leaving short-circuit decisions to the caller.

pub mod context;
pub mod messages;
pub mod rules;

pub use context::ValidationContext;
pub use messages::{Locale, MessageKind, ValidationMessage};
