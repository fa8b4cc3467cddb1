//! Core domain types for the engine.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from the engine, the checker, and clients alike.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod proposal;
mod trace;
pub mod value;

pub use ids::{ModelId, Stamp, StampSource};
pub use proposal::{Proposal, ProposalBody, ProposalError};
pub use trace::{Trace, TraceEntry, display_fields, display_payload};

use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Label Types
// ============================================================================

#[derive(Debug, Error)]
#[error("label must not be empty")]
pub struct EmptyLabelError;

/// Identity of an action: used for allow-listing, checker filters, and trace lines.
///
/// Guaranteed non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionLabel(Cow<'static, str>);

impl ActionLabel {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyLabelError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyLabelError)
        } else {
            Ok(Self(Cow::Owned(value)))
        }
    }

    /// A compile-time checked label.
    #[must_use]
    pub const fn from_static(value: &'static str) -> Self {
        assert!(!value.is_empty(), "ActionLabel must not be empty");
        Self(Cow::Borrowed(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActionLabel {
    type Error = EmptyLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ActionLabel {
    type Error = EmptyLabelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ActionLabel> for String {
    fn from(value: ActionLabel) -> Self {
        value.0.into_owned()
    }
}

impl Borrow<str> for ActionLabel {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for ActionLabel {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a mounted component and key of its sub-state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyLabelError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyLabelError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ComponentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
