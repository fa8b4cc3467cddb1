//! Proposals: the only way state changes are requested.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ActionLabel, Stamp};

/// Failure carried by an error proposal and kept in the model's error slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ProposalError {
    message: String,
}

impl ProposalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// An intent was invoked while the allow-list excluded it.
    #[must_use]
    pub fn unexpected_action(label: &ActionLabel) -> Self {
        Self::new(format!("unexpected action: {label}"))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a proposal asks for.
///
/// `A` is the client's own action enum; acceptors match on it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalBody<A> {
    Action(A),
    Error(ProposalError),
    ClearTrace,
}

/// Ephemeral, single-use payload presented to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal<A> {
    label: Option<ActionLabel>,
    stamp: Option<Stamp>,
    body: ProposalBody<A>,
}

impl<A> Proposal<A> {
    pub fn action(action: A) -> Self {
        Self::from_body(ProposalBody::Action(action))
    }

    pub fn error(error: ProposalError) -> Self {
        Self::from_body(ProposalBody::Error(error))
    }

    /// Empties the model's trace when presented.
    pub fn clear_trace() -> Self {
        Self::from_body(ProposalBody::ClearTrace)
    }

    fn from_body(body: ProposalBody<A>) -> Self {
        Self {
            label: None,
            stamp: None,
            body,
        }
    }

    /// Tag with an action name; tagged proposals are recorded in the trace.
    #[must_use]
    pub fn named(mut self, label: ActionLabel) -> Self {
        self.label = Some(label);
        self
    }

    #[must_use]
    pub fn stamped(mut self, stamp: Stamp) -> Self {
        self.stamp = Some(stamp);
        self
    }

    #[must_use]
    pub fn label(&self) -> Option<&ActionLabel> {
        self.label.as_ref()
    }

    #[must_use]
    pub fn stamp(&self) -> Option<Stamp> {
        self.stamp
    }

    #[must_use]
    pub fn body(&self) -> &ProposalBody<A> {
        &self.body
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.body, ProposalBody::Error(_))
    }

    pub fn into_body(self) -> ProposalBody<A> {
        self.body
    }
}
