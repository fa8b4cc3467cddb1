//! Reactive state engine.
//!
//! Every change to the model goes through one cycle:
//!
//! 1. a [`Proposal`] is presented (directly or through an [`Intent`])
//! 2. acceptors mutate the model
//! 3. reactors recompute derived state
//! 4. guards may suppress the render, schedule a follow-up proposal, or roll
//!    the model back to the last snapshot
//! 5. the render sink observes the result
//!
//! Failures inside a cycle never escape: they become error proposals and land
//! in the model's error slot.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Lock poisoning is recovered, not propagated

mod component;
mod cycle;
mod engine;
mod error;
pub mod history;
mod intent;
mod logger;
pub mod model;
mod queue;
mod request;

pub use component::{Component, ComponentOptions, Nap, Patch, RetryPolicy};
pub use cycle::{RenderSink, TraceFormatter, Travel};
pub use engine::Engine;
pub use error::EngineError;
pub use history::{History, Snapshot};
pub use intent::{Action, ActionFuture, Intent, Mounted};
pub use logger::{SafetyLogger, TracingLogger};
pub use model::{Local, LocalState, Model};
pub use request::{Allowed, Check, EngineStatus, Request, Response};

pub use sam_config::{EngineConfig, Synchronize, TimeTravelConfig};
pub use sam_types::{
    ActionLabel, ComponentName, Proposal, ProposalBody, ProposalError, Stamp, Trace,
    TraceEntry, value,
};

#[cfg(test)]
mod tests;
