//! Sink for safety-condition violations.

use serde::Serialize;

use crate::model::Model;

pub trait SafetyLogger<S>: Send {
    fn violation(&mut self, condition: &str, model: &Model<S>);
}

impl<S, F> SafetyLogger<S> for F
where
    F: FnMut(&str, &Model<S>) + Send,
{
    fn violation(&mut self, condition: &str, model: &Model<S>) {
        self(condition, model);
    }
}

/// Default logger: one `warn` event per violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl<S: Serialize> SafetyLogger<S> for TracingLogger {
    fn violation(&mut self, condition: &str, model: &Model<S>) {
        tracing::warn!(
            instance = model.instance_name(),
            condition,
            state = %model.summary(),
            "Safety condition violated"
        );
    }
}
