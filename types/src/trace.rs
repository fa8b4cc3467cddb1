//! Human-readable record of executed proposals.
//!
//! One line per step: `fill(1) ==> [0,5], [3,5], 4`. Arguments and fields are
//! compact JSON in declaration order. Keys starting with `__` are bookkeeping
//! and never displayed. An entry may carry its own line instead.

use std::fmt;
use std::slice;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ActionLabel;
use crate::value::fields;

const HIDDEN_PREFIX: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    action: ActionLabel,
    proposal: Value,
    state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<String>,
}

impl TraceEntry {
    #[must_use]
    pub fn new(action: ActionLabel, proposal: Value, state: Value) -> Self {
        Self {
            action,
            proposal,
            state,
            display: None,
        }
    }

    /// Replace the default rendering of this entry with `line`.
    #[must_use]
    pub fn displayed(mut self, line: String) -> Self {
        self.display = Some(line);
        self
    }

    #[must_use]
    pub fn action(&self) -> &ActionLabel {
        &self.action
    }

    #[must_use]
    pub fn proposal(&self) -> &Value {
        &self.proposal
    }

    /// Summary of the model right after the proposal was accepted.
    #[must_use]
    pub fn state(&self) -> &Value {
        &self.state
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = &self.display {
            return f.write_str(line);
        }
        write!(
            f,
            "{}({}) ==> {}",
            self.action,
            display_payload(&self.proposal),
            display_fields(&self.state)
        )
    }
}

/// Ordered log of trace entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, TraceEntry> {
        self.entries.iter()
    }

    /// Action names in order, handy for comparing runs.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.action.as_str())
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceEntry;
    type IntoIter = slice::Iter<'a, TraceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Render a proposal payload as an argument list.
///
/// Externally tagged enum variants (`{"Fill": 1}`) show their contents only;
/// unit variants (`"Reset"`) show no arguments.
#[must_use]
pub fn display_payload(payload: &Value) -> String {
    match payload {
        Value::String(_) | Value::Null => String::new(),
        Value::Object(map) if map.len() == 1 => map
            .values()
            .next()
            .map_or_else(String::new, display_fields),
        other => display_fields(other),
    }
}

/// Render a value as a comma-separated list of its visible parts.
#[must_use]
pub fn display_fields(value: &Value) -> String {
    match value {
        Value::Object(_) => join(
            fields(value)
                .filter(|(key, _)| !key.starts_with(HIDDEN_PREFIX))
                .map(|(_, field)| field),
        ),
        Value::Array(items) => join(items.iter()),
        Value::Null => String::new(),
        scalar => scalar.to_string(),
    }
}

fn join<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
