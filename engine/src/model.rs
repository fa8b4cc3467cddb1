//! The mutable state container owned by an engine.
//!
//! A [`Model`] holds the application state `S` plus the engine's bookkeeping:
//! component sub-states, the error slot, the allow-list, the one-shot render
//! suppression flag, and the trace. It dereferences to `S`, so acceptors read
//! and write application fields directly.
//!
//! Component sub-states never point at their parent. They carry the parent's
//! [`ModelId`] and the parent is resolved on demand, which keeps snapshots free
//! of cycles.

use std::any::{self, Any};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use serde_json::Value;

use sam_types::value;
use sam_types::{ActionLabel, ComponentName, ModelId, ProposalError, Stamp, Trace, TraceEntry};

use crate::history::Snapshot;

/// Type-erased component state.
///
/// Implemented for every `Clone + Send + 'static` type; snapshots copy it
/// through [`LocalState::clone_local`].
pub trait LocalState: Any + Send {
    fn clone_local(&self) -> Box<dyn LocalState>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone + Send> LocalState for T {
    fn clone_local(&self) -> Box<dyn LocalState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn downcast_mut<L: LocalState>(local: &mut dyn LocalState) -> anyhow::Result<&mut L> {
    local
        .as_any_mut()
        .downcast_mut::<L>()
        .ok_or_else(|| anyhow::anyhow!("local state is not a {}", any::type_name::<L>()))
}

pub(crate) struct SubState {
    parent: ModelId,
    local: Box<dyn LocalState>,
}

/// A component's own state, with read access to the parent model's state.
pub struct Local<'a, S, L> {
    state: &'a mut L,
    parent: &'a S,
}

impl<'a, S, L> Local<'a, S, L> {
    pub(crate) fn new(state: &'a mut L, parent: &'a S) -> Self {
        Self { state, parent }
    }

    #[must_use]
    pub fn parent(&self) -> &S {
        self.parent
    }
}

impl<S, L> Deref for Local<'_, S, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.state
    }
}

impl<S, L> DerefMut for Local<'_, S, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.state
    }
}

pub struct Model<S> {
    id: ModelId,
    instance: String,
    state: S,
    components: BTreeMap<ComponentName, SubState>,
    error: Option<ProposalError>,
    allowed_actions: BTreeSet<ActionLabel>,
    suppress_render: bool,
    trace: Trace,
    last_stamp: Option<Stamp>,
    has_next: bool,
}

impl<S> Model<S> {
    pub(crate) fn new(instance: impl Into<String>, state: S) -> Self {
        Self {
            id: ModelId::fresh(),
            instance: instance.into(),
            state,
            components: BTreeMap::new(),
            error: None,
            allowed_actions: BTreeSet::new(),
            suppress_render: false,
            trace: Trace::new(),
            last_stamp: None,
            has_next: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> ModelId {
        self.id
    }

    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance
    }

    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Replace the application state and start a new trace.
    pub(crate) fn install(&mut self, state: S) {
        self.state = state;
        self.trace.clear();
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn component_names(&self) -> impl Iterator<Item = &ComponentName> {
        self.components.keys()
    }

    pub(crate) fn mount_component(&mut self, name: ComponentName, local: Box<dyn LocalState>) {
        let parent = self.id;
        self.components.insert(name, SubState { parent, local });
    }

    /// Typed view of a component's state.
    #[must_use]
    pub fn local_state<L: LocalState>(&self, name: &str) -> Option<&L> {
        self.components
            .get(name)
            .and_then(|sub| sub.local.as_any().downcast_ref::<L>())
    }

    pub fn local_state_mut<L: LocalState>(&mut self, name: &str) -> Option<&mut L> {
        self.components
            .get_mut(name)
            .and_then(|sub| sub.local.as_any_mut().downcast_mut::<L>())
    }

    /// Resolve a component's parent handle against this model.
    #[must_use]
    pub fn parent_of(&self, name: &str) -> Option<&S> {
        self.components
            .get(name)
            .filter(|sub| sub.parent == self.id)
            .map(|_| &self.state)
    }

    /// Disjoint borrows of one component's state and the parent state.
    pub(crate) fn split_component(&mut self, name: &ComponentName) -> Option<(&mut dyn LocalState, &S)> {
        let id = self.id;
        let sub = self.components.get_mut(name).filter(|sub| sub.parent == id)?;
        Some((sub.local.as_mut(), &self.state))
    }

    // ------------------------------------------------------------------------
    // Error slot
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ProposalError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(ProposalError::message)
    }

    pub fn clear_error(&mut self) -> Option<ProposalError> {
        self.error.take()
    }

    pub(crate) fn set_error(&mut self, error: ProposalError) {
        self.error = Some(error);
    }

    // ------------------------------------------------------------------------
    // Allow-list
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn allowed_actions(&self) -> &BTreeSet<ActionLabel> {
        &self.allowed_actions
    }

    /// An empty allow-list admits everything.
    #[must_use]
    pub fn is_allowed(&self, label: &str) -> bool {
        self.allowed_actions.is_empty() || self.allowed_actions.contains(label)
    }

    pub fn allow(&mut self, labels: impl IntoIterator<Item = ActionLabel>) {
        self.allowed_actions.extend(labels);
    }

    pub fn clear_allowed_actions(&mut self) {
        self.allowed_actions.clear();
    }

    // ------------------------------------------------------------------------
    // Cycle bookkeeping
    // ------------------------------------------------------------------------

    /// Skip the render of the current cycle. Consumed when the cycle ends.
    pub fn do_not_render(&mut self) {
        self.suppress_render = true;
    }

    #[must_use]
    pub fn render_suppressed(&self) -> bool {
        self.suppress_render
    }

    pub(crate) fn take_render_suppression(&mut self) -> bool {
        mem::take(&mut self.suppress_render)
    }

    #[must_use]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub(crate) fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub(crate) fn record(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    /// Admit a stamped proposal only if it started after the last admitted one.
    pub(crate) fn admit_stamp(&mut self, stamp: Stamp) -> bool {
        if self.last_stamp.is_some_and(|last| stamp <= last) {
            return false;
        }
        self.last_stamp = Some(stamp);
        true
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub(crate) fn set_has_next(&mut self, has_next: bool) {
        self.has_next = has_next;
    }
}

impl<S: Clone> Model<S> {
    /// Structural copy of the application state and every sub-state.
    /// Parent handles are not copied; they are reattached on restore.
    pub(crate) fn snapshot(&self) -> Snapshot<S> {
        let components = self
            .components
            .iter()
            .map(|(name, sub)| (name.clone(), sub.local.clone_local()))
            .collect();
        Snapshot::new(self.state.clone(), components)
    }

    /// Overwrite application state and the snapshot's sub-states in place.
    ///
    /// Sub-states missing from the snapshot are left as they are.
    pub(crate) fn restore(&mut self, snapshot: &Snapshot<S>) {
        self.state = snapshot.state().clone();
        let parent = self.id;
        for (name, local) in snapshot.components() {
            self.components.insert(
                name.clone(),
                SubState {
                    parent,
                    local: local.clone_local(),
                },
            );
        }
    }
}

impl<S: Serialize> Model<S> {
    /// The application state as JSON; `null` if it cannot be serialized.
    #[must_use]
    pub fn summary(&self) -> Value {
        serde_json::to_value(&self.state).unwrap_or_else(|err| {
            tracing::warn!(instance = %self.instance, "Failed to summarize state: {err}");
            Value::Null
        })
    }

    /// Look up a top-level field by name. Absent values yield `None`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.summary() {
            Value::Object(mut fields) => fields.remove(name).filter(value::is_present),
            _ => None,
        }
    }

    /// Whether field `name` is present and, when `element` is present, contains it.
    #[must_use]
    pub fn field_has(&self, name: &str, element: &Value) -> bool {
        self.field(name)
            .is_some_and(|field| value::has(&field, element))
    }
}

impl<S> Deref for Model<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.state
    }
}

impl<S> DerefMut for Model<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

impl<S: fmt::Debug> fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("state", &self.state)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("error", &self.error)
            .field("allowed_actions", &self.allowed_actions)
            .field("trace_len", &self.trace.len())
            .finish_non_exhaustive()
    }
}
