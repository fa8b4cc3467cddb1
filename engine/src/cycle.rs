//! The present/accept/react/guard/render cycle.
//!
//! [`Core`] owns the model and every mounted piece of behavior. It lives behind
//! the engine's mutex; one cycle runs at a time and nothing here awaits.

use std::collections::VecDeque;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use sam_types::{ActionLabel, ComponentName, Proposal, ProposalBody, ProposalError, TraceEntry};

use crate::EngineError;
use crate::component::{
    AcceptorKind, AsyncAcceptor, Component, ComponentOptions, Guard, LocalAcceptor, LocalReactor,
    Nap, Patch, ReactorKind, SharedAcceptor, SharedReactor,
};
use crate::history::{History, Snapshot};
use crate::logger::{SafetyLogger, TracingLogger};
use crate::model::Model;

/// Observer invoked after every rendered cycle.
pub type RenderSink<S> = Box<dyn FnMut(&Model<S>) + Send>;

/// Builds the trace line for an accepted proposal from its label, its
/// serialized payload and the model after acceptance.
pub type TraceFormatter<S> = Box<dyn Fn(&ActionLabel, &Value, &Model<S>) -> String + Send>;

/// Result of an asynchronous acceptor, keyed by its registration position.
pub(crate) type PatchResult<S> = (usize, anyhow::Result<Patch<S>>);
pub(crate) type PendingPatch<S> = (usize, BoxFuture<'static, anyhow::Result<Patch<S>>>);

enum AcceptorSlot<S, A> {
    Shared(SharedAcceptor<S, A>),
    Local {
        component: ComponentName,
        accept: LocalAcceptor<S, A>,
    },
    Async(AsyncAcceptor<S, A>),
}

enum ReactorSlot<S> {
    Shared(SharedReactor<S>),
    Local {
        component: ComponentName,
        react: LocalReactor<S>,
    },
}

/// Cursor moves for time travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    /// Back to the initial snapshot; the trace starts over.
    Reset,
    /// The snapshot at the cursor, then advance.
    Next,
    /// The most recent snapshot.
    Last,
    Index(usize),
}

/// Render and history bookkeeping.
///
/// While a check runs the caller's sink is parked and snapshots are not taken.
struct Output<S> {
    sink: Option<RenderSink<S>>,
    parked: Option<RenderSink<S>>,
    history: Option<History<S>>,
    checking: bool,
}

impl<S: Clone> Output<S> {
    fn render(&mut self, model: &Model<S>) {
        if !self.checking
            && let Some(history) = self.history.as_mut()
        {
            history.snap(model.snapshot(), None);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink(model);
        }
    }

    fn has_next(&self) -> bool {
        self.history.as_ref().is_some_and(History::has_next)
    }
}

pub(crate) struct Core<S, A> {
    model: Model<S>,
    acceptors: Vec<AcceptorSlot<S, A>>,
    reactors: Vec<ReactorSlot<S>>,
    guards: Vec<Guard<S, A>>,
    output: Output<S>,
    logger: Box<dyn SafetyLogger<S>>,
    formatter: Option<TraceFormatter<S>>,
    max_snapshots: Option<usize>,
    deferred: VecDeque<Proposal<A>>,
}

impl<S, A> Core<S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    pub(crate) fn new(instance: &str, state: S, time_travel: bool, max_snapshots: Option<usize>) -> Self {
        let mut core = Self {
            model: Model::new(instance, state),
            acceptors: Vec::new(),
            reactors: Vec::new(),
            guards: Vec::new(),
            output: Output {
                sink: None,
                parked: None,
                history: None,
                checking: false,
            },
            logger: Box::new(TracingLogger),
            formatter: None,
            max_snapshots,
            deferred: VecDeque::new(),
        };
        if time_travel {
            core.output.history = Some(History::new(max_snapshots));
            core.snap_initial();
        }
        core
    }

    pub(crate) fn model(&self) -> &Model<S> {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut Model<S> {
        &mut self.model
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    pub(crate) fn install_state(&mut self, state: S) {
        self.model.install(state);
        self.snap_initial();
    }

    fn snap_initial(&mut self) {
        if let Some(history) = self.output.history.as_mut() {
            history.snap(self.model.snapshot(), Some(0));
        }
        let has_next = self.output.has_next();
        self.model.set_has_next(has_next);
    }

    /// Mount a component's pieces after those already registered.
    pub(crate) fn mount(
        &mut self,
        component: Component<S, A>,
    ) -> Result<(Option<ComponentName>, ComponentOptions), EngineError> {
        let parts = component.into_parts()?;
        if let Some(name) = parts.name.as_ref()
            && self.model.has_component(name.as_str())
        {
            return Err(EngineError::DuplicateComponent { name: name.clone() });
        }
        if let (Some(name), Some(local)) = (parts.name.clone(), parts.local) {
            self.model.mount_component(name, local);
        }

        for acceptor in parts.acceptors {
            self.acceptors.push(match acceptor {
                AcceptorKind::Shared(accept) => AcceptorSlot::Shared(accept),
                AcceptorKind::Async(accept) => AcceptorSlot::Async(accept),
                AcceptorKind::Local(accept) => AcceptorSlot::Local {
                    component: parts.name.clone().ok_or(EngineError::UnnamedComponent)?,
                    accept,
                },
            });
        }
        for reactor in parts.reactors {
            self.reactors.push(match reactor {
                ReactorKind::Shared(react) => ReactorSlot::Shared(react),
                ReactorKind::Local(react) => ReactorSlot::Local {
                    component: parts.name.clone().ok_or(EngineError::UnnamedComponent)?,
                    react,
                },
            });
        }
        self.guards.extend(parts.guards);
        Ok((parts.name, parts.options))
    }

    pub(crate) fn set_render(&mut self, sink: RenderSink<S>) {
        if self.output.checking {
            self.output.parked = Some(sink);
        } else {
            self.output.sink = Some(sink);
        }
    }

    pub(crate) fn set_logger(&mut self, logger: Box<dyn SafetyLogger<S>>) {
        self.logger = logger;
    }

    pub(crate) fn set_trace_formatter(&mut self, formatter: TraceFormatter<S>) {
        self.formatter = Some(formatter);
    }

    /// Attach a history seeded with `seed`. An empty seed starts from the
    /// current model.
    pub(crate) fn set_history(&mut self, seed: Vec<S>) {
        let seeded = !seed.is_empty();
        let snapshots = seed.into_iter().map(Snapshot::from).collect();
        self.output.history = Some(History::with_snapshots(snapshots, self.max_snapshots));
        if seeded {
            let has_next = self.output.has_next();
            self.model.set_has_next(has_next);
        } else {
            self.snap_initial();
        }
        self.model.clear_trace();
    }

    pub(crate) fn has_history(&self) -> bool {
        self.output.history.is_some()
    }

    // ------------------------------------------------------------------------
    // Time travel
    // ------------------------------------------------------------------------

    /// Restore the selected snapshot, if any, and render.
    pub(crate) fn travel(&mut self, travel: Travel) {
        let Self { model, output, .. } = self;
        if let Some(history) = output.history.as_mut() {
            let snapshot = match travel {
                Travel::Reset => history.travel(0),
                Travel::Next => history.next(),
                Travel::Last => history.last(),
                Travel::Index(index) => history.travel(index),
            };
            if let Some(snapshot) = snapshot {
                model.restore(snapshot);
            }
        }
        if travel == Travel::Reset {
            model.clear_trace();
        }
        let has_next = output.has_next();
        model.set_has_next(has_next);
        output.render(model);
    }

    // ------------------------------------------------------------------------
    // Check mode
    // ------------------------------------------------------------------------

    /// Swap in an observer sink for the duration of a check.
    pub(crate) fn begin_check(&mut self, observer: RenderSink<S>) {
        if !self.output.checking {
            self.output.parked = self.output.sink.take();
            self.output.checking = true;
        }
        self.output.sink = Some(observer);
    }

    pub(crate) fn end_check(&mut self) {
        if self.output.checking {
            self.output.sink = self.output.parked.take();
            self.output.checking = false;
        }
    }

    // ------------------------------------------------------------------------
    // Cycle
    // ------------------------------------------------------------------------

    /// Start every asynchronous acceptor that matches the proposal's action.
    pub(crate) fn pending_patches(&self, proposal: &Proposal<A>) -> Vec<PendingPatch<S>> {
        let ProposalBody::Action(action) = proposal.body() else {
            return Vec::new();
        };
        self.acceptors
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                AcceptorSlot::Async(accept) => accept(action).map(|future| (index, future)),
                _ => None,
            })
            .collect()
    }

    /// Run one cycle. Returns the proposals it scheduled, in order.
    ///
    /// Callers present the returned proposals once the lock is released.
    /// A failing cycle schedules an error proposal, unless the failing
    /// proposal was itself an error; then the error slot is set directly.
    pub(crate) fn run(&mut self, proposal: Proposal<A>, patches: Vec<PatchResult<S>>) -> Vec<Proposal<A>> {
        let reporting = proposal.is_error();
        if let Err(err) = self.cycle(proposal, patches) {
            tracing::debug!(
                instance = self.model.instance_name(),
                "Cycle aborted: {err:#}"
            );
            self.model.take_render_suppression();
            let error = ProposalError::new(format!("{err:#}"));
            if reporting {
                self.model.set_error(error);
            } else {
                self.deferred.push_back(Proposal::error(error));
            }
        }
        self.deferred.drain(..).collect()
    }

    fn cycle(&mut self, proposal: Proposal<A>, mut patches: Vec<PatchResult<S>>) -> anyhow::Result<()> {
        if let Some(stamp) = proposal.stamp()
            && !self.model.admit_stamp(stamp)
        {
            tracing::debug!(
                instance = self.model.instance_name(),
                %stamp,
                "Dropped outdated proposal"
            );
            return Ok(());
        }

        let label = proposal.label().cloned();
        match proposal.into_body() {
            ProposalBody::Error(error) => self.model.set_error(error),
            ProposalBody::ClearTrace => self.model.clear_trace(),
            ProposalBody::Action(action) => {
                self.accept(&action, &mut patches)?;
                if let Some(label) = label {
                    self.record(label, &action);
                }
            }
        }

        self.react()?;
        let suppressed = self.guard();
        let flagged = self.model.take_render_suppression();
        if !suppressed && !flagged {
            self.output.render(&self.model);
        }
        Ok(())
    }

    fn accept(&mut self, action: &A, patches: &mut Vec<PatchResult<S>>) -> anyhow::Result<()> {
        for (index, slot) in self.acceptors.iter_mut().enumerate() {
            match slot {
                AcceptorSlot::Shared(accept) => accept(&mut self.model, action)?,
                AcceptorSlot::Local { component, accept } => {
                    let (local, parent) = self
                        .model
                        .split_component(component)
                        .ok_or_else(|| anyhow::anyhow!("component {component} is not mounted"))?;
                    accept(local, parent, action)?;
                }
                AcceptorSlot::Async(_) => {
                    if let Some(position) = patches.iter().position(|(slot, _)| *slot == index) {
                        let (_, patch) = patches.swap_remove(position);
                        let patch = patch?;
                        patch(self.model.state_mut());
                    }
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, label: ActionLabel, action: &A) {
        let proposal = serde_json::to_value(action).unwrap_or_else(|err| {
            tracing::warn!(
                instance = self.model.instance_name(),
                action = %label,
                "Failed to serialize proposal: {err}"
            );
            Value::Null
        });
        let line = self
            .formatter
            .as_ref()
            .map(|format| format(&label, &proposal, &self.model));
        let state = self.model.summary();
        let mut entry = TraceEntry::new(label, proposal, state);
        if let Some(line) = line {
            entry = entry.displayed(line);
        }
        self.model.record(entry);
    }

    fn react(&mut self) -> anyhow::Result<()> {
        let has_next = self.output.has_next();
        self.model.set_has_next(has_next);
        for slot in &mut self.reactors {
            match slot {
                ReactorSlot::Shared(react) => react(&mut self.model)?,
                ReactorSlot::Local { component, react } => {
                    let (local, parent) = self
                        .model
                        .split_component(component)
                        .ok_or_else(|| anyhow::anyhow!("component {component} is not mounted"))?;
                    react(local, parent)?;
                }
            }
        }
        Ok(())
    }

    /// Evaluate every guard. Returns whether the default render is skipped.
    fn guard(&mut self) -> bool {
        let Self {
            model,
            guards,
            output,
            logger,
            deferred,
            ..
        } = self;
        let mut suppressed = false;
        for guard in guards.iter_mut() {
            match guard {
                Guard::Safety { name, violated } => {
                    if !violated(model) {
                        continue;
                    }
                    logger.violation(name, model);
                    let Some(snapshot) = output.history.as_mut().and_then(History::last) else {
                        continue;
                    };
                    model.restore(snapshot);
                    output.render(model);
                    suppressed = true;
                }
                Guard::Nap(nap) => match nap(model) {
                    Nap::Continue => {}
                    Nap::Suppress => suppressed = true,
                    Nap::Next(proposal) => {
                        deferred.push_back(proposal);
                        suppressed = true;
                    }
                },
            }
        }
        suppressed
    }
}
