//! The engine handle.
//!
//! An [`Engine`] is a cheap, cloneable handle to one model and its mounted
//! behavior. All mutation goes through [`Engine::present`]; configuration goes
//! through [`Engine::apply`] or the single-purpose helpers built on it.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use sam_config::EngineConfig;
use sam_types::{ActionLabel, Proposal, ProposalError, Stamp, StampSource, Trace};

use crate::EngineError;
use crate::component::Component;
use crate::cycle::{Core, PatchResult, PendingPatch, RenderSink, Travel};
use crate::intent::{Action, Intent, Mounted};
use crate::logger::SafetyLogger;
use crate::model::Model;
use crate::queue::{AdmissionQueue, QueueItem};
use crate::request::{Allowed, Check, EngineStatus, Request, Response};

enum QueueState<A> {
    Direct,
    Serialized(AdmissionQueue<A>),
    /// The queue was cleared; later proposals are dropped.
    Closed,
}

struct Shared<S, A> {
    config: EngineConfig,
    core: Mutex<Core<S, A>>,
    stamps: StampSource,
    queue: Mutex<QueueState<A>>,
    in_flight: Arc<watch::Sender<usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine<S, A> {
    shared: Arc<Shared<S, A>>,
}

impl<S, A> Clone for Engine<S, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct WeakEngine<S, A>(Weak<Shared<S, A>>);

impl<S, A> WeakEngine<S, A> {
    pub(crate) fn upgrade(&self) -> Option<Engine<S, A>> {
        self.0.upgrade().map(|shared| Engine { shared })
    }
}

/// Counts spawned admission work until dropped.
pub(crate) struct InFlight(Arc<watch::Sender<usize>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl<S, A> Engine<S, A>
where
    S: Clone + Default + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    /// An engine over `S::default()`.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_state(config, S::default())
    }
}

impl<S, A> Engine<S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    /// Build an engine. Synchronized engines start their admission worker on
    /// the current tokio runtime.
    pub fn with_state(config: EngineConfig, state: S) -> Result<Self, EngineError> {
        let core = Core::new(
            &config.instance_name,
            state,
            config.time_travel.is_some(),
            config.max_snapshots(),
        );
        let poll_interval = config.synchronize.poll_interval();
        let handle = match poll_interval {
            Some(_) => Some(Handle::try_current().map_err(|_| EngineError::NoRuntime)?),
            None => None,
        };
        let engine = Self {
            shared: Arc::new(Shared {
                config,
                core: Mutex::new(core),
                stamps: StampSource::new(),
                queue: Mutex::new(QueueState::Direct),
                in_flight: Arc::new(watch::Sender::new(0)),
            }),
        };
        if let (Some(poll_interval), Some(handle)) = (poll_interval, handle) {
            let queue = AdmissionQueue::start(engine.downgrade(), poll_interval, &handle);
            *lock(&engine.shared.queue) = QueueState::Serialized(queue);
        }
        tracing::debug!(
            instance = engine.instance_name(),
            synchronized = engine.is_synchronized(),
            "Engine created"
        );
        Ok(engine)
    }

    fn core(&self) -> MutexGuard<'_, Core<S, A>> {
        lock(&self.shared.core)
    }

    pub(crate) fn downgrade(&self) -> WeakEngine<S, A> {
        WeakEngine(Arc::downgrade(&self.shared))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.shared.config.instance_name
    }

    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.shared.config.synchronize.is_on()
    }

    pub(crate) fn next_stamp(&self) -> Stamp {
        self.shared.stamps.next()
    }

    pub(crate) fn in_flight(&self) -> InFlight {
        self.shared.in_flight.send_modify(|count| *count += 1);
        InFlight(Arc::clone(&self.shared.in_flight))
    }

    // ------------------------------------------------------------------------
    // Model access
    // ------------------------------------------------------------------------

    /// Read the model under the engine lock.
    ///
    /// `f` must not call back into this engine.
    pub fn with_model<R>(&self, f: impl FnOnce(&Model<S>) -> R) -> R {
        f(self.core().model())
    }

    /// Mutate the model outside of a cycle. Nothing is rendered.
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut Model<S>) -> R) -> R {
        f(self.core().model_mut())
    }

    #[must_use]
    pub fn state(&self) -> S {
        self.with_model(|model| model.state().clone())
    }

    #[must_use]
    pub fn trace(&self) -> Trace {
        self.with_model(|model| model.trace().clone())
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.with_model(EngineStatus::of)
    }

    #[must_use]
    pub fn is_allowed(&self, label: &str) -> bool {
        self.with_model(|model| model.is_allowed(label))
    }

    // ------------------------------------------------------------------------
    // Envelope
    // ------------------------------------------------------------------------

    /// Process a request's fields in order: history, initial state,
    /// component, render, travel, logger, check, allow-list, clear queue.
    pub fn apply(&self, request: Request<S, A>) -> Result<Response<S, A>, EngineError> {
        let Request {
            initial_state,
            component,
            render,
            history,
            travel,
            logger,
            check,
            allowed,
            clear_queue,
        } = request;

        let mut core = self.core();
        if let Some(seed) = history {
            core.set_history(seed);
        }
        if let Some(state) = initial_state {
            core.install_state(state);
        }
        let mounted = match component {
            Some(component) => {
                let (name, options) = core.mount(component)?;
                Some(Mounted::new(self.clone(), name, options))
            }
            None => None,
        };
        if let Some(render) = render {
            core.set_render(render);
        }
        if let Some(travel) = travel {
            core.travel(travel);
        }
        if let Some(logger) = logger {
            core.set_logger(logger);
        }
        match check {
            Some(Check::Begin(observer)) => core.begin_check(observer),
            Some(Check::End) => core.end_check(),
            None => {}
        }
        let allowed_actions = match allowed {
            Some(Allowed::Allow(labels)) => {
                core.model_mut().allow(labels);
                None
            }
            Some(Allowed::Clear) => {
                core.model_mut().clear_allowed_actions();
                None
            }
            Some(Allowed::Query) => Some(core.model().allowed_actions().iter().cloned().collect()),
            None => None,
        };
        let status = EngineStatus::of(core.model());
        drop(core);

        if clear_queue {
            self.stop_queue();
        }
        Ok(Response {
            status,
            mounted,
            allowed_actions,
        })
    }

    pub fn add_initial_state(&self, state: S) {
        self.core().install_state(state);
    }

    pub fn add_component(&self, component: Component<S, A>) -> Result<Mounted<S, A>, EngineError> {
        let (name, options) = self.core().mount(component)?;
        Ok(Mounted::new(self.clone(), name, options))
    }

    pub fn set_render<F>(&self, render: F)
    where
        F: FnMut(&Model<S>) + Send + 'static,
    {
        self.core().set_render(Box::new(render));
    }

    pub fn set_history(&self, seed: Vec<S>) {
        self.core().set_history(seed);
    }

    #[must_use]
    pub fn has_history(&self) -> bool {
        self.core().has_history()
    }

    pub fn travel(&self, travel: Travel) {
        self.core().travel(travel);
    }

    pub fn next(&self) {
        self.travel(Travel::Next);
    }

    pub fn last(&self) {
        self.travel(Travel::Last);
    }

    pub fn reset(&self) {
        self.travel(Travel::Reset);
    }

    pub fn set_logger(&self, logger: impl SafetyLogger<S> + 'static) {
        self.core().set_logger(Box::new(logger));
    }

    /// Render trace lines with `format` instead of `label(args) ==> fields`.
    pub fn set_trace_formatter<F>(&self, format: F)
    where
        F: Fn(&ActionLabel, &Value, &Model<S>) -> String + Send + 'static,
    {
        self.core().set_trace_formatter(Box::new(format));
    }

    pub fn begin_check(&self, observer: RenderSink<S>) {
        self.core().begin_check(observer);
    }

    pub fn end_check(&self) {
        self.core().end_check();
    }

    pub fn allow(&self, labels: impl IntoIterator<Item = ActionLabel>) {
        self.core().model_mut().allow(labels);
    }

    pub fn clear_allowed_actions(&self) {
        self.core().model_mut().clear_allowed_actions();
    }

    #[must_use]
    pub fn allowed_actions(&self) -> Vec<ActionLabel> {
        self.with_model(|model| model.allowed_actions().iter().cloned().collect())
    }

    /// Stop serialized admission. Queued and later proposals are dropped.
    pub fn clear_queue(&self) {
        self.stop_queue();
    }

    fn stop_queue(&self) {
        let mut queue = lock(&self.shared.queue);
        match mem::replace(&mut *queue, QueueState::Closed) {
            QueueState::Serialized(admission) => {
                admission.stop();
                tracing::debug!(instance = self.instance_name(), "Admission queue cleared");
            }
            // Direct engines stay direct; a closed queue stays closed.
            other => *queue = other,
        }
    }

    /// Bind an action with default options, outside of any component.
    pub fn intent<Args>(&self, action: Action<A, Args>) -> Result<Intent<S, A, Args>, EngineError>
    where
        Args: Clone + Send + 'static,
    {
        Mounted::detached(self.clone()).intent(action)
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Hand a proposal to the engine.
    ///
    /// Synchronized engines queue it for the admission worker. Otherwise the
    /// cycle runs before this returns, unless asynchronous acceptors match, in
    /// which case it runs on a spawned task once they resolve.
    pub fn present(&self, proposal: Proposal<A>) {
        {
            let queue = lock(&self.shared.queue);
            match &*queue {
                QueueState::Direct => {}
                QueueState::Serialized(admission) => {
                    if admission.push(QueueItem::Proposal(proposal)).is_err() {
                        tracing::debug!(
                            instance = self.instance_name(),
                            "Admission worker gone; proposal dropped"
                        );
                    }
                    return;
                }
                QueueState::Closed => {
                    tracing::debug!(
                        instance = self.instance_name(),
                        "Admission queue cleared; proposal dropped"
                    );
                    return;
                }
            }
        }
        self.admit_now(proposal);
    }

    fn admit_now(&self, proposal: Proposal<A>) {
        let mut pending = VecDeque::from([proposal]);
        while let Some(proposal) = pending.pop_front() {
            let work = self.core().pending_patches(&proposal);
            if work.is_empty() {
                pending.extend(self.core().run(proposal, Vec::new()));
                continue;
            }
            match Handle::try_current() {
                Ok(handle) => {
                    let engine = self.clone();
                    let in_flight = self.in_flight();
                    handle.spawn(async move {
                        let _in_flight = in_flight;
                        engine.admit_with(proposal, work).await;
                    });
                }
                Err(_) => {
                    drop(work);
                    let error = ProposalError::new("asynchronous acceptors require a tokio runtime");
                    pending.extend(self.core().run(Proposal::error(error), Vec::new()));
                }
            }
        }
    }

    /// Admit a proposal and everything it schedules, awaiting asynchronous
    /// acceptors in place.
    pub(crate) async fn admit(&self, proposal: Proposal<A>) {
        let work = self.core().pending_patches(&proposal);
        self.admit_with(proposal, work).await;
    }

    async fn admit_with(&self, proposal: Proposal<A>, work: Vec<PendingPatch<S>>) {
        let patches = resolve(work).await;
        let mut pending: VecDeque<_> = self.core().run(proposal, patches).into();
        while let Some(proposal) = pending.pop_front() {
            let work = self.core().pending_patches(&proposal);
            let patches = resolve(work).await;
            pending.extend(self.core().run(proposal, patches));
        }
    }

    /// Wait until queued proposals and spawned admission work have finished.
    pub async fn settle(&self) {
        let mut in_flight = self.shared.in_flight.subscribe();
        let _ = in_flight.wait_for(|count| *count == 0).await;

        let barrier = {
            let queue = lock(&self.shared.queue);
            match &*queue {
                QueueState::Serialized(admission) => {
                    let (done, wait) = oneshot::channel();
                    admission.push(QueueItem::Barrier(done)).ok().map(|()| wait)
                }
                QueueState::Direct | QueueState::Closed => None,
            }
        };
        if let Some(wait) = barrier {
            let _ = wait.await;
        }
    }
}

async fn resolve<S>(work: Vec<PendingPatch<S>>) -> Vec<PatchResult<S>> {
    if work.is_empty() {
        return Vec::new();
    }
    let (slots, futures): (Vec<_>, Vec<_>) = work.into_iter().unzip();
    slots.into_iter().zip(join_all(futures).await).collect()
}
