//! Intents: actions bound to an engine with admission control.
//!
//! An [`Action`] turns arguments into an action value, synchronously or
//! asynchronously, and may fail. Mounting it through a component's [`Mounted`]
//! handle yields an [`Intent`], which decides whether an invocation is admitted
//! (allow-list, debounce), retries failures, stamps proposals for out-of-order
//! rejection, and finally presents the proposal.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{self, Instant};

use sam_types::{ActionLabel, ComponentName, Proposal, ProposalError, Stamp};

use crate::EngineError;
use crate::component::ComponentOptions;
use crate::engine::Engine;

/// Future returned by an asynchronous action.
pub type ActionFuture<A> = BoxFuture<'static, anyhow::Result<A>>;

type SyncFn<A, Args> = Arc<dyn Fn(Args) -> anyhow::Result<A> + Send + Sync>;
type AsyncFn<A, Args> = Arc<dyn Fn(Args) -> ActionFuture<A> + Send + Sync>;

enum ActionKind<A, Args> {
    Sync(SyncFn<A, Args>),
    Async(AsyncFn<A, Args>),
}

impl<A, Args> Clone for ActionKind<A, Args> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// A labeled function from arguments to an action value.
pub struct Action<A, Args> {
    label: ActionLabel,
    traced: bool,
    kind: ActionKind<A, Args>,
}

impl<A, Args> Action<A, Args> {
    pub fn new<F>(label: ActionLabel, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        Self {
            label,
            traced: true,
            kind: ActionKind::Sync(Arc::new(f)),
        }
    }

    pub fn new_async<F>(label: ActionLabel, f: F) -> Self
    where
        F: Fn(Args) -> ActionFuture<A> + Send + Sync + 'static,
    {
        Self {
            label,
            traced: true,
            kind: ActionKind::Async(Arc::new(f)),
        }
    }

    /// Present proposals without an action tag; they leave no trace entry.
    #[must_use]
    pub fn untraced(mut self) -> Self {
        self.traced = false;
        self
    }

    #[must_use]
    pub fn label(&self) -> &ActionLabel {
        &self.label
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.kind, ActionKind::Async(_))
    }
}

impl<A, Args> Clone for Action<A, Args> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            traced: self.traced,
            kind: self.kind.clone(),
        }
    }
}

impl<A, Args> fmt::Debug for Action<A, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label)
            .field("traced", &self.traced)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Handle returned when a component is mounted; binds its actions.
pub struct Mounted<S, A> {
    engine: Engine<S, A>,
    name: Option<ComponentName>,
    options: ComponentOptions,
    order: Option<Arc<AsyncMutex<()>>>,
}

impl<S, A> Clone for Mounted<S, A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            name: self.name.clone(),
            options: self.options.clone(),
            order: self.order.clone(),
        }
    }
}

impl<S, A> Mounted<S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    pub(crate) fn new(engine: Engine<S, A>, name: Option<ComponentName>, options: ComponentOptions) -> Self {
        let order = options
            .serialized_order
            .then(|| Arc::new(AsyncMutex::new(())));
        Self {
            engine,
            name,
            options,
            order,
        }
    }

    pub(crate) fn detached(engine: Engine<S, A>) -> Self {
        Self::new(engine, None, ComponentOptions::default())
    }

    #[must_use]
    pub fn name(&self) -> Option<&ComponentName> {
        self.name.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &ComponentOptions {
        &self.options
    }

    #[must_use]
    pub fn engine(&self) -> &Engine<S, A> {
        &self.engine
    }

    /// Wrap `action` with this component's admission options.
    pub fn intent<Args>(&self, action: Action<A, Args>) -> Result<Intent<S, A, Args>, EngineError>
    where
        Args: Clone + Send + 'static,
    {
        if action.is_async() && !self.engine.config().asynchronous_actions {
            return Err(EngineError::AsyncActionsDisabled {
                instance: self.engine.instance_name().to_string(),
                label: action.label,
            });
        }
        Ok(Intent {
            inner: Arc::new(IntentInner {
                engine: self.engine.clone(),
                action,
                options: self.options.clone(),
                order: self.order.clone(),
                admission: Mutex::new(Admission::default()),
            }),
        })
    }
}

#[derive(Debug, Default)]
struct Admission {
    /// End of the current debounce window.
    window_end: Option<Instant>,
    /// Consecutive failures since the last success.
    failures: u32,
}

struct IntentInner<S, A, Args> {
    engine: Engine<S, A>,
    action: Action<A, Args>,
    options: ComponentOptions,
    order: Option<Arc<AsyncMutex<()>>>,
    admission: Mutex<Admission>,
}

/// A callable, cloneable binding of an action to an engine.
pub struct Intent<S, A, Args> {
    inner: Arc<IntentInner<S, A, Args>>,
}

impl<S, A, Args> Clone for Intent<S, A, Args> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, Args> Intent<S, A, Args>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
    Args: Clone + Send + 'static,
{
    #[must_use]
    pub fn label(&self) -> &ActionLabel {
        &self.inner.action.label
    }

    /// Fire and forget.
    ///
    /// Synchronous actions make their first attempt before this returns; a
    /// delayed retry continues in the background. Asynchronous actions are
    /// spawned on the current runtime; without one an error is presented.
    pub fn invoke(&self, args: Args) {
        match &self.inner.action.kind {
            ActionKind::Sync(f) => {
                if let Some(stamp) = self.admit() {
                    self.run_sync(f, args, stamp);
                }
            }
            ActionKind::Async(_) => match Handle::try_current() {
                Ok(handle) => {
                    let intent = self.clone();
                    let in_flight = self.inner.engine.in_flight();
                    handle.spawn(async move {
                        let _in_flight = in_flight;
                        intent.dispatch(args).await;
                    });
                }
                Err(_) => self.present_error(ProposalError::new(format!(
                    "asynchronous action {} requires a tokio runtime",
                    self.label()
                ))),
            },
        }
    }

    /// Run the action and hand its proposal to the engine.
    ///
    /// With `serialized_order`, dispatches of the same component wait for
    /// each other in call order.
    pub async fn dispatch(&self, args: Args) {
        let _order = match &self.inner.order {
            Some(order) => Some(Arc::clone(order).lock_owned().await),
            None => None,
        };
        let Some(stamp) = self.admit() else {
            return;
        };
        self.run_dispatched(args, stamp).await;
    }

    /// Admission checks. `Some` carries the stamp to attach, if any.
    fn admit(&self) -> Option<Option<Stamp>> {
        let inner = &*self.inner;
        let label = &inner.action.label;
        if !inner.engine.is_allowed(label.as_str()) {
            tracing::debug!(
                instance = inner.engine.instance_name(),
                action = %label,
                "Action not in allow-list"
            );
            self.present_error(ProposalError::unexpected_action(label));
            return None;
        }

        let window = inner.options.debounce;
        if !window.is_zero() {
            let now = Instant::now();
            let mut admission = self.admission();
            if admission.window_end.is_some_and(|end| now < end) {
                tracing::debug!(
                    instance = inner.engine.instance_name(),
                    action = %label,
                    "Debounced"
                );
                return None;
            }
            admission.window_end = Some(now + window);
        }

        Some(
            inner
                .options
                .ignore_outdated_proposals
                .then(|| inner.engine.next_stamp()),
        )
    }

    /// Retries wait out the policy delay on a task spawned on the current
    /// runtime, which counts as in flight until the last attempt presents.
    /// Without a runtime the retry runs immediately.
    fn run_sync(&self, f: &SyncFn<A, Args>, args: Args, stamp: Option<Stamp>) {
        loop {
            let err = match f(args.clone()) {
                Ok(action) => return self.succeed(action, stamp),
                Err(err) => err,
            };
            if !self.should_retry(&err) {
                return self.fail(&err);
            }
            let delay = self.retry_delay();
            if delay.is_zero() {
                continue;
            }
            let Ok(handle) = Handle::try_current() else {
                continue;
            };
            let intent = self.clone();
            let f = Arc::clone(f);
            let in_flight = self.inner.engine.in_flight();
            handle.spawn(async move {
                let _in_flight = in_flight;
                time::sleep(delay).await;
                intent.run_sync(&f, args, stamp);
            });
            return;
        }
    }

    async fn run_dispatched(&self, args: Args, stamp: Option<Stamp>) {
        loop {
            let result = match &self.inner.action.kind {
                ActionKind::Sync(f) => f(args.clone()),
                ActionKind::Async(f) => f(args.clone()).await,
            };
            match result {
                Ok(action) => return self.succeed(action, stamp),
                Err(err) => {
                    if !self.should_retry(&err) {
                        return self.fail(&err);
                    }
                    time::sleep(self.retry_delay()).await;
                }
            }
        }
    }

    fn retry_delay(&self) -> Duration {
        self.inner
            .options
            .retry
            .map_or(Duration::ZERO, |policy| policy.delay())
    }

    fn should_retry(&self, err: &anyhow::Error) -> bool {
        let Some(policy) = self.inner.options.retry else {
            return false;
        };
        let mut admission = self.admission();
        admission.failures += 1;
        if admission.failures < policy.max() {
            tracing::debug!(
                instance = self.inner.engine.instance_name(),
                action = %self.label(),
                attempt = admission.failures,
                "Retrying after failure: {err:#}"
            );
            true
        } else {
            admission.failures = 0;
            false
        }
    }

    fn succeed(&self, action: A, stamp: Option<Stamp>) {
        self.admission().failures = 0;
        let mut proposal = Proposal::action(action);
        if self.inner.action.traced {
            proposal = proposal.named(self.label().clone());
        }
        if let Some(stamp) = stamp {
            proposal = proposal.stamped(stamp);
        }
        self.inner.engine.present(proposal);
    }

    fn fail(&self, err: &anyhow::Error) {
        self.present_error(ProposalError::new(format!("{err:#}")));
    }

    fn present_error(&self, error: ProposalError) {
        self.inner.engine.present(Proposal::error(error));
    }

    fn admission(&self) -> MutexGuard<'_, Admission> {
        self.inner
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, A, Args> fmt::Debug for Intent<S, A, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intent")
            .field("action", &self.inner.action)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
