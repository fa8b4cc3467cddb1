//! Component registration: acceptors, reactors, guards, and intent options.
//!
//! A [`Component`] is a bundle of behavior mounted onto an engine. Its pieces
//! run inside every cycle in registration order, across all components:
//!
//! - acceptors mutate the model in response to a proposal's action
//! - reactors recompute derived state
//! - guards (safety conditions first, then next-action predicates) inspect the
//!   result and may suppress the render or roll the model back
//!
//! A named component may carry its own local state. Local acceptors and
//! reactors see that state mutably and the parent model's state read-only.

use std::time::Duration;

use futures_util::future::BoxFuture;

use sam_types::value::non_zero;
use sam_types::{ComponentName, Proposal};

use crate::EngineError;
use crate::model::{Local, LocalState, Model, downcast_mut};

/// Deferred mutation produced by an asynchronous acceptor.
pub type Patch<S> = Box<dyn FnOnce(&mut S) + Send>;

pub(crate) type SharedAcceptor<S, A> = Box<dyn FnMut(&mut Model<S>, &A) -> anyhow::Result<()> + Send>;
pub(crate) type LocalAcceptor<S, A> =
    Box<dyn FnMut(&mut dyn LocalState, &S, &A) -> anyhow::Result<()> + Send>;
pub(crate) type AsyncAcceptor<S, A> =
    Box<dyn Fn(&A) -> Option<BoxFuture<'static, anyhow::Result<Patch<S>>>> + Send>;
pub(crate) type SharedReactor<S> = Box<dyn FnMut(&mut Model<S>) -> anyhow::Result<()> + Send>;
pub(crate) type LocalReactor<S> = Box<dyn FnMut(&mut dyn LocalState, &S) -> anyhow::Result<()> + Send>;
pub(crate) type NapFn<S, A> = Box<dyn FnMut(&Model<S>) -> Nap<A> + Send>;
pub(crate) type SafetyFn<S> = Box<dyn Fn(&Model<S>) -> bool + Send>;

/// Outcome of a next-action predicate.
#[derive(Debug)]
pub enum Nap<A> {
    Continue,
    /// Skip this cycle's render.
    Suppress,
    /// Skip this cycle's render and present `proposal` once the cycle ends.
    Next(Proposal<A>),
}

/// Bounded re-run of a failing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max` counts failed attempts; zero is treated as one.
    #[must_use]
    pub fn new(max: u32, delay: Duration) -> Self {
        Self {
            max: non_zero(u64::from(max), 1) as u32,
            delay,
        }
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Admission options applied to every intent of a component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOptions {
    /// Zero disables debouncing.
    pub debounce: Duration,
    pub retry: Option<RetryPolicy>,
    pub ignore_outdated_proposals: bool,
    /// Run this component's dispatches one at a time, in call order.
    pub serialized_order: bool,
}

impl ComponentOptions {
    #[must_use]
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    #[must_use]
    pub fn ignore_outdated_proposals(mut self) -> Self {
        self.ignore_outdated_proposals = true;
        self
    }

    #[must_use]
    pub fn serialized_order(mut self) -> Self {
        self.serialized_order = true;
        self
    }
}

pub(crate) enum AcceptorKind<S, A> {
    Shared(SharedAcceptor<S, A>),
    Local(LocalAcceptor<S, A>),
    Async(AsyncAcceptor<S, A>),
}

pub(crate) enum ReactorKind<S> {
    Shared(SharedReactor<S>),
    Local(LocalReactor<S>),
}

pub(crate) enum Guard<S, A> {
    Safety { name: String, violated: SafetyFn<S> },
    Nap(NapFn<S, A>),
}

pub struct Component<S, A> {
    name: Option<String>,
    local: Option<Box<dyn LocalState>>,
    acceptors: Vec<AcceptorKind<S, A>>,
    reactors: Vec<ReactorKind<S>>,
    safety: Vec<Guard<S, A>>,
    naps: Vec<Guard<S, A>>,
    options: ComponentOptions,
    needs_name: bool,
}

impl<S, A> Default for Component<S, A> {
    fn default() -> Self {
        Self {
            name: None,
            local: None,
            acceptors: Vec::new(),
            reactors: Vec::new(),
            safety: Vec::new(),
            naps: Vec::new(),
            options: ComponentOptions::default(),
            needs_name: false,
        }
    }
}

impl<S: 'static, A: 'static> Component<S, A> {
    /// An anonymous component working on the shared model only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A component owning `local` under `name`.
    #[must_use]
    pub fn named<L: LocalState>(name: impl Into<String>, local: L) -> Self {
        Self {
            name: Some(name.into()),
            local: Some(Box::new(local)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn acceptor<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Model<S>, &A) -> anyhow::Result<()> + Send + 'static,
    {
        self.acceptors.push(AcceptorKind::Shared(Box::new(f)));
        self
    }

    #[must_use]
    pub fn local_acceptor<L, F>(mut self, mut f: F) -> Self
    where
        L: LocalState,
        F: FnMut(Local<'_, S, L>, &A) -> anyhow::Result<()> + Send + 'static,
    {
        self.needs_name = true;
        self.acceptors.push(AcceptorKind::Local(Box::new(
            move |local: &mut dyn LocalState, parent: &S, action: &A| {
                let state = downcast_mut::<L>(local)?;
                f(Local::new(state, parent), action)
            },
        )));
        self
    }

    /// An acceptor whose work completes later.
    ///
    /// Returns `None` for actions it ignores. The engine awaits every matched
    /// future before the cycle starts and applies the resulting patches in
    /// registration order.
    #[must_use]
    pub fn async_acceptor<F>(mut self, f: F) -> Self
    where
        F: Fn(&A) -> Option<BoxFuture<'static, anyhow::Result<Patch<S>>>> + Send + 'static,
    {
        self.acceptors.push(AcceptorKind::Async(Box::new(f)));
        self
    }

    #[must_use]
    pub fn reactor<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Model<S>) -> anyhow::Result<()> + Send + 'static,
    {
        self.reactors.push(ReactorKind::Shared(Box::new(f)));
        self
    }

    #[must_use]
    pub fn local_reactor<L, F>(mut self, mut f: F) -> Self
    where
        L: LocalState,
        F: FnMut(Local<'_, S, L>) -> anyhow::Result<()> + Send + 'static,
    {
        self.needs_name = true;
        self.reactors.push(ReactorKind::Local(Box::new(
            move |local: &mut dyn LocalState, parent: &S| {
                let state = downcast_mut::<L>(local)?;
                f(Local::new(state, parent))
            },
        )));
        self
    }

    #[must_use]
    pub fn nap<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Model<S>) -> Nap<A> + Send + 'static,
    {
        self.naps.push(Guard::Nap(Box::new(f)));
        self
    }

    /// `violated` returns true when the model is in a forbidden state.
    #[must_use]
    pub fn safety<F>(mut self, name: impl Into<String>, violated: F) -> Self
    where
        F: Fn(&Model<S>) -> bool + Send + 'static,
    {
        self.safety.push(Guard::Safety {
            name: name.into(),
            violated: Box::new(violated),
        });
        self
    }

    #[must_use]
    pub fn options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn into_parts(self) -> Result<ComponentParts<S, A>, EngineError> {
        let name = match self.name {
            Some(name) => Some(ComponentName::new(name).map_err(|_| EngineError::EmptyComponentName)?),
            None if self.needs_name => return Err(EngineError::UnnamedComponent),
            None => None,
        };
        let mut guards = self.safety;
        guards.extend(self.naps);
        Ok(ComponentParts {
            name,
            local: self.local,
            acceptors: self.acceptors,
            reactors: self.reactors,
            guards,
            options: self.options,
        })
    }
}

pub(crate) struct ComponentParts<S, A> {
    pub name: Option<ComponentName>,
    pub local: Option<Box<dyn LocalState>>,
    pub acceptors: Vec<AcceptorKind<S, A>>,
    pub reactors: Vec<ReactorKind<S>>,
    pub guards: Vec<Guard<S, A>>,
    pub options: ComponentOptions,
}
