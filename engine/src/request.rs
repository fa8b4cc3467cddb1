//! Operation envelope: one request carrying any mix of configuration steps.

use sam_types::ActionLabel;

use crate::component::Component;
use crate::cycle::{RenderSink, Travel};
use crate::intent::Mounted;
use crate::logger::SafetyLogger;
use crate::model::Model;

/// Render-sink swap used while a checker runs.
pub enum Check<S> {
    /// Park the current sink and render into `observer` instead.
    Begin(RenderSink<S>),
    /// Restore the parked sink.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed {
    /// Extend the allow-list.
    Allow(Vec<ActionLabel>),
    Clear,
    /// Report the allow-list in the response.
    Query,
}

/// Every field is optional. [`Engine::apply`](crate::Engine::apply) processes
/// them in declaration order, except that `history` is installed before
/// `initial_state`.
pub struct Request<S, A> {
    pub initial_state: Option<S>,
    pub component: Option<Component<S, A>>,
    pub render: Option<RenderSink<S>>,
    pub history: Option<Vec<S>>,
    pub travel: Option<Travel>,
    pub logger: Option<Box<dyn SafetyLogger<S>>>,
    pub check: Option<Check<S>>,
    pub allowed: Option<Allowed>,
    pub clear_queue: bool,
}

impl<S, A> Default for Request<S, A> {
    fn default() -> Self {
        Self {
            initial_state: None,
            component: None,
            render: None,
            history: None,
            travel: None,
            logger: None,
            check: None,
            allowed: None,
            clear_queue: false,
        }
    }
}

impl<S, A> Request<S, A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    #[must_use]
    pub fn component(mut self, component: Component<S, A>) -> Self {
        self.component = Some(component);
        self
    }

    #[must_use]
    pub fn render<F>(mut self, render: F) -> Self
    where
        F: FnMut(&Model<S>) + Send + 'static,
    {
        self.render = Some(Box::new(render));
        self
    }

    #[must_use]
    pub fn history(mut self, seed: Vec<S>) -> Self {
        self.history = Some(seed);
        self
    }

    #[must_use]
    pub fn travel(mut self, travel: Travel) -> Self {
        self.travel = Some(travel);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: impl SafetyLogger<S> + 'static) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    #[must_use]
    pub fn check(mut self, check: Check<S>) -> Self {
        self.check = Some(check);
        self
    }

    #[must_use]
    pub fn allowed(mut self, allowed: Allowed) -> Self {
        self.allowed = Some(allowed);
        self
    }

    #[must_use]
    pub fn clear_queue(mut self) -> Self {
        self.clear_queue = true;
        self
    }
}

/// Model flags reported after every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub has_next: bool,
    pub has_error: bool,
    pub error_message: Option<String>,
}

impl EngineStatus {
    pub(crate) fn of<S>(model: &Model<S>) -> Self {
        Self {
            has_next: model.has_next(),
            has_error: model.has_error(),
            error_message: model.error_message().map(str::to_owned),
        }
    }
}

pub struct Response<S, A> {
    pub status: EngineStatus,
    /// Set when the request mounted a component.
    pub mounted: Option<Mounted<S, A>>,
    /// Set when the request queried the allow-list.
    pub allowed_actions: Option<Vec<ActionLabel>>,
}
