//! Brute-force explorer for liveness and safety properties.
//!
//! The checker replays every sequence of registered intents of a fixed length,
//! with every combination of their argument choices, against a live engine.
//! Before each replay it resets the application and clears the trace. The
//! engine's render sink is swapped for an observer that evaluates the liveness and
//! safety predicates on the render of the final step and records the trace
//! that led there.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod sequence;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;

use sam_config::CheckerConfig;
use sam_engine::{Engine, Intent, Model, RenderSink};
use sam_types::{ActionLabel, Proposal, Trace};

pub use sequence::{ArgumentOdometer, sequences};

// ============================================================================
// Options and results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// Exact length of every replayed sequence.
    pub depth_max: usize,
    pub no_duplicate_action: bool,
    pub do_not_start_with: Vec<ActionLabel>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckerConfig::default().into()
    }
}

impl From<CheckerConfig> for CheckOptions {
    fn from(config: CheckerConfig) -> Self {
        Self {
            depth_max: config.depth_max,
            no_duplicate_action: config.no_duplicate_action,
            do_not_start_with: config
                .do_not_start_with
                .into_iter()
                .filter_map(|label| ActionLabel::new(label).ok())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// The liveness predicate held after the final step.
    Liveness(Trace),
    /// The safety predicate was violated after the final step.
    Safety(Trace),
}

impl Finding {
    #[must_use]
    pub fn trace(&self) -> &Trace {
        match self {
            Self::Liveness(trace) | Self::Safety(trace) => trace,
        }
    }

    #[must_use]
    pub fn is_liveness(&self) -> bool {
        matches!(self, Self::Liveness(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
    pub replays: usize,
}

impl CheckReport {
    pub fn liveness(&self) -> impl Iterator<Item = &Trace> {
        self.findings
            .iter()
            .filter(|finding| finding.is_liveness())
            .map(Finding::trace)
    }

    pub fn safety(&self) -> impl Iterator<Item = &Trace> {
        self.findings
            .iter()
            .filter(|finding| !finding.is_liveness())
            .map(Finding::trace)
    }
}

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Intent {label} has no argument choices")]
    NoArgumentChoices { label: ActionLabel },
    #[error("Search space does not fit in memory")]
    SearchSpaceTooLarge,
    #[error("Synchronized engines render asynchronously and cannot be checked")]
    SynchronizedEngine,
}

// ============================================================================
// Intent descriptors
// ============================================================================

/// An intent as the checker sees it: a label and a finite set of arguments.
pub trait CheckIntent {
    fn label(&self) -> &ActionLabel;
    fn choice_count(&self) -> usize;
    /// Invoke with the argument at `choice`.
    fn invoke(&self, choice: usize);
}

pub struct IntentDescriptor<Args> {
    label: ActionLabel,
    choices: Vec<Args>,
    invoke: Box<dyn Fn(&Args)>,
}

impl<Args: 'static> IntentDescriptor<Args> {
    pub fn new(label: ActionLabel, choices: Vec<Args>, invoke: impl Fn(&Args) + 'static) -> Self {
        Self {
            label,
            choices,
            invoke: Box::new(invoke),
        }
    }

    /// Describe an engine intent; each replay step calls [`Intent::invoke`].
    pub fn from_intent<S, A>(intent: Intent<S, A, Args>, choices: Vec<Args>) -> Self
    where
        S: Clone + Serialize + Send + 'static,
        A: Serialize + Send + 'static,
        Args: Clone + Send,
    {
        let label = intent.label().clone();
        Self::new(label, choices, move |args: &Args| intent.invoke(args.clone()))
    }
}

impl<Args> CheckIntent for IntentDescriptor<Args> {
    fn label(&self) -> &ActionLabel {
        &self.label
    }

    fn choice_count(&self) -> usize {
        self.choices.len()
    }

    fn invoke(&self, choice: usize) {
        if let Some(args) = self.choices.get(choice) {
            (self.invoke)(args);
        }
    }
}

// ============================================================================
// Checker
// ============================================================================

type Predicate<S> = Arc<dyn Fn(&Model<S>) -> bool + Send + Sync>;

#[derive(Default)]
struct Observer {
    armed: bool,
    findings: Vec<Finding>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restores the engine's render sink when dropped.
struct Session<'a, S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    engine: &'a Engine<S, A>,
}

impl<S, A> Drop for Session<'_, S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    fn drop(&mut self) {
        self.engine.end_check();
    }
}

pub struct Checker<S, A> {
    engine: Engine<S, A>,
    intents: Vec<Box<dyn CheckIntent>>,
    reset: Box<dyn FnMut(&Engine<S, A>)>,
    liveness: Option<Predicate<S>>,
    safety: Option<Predicate<S>>,
    options: CheckOptions,
    on_liveness: Option<Box<dyn FnMut(&Trace)>>,
    on_safety: Option<Box<dyn FnMut(&Trace)>>,
}

impl<S, A> Checker<S, A>
where
    S: Clone + Serialize + Send + 'static,
    A: Serialize + Send + 'static,
{
    /// `reset` brings the application back to its starting state before
    /// each replay.
    #[must_use]
    pub fn new(engine: Engine<S, A>, reset: impl FnMut(&Engine<S, A>) + 'static) -> Self {
        Self {
            engine,
            intents: Vec::new(),
            reset: Box::new(reset),
            liveness: None,
            safety: None,
            options: CheckOptions::default(),
            on_liveness: None,
            on_safety: None,
        }
    }

    #[must_use]
    pub fn intent(mut self, intent: impl CheckIntent + 'static) -> Self {
        self.intents.push(Box::new(intent));
        self
    }

    #[must_use]
    pub fn liveness(mut self, holds: impl Fn(&Model<S>) -> bool + Send + Sync + 'static) -> Self {
        self.liveness = Some(Arc::new(holds));
        self
    }

    /// `violated` returns true when the model is in a forbidden state.
    #[must_use]
    pub fn safety(mut self, violated: impl Fn(&Model<S>) -> bool + Send + Sync + 'static) -> Self {
        self.safety = Some(Arc::new(violated));
        self
    }

    #[must_use]
    pub fn options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn on_liveness(mut self, callback: impl FnMut(&Trace) + 'static) -> Self {
        self.on_liveness = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_safety(mut self, callback: impl FnMut(&Trace) + 'static) -> Self {
        self.on_safety = Some(Box::new(callback));
        self
    }

    /// Number of replays [`Checker::run`] would perform.
    pub fn search_space(&self) -> Result<usize, CheckerError> {
        if let Some(intent) = self.intents.iter().find(|intent| intent.choice_count() == 0) {
            return Err(CheckerError::NoArgumentChoices {
                label: intent.label().clone(),
            });
        }
        self.plan().iter().try_fold(0_usize, |total, radices| {
            ArgumentOdometer::count_for(radices)
                .and_then(|count| total.checked_add(count))
                .ok_or(CheckerError::SearchSpaceTooLarge)
        })
    }

    fn labels(&self) -> Vec<ActionLabel> {
        self.intents.iter().map(|intent| intent.label().clone()).collect()
    }

    fn plan(&self) -> Vec<Vec<usize>> {
        sequences(&self.labels(), &self.options)
            .iter()
            .map(|sequence| {
                sequence
                    .iter()
                    .map(|&index| self.intents[index].choice_count())
                    .collect()
            })
            .collect()
    }

    /// Replay every candidate and collect findings in enumeration order.
    ///
    /// Input is validated before the first replay. The engine's own render
    /// sink is restored when this returns.
    pub fn run(&mut self) -> Result<CheckReport, CheckerError> {
        if self.engine.is_synchronized() {
            return Err(CheckerError::SynchronizedEngine);
        }
        let planned = self.search_space()?;
        tracing::debug!(
            instance = self.engine.instance_name(),
            intents = self.intents.len(),
            depth = self.options.depth_max,
            replays = planned,
            "Starting check"
        );

        let observer = Arc::new(Mutex::new(Observer::default()));
        self.engine.begin_check(self.observer_sink(Arc::clone(&observer)));
        let session = Session {
            engine: &self.engine,
        };

        let mut report = CheckReport::default();
        for sequence in sequences(&self.labels(), &self.options) {
            let radices: Vec<usize> = sequence
                .iter()
                .map(|&index| self.intents[index].choice_count())
                .collect();
            for digits in ArgumentOdometer::new(radices) {
                (self.reset)(session.engine);
                session.engine.present(Proposal::clear_trace());

                let last = sequence.len() - 1;
                for (step, (&intent, &choice)) in sequence.iter().zip(&digits).enumerate() {
                    if step == last {
                        lock(&observer).armed = true;
                    }
                    self.intents[intent].invoke(choice);
                }

                let findings = {
                    let mut observer = lock(&observer);
                    observer.armed = false;
                    std::mem::take(&mut observer.findings)
                };
                report.replays += 1;
                for finding in findings {
                    let callback = match &finding {
                        Finding::Liveness(_) => self.on_liveness.as_mut(),
                        Finding::Safety(_) => self.on_safety.as_mut(),
                    };
                    if let Some(callback) = callback {
                        callback(finding.trace());
                    }
                    report.findings.push(finding);
                }
            }
        }
        drop(session);

        tracing::debug!(
            instance = self.engine.instance_name(),
            replays = report.replays,
            findings = report.findings.len(),
            "Check finished"
        );
        Ok(report)
    }

    fn observer_sink(&self, observer: Arc<Mutex<Observer>>) -> RenderSink<S> {
        let liveness = self.liveness.clone();
        let safety = self.safety.clone();
        Box::new(move |model: &Model<S>| {
            let mut observer = lock(&observer);
            if !observer.armed {
                return;
            }
            observer.armed = false;
            if liveness.as_ref().is_some_and(|holds| holds(model)) {
                observer.findings.push(Finding::Liveness(model.trace().clone()));
            }
            if safety.as_ref().is_some_and(|violated| violated(model)) {
                observer.findings.push(Finding::Safety(model.trace().clone()));
            }
        })
    }
}
