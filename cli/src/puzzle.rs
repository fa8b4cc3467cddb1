//! Two-container water puzzle: measure exactly `goal` units with a 3 and a 5.

use serde::Serialize;

use sam_checker::{CheckOptions, Checker, IntentDescriptor};
use sam_engine::{Action, ActionLabel, Component, Engine, EngineConfig, EngineError, Intent};

pub const FILL: ActionLabel = ActionLabel::from_static("fill");
pub const EMPTY: ActionLabel = ActionLabel::from_static("empty");
pub const TRANSFER: ActionLabel = ActionLabel::from_static("transfer");

/// The known six-step solution.
pub const SOLUTION: [Pour; 6] = [
    Pour::Fill(1),
    Pour::Transfer(1, 0),
    Pour::Empty(0),
    Pour::Transfer(1, 0),
    Pour::Fill(1),
    Pour::Transfer(1, 0),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Jugs {
    pub jugs: Vec<u32>,
    pub capacity: Vec<u32>,
    pub goal: u32,
}

impl Default for Jugs {
    fn default() -> Self {
        Self {
            jugs: vec![0, 0],
            capacity: vec![3, 5],
            goal: 4,
        }
    }
}

impl Jugs {
    #[must_use]
    pub fn goal_reached(&self) -> bool {
        self.jugs.contains(&self.goal)
    }

    #[must_use]
    pub fn overflowing(&self) -> bool {
        self.jugs
            .iter()
            .zip(&self.capacity)
            .any(|(content, capacity)| content > capacity)
    }

    /// Out-of-range indices and transfers onto the same container do nothing.
    pub fn pour(&mut self, pour: &Pour) {
        let n = self.jugs.len();
        match *pour {
            Pour::Fill(jug) if jug < n => self.jugs[jug] = self.capacity[jug],
            Pour::Empty(jug) if jug < n => self.jugs[jug] = 0,
            Pour::Transfer(from, to) if from != to && from < n && to < n => {
                let room = self.capacity[to].saturating_sub(self.jugs[to]);
                let moved = room.min(self.jugs[from]);
                self.jugs[from] -= moved;
                self.jugs[to] += moved;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pour {
    Fill(usize),
    Empty(usize),
    Transfer(usize, usize),
}

/// An engine wired with the pouring component and its three intents.
#[derive(Clone)]
pub struct Puzzle {
    pub engine: Engine<Jugs, Pour>,
    pub fill: Intent<Jugs, Pour, usize>,
    pub empty: Intent<Jugs, Pour, usize>,
    pub transfer: Intent<Jugs, Pour, (usize, usize)>,
}

impl Puzzle {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let engine = Engine::new(config)?;
        let pouring = Component::<Jugs, Pour>::new().acceptor(|model, pour| {
            model.pour(pour);
            Ok(())
        });
        let mounted = engine.add_component(pouring)?;

        Ok(Self {
            fill: mounted.intent(Action::new(FILL, |jug: usize| Ok(Pour::Fill(jug))))?,
            empty: mounted.intent(Action::new(EMPTY, |jug: usize| Ok(Pour::Empty(jug))))?,
            transfer: mounted.intent(Action::new(TRANSFER, |(from, to): (usize, usize)| {
                Ok(Pour::Transfer(from, to))
            }))?,
            engine,
        })
    }

    pub fn invoke(&self, pour: Pour) {
        match pour {
            Pour::Fill(jug) => self.fill.invoke(jug),
            Pour::Empty(jug) => self.empty.invoke(jug),
            Pour::Transfer(from, to) => self.transfer.invoke((from, to)),
        }
    }

    /// Search bounds used when the config has no `[checker]` section.
    #[must_use]
    pub fn check_options() -> CheckOptions {
        CheckOptions {
            depth_max: 6,
            no_duplicate_action: true,
            do_not_start_with: vec![EMPTY, TRANSFER],
        }
    }

    /// A checker that looks for the goal and for overflowing containers.
    #[must_use]
    pub fn checker(&self, options: CheckOptions) -> Checker<Jugs, Pour> {
        let empty = self.empty.clone();
        let reset = move |_: &Engine<Jugs, Pour>| {
            empty.invoke(0);
            empty.invoke(1);
        };
        Checker::new(self.engine.clone(), reset)
            .intent(IntentDescriptor::from_intent(self.fill.clone(), vec![0, 1]))
            .intent(IntentDescriptor::from_intent(self.empty.clone(), vec![0, 1]))
            .intent(IntentDescriptor::from_intent(
                self.transfer.clone(),
                vec![(0, 1), (1, 0)],
            ))
            .liveness(|model| model.goal_reached())
            .safety(|model| model.overflowing())
            .options(options)
    }
}
