//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde::Serialize;

use sam::puzzle::{Jugs, Puzzle};
use sam_engine::{Component, Engine, EngineConfig};

/// A sync-only puzzle engine, the way the checker needs it.
pub fn puzzle() -> Puzzle {
    Puzzle::new(EngineConfig::named("dieharder").synchronous()).expect("puzzle engine")
}

pub fn puzzle_with_history(max_snapshots: usize) -> Puzzle {
    Puzzle::new(
        EngineConfig::named("dieharder")
            .synchronous()
            .with_max_snapshots(max_snapshots),
    )
    .expect("puzzle engine")
}

/// Record the containers seen by every render.
pub fn record_renders(puzzle: &Puzzle) -> Arc<Mutex<Vec<Vec<u32>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    puzzle
        .engine
        .set_render(move |model| sink.lock().unwrap().push(model.jugs.clone()));
    seen
}

pub fn jugs(puzzle: &Puzzle) -> Vec<u32> {
    puzzle.engine.with_model(|model| model.jugs.clone())
}

pub fn state(puzzle: &Puzzle) -> Jugs {
    puzzle.engine.state()
}

/// Append-only log used to observe admission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    pub entries: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Entry {
    Append(u32),
}

pub fn ledger(config: EngineConfig) -> Engine<Ledger, Entry> {
    let engine = Engine::new(config).expect("ledger engine");
    engine
        .add_component(Component::<Ledger, Entry>::new().acceptor(|model, entry| {
            let Entry::Append(value) = entry;
            model.entries.push(*value);
            Ok(())
        }))
        .expect("ledger component");
    engine
}
