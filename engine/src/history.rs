//! Snapshot list for rollback and time travel.

use std::collections::BTreeMap;
use std::fmt;

use sam_types::ComponentName;

use crate::model::LocalState;

/// Structural copy of a model: application state plus every component's state.
///
/// Parent handles are not part of a snapshot.
pub struct Snapshot<S> {
    state: S,
    components: BTreeMap<ComponentName, Box<dyn LocalState>>,
}

impl<S> Snapshot<S> {
    pub(crate) fn new(state: S, components: BTreeMap<ComponentName, Box<dyn LocalState>>) -> Self {
        Self { state, components }
    }

    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn components(&self) -> impl Iterator<Item = (&ComponentName, &dyn LocalState)> {
        self.components
            .iter()
            .map(|(name, local)| (name, local.as_ref()))
    }

    #[must_use]
    pub fn local_state<L: LocalState>(&self, name: &str) -> Option<&L> {
        self.components
            .get(name)
            .and_then(|local| local.as_any().downcast_ref::<L>())
    }
}

impl<S> From<S> for Snapshot<S> {
    fn from(state: S) -> Self {
        Self::new(state, BTreeMap::new())
    }
}

impl<S: Clone> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            components: self
                .components
                .iter()
                .map(|(name, local)| (name.clone(), local.clone_local()))
                .collect(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Snapshot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Ordered snapshots with a travel cursor.
///
/// When `max` is set the oldest snapshot is evicted once the list grows past it.
pub struct History<S> {
    snapshots: Vec<Snapshot<S>>,
    cursor: usize,
    max: Option<usize>,
}

impl<S> History<S> {
    #[must_use]
    pub fn new(max: Option<usize>) -> Self {
        Self::with_snapshots(Vec::new(), max)
    }

    #[must_use]
    pub fn with_snapshots(snapshots: Vec<Snapshot<S>>, max: Option<usize>) -> Self {
        let mut history = Self {
            snapshots,
            cursor: 0,
            max: max.map(|max| max.max(1)),
        };
        history.evict();
        history
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Record a snapshot. With `index` inside the list the entry there is
    /// replaced; otherwise the snapshot is appended.
    pub fn snap(&mut self, snapshot: Snapshot<S>, index: Option<usize>) {
        match index {
            Some(index) if index < self.snapshots.len() => self.snapshots[index] = snapshot,
            _ => {
                self.snapshots.push(snapshot);
                self.evict();
            }
        }
    }

    /// Jump to `index`. The cursor moves even when nothing is stored there.
    pub fn travel(&mut self, index: usize) -> Option<&Snapshot<S>> {
        self.cursor = index;
        self.snapshots.get(index)
    }

    /// Snapshot at the cursor, then advance.
    pub fn next(&mut self) -> Option<&Snapshot<S>> {
        let index = self.cursor;
        self.cursor = self.cursor.saturating_add(1);
        self.snapshots.get(index)
    }

    /// Most recent snapshot; parks the cursor on it.
    pub fn last(&mut self) -> Option<&Snapshot<S>> {
        self.cursor = self.snapshots.len().saturating_sub(1);
        self.snapshots.last()
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor < self.snapshots.len()
    }

    fn evict(&mut self) {
        let Some(max) = self.max else {
            return;
        };
        if self.snapshots.len() > max {
            let excess = self.snapshots.len() - max;
            self.snapshots.drain(..excess);
            self.cursor = self.cursor.saturating_sub(excess);
        }
    }
}

impl<S> Default for History<S> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<S> fmt::Debug for History<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("len", &self.snapshots.len())
            .field("cursor", &self.cursor)
            .field("max", &self.max)
            .finish()
    }
}
