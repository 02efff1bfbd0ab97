//! Per-entity state store
//!
//! Copy-on-write: each entry is an `Arc<FlattenState>` that is replaced
//! wholesale, never edited. Readers holding an older `Arc` keep a consistent
//! snapshot for as long as they need it.

use std::sync::Arc;

use ahash::AHashMap;

use crate::core::types::EntityId;
use crate::flatten::state::{FlattenPhase, FlattenState};

/// Number of tracked entities in each phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCensus {
    pub normal: usize,
    pub compressing: usize,
    pub compressed: usize,
    pub recovering: usize,
}

impl PhaseCensus {
    pub fn total(&self) -> usize {
        self.normal + self.compressing + self.compressed + self.recovering
    }
}

#[derive(Debug, Default)]
pub struct PhaseStateStore {
    states: AHashMap<EntityId, Arc<FlattenState>>,
}

impl PhaseStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, creating a NORMAL entry on first query
    pub fn get_or_create(&mut self, id: EntityId) -> Arc<FlattenState> {
        self.states
            .entry(id)
            .or_insert_with(|| Arc::new(FlattenState::normal()))
            .clone()
    }

    /// Current snapshot without creating one
    pub fn get(&self, id: EntityId) -> Option<Arc<FlattenState>> {
        self.states.get(&id).cloned()
    }

    /// Swap in a new snapshot, returning the previous one
    pub fn replace(&mut self, id: EntityId, state: FlattenState) -> Option<Arc<FlattenState>> {
        self.states.insert(id, Arc::new(state))
    }

    /// Forget an entity entirely (disconnect)
    pub fn remove(&mut self, id: EntityId) -> Option<Arc<FlattenState>> {
        self.states.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Arc<FlattenState>)> {
        self.states.iter()
    }

    pub fn census(&self) -> PhaseCensus {
        let mut census = PhaseCensus::default();
        for state in self.states.values() {
            match state.phase {
                FlattenPhase::Normal => census.normal += 1,
                FlattenPhase::Compressing => census.compressing += 1,
                FlattenPhase::Compressed => census.compressed += 1,
                FlattenPhase::Recovering => census.recovering += 1,
            }
        }
        census
    }
}
