//! Damage sink

use crate::core::types::EntityId;

/// Receives stack damage from the driver
///
/// Immune entities are filtered out before this is called.
pub trait DamageSink {
    fn apply_damage(&mut self, entity: EntityId, amount: f64);
}

/// Sink that just remembers what it was asked to do
#[derive(Debug, Clone, Default)]
pub struct DamageLog {
    pub entries: Vec<(EntityId, f64)>,
}

impl DamageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_for(&self, entity: EntityId) -> f64 {
        self.entries
            .iter()
            .filter(|(id, _)| *id == entity)
            .fold(0.0, |total, (_, amount)| total + amount)
    }

    pub fn hits_for(&self, entity: EntityId) -> usize {
        self.entries.iter().filter(|(id, _)| *id == entity).count()
    }
}

impl DamageSink for DamageLog {
    fn apply_damage(&mut self, entity: EntityId, amount: f64) {
        self.entries.push((entity, amount));
    }
}
