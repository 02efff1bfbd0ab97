//! Scale sink and provider registry
//!
//! Several rendering backends may be able to scale an entity. Providers are
//! kept in priority order; the first one whose capability check passes for an
//! entity is remembered for that entity until it disconnects.

use ahash::AHashMap;

use crate::core::types::EntityId;
use crate::flatten::scale::ScaleTriple;

/// Receives the scale triple of every tracked entity once per tick
pub trait ScaleSink {
    fn set_scales(&mut self, entity: EntityId, scales: ScaleTriple, transition_ticks: u32);

    /// Forget anything cached for the entity
    fn invalidate(&mut self, _entity: EntityId) {}
}

/// One way of applying scales to an entity
pub trait ScaleProvider {
    fn name(&self) -> &str;

    /// Higher is preferred
    fn priority(&self) -> i32;

    /// Whether this provider can scale the entity at all
    fn supports(&self, entity: EntityId) -> bool;

    fn apply(&mut self, entity: EntityId, scales: ScaleTriple, transition_ticks: u32);
}

#[derive(Default)]
pub struct ScaleProviderRegistry {
    providers: Vec<Box<dyn ScaleProvider>>,
    /// Resolved provider index per entity; `None` means nothing supports it
    resolved: AHashMap<EntityId, Option<usize>>,
}

impl ScaleProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider; equal priorities keep registration order
    ///
    /// Cached resolutions are dropped since indices shift.
    pub fn register(&mut self, provider: Box<dyn ScaleProvider>) {
        let priority = provider.priority();
        let index = self
            .providers
            .iter()
            .position(|p| p.priority() < priority)
            .unwrap_or(self.providers.len());
        self.providers.insert(index, provider);
        self.resolved.clear();
    }

    /// Name of the provider currently serving the entity
    pub fn resolve(&mut self, entity: EntityId) -> Option<&str> {
        let index = self.resolve_index(entity)?;
        self.providers.get(index).map(|p| p.name())
    }

    fn resolve_index(&mut self, entity: EntityId) -> Option<usize> {
        if let Some(cached) = self.resolved.get(&entity) {
            return *cached;
        }
        let index = self.providers.iter().position(|p| p.supports(entity));
        self.resolved.insert(entity, index);
        index
    }

    pub fn cached_entities(&self) -> usize {
        self.resolved.len()
    }
}

impl ScaleSink for ScaleProviderRegistry {
    fn set_scales(&mut self, entity: EntityId, scales: ScaleTriple, transition_ticks: u32) {
        match self.resolve_index(entity) {
            Some(index) => {
                if let Some(provider) = self.providers.get_mut(index) {
                    provider.apply(entity, scales, transition_ticks);
                }
            }
            None => tracing::trace!(%entity, "No scale provider supports entity"),
        }
    }

    fn invalidate(&mut self, entity: EntityId) {
        self.resolved.remove(&entity);
    }
}

/// Provider that stores the latest triple per entity
#[derive(Debug, Default)]
pub struct ScaleTable {
    name: String,
    priority: i32,
    latest: AHashMap<EntityId, (ScaleTriple, u32)>,
}

impl ScaleTable {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            latest: AHashMap::new(),
        }
    }

    pub fn get(&self, entity: EntityId) -> Option<(ScaleTriple, u32)> {
        self.latest.get(&entity).copied()
    }
}

impl ScaleProvider for ScaleTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, _entity: EntityId) -> bool {
        true
    }

    fn apply(&mut self, entity: EntityId, scales: ScaleTriple, transition_ticks: u32) {
        self.latest.insert(entity, (scales, transition_ticks));
    }
}

impl ScaleSink for ScaleTable {
    fn set_scales(&mut self, entity: EntityId, scales: ScaleTriple, transition_ticks: u32) {
        self.apply(entity, scales, transition_ticks);
    }

    fn invalidate(&mut self, entity: EntityId) {
        self.latest.remove(&entity);
    }
}
