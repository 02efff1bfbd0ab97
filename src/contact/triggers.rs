//! Pluggable contact triggers
//!
//! Triggers let other systems (scripted traps, special items) flatten an
//! entity without a physical heavy object. They are evaluated before the
//! standard detectors, highest priority first; the first one that fires wins.

use glam::DVec3;

use crate::contact::world::WorldQuery;
use crate::core::types::{EntityBody, ObjectId};

/// What a trigger reports when it fires
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerHit {
    /// Underside of the compressing thing. `None` flattens instantly.
    pub position: Option<DVec3>,
    pub count: u32,
    pub object_id: Option<ObjectId>,
}

impl TriggerHit {
    /// Fire with a position, taking the progressive path
    pub fn at(position: DVec3) -> Self {
        Self {
            position: Some(position),
            count: 1,
            object_id: None,
        }
    }

    /// Fire without a position, flattening in one step
    pub fn instant(count: u32) -> Self {
        Self {
            position: None,
            count,
            object_id: None,
        }
    }
}

pub trait ContactTrigger {
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32;

    fn check(&self, body: &EntityBody, world: &dyn WorldQuery) -> Option<TriggerHit>;
}

/// Priority-ordered list of triggers
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: Vec<Box<dyn ContactTrigger>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger; equal priorities keep registration order
    pub fn register(&mut self, trigger: Box<dyn ContactTrigger>) {
        tracing::debug!(
            name = trigger.name(),
            priority = trigger.priority(),
            "Registered contact trigger"
        );
        let priority = trigger.priority();
        let index = self
            .triggers
            .iter()
            .position(|t| t.priority() < priority)
            .unwrap_or(self.triggers.len());
        self.triggers.insert(index, trigger);
    }

    /// Remove every trigger with the given name, returning how many went
    pub fn unregister(&mut self, name: &str) -> usize {
        let before = self.triggers.len();
        self.triggers.retain(|t| t.name() != name);
        before - self.triggers.len()
    }

    /// First trigger that fires, with its name
    pub fn evaluate(&self, body: &EntityBody, world: &dyn WorldQuery) -> Option<(&str, TriggerHit)> {
        self.triggers
            .iter()
            .find_map(|t| t.check(body, world).map(|hit| (t.name(), hit)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityId;
    use crate::world::grid::BlockWorld;

    struct Fixed {
        name: &'static str,
        priority: i32,
        hit: Option<TriggerHit>,
    }

    impl ContactTrigger for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn check(&self, _body: &EntityBody, _world: &dyn WorldQuery) -> Option<TriggerHit> {
            self.hit
        }
    }

    fn fixed(name: &'static str, priority: i32, hit: Option<TriggerHit>) -> Box<dyn ContactTrigger> {
        Box::new(Fixed { name, priority, hit })
    }

    fn body() -> EntityBody {
        EntityBody::new(EntityId::new(), DVec3::new(0.5, 64.0, 0.5))
    }

    #[test]
    fn test_sorted_by_priority_then_registration() {
        let mut registry = TriggerRegistry::new();
        registry.register(fixed("low", 1, None));
        registry.register(fixed("high", 10, None));
        registry.register(fixed("mid_a", 5, None));
        registry.register(fixed("mid_b", 5, None));

        assert_eq!(registry.names(), vec!["high", "mid_a", "mid_b", "low"]);
    }

    #[test]
    fn test_highest_firing_trigger_wins() {
        let mut registry = TriggerRegistry::new();
        registry.register(fixed("trap", 1, Some(TriggerHit::instant(1))));
        registry.register(fixed("idle", 10, None));
        registry.register(fixed("press", 5, Some(TriggerHit::at(DVec3::new(0.5, 65.0, 0.5)))));

        let world = BlockWorld::new();
        let (name, hit) = registry.evaluate(&body(), &world).unwrap();
        assert_eq!(name, "press");
        assert!(hit.position.is_some());
    }

    #[test]
    fn test_nothing_fires() {
        let mut registry = TriggerRegistry::new();
        registry.register(fixed("idle", 10, None));
        assert!(registry.evaluate(&body(), &BlockWorld::new()).is_none());
    }

    #[test]
    fn test_unregister_by_name() {
        let mut registry = TriggerRegistry::new();
        registry.register(fixed("trap", 1, None));
        registry.register(fixed("trap", 2, None));
        registry.register(fixed("press", 3, None));

        assert_eq!(registry.unregister("trap"), 2);
        assert_eq!(registry.names(), vec!["press"]);
    }
}
