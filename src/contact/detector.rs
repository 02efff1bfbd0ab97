//! Contact detection
//!
//! Once per tick per entity, work out whether something heavy is pressing on
//! it. Sources are tried in a fixed order:
//! custom triggers > dynamic heavy object > static heavy block.

use glam::{DVec3, IVec3};
use serde::{Deserialize, Serialize};

use crate::contact::triggers::{ContactTrigger, TriggerRegistry};
use crate::contact::world::WorldQuery;
use crate::core::types::{cell_of, EntityBody, ObjectId};

/// Tallest static stack that is counted
pub const MAX_STACK_HEIGHT: u32 = 16;

/// How many cells below the entity the floor lookup samples
pub const MAX_FLOOR_RAYCAST: i32 = 8;

/// How far above the entity's head dynamic objects are picked up (blocks)
///
/// Vertical only: an object has to overlap the entity's footprint to count.
pub const DYNAMIC_SEARCH_MARGIN: f64 = 0.5;

/// Tolerance for "at or above the entity's lower bound"
const LOWER_BOUND_EPSILON: f64 = 1e-6;

/// Where a contact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactKind {
    Dynamic,
    Static,
    /// Custom trigger, by name
    Trigger(String),
}

/// A compressing object pressing on an entity this tick
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub object_bottom_y: f64,
    pub floor_y: f64,
    /// Objects in the stack, at least 1
    pub count: u32,
    pub velocity_y: f64,
    pub kind: ContactKind,
    pub object_id: Option<ObjectId>,
    pub position: Option<DVec3>,
}

/// Detector output for one entity and tick
#[derive(Debug, Clone, PartialEq)]
pub enum ContactSignal {
    /// Gradual compression driven by geometry
    Progressive(Contact),
    /// A trigger without a position: flatten in one step
    Instant {
        source: String,
        count: u32,
        object_id: Option<ObjectId>,
    },
}

impl ContactSignal {
    pub fn count(&self) -> u32 {
        match self {
            ContactSignal::Progressive(contact) => contact.count,
            ContactSignal::Instant { count, .. } => *count,
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            ContactSignal::Progressive(contact) => contact.object_id,
            ContactSignal::Instant { object_id, .. } => *object_id,
        }
    }

    pub fn position(&self) -> Option<DVec3> {
        match self {
            ContactSignal::Progressive(contact) => contact.position,
            ContactSignal::Instant { .. } => None,
        }
    }

    /// Falling speed reported with the contact (zero for instant hits)
    pub fn velocity_y(&self) -> f64 {
        match self {
            ContactSignal::Progressive(contact) => contact.velocity_y,
            ContactSignal::Instant { .. } => 0.0,
        }
    }
}

#[derive(Default)]
pub struct ContactDetector {
    triggers: TriggerRegistry,
}

impl ContactDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, trigger: Box<dyn ContactTrigger>) {
        self.triggers.register(trigger);
    }

    pub fn triggers_mut(&mut self) -> &mut TriggerRegistry {
        &mut self.triggers
    }

    /// Contact for this tick, if any
    pub fn tick(&self, body: &EntityBody, world: &dyn WorldQuery) -> Option<ContactSignal> {
        if let Some((name, hit)) = self.triggers.evaluate(body, world) {
            let count = hit.count.max(1);
            let signal = match hit.position {
                Some(position) => ContactSignal::Progressive(Contact {
                    object_bottom_y: position.y,
                    floor_y: floor_y(body, world),
                    count,
                    velocity_y: 0.0,
                    kind: ContactKind::Trigger(name.to_string()),
                    object_id: hit.object_id,
                    position: Some(position),
                }),
                None => ContactSignal::Instant {
                    source: name.to_string(),
                    count,
                    object_id: hit.object_id,
                },
            };
            return Some(signal);
        }

        detect_dynamic(body, world)
            .or_else(|| detect_static(body, world))
            .map(ContactSignal::Progressive)
    }
}

/// First dynamic heavy object in the search volume whose underside is at or
/// above the entity's feet
pub fn detect_dynamic(body: &EntityBody, world: &dyn WorldQuery) -> Option<Contact> {
    let bounds = body.bounds();
    let volume = bounds.expand(0.0, DYNAMIC_SEARCH_MARGIN);

    let object = world
        .dynamic_heavy_objects_in(&volume)
        .into_iter()
        .find(|o| o.bounds.min.y >= bounds.min.y - LOWER_BOUND_EPSILON)?;

    Some(Contact {
        object_bottom_y: object.bounds.min.y,
        floor_y: floor_y(body, world),
        count: 1,
        velocity_y: object.velocity_y,
        kind: ContactKind::Dynamic,
        object_id: Some(object.id),
        position: Some(object.bottom_center()),
    })
}

/// First static heavy block inside the entity's box, lowest layer first
pub fn detect_static(body: &EntityBody, world: &dyn WorldQuery) -> Option<Contact> {
    let bounds = body.bounds();
    let bottom = body.position.y.floor() as i32;
    let top = (bounds.max.y - LOWER_BOUND_EPSILON).floor() as i32;

    for y in bottom..=top {
        if (y as f64) < body.position.y - LOWER_BOUND_EPSILON {
            continue;
        }
        for (x, z) in bounds.footprint_columns() {
            let cell = IVec3::new(x, y, z);
            if world.is_static_heavy_at(cell) {
                return Some(Contact {
                    object_bottom_y: y as f64,
                    floor_y: floor_y(body, world),
                    count: stack_height(cell, world),
                    velocity_y: 0.0,
                    kind: ContactKind::Static,
                    object_id: None,
                    position: Some(DVec3::new(x as f64 + 0.5, y as f64, z as f64 + 0.5)),
                });
            }
        }
    }
    None
}

/// Contiguous static heavy blocks from `cell` upward, capped
pub fn stack_height(cell: IVec3, world: &dyn WorldQuery) -> u32 {
    let mut count = 1;
    while count < MAX_STACK_HEIGHT && world.is_static_heavy_at(cell + IVec3::Y * count as i32) {
        count += 1;
    }
    count
}

/// Top of the first solid collider below the entity
///
/// Falls back to the entity's own height when nothing is in range.
pub fn floor_y(body: &EntityBody, world: &dyn WorldQuery) -> f64 {
    let start = cell_of(body.position - DVec3::Y * LOWER_BOUND_EPSILON);
    (0..MAX_FLOOR_RAYCAST)
        .find_map(|i| world.collider_top_at(start - IVec3::Y * i))
        .unwrap_or(body.position.y)
}
