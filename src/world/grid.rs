//! In-memory block world
//!
//! A sparse voxel world with solid blocks, static heavy blocks and falling
//! heavy objects. Falling objects pass through entities and settle into a
//! static heavy block when they land. Implements [`WorldQuery`] so the
//! detector can run against it in tests and in the scenario runner.

use std::ops::RangeInclusive;

use ahash::AHashSet;
use glam::{DVec3, IVec3};

use crate::contact::world::{HeavyObject, WorldQuery};
use crate::core::types::{cell_of, Aabb, ObjectId};

/// Downward acceleration in blocks per tick squared
pub const GRAVITY: f64 = -0.04;
/// Fastest a falling object moves, in blocks per tick
pub const TERMINAL_VELOCITY: f64 = -2.0;
/// How far below a falling object the landing surface is searched
const MAX_FALL_SCAN: i32 = 64;

/// A heavy object in free fall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallingObject {
    pub id: ObjectId,
    /// Bottom centre
    pub position: DVec3,
    pub velocity_y: f64,
}

impl FallingObject {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            DVec3::new(self.position.x - 0.5, self.position.y, self.position.z - 0.5),
            DVec3::new(self.position.x + 0.5, self.position.y + 1.0, self.position.z + 0.5),
        )
    }
}

/// A falling object that settled this step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Landing {
    pub id: ObjectId,
    pub cell: IVec3,
}

#[derive(Debug, Clone, Default)]
pub struct BlockWorld {
    solid: AHashSet<(i32, i32, i32)>,
    heavy: AHashSet<(i32, i32, i32)>,
    falling: Vec<FallingObject>,
    next_object_id: u64,
}

fn key(cell: IVec3) -> (i32, i32, i32) {
    (cell.x, cell.y, cell.z)
}

impl BlockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place_solid(&mut self, cell: IVec3) {
        self.solid.insert(key(cell));
    }

    pub fn remove_solid(&mut self, cell: IVec3) -> bool {
        self.solid.remove(&key(cell))
    }

    /// Place a static heavy block (e.g. a resting anvil)
    pub fn place_heavy(&mut self, cell: IVec3) {
        self.heavy.insert(key(cell));
    }

    pub fn remove_heavy(&mut self, cell: IVec3) -> bool {
        self.heavy.remove(&key(cell))
    }

    /// Solid slab of blocks at height `y`
    pub fn fill_floor(&mut self, xs: RangeInclusive<i32>, y: i32, zs: RangeInclusive<i32>) {
        for x in xs {
            for z in zs.clone() {
                self.place_solid(IVec3::new(x, y, z));
            }
        }
    }

    /// Spawn a falling heavy object with its underside at `position`
    pub fn drop_object(&mut self, position: DVec3, velocity_y: f64) -> ObjectId {
        self.next_object_id += 1;
        let id = ObjectId(self.next_object_id);
        self.falling.push(FallingObject {
            id,
            position,
            velocity_y,
        });
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let before = self.falling.len();
        self.falling.retain(|o| o.id != id);
        before != self.falling.len()
    }

    pub fn falling(&self) -> &[FallingObject] {
        &self.falling
    }

    pub fn heavy_block_count(&self) -> usize {
        self.heavy.len()
    }

    /// Highest solid surface at or below `from` in the column, within range
    fn surface_below(&self, from: DVec3) -> Option<f64> {
        let start = cell_of(from - DVec3::Y * 1e-6);
        (0..MAX_FALL_SCAN).find_map(|i| self.collider_top_at(start - IVec3::Y * i))
    }

    /// Advance falling objects by one tick, settling the ones that land
    pub fn step(&mut self) -> Vec<Landing> {
        let mut landings = Vec::new();
        let mut still_falling = Vec::with_capacity(self.falling.len());

        for mut object in std::mem::take(&mut self.falling) {
            let velocity = (object.velocity_y + GRAVITY).max(TERMINAL_VELOCITY);
            let next_bottom = object.position.y + velocity;

            match self.surface_below(object.position) {
                Some(surface) if next_bottom <= surface => {
                    let cell = cell_of(DVec3::new(object.position.x, surface, object.position.z));
                    self.place_heavy(cell);
                    tracing::trace!(id = object.id.0, y = cell.y, "Heavy object landed");
                    landings.push(Landing {
                        id: object.id,
                        cell,
                    });
                }
                _ => {
                    object.position.y = next_bottom;
                    object.velocity_y = velocity;
                    still_falling.push(object);
                }
            }
        }

        self.falling = still_falling;
        landings
    }
}

impl WorldQuery for BlockWorld {
    fn dynamic_heavy_objects_in(&self, volume: &Aabb) -> Vec<HeavyObject> {
        self.falling
            .iter()
            .filter(|o| o.bounds().intersects(volume))
            .map(|o| HeavyObject {
                id: o.id,
                bounds: o.bounds(),
                velocity_y: o.velocity_y,
            })
            .collect()
    }

    fn is_static_heavy_at(&self, cell: IVec3) -> bool {
        self.heavy.contains(&key(cell))
    }

    fn is_solid_at(&self, cell: IVec3) -> bool {
        self.solid.contains(&key(cell)) || self.heavy.contains(&key(cell))
    }
}
