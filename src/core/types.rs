//! Core type definitions used throughout the codebase

use glam::{DVec3, IVec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flatten::state::FrozenPose;

/// Unique identifier for tracked entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a dynamic (moving) heavy object in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Game tick counter (simulation time unit)
pub type Tick = u64;

/// Simulation ticks per wall-clock second
pub const TICKS_PER_SECOND: i32 = 20;

/// Axis-aligned bounding box in block units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Grow the box by `horizontal` on x/z and by `up` above the top face
    pub fn expand(&self, horizontal: f64, up: f64) -> Self {
        Self {
            min: DVec3::new(self.min.x - horizontal, self.min.y, self.min.z - horizontal),
            max: DVec3::new(self.max.x + horizontal, self.max.y + up, self.max.z + horizontal),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Block cells whose columns overlap the box footprint (x/z only)
    pub fn footprint_columns(&self) -> impl Iterator<Item = (i32, i32)> {
        let x0 = self.min.x.floor() as i32;
        let z0 = self.min.z.floor() as i32;
        // Faces sitting exactly on a cell boundary do not reach into the next column
        let x1 = (self.max.x - 1e-7).floor() as i32;
        let z1 = (self.max.z - 1e-7).floor() as i32;
        (x0..=x1.max(x0)).flat_map(move |x| (z0..=z1.max(z0)).map(move |z| (x, z)))
    }
}

/// Cell containing a world position
pub fn cell_of(pos: DVec3) -> IVec3 {
    IVec3::new(pos.x.floor() as i32, pos.y.floor() as i32, pos.z.floor() as i32)
}

/// What the simulation knows about a tracked entity's body this tick
///
/// Bodies are supplied by the host each tick; the flattening core never owns them.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBody {
    pub id: EntityId,
    /// Feet position (bottom centre of the bounding box)
    pub position: DVec3,
    /// Unscaled bounding box width
    pub width: f64,
    /// Unscaled bounding box height
    pub height: f64,
    /// Current pose, captured when compression begins
    pub pose: FrozenPose,
    /// Creative-mode style immunity; the driver never forwards damage for these
    pub damage_immune: bool,
}

impl EntityBody {
    pub fn new(id: EntityId, position: DVec3) -> Self {
        Self {
            id,
            position,
            width: 0.6,
            height: FrozenPose::Standing.reference_height(),
            pose: FrozenPose::Standing,
            damage_immune: false,
        }
    }

    pub fn with_pose(mut self, pose: FrozenPose) -> Self {
        self.pose = pose;
        self.height = pose.reference_height();
        self
    }

    pub fn immune(mut self) -> Self {
        self.damage_immune = true;
        self
    }

    pub fn bounds(&self) -> Aabb {
        let half = self.width / 2.0;
        Aabb::new(
            DVec3::new(self.position.x - half, self.position.y, self.position.z - half),
            DVec3::new(
                self.position.x + half,
                self.position.y + self.height,
                self.position.z + half,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_equality() {
        let a = EntityId::new();
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, EntityId::new());
    }

    #[test]
    fn test_body_bounds_centered_on_feet() {
        let body = EntityBody::new(EntityId::new(), DVec3::new(0.5, 64.0, 0.5));
        let bounds = body.bounds();
        assert!((bounds.min.x - 0.2).abs() < 1e-9);
        assert!((bounds.max.x - 0.8).abs() < 1e-9);
        assert_eq!(bounds.min.y, 64.0);
        assert!((bounds.max.y - 65.8).abs() < 1e-9);
    }

    #[test]
    fn test_footprint_single_column() {
        let body = EntityBody::new(EntityId::new(), DVec3::new(0.5, 64.0, 0.5));
        let columns: Vec<_> = body.bounds().footprint_columns().collect();
        assert_eq!(columns, vec![(0, 0)]);
    }

    #[test]
    fn test_footprint_straddles_columns() {
        let body = EntityBody::new(EntityId::new(), DVec3::new(1.0, 64.0, 0.5));
        let columns: Vec<_> = body.bounds().footprint_columns().collect();
        assert_eq!(columns, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_aabb_intersects() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::new(DVec3::splat(0.5), DVec3::splat(1.5));
        let c = Aabb::new(DVec3::splat(2.0), DVec3::splat(3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_pose_changes_height() {
        let body = EntityBody::new(EntityId::new(), DVec3::ZERO).with_pose(FrozenPose::Crouching);
        assert_eq!(body.height, 1.5);
    }
}
