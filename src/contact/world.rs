//! World queries the contact layer depends on
//!
//! The host world implements [`WorldQuery`]. Every query is bounded by the
//! caller (a search volume or a single cell) so detection cost never grows
//! with world size.

use glam::{DVec3, IVec3};

use crate::core::types::{Aabb, ObjectId};

/// A moving heavy object (e.g. a falling anvil)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeavyObject {
    pub id: ObjectId,
    pub bounds: Aabb,
    /// Vertical velocity in blocks per tick, negative when falling
    pub velocity_y: f64,
}

impl HeavyObject {
    /// Bottom centre of the object
    pub fn bottom_center(&self) -> DVec3 {
        DVec3::new(
            (self.bounds.min.x + self.bounds.max.x) / 2.0,
            self.bounds.min.y,
            (self.bounds.min.z + self.bounds.max.z) / 2.0,
        )
    }
}

pub trait WorldQuery {
    /// Dynamic heavy objects intersecting `volume`, in a stable order
    fn dynamic_heavy_objects_in(&self, volume: &Aabb) -> Vec<HeavyObject>;

    /// Whether a static heavy block occupies `cell`
    fn is_static_heavy_at(&self, cell: IVec3) -> bool;

    /// Whether `cell` holds a solid collider
    fn is_solid_at(&self, cell: IVec3) -> bool;

    /// Top surface of the collider in `cell`, if any
    ///
    /// Full blocks by default; worlds with partial colliders override this.
    fn collider_top_at(&self, cell: IVec3) -> Option<f64> {
        self.is_solid_at(cell).then(|| cell.y as f64 + 1.0)
    }
}
