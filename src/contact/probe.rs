//! Reformation probes backed by a [`WorldQuery`]

use glam::IVec3;

use crate::contact::world::WorldQuery;
use crate::core::types::{Aabb, EntityBody};
use crate::flatten::reformation::{ReformationProbe, CLEARANCE_RAYCAST_CELLS};

pub struct WorldProbe<'a> {
    world: &'a dyn WorldQuery,
}

impl<'a> WorldProbe<'a> {
    pub fn new(world: &'a dyn WorldQuery) -> Self {
        Self { world }
    }

    /// Column over the entity's footprint, `cells` high from the feet
    fn column_above(body: &EntityBody, cells: u32) -> Aabb {
        let mut column = body.bounds();
        column.max.y = body.position.y + cells as f64;
        column
    }
}

impl ReformationProbe for WorldProbe<'_> {
    fn blocking_object_above(&self, body: &EntityBody) -> bool {
        let volume = Self::column_above(body, CLEARANCE_RAYCAST_CELLS);
        let dynamic = self
            .world
            .dynamic_heavy_objects_in(&volume)
            .iter()
            .any(|o| o.bounds.min.y >= body.position.y);
        if dynamic {
            return true;
        }

        let base = body.position.y.floor() as i32;
        (0..CLEARANCE_RAYCAST_CELLS as i32).any(|dy| {
            body.bounds()
                .footprint_columns()
                .any(|(x, z)| self.world.is_static_heavy_at(IVec3::new(x, base + dy, z)))
        })
    }

    fn clearance_above(&self, body: &EntityBody, max_cells: u32) -> f64 {
        let feet = body.position.y;
        let base = feet.floor() as i32;
        let mut ceiling = (base + max_cells as i32) as f64;

        'scan: for dy in 0..max_cells as i32 {
            let y = base + dy;
            for (x, z) in body.bounds().footprint_columns() {
                let cell = IVec3::new(x, y, z);
                if self.world.is_solid_at(cell) || self.world.is_static_heavy_at(cell) {
                    ceiling = ceiling.min(y as f64);
                    break 'scan;
                }
            }
        }

        let volume = Self::column_above(body, max_cells);
        for object in self.world.dynamic_heavy_objects_in(&volume) {
            if object.bounds.min.y >= feet {
                ceiling = ceiling.min(object.bounds.min.y);
            }
        }

        (ceiling - feet).max(0.0)
    }
}
