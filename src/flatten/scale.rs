//! Scale and damage calculators
//!
//! Pure functions over geometry. Nothing here reads configuration or state;
//! callers pass the values in.

use serde::{Deserialize, Serialize};

use crate::flatten::state::FlattenPhase;

/// Falling speed (blocks per tick) above which the squash snaps in one tick
pub const FAST_FALL_VELOCITY: f64 = 0.5;

/// Height/width/depth scale applied to an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleTriple {
    pub height: f64,
    pub width: f64,
    pub depth: f64,
}

impl ScaleTriple {
    pub const IDENTITY: ScaleTriple = ScaleTriple {
        height: 1.0,
        width: 1.0,
        depth: 1.0,
    };
}

impl Default for ScaleTriple {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Height scale from the gap between the object's underside and the floor
///
/// A non-positive original height means there is nothing to scale against,
/// which is treated as fully compressed.
pub fn height_scale(object_bottom_y: f64, floor_y: f64, original_height: f64, min_scale: f64) -> f64 {
    if original_height <= 0.0 {
        return min_scale;
    }
    ((object_bottom_y - floor_y) / original_height).clamp(min_scale, 1.0)
}

/// Width grows by half of what the height lost (volume is loosely preserved)
pub fn width_scale(height_scale: f64) -> f64 {
    1.0 + (1.0 - height_scale) / 2.0
}

/// Linear step from `current` toward `target`
pub fn interpolate_recovery(current: f64, target: f64, progress: f64) -> f64 {
    current + (target - current) * progress
}

/// Spread contributed by `count` objects
pub fn spread(count: u32, increment: f64) -> f64 {
    count as f64 * increment
}

/// Add spread onto an existing multiplier, capped at `max_spread`
pub fn accumulate_spread(current: f64, added: f64, max_spread: f64) -> f64 {
    (current + added).min(max_spread)
}

/// Damage dealt by a stack of `count` objects
pub fn stack_damage(count: u32, base: f64, per_extra: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    base + (count - 1) as f64 * per_extra
}

/// Interpolation length the renderer should use for a scale change
pub fn transition_ticks(phase: FlattenPhase, tracked_velocity: f64) -> u32 {
    match phase {
        FlattenPhase::Compressing if tracked_velocity.abs() >= FAST_FALL_VELOCITY => 1,
        FlattenPhase::Compressing => 3,
        FlattenPhase::Recovering => 1,
        FlattenPhase::Normal | FlattenPhase::Compressed => 0,
    }
}
