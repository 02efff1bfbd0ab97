//! Flatten state snapshot
//!
//! A `FlattenState` is an immutable value. Every transition builds a new
//! snapshot; the store swaps whole snapshots so readers never see a half
//! applied change.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::core::types::ObjectId;
use crate::flatten::scale::ScaleTriple;

/// Lifecycle phase of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FlattenPhase {
    /// Untouched, all scales 1.0
    #[default]
    Normal,
    /// An object is pressing down, height follows the gap to the floor
    Compressing,
    /// Fully squashed, waiting for a reformation request
    Compressed,
    /// Springing back toward NORMAL
    Recovering,
}

impl FlattenPhase {
    pub fn name(&self) -> &'static str {
        match self {
            FlattenPhase::Normal => "normal",
            FlattenPhase::Compressing => "compressing",
            FlattenPhase::Compressed => "compressed",
            FlattenPhase::Recovering => "recovering",
        }
    }
}

/// Pose captured when compression begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FrozenPose {
    #[default]
    Standing,
    Crouching,
    Swimming,
    Sleeping,
}

impl FrozenPose {
    /// Bounding box height of the pose in blocks
    pub fn reference_height(&self) -> f64 {
        match self {
            FrozenPose::Standing => 1.8,
            FrozenPose::Crouching => 1.5,
            FrozenPose::Swimming => 0.6,
            FrozenPose::Sleeping => 0.2,
        }
    }
}

/// Immutable per-entity flattening snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenState {
    pub phase: FlattenPhase,
    /// In [min_height_scale, 1.0]
    pub height_scale: f64,
    /// Always >= 1.0
    pub width_scale: f64,
    pub depth_scale: f64,
    /// Accumulated horizontal growth from re-compressions, in [0, max_spread_limit]
    pub spread_multiplier: f64,
    /// Unscaled height captured when compression began
    pub original_height: f64,
    pub frozen_pose: FrozenPose,
    pub recovery_ticks_remaining: i32,
    /// Fallback countdown; -1 means the fallback is disabled
    pub fallback_ticks_remaining: i32,
    pub reflatten_cooldown_ticks: i32,
    pub tracked_object_count: u32,
    pub has_contact: bool,
    /// Identity of a dynamic compressing object, if the contact has one
    pub contact_object_id: Option<ObjectId>,
    /// Where the compressing object sits, if the contact source reported it
    pub contact_position: Option<DVec3>,
}

impl Default for FlattenState {
    fn default() -> Self {
        Self::normal()
    }
}

impl FlattenState {
    /// The resting state every entity starts in and returns to
    pub fn normal() -> Self {
        Self {
            phase: FlattenPhase::Normal,
            height_scale: 1.0,
            width_scale: 1.0,
            depth_scale: 1.0,
            spread_multiplier: 0.0,
            original_height: 0.0,
            frozen_pose: FrozenPose::Standing,
            recovery_ticks_remaining: 0,
            fallback_ticks_remaining: 0,
            reflatten_cooldown_ticks: 0,
            tracked_object_count: 0,
            has_contact: false,
            contact_object_id: None,
            contact_position: None,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.phase == FlattenPhase::Normal
    }

    /// Copy of this snapshot with all contact fields cleared
    pub fn without_contact(&self) -> Self {
        Self {
            has_contact: false,
            tracked_object_count: 0,
            contact_object_id: None,
            contact_position: None,
            ..self.clone()
        }
    }

    /// Scales as the renderer should apply them
    ///
    /// Spread is additive horizontal growth on top of the width scale.
    pub fn render_scales(&self) -> ScaleTriple {
        ScaleTriple {
            height: self.height_scale,
            width: self.width_scale + self.spread_multiplier,
            depth: self.depth_scale + self.spread_multiplier,
        }
    }

    /// Whether the fallback countdown has run out
    ///
    /// A disabled fallback (-1) never expires.
    pub fn fallback_expired(&self) -> bool {
        self.fallback_ticks_remaining == 0
    }
}
