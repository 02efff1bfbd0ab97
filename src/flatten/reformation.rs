//! Reformation gate
//!
//! Decides whether a COMPRESSED entity may start recovering. The gate only
//! answers; it never changes state. A passing check yields a [`ReformPermit`],
//! which is the only way to drive the COMPRESSED -> RECOVERING edge.

use std::sync::Arc;

use thiserror::Error;

use crate::core::config::ConfigSource;
use crate::core::types::EntityBody;
use crate::flatten::state::{FlattenPhase, FlattenState};

/// How far up the clearance raycast looks, in cells
pub const CLEARANCE_RAYCAST_CELLS: u32 = 10;

/// Share of the frozen pose's height that must be free above the entity
pub const CLEARANCE_FRACTION: f64 = 0.75;

/// Proof that the gate passed for this tick
#[derive(Debug)]
pub struct ReformPermit {
    _sealed: (),
}

/// Why a reformation request was refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReformDenial {
    #[error("entity is {0:?}, not compressed")]
    NotCompressed(FlattenPhase),

    #[error("a heavy object is still resting above")]
    Blocked,

    #[error("only {available:.2} blocks of clearance, {required:.2} needed")]
    InsufficientClearance { available: f64, required: f64 },
}

/// World-side questions the gate needs answered
pub trait ReformationProbe {
    /// Is a heavy object sitting above the entity?
    fn blocking_object_above(&self, body: &EntityBody) -> bool;

    /// Free vertical space above the entity's feet, looking at most `max_cells` up.
    /// Heavy objects count as ceilings.
    fn clearance_above(&self, body: &EntityBody, max_cells: u32) -> f64;
}

pub struct ReformationGate {
    config: Arc<dyn ConfigSource>,
}

impl ReformationGate {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }

    /// Validate a reformation request
    ///
    /// An expired fallback timer skips the blocking check but never the
    /// clearance check.
    pub fn check(
        &self,
        state: &FlattenState,
        body: &EntityBody,
        probe: &dyn ReformationProbe,
    ) -> Result<ReformPermit, ReformDenial> {
        if state.phase != FlattenPhase::Compressed {
            return Err(ReformDenial::NotCompressed(state.phase));
        }

        let config = self.config.current();
        if config.blocking_enabled
            && !state.fallback_expired()
            && probe.blocking_object_above(body)
        {
            return Err(ReformDenial::Blocked);
        }

        let required = state.frozen_pose.reference_height() * CLEARANCE_FRACTION;
        let available = probe.clearance_above(body, CLEARANCE_RAYCAST_CELLS);
        if available < required {
            return Err(ReformDenial::InsufficientClearance {
                available,
                required,
            });
        }

        Ok(ReformPermit { _sealed: () })
    }

    pub fn can_reform(
        &self,
        state: &FlattenState,
        body: &EntityBody,
        probe: &dyn ReformationProbe,
    ) -> bool {
        self.check(state, body, probe).is_ok()
    }
}

#[cfg(test)]
pub(crate) fn test_permit() -> ReformPermit {
    ReformPermit { _sealed: () }
}
