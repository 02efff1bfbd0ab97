//! Phase state machine
//!
//! NORMAL -> COMPRESSING -> COMPRESSED -> RECOVERING -> NORMAL, with
//! re-compression edges from COMPRESSED and RECOVERING. Every operation takes
//! the previous snapshot by reference and returns a new one; an operation
//! with no edge from the current phase hands back an identical copy.
//!
//! The machine does not touch the world or any sink. Damage is reported in
//! the returned [`Step`] and forwarded by the driver.

use std::sync::Arc;

use crate::contact::{Contact, ContactSignal};
use crate::core::config::{ConfigSource, FlattenConfig};
use crate::core::types::{EntityBody, ObjectId};
use crate::flatten::reformation::ReformPermit;
use crate::flatten::scale;
use crate::flatten::state::{FlattenPhase, FlattenState};
use crate::flatten::timer;

/// Relative velocity change below which the tracked value is kept
pub const VELOCITY_CHANGE_THRESHOLD: f64 = 0.2;

/// Result of one transition
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: FlattenState,
    /// Stack damage the driver should forward, if any
    pub damage: Option<f64>,
}

impl Step {
    fn unchanged(prev: &FlattenState) -> Self {
        Self {
            state: prev.clone(),
            damage: None,
        }
    }

    fn to(state: FlattenState) -> Self {
        Self {
            state,
            damage: None,
        }
    }
}

/// Contact facts a re-compression needs, independent of the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub count: u32,
    pub object_id: Option<ObjectId>,
    pub position: Option<glam::DVec3>,
}

impl From<&ContactSignal> for Arrival {
    fn from(signal: &ContactSignal) -> Self {
        Self {
            count: signal.count(),
            object_id: signal.object_id(),
            position: signal.position(),
        }
    }
}

/// Whether the tracked falling velocity should be replaced
///
/// Changes under 20% are treated as noise.
pub fn velocity_changed(tracked: f64, observed: f64) -> bool {
    if tracked == 0.0 {
        return observed != 0.0;
    }
    ((observed - tracked) / tracked).abs() > VELOCITY_CHANGE_THRESHOLD
}

pub struct PhaseStateMachine {
    config: Arc<dyn ConfigSource>,
}

impl PhaseStateMachine {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }

    fn config(&self) -> FlattenConfig {
        self.config.current()
    }

    /// Route this tick's contact signal (or its absence) to the right edge
    pub fn apply_contact(
        &self,
        prev: &FlattenState,
        body: &EntityBody,
        signal: Option<&ContactSignal>,
        tracked_velocity: &mut f64,
    ) -> Step {
        let Some(signal) = signal else {
            return self.contact_lost(prev);
        };

        match (prev.phase, signal) {
            (FlattenPhase::Normal, ContactSignal::Progressive(contact)) => {
                self.begin_compression(prev, body, contact, tracked_velocity)
            }
            (FlattenPhase::Compressing, ContactSignal::Progressive(contact)) => {
                self.update_compression(prev, contact, tracked_velocity)
            }
            (FlattenPhase::Normal | FlattenPhase::Compressing, ContactSignal::Instant { .. }) => {
                self.instant_compress(prev, body, &Arrival::from(signal))
            }
            (FlattenPhase::Compressed | FlattenPhase::Recovering, _) => {
                let arrival = Arrival::from(signal);
                if is_arrival(prev, &arrival) {
                    self.recompress(prev, &arrival)
                } else {
                    refresh_contact(prev, &arrival)
                }
            }
        }
    }

    /// NORMAL + contact -> COMPRESSING, cascading to COMPRESSED at the floor
    pub fn begin_compression(
        &self,
        prev: &FlattenState,
        body: &EntityBody,
        contact: &Contact,
        tracked_velocity: &mut f64,
    ) -> Step {
        if prev.phase != FlattenPhase::Normal {
            return Step::unchanged(prev);
        }
        let config = self.config();

        let original_height = body.height;
        let height = scale::height_scale(
            contact.object_bottom_y,
            contact.floor_y,
            original_height,
            config.min_height_scale,
        );
        let width = scale::width_scale(height);
        *tracked_velocity = contact.velocity_y;

        let state = FlattenState {
            phase: FlattenPhase::Compressing,
            height_scale: height,
            width_scale: width,
            depth_scale: width,
            original_height,
            frozen_pose: body.pose,
            recovery_ticks_remaining: 0,
            fallback_ticks_remaining: 0,
            tracked_object_count: contact.count,
            has_contact: true,
            contact_object_id: contact.object_id,
            contact_position: contact.position,
            ..prev.clone()
        };

        if height <= config.min_height_scale {
            return complete_compression(state, &config);
        }
        Step::to(state)
    }

    /// COMPRESSING + contact -> recompute scales from current geometry
    pub fn update_compression(
        &self,
        prev: &FlattenState,
        contact: &Contact,
        tracked_velocity: &mut f64,
    ) -> Step {
        if prev.phase != FlattenPhase::Compressing {
            return Step::unchanged(prev);
        }
        let config = self.config();

        let height = scale::height_scale(
            contact.object_bottom_y,
            contact.floor_y,
            prev.original_height,
            config.min_height_scale,
        );
        let width = scale::width_scale(height);

        if velocity_changed(*tracked_velocity, contact.velocity_y) {
            *tracked_velocity = contact.velocity_y;
        }

        let state = FlattenState {
            height_scale: height,
            width_scale: width,
            depth_scale: width,
            tracked_object_count: contact.count,
            has_contact: true,
            contact_object_id: contact.object_id,
            contact_position: contact.position,
            ..prev.clone()
        };

        if height <= config.min_height_scale {
            return complete_compression(state, &config);
        }
        Step::to(state)
    }

    /// Contact gone: COMPRESSING starts recovering, COMPRESSED forgets the contact
    pub fn contact_lost(&self, prev: &FlattenState) -> Step {
        match prev.phase {
            FlattenPhase::Compressing => Step::to(FlattenState {
                phase: FlattenPhase::Recovering,
                recovery_ticks_remaining: self.config().recovery_ticks,
                ..prev.without_contact()
            }),
            FlattenPhase::Compressed if prev.has_contact => Step::to(prev.without_contact()),
            _ => Step::unchanged(prev),
        }
    }

    /// Contact arriving on an already flattened entity
    ///
    /// Ignored while the re-flatten cooldown runs. Damage is only dealt when
    /// the contact replaces one that had been lost completely.
    pub fn recompress(&self, prev: &FlattenState, arrival: &Arrival) -> Step {
        if !matches!(prev.phase, FlattenPhase::Compressed | FlattenPhase::Recovering) {
            return Step::unchanged(prev);
        }
        if prev.reflatten_cooldown_ticks > 0 {
            tracing::trace!(
                cooldown = prev.reflatten_cooldown_ticks,
                "Re-compression ignored during cooldown"
            );
            return Step::unchanged(prev);
        }
        let config = self.config();

        let added = scale::spread(arrival.count, config.spread_increment);
        let spread_multiplier =
            scale::accumulate_spread(prev.spread_multiplier, added, config.max_spread_limit);
        let is_replacement = !prev.has_contact;
        let damage = is_replacement.then(|| {
            scale::stack_damage(
                arrival.count,
                config.base_damage,
                config.per_extra_object_damage,
            )
        });

        let base = FlattenState {
            spread_multiplier,
            reflatten_cooldown_ticks: config.reflatten_cooldown_ticks,
            tracked_object_count: stacked_count(prev, arrival),
            has_contact: true,
            contact_object_id: arrival.object_id,
            contact_position: arrival.position,
            ..prev.clone()
        };

        let state = if prev.phase == FlattenPhase::Recovering {
            FlattenState {
                phase: FlattenPhase::Compressing,
                recovery_ticks_remaining: 0,
                ..base
            }
        } else {
            FlattenState {
                fallback_ticks_remaining: timer::reset_timer(self.config.as_ref()),
                ..base
            }
        };

        Step { state, damage }
    }

    /// Trigger without a position: skip the gradual squash entirely
    pub fn instant_compress(&self, prev: &FlattenState, body: &EntityBody, arrival: &Arrival) -> Step {
        let config = self.config();
        let compressing = match prev.phase {
            FlattenPhase::Normal => FlattenState {
                phase: FlattenPhase::Compressing,
                original_height: body.height,
                frozen_pose: body.pose,
                tracked_object_count: arrival.count,
                has_contact: true,
                contact_object_id: arrival.object_id,
                contact_position: arrival.position,
                ..prev.clone()
            },
            FlattenPhase::Compressing => FlattenState {
                tracked_object_count: arrival.count,
                has_contact: true,
                contact_object_id: arrival.object_id,
                contact_position: arrival.position,
                ..prev.clone()
            },
            FlattenPhase::Compressed | FlattenPhase::Recovering => {
                return self.recompress(prev, arrival);
            }
        };
        complete_compression(compressing, &config)
    }

    /// COMPRESSED -> RECOVERING once the reformation gate has passed
    pub fn begin_reformation(&self, prev: &FlattenState, _permit: ReformPermit) -> Step {
        if prev.phase != FlattenPhase::Compressed {
            return Step::unchanged(prev);
        }
        Step::to(FlattenState {
            phase: FlattenPhase::Recovering,
            recovery_ticks_remaining: self.config().recovery_ticks,
            fallback_ticks_remaining: 0,
            ..prev.without_contact()
        })
    }

    /// Per-tick timer bookkeeping and recovery interpolation
    pub fn tick(&self, prev: &FlattenState) -> FlattenState {
        let cooldown = if prev.reflatten_cooldown_ticks > 0 {
            prev.reflatten_cooldown_ticks - 1
        } else {
            prev.reflatten_cooldown_ticks
        };

        match prev.phase {
            FlattenPhase::Normal => prev.clone(),
            FlattenPhase::Compressing => FlattenState {
                reflatten_cooldown_ticks: cooldown,
                ..prev.clone()
            },
            FlattenPhase::Compressed => {
                let fallback = if prev.fallback_ticks_remaining > 0 {
                    timer::tick(prev.fallback_ticks_remaining)
                } else {
                    prev.fallback_ticks_remaining
                };
                FlattenState {
                    reflatten_cooldown_ticks: cooldown,
                    fallback_ticks_remaining: fallback,
                    ..prev.clone()
                }
            }
            FlattenPhase::Recovering => {
                if prev.recovery_ticks_remaining <= 1 {
                    return FlattenState::normal();
                }
                let progress = 1.0 / prev.recovery_ticks_remaining as f64;
                FlattenState {
                    height_scale: scale::interpolate_recovery(prev.height_scale, 1.0, progress),
                    width_scale: scale::interpolate_recovery(prev.width_scale, 1.0, progress),
                    depth_scale: scale::interpolate_recovery(prev.depth_scale, 1.0, progress),
                    spread_multiplier: scale::interpolate_recovery(
                        prev.spread_multiplier,
                        0.0,
                        progress,
                    ),
                    recovery_ticks_remaining: prev.recovery_ticks_remaining - 1,
                    reflatten_cooldown_ticks: cooldown,
                    ..prev.clone()
                }
            }
        }
    }

    /// Death or respawn: drop everything back to NORMAL
    pub fn reset(&self, _prev: &FlattenState) -> FlattenState {
        FlattenState::normal()
    }
}

/// COMPRESSING -> COMPRESSED, shared by the gradual and the immediate path
fn complete_compression(state: FlattenState, config: &FlattenConfig) -> Step {
    let count = state.tracked_object_count.max(1);
    let damage = scale::stack_damage(count, config.base_damage, config.per_extra_object_damage);
    let width = scale::width_scale(config.min_height_scale);

    Step {
        state: FlattenState {
            phase: FlattenPhase::Compressed,
            height_scale: config.min_height_scale,
            width_scale: width,
            depth_scale: width,
            fallback_ticks_remaining: timer::initialize_timer(config.fallback_timeout_seconds),
            tracked_object_count: count,
            ..state
        },
        damage: Some(damage),
    }
}

/// New contact, a bigger stack, or a different identified object
///
/// A dynamic object settling into a static block loses its identity; that
/// alone is not a new arrival.
fn is_arrival(prev: &FlattenState, arrival: &Arrival) -> bool {
    !prev.has_contact
        || arrival.count > prev.tracked_object_count
        || (arrival.object_id.is_some() && arrival.object_id != prev.contact_object_id)
}

/// Objects pressing on the entity once the arrival is counted
///
/// An identified object landing on an existing contact sits on top of that
/// stack; when it settles the static stack reports the same total.
fn stacked_count(prev: &FlattenState, arrival: &Arrival) -> u32 {
    if prev.has_contact && arrival.object_id.is_some() {
        prev.tracked_object_count.saturating_add(arrival.count)
    } else {
        arrival.count
    }
}

/// Continuing contact on a flattened entity: keep the snapshot in sync only
fn refresh_contact(prev: &FlattenState, arrival: &Arrival) -> Step {
    // Still the same falling object: it already counts on top of the stack
    let count = if arrival.object_id.is_some() && arrival.object_id == prev.contact_object_id {
        prev.tracked_object_count.max(arrival.count)
    } else {
        arrival.count
    };
    if prev.tracked_object_count == count && prev.contact_position == arrival.position {
        return Step::unchanged(prev);
    }
    Step::to(FlattenState {
        tracked_object_count: count,
        contact_position: arrival.position,
        ..prev.clone()
    })
}
