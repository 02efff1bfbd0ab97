//! Tick driver - orchestrates the flattening lifecycle
//!
//! This is the loop that ties together, per tracked entity:
//! timers -> contact detection -> phase transition -> store -> damage -> scales
//!
//! The driver is the single writer of the state store. Everything runs
//! sequentially on the caller's thread; readers only ever see whole
//! snapshots.

use std::sync::Arc;

use ahash::AHashMap;

use crate::contact::{ContactDetector, WorldProbe, WorldQuery};
use crate::core::config::ConfigSource;
use crate::core::types::{EntityBody, EntityId, Tick};
use crate::flatten::scale::transition_ticks;
use crate::flatten::{
    FlattenPhase, FlattenState, PhaseCensus, PhaseStateMachine, PhaseStateStore, ReformDenial,
    ReformationGate,
};
use crate::integration::{DamageSink, PersistenceCodec, ScaleSink};

/// Events generated during a flattening tick
///
/// Returned by [`FlattenService::run_tick`] for logging and UI feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenEvent {
    /// An entity moved to a new phase (cascades report the end phase)
    PhaseChanged {
        entity: EntityId,
        tick: Tick,
        from: FlattenPhase,
        to: FlattenPhase,
    },
    /// Stack damage forwarded to the damage sink
    Damaged {
        entity: EntityId,
        tick: Tick,
        amount: f64,
    },
    /// Stack damage withheld because the entity is immune
    DamageSuppressed {
        entity: EntityId,
        tick: Tick,
        amount: f64,
    },
}

pub struct FlattenService {
    store: PhaseStateStore,
    machine: PhaseStateMachine,
    gate: ReformationGate,
    detector: ContactDetector,
    /// Last tracked falling velocity per entity in COMPRESSING
    velocities: AHashMap<EntityId, f64>,
    current_tick: Tick,
}

impl FlattenService {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self::with_detector(config, ContactDetector::new())
    }

    pub fn with_detector(config: Arc<dyn ConfigSource>, detector: ContactDetector) -> Self {
        Self {
            store: PhaseStateStore::new(),
            machine: PhaseStateMachine::new(config.clone()),
            gate: ReformationGate::new(config),
            detector,
            velocities: AHashMap::new(),
            current_tick: 0,
        }
    }

    pub fn detector_mut(&mut self) -> &mut ContactDetector {
        &mut self.detector
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Current snapshot, creating a NORMAL one on first query
    pub fn state(&mut self, id: EntityId) -> Arc<FlattenState> {
        self.store.get_or_create(id)
    }

    /// Current snapshot if the entity is tracked
    pub fn peek(&self, id: EntityId) -> Option<Arc<FlattenState>> {
        self.store.get(id)
    }

    pub fn census(&self) -> PhaseCensus {
        self.store.census()
    }

    /// Run a single flattening tick over the given bodies
    ///
    /// For every body:
    /// 1. Count down timers and advance recovery
    /// 2. Detect contact (triggers, then dynamic, then static objects)
    /// 3. Apply the contact transition
    /// 4. Store the new snapshot
    /// 5. Forward stack damage unless the entity is immune
    /// 6. Push the scale triple to the sink
    pub fn run_tick(
        &mut self,
        bodies: &[EntityBody],
        world: &dyn WorldQuery,
        damage: &mut dyn DamageSink,
        scales: &mut dyn ScaleSink,
    ) -> Vec<FlattenEvent> {
        let mut events = Vec::new();
        for body in bodies {
            self.tick_entity(body, world, damage, scales, &mut events);
        }
        self.current_tick += 1;
        events
    }

    fn tick_entity(
        &mut self,
        body: &EntityBody,
        world: &dyn WorldQuery,
        damage: &mut dyn DamageSink,
        scales: &mut dyn ScaleSink,
        events: &mut Vec<FlattenEvent>,
    ) {
        let prev = self.store.get_or_create(body.id);
        let timed = self.machine.tick(&prev);

        let signal = self.detector.tick(body, world);
        // Threaded through the transition and written back afterwards
        let mut velocity = self.velocities.get(&body.id).copied().unwrap_or(0.0);
        let step = self
            .machine
            .apply_contact(&timed, body, signal.as_ref(), &mut velocity);
        let next = step.state;

        if next.phase == FlattenPhase::Normal {
            self.velocities.remove(&body.id);
        } else {
            self.velocities.insert(body.id, velocity);
        }

        if next.phase != prev.phase {
            tracing::debug!(
                entity = %body.id,
                from = prev.phase.name(),
                to = next.phase.name(),
                height = next.height_scale,
                "Flatten phase changed"
            );
            events.push(FlattenEvent::PhaseChanged {
                entity: body.id,
                tick: self.current_tick,
                from: prev.phase,
                to: next.phase,
            });
        }

        if let Some(amount) = step.damage {
            if body.damage_immune {
                tracing::trace!(entity = %body.id, amount, "Stack damage suppressed");
                events.push(FlattenEvent::DamageSuppressed {
                    entity: body.id,
                    tick: self.current_tick,
                    amount,
                });
            } else {
                damage.apply_damage(body.id, amount);
                events.push(FlattenEvent::Damaged {
                    entity: body.id,
                    tick: self.current_tick,
                    amount,
                });
            }
        }

        scales.set_scales(
            body.id,
            next.render_scales(),
            transition_ticks(next.phase, velocity),
        );

        if next != *prev {
            self.store.replace(body.id, next);
        }
    }

    /// Ask for a COMPRESSED entity to start reforming
    ///
    /// A denial leaves the state untouched.
    pub fn request_reform(
        &mut self,
        body: &EntityBody,
        world: &dyn WorldQuery,
    ) -> Result<FlattenPhase, ReformDenial> {
        let prev = self.store.get_or_create(body.id);
        let probe = WorldProbe::new(world);

        match self.gate.check(&prev, body, &probe) {
            Ok(permit) => {
                let step = self.machine.begin_reformation(&prev, permit);
                let phase = step.state.phase;
                tracing::debug!(entity = %body.id, "Reformation started");
                self.store.replace(body.id, step.state);
                Ok(phase)
            }
            Err(denial) => {
                tracing::debug!(entity = %body.id, %denial, "Reformation denied");
                Err(denial)
            }
        }
    }

    /// Death or respawn: the entity is NORMAL again
    pub fn on_death(&mut self, id: EntityId) {
        let prev = self.store.get_or_create(id);
        self.store.replace(id, self.machine.reset(&prev));
        self.velocities.remove(&id);
    }

    /// The entity left: forget everything about it
    pub fn on_disconnect(&mut self, id: EntityId, scales: &mut dyn ScaleSink) {
        self.store.remove(id);
        self.velocities.remove(&id);
        scales.invalidate(id);
    }

    /// Serialize every tracked state
    pub fn export<C: PersistenceCodec>(&self, codec: &C) -> Vec<(EntityId, C::Record)> {
        self.store
            .iter()
            .map(|(id, state)| (*id, codec.serialize(state)))
            .collect()
    }

    /// Restore states; records that fail to decode become NORMAL
    ///
    /// Returns how many records decoded cleanly.
    pub fn import<C: PersistenceCodec>(
        &mut self,
        codec: &C,
        records: impl IntoIterator<Item = (EntityId, C::Record)>,
    ) -> usize {
        let mut restored = 0;
        for (id, record) in records {
            match codec.deserialize(&record) {
                Ok(state) => {
                    self.store.replace(id, state);
                    restored += 1;
                }
                Err(e) => {
                    tracing::warn!(entity = %id, "Discarding unreadable flatten state: {}", e);
                    self.store.replace(id, FlattenState::normal());
                }
            }
            self.velocities.remove(&id);
        }
        restored
    }
}
