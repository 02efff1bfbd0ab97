//! Flattening lifecycle integration tests
//!
//! Drive the service against the in-memory block world the way a host game
//! would: step the world, then run a flattening tick.

use std::sync::Arc;

use glam::{DVec3, IVec3};

use flattening::core::config::{FlattenConfig, SharedConfig};
use flattening::core::types::{EntityBody, EntityId};
use flattening::flatten::{FlattenPhase, ReformDenial};
use flattening::integration::{DamageLog, FlattenRecord, PersistenceCodec, RecordCodec, ScaleTable};
use flattening::simulation::{FlattenEvent, FlattenService};
use flattening::world::BlockWorld;

struct Harness {
    service: FlattenService,
    world: BlockWorld,
    body: EntityBody,
    damage: DamageLog,
    scales: ScaleTable,
    events: Vec<FlattenEvent>,
}

impl Harness {
    fn new(config: FlattenConfig) -> Self {
        let mut world = BlockWorld::new();
        world.fill_floor(-4..=4, 63, -4..=4);
        Self {
            service: FlattenService::new(Arc::new(config)),
            world,
            body: EntityBody::new(EntityId::new(), DVec3::new(0.5, 64.0, 0.5)),
            damage: DamageLog::new(),
            scales: ScaleTable::new("table", 0),
            events: Vec::new(),
        }
    }

    fn step(&mut self) {
        self.world.step();
        let events = self.service.run_tick(
            std::slice::from_ref(&self.body),
            &self.world,
            &mut self.damage,
            &mut self.scales,
        );
        self.events.extend(events);
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step();
        }
    }

    fn phase(&mut self) -> FlattenPhase {
        self.service.state(self.body.id).phase
    }

    fn transitions(&self) -> Vec<(FlattenPhase, FlattenPhase)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FlattenEvent::PhaseChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    /// Squash the entity with a resting block, then clear the block away
    fn compress_and_clear(&mut self) {
        let cell = IVec3::new(0, 64, 0);
        self.world.place_heavy(cell);
        self.step();
        assert_eq!(self.phase(), FlattenPhase::Compressed);
        self.world.remove_heavy(cell);
        self.step();
    }
}

#[test]
fn test_falling_object_squashes_gradually() {
    let mut h = Harness::new(FlattenConfig::default());

    // Drop a block from four blocks above the entity's feet
    h.world.drop_object(DVec3::new(0.5, 68.0, 0.5), 0.0);
    h.run(60);

    assert_eq!(
        h.transitions(),
        vec![
            (FlattenPhase::Normal, FlattenPhase::Compressing),
            (FlattenPhase::Compressing, FlattenPhase::Compressed),
        ]
    );
    assert_eq!(h.damage.hits_for(h.body.id), 1);
    assert_eq!(h.damage.total_for(h.body.id), 8.0);

    // The landed block keeps the entity flat
    let state = h.service.state(h.body.id);
    assert!(state.has_contact);
    assert_eq!(state.height_scale, 0.05);
    assert_eq!(h.world.heavy_block_count(), 1);
}

#[test]
fn test_scales_reach_the_sink() {
    let mut h = Harness::new(FlattenConfig::default());
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();

    let (triple, transition_ticks) = h.scales.get(h.body.id).unwrap();
    assert_eq!(triple.height, 0.05);
    assert!((triple.width - 1.475).abs() < 1e-9);
    assert!((triple.depth - 1.475).abs() < 1e-9);
    assert_eq!(transition_ticks, 0);
}

#[test]
fn test_fallback_timer_bypasses_blocking() {
    let config = FlattenConfig {
        fallback_timeout_seconds: 1,
        ..FlattenConfig::default()
    };
    let mut h = Harness::new(config);
    h.compress_and_clear();

    // A block hovering above the head blocks reformation but leaves room
    h.world.place_heavy(IVec3::new(0, 66, 0));
    assert_eq!(
        h.service.request_reform(&h.body, &h.world),
        Err(ReformDenial::Blocked)
    );
    assert_eq!(h.phase(), FlattenPhase::Compressed);

    // One second later the block no longer matters
    h.run(25);
    assert!(h.service.state(h.body.id).fallback_expired());
    assert_eq!(
        h.service.request_reform(&h.body, &h.world),
        Ok(FlattenPhase::Recovering)
    );

    h.run(25);
    assert!(h.service.state(h.body.id).is_normal());
}

#[test]
fn test_no_fallback_keeps_blocking_forever() {
    let config = FlattenConfig {
        fallback_timeout_seconds: 0,
        ..FlattenConfig::default()
    };
    let mut h = Harness::new(config);
    h.compress_and_clear();
    h.world.place_heavy(IVec3::new(0, 66, 0));

    h.run(400);
    assert_eq!(
        h.service.request_reform(&h.body, &h.world),
        Err(ReformDenial::Blocked)
    );
}

#[test]
fn test_low_ceiling_denies_reform() {
    let mut h = Harness::new(FlattenConfig {
        blocking_enabled: false,
        ..FlattenConfig::default()
    });
    h.compress_and_clear();

    // One block of headroom is short of 0.75 * 1.8
    h.world.place_solid(IVec3::new(0, 65, 0));
    let denial = h.service.request_reform(&h.body, &h.world).unwrap_err();
    assert!(matches!(
        denial,
        ReformDenial::InsufficientClearance { available, required }
            if available == 1.0 && (required - 1.35).abs() < 1e-9
    ));
}

#[test]
fn test_recovery_returns_to_normal() {
    let mut h = Harness::new(FlattenConfig::default());
    h.compress_and_clear();
    assert!(h.service.request_reform(&h.body, &h.world).is_ok());

    h.step();
    let mid = h.service.state(h.body.id);
    assert_eq!(mid.phase, FlattenPhase::Recovering);
    assert!(mid.height_scale > 0.05 && mid.height_scale < 1.0);

    h.run(20);
    assert!(h.service.state(h.body.id).is_normal());
    assert_eq!(h.scales.get(h.body.id).unwrap().0.height, 1.0);
}

#[test]
fn test_recompress_while_recovering() {
    let mut h = Harness::new(FlattenConfig::default());
    h.compress_and_clear();
    assert!(h.service.request_reform(&h.body, &h.world).is_ok());
    h.run(3);

    // Two blocks land on the recovering entity
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.world.place_heavy(IVec3::new(0, 65, 0));
    h.step();

    let state = h.service.state(h.body.id);
    assert_eq!(state.phase, FlattenPhase::Compressing);
    assert!((state.spread_multiplier - 1.6).abs() < 1e-9);
    assert_eq!(state.reflatten_cooldown_ticks, 10);
    assert_eq!(state.tracked_object_count, 2);
    // Contact came back after being lost: replacement damage
    assert_eq!(h.damage.total_for(h.body.id), 8.0 + 10.0);

    // The stack sits on the floor, so the next tick completes the squash
    h.step();
    let state = h.service.state(h.body.id);
    assert_eq!(state.phase, FlattenPhase::Compressed);
    assert!((state.spread_multiplier - 1.6).abs() < 1e-9);
    assert_eq!(h.damage.hits_for(h.body.id), 3);
}

#[test]
fn test_continuing_contact_deals_no_extra_damage() {
    let mut h = Harness::new(FlattenConfig::default());
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.run(50);

    assert_eq!(h.damage.hits_for(h.body.id), 1);
    assert_eq!(h.phase(), FlattenPhase::Compressed);
}

#[test]
fn test_immune_entity_still_flattens() {
    let mut h = Harness::new(FlattenConfig::default());
    h.body = h.body.clone().immune();
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();

    assert_eq!(h.phase(), FlattenPhase::Compressed);
    assert!(h.damage.entries.is_empty());
    assert!(h
        .events
        .iter()
        .any(|e| matches!(e, FlattenEvent::DamageSuppressed { .. })));
}

#[test]
fn test_config_reload_applies_on_next_use() {
    let shared = SharedConfig::new(FlattenConfig::default());
    let mut h = Harness::new(FlattenConfig::default());
    h.service = FlattenService::new(Arc::new(shared.clone()));

    shared
        .replace(FlattenConfig {
            base_damage: 20.0,
            ..FlattenConfig::default()
        })
        .unwrap();

    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();
    assert_eq!(h.damage.total_for(h.body.id), 20.0);
}

#[test]
fn test_death_and_disconnect() {
    let mut h = Harness::new(FlattenConfig::default());
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();
    assert_eq!(h.service.census().compressed, 1);

    h.service.on_death(h.body.id);
    assert!(h.service.state(h.body.id).is_normal());
    assert_eq!(h.service.census().normal, 1);

    h.service.on_disconnect(h.body.id, &mut h.scales);
    assert!(h.service.peek(h.body.id).is_none());
    assert!(h.scales.get(h.body.id).is_none());
    assert_eq!(h.service.census().total(), 0);
}

#[test]
fn test_export_import_through_json() {
    let mut h = Harness::new(FlattenConfig::default());
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();

    let codec = RecordCodec::new();
    let exported = h.service.export(&codec);
    let json = serde_json::to_string(&exported).unwrap();

    let records: Vec<(EntityId, FlattenRecord)> = serde_json::from_str(&json).unwrap();
    let mut restored = FlattenService::new(Arc::new(FlattenConfig::default()));
    assert_eq!(restored.import(&codec, records), 1);

    let before = h.service.state(h.body.id);
    let after = restored.state(h.body.id);
    assert_eq!(*before, *after);
    assert_eq!(codec.serialize(&after).phase, FlattenPhase::Compressed);
}

#[test]
fn test_anvil_landing_on_resting_block_spreads_once() {
    let mut h = Harness::new(FlattenConfig::default());
    h.world.place_heavy(IVec3::new(0, 64, 0));
    h.step();
    assert_eq!(h.service.state(h.body.id).spread_multiplier, 0.0);

    // Second block falls onto the one already pinning the entity
    h.world.drop_object(DVec3::new(0.5, 68.0, 0.5), 0.0);
    let mut spreads = Vec::new();
    for _ in 0..80 {
        h.step();
        spreads.push(h.service.state(h.body.id).spread_multiplier);
    }

    let increases = spreads.windows(2).filter(|w| w[1] > w[0]).count()
        + usize::from(spreads[0] > 0.0);
    assert_eq!(increases, 1);

    let state = h.service.state(h.body.id);
    assert!((state.spread_multiplier - 0.8).abs() < 1e-9);
    assert_eq!(state.tracked_object_count, 2);
    assert_eq!(state.phase, FlattenPhase::Compressed);
    assert_eq!(h.world.heavy_block_count(), 2);
    assert_eq!(h.damage.hits_for(h.body.id), 1);
}

#[test]
fn test_anvil_in_next_column_leaves_entity_alone() {
    let mut h = Harness::new(FlattenConfig::default());

    // Falls through x 1.0..2.0; the entity only spans x 0.2..0.8
    h.world.drop_object(DVec3::new(1.5, 68.0, 0.5), 0.0);
    h.run(60);

    assert!(h.transitions().is_empty());
    assert!(h.service.state(h.body.id).is_normal());
    assert_eq!(h.world.heavy_block_count(), 1);
    assert!(h.damage.entries.is_empty());
}
