//! Flattening scenario runner
//!
//! Drops heavy objects onto a single entity standing on a flat floor, runs the
//! flattening lifecycle tick by tick and reports what happened. Landed blocks
//! can be cleared part way through so the entity gets a chance to reform.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glam::{DVec3, IVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use flattening::core::config::{FlattenConfig, SharedConfig};
use flattening::core::error::Result;
use flattening::core::types::{EntityBody, EntityId, Tick};
use flattening::flatten::{FlattenPhase, ScaleTriple};
use flattening::integration::{
    DamageLog, FlattenRecord, PersistenceCodec, RecordCodec, ScaleProviderRegistry, ScaleTable,
};
use flattening::simulation::{FlattenEvent, FlattenService};
use flattening::world::BlockWorld;

/// Flattening scenario runner
#[derive(Parser, Debug)]
#[command(name = "flattening")]
#[command(about = "Drop heavy objects on an entity and trace its compression lifecycle")]
struct Args {
    /// TOML file with flattening settings (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 400)]
    ticks: u64,

    /// Random seed for the scattered drops
    #[arg(long)]
    seed: Option<u64>,

    /// Height above the entity's feet the first object is dropped from
    #[arg(long, default_value_t = 6.0)]
    drop_height: f64,

    /// Objects dropped in a column on top of the entity
    #[arg(long, default_value_t = 1)]
    stack: u32,

    /// Extra objects scattered around the entity
    #[arg(long, default_value_t = 0)]
    scatter: u32,

    /// Tick at which landed blocks are cleared away
    #[arg(long)]
    clear_at: Option<u64>,

    /// Ticks between reformation attempts while compressed
    #[arg(long, default_value_t = 20)]
    reform_every: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Transition {
    tick: Tick,
    from: FlattenPhase,
    to: FlattenPhase,
}

#[derive(Serialize)]
struct ScenarioReport {
    seed: u64,
    ticks: u64,
    transitions: Vec<Transition>,
    damage_total: f64,
    damage_hits: usize,
    reform_attempts: u32,
    reform_denials: Vec<String>,
    final_scales: ScaleTriple,
    final_state: FlattenRecord,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flattening=info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FlattenConfig::load(path)?,
        None => FlattenConfig::default(),
    };
    let config = SharedConfig::new(config);

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    // Flat floor with the entity standing in the middle
    let mut world = BlockWorld::new();
    world.fill_floor(-8..=8, 63, -8..=8);
    let body = EntityBody::new(EntityId::new(), DVec3::new(0.5, 64.0, 0.5));

    for i in 0..args.stack {
        let y = body.position.y + args.drop_height + i as f64;
        world.drop_object(DVec3::new(0.5, y, 0.5), 0.0);
    }
    for _ in 0..args.scatter {
        let x = rng.gen_range(-3..=3) as f64 + 0.5;
        let z = rng.gen_range(-3..=3) as f64 + 0.5;
        let y = body.position.y + rng.gen_range(2.0..12.0);
        world.drop_object(DVec3::new(x, y, z), 0.0);
    }

    tracing::info!(
        seed,
        stack = args.stack,
        scatter = args.scatter,
        "Starting flattening scenario"
    );

    let mut service = FlattenService::new(Arc::new(config));
    let mut damage = DamageLog::new();
    let mut scales = ScaleProviderRegistry::new();
    scales.register(Box::new(ScaleTable::new("table", 0)));

    let mut landed: Vec<IVec3> = Vec::new();
    let mut transitions = Vec::new();
    let mut reform_attempts = 0;
    let mut reform_denials = Vec::new();
    let mut compressed_since: Option<Tick> = None;

    for tick in 0..args.ticks {
        landed.extend(world.step().into_iter().map(|landing| landing.cell));

        if args.clear_at == Some(tick) {
            let cleared = landed.drain(..).filter(|cell| world.remove_heavy(*cell)).count();
            tracing::info!(tick, cleared, "Cleared landed blocks");
        }

        let events = service.run_tick(
            std::slice::from_ref(&body),
            &world,
            &mut damage,
            &mut scales,
        );
        for event in events {
            match event {
                FlattenEvent::PhaseChanged { tick, from, to, .. } => {
                    tracing::info!(tick, "{} -> {}", from.name(), to.name());
                    transitions.push(Transition { tick, from, to });
                }
                FlattenEvent::Damaged { tick, amount, .. } => {
                    tracing::info!(tick, amount, "Stack damage");
                }
                FlattenEvent::DamageSuppressed { tick, amount, .. } => {
                    tracing::info!(tick, amount, "Stack damage suppressed");
                }
            }
        }

        let phase = service.state(body.id).phase;
        if phase != FlattenPhase::Compressed {
            compressed_since = None;
            continue;
        }
        let since = *compressed_since.get_or_insert(tick);
        if args.reform_every > 0 && tick > since && (tick - since) % args.reform_every == 0 {
            reform_attempts += 1;
            if let Err(denial) = service.request_reform(&body, &world) {
                reform_denials.push(denial.to_string());
            }
        }
    }

    let state = service.state(body.id);
    let report = ScenarioReport {
        seed,
        ticks: args.ticks,
        transitions,
        damage_total: damage.total_for(body.id),
        damage_hits: damage.hits_for(body.id),
        reform_attempts,
        reform_denials,
        final_scales: state.render_scales(),
        final_state: RecordCodec::new().serialize(&state),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("\n=== FLATTENING SCENARIO (seed {}) ===", report.seed);
    println!("Ticks simulated: {}", report.ticks);
    println!();
    println!("Transitions:");
    for t in &report.transitions {
        println!("  [{:>4}] {:<11} -> {}", t.tick, t.from.name(), t.to.name());
    }
    println!();
    println!(
        "Damage: {:.1} over {} hit(s)",
        report.damage_total, report.damage_hits
    );
    println!(
        "Reform attempts: {} ({} denied)",
        report.reform_attempts,
        report.reform_denials.len()
    );
    if let Some(last) = report.reform_denials.last() {
        println!("  last denial: {}", last);
    }
    println!(
        "Final phase: {} (h {:.3}, w {:.3}, d {:.3})",
        report.final_state.phase.name(),
        report.final_scales.height,
        report.final_scales.width,
        report.final_scales.depth
    );
}
