use std::{collections::HashMap, sync::Arc};

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pairrank::{
    model::structures::{
        comparison::GroupSize,
        entity::{CatalogFilter, EntityAttributes, EntityId, InMemoryCatalog},
        tier::TierId
    },
    utils::progress_utils::progress_bar,
    EngineConfig, JsonFileBackend, RankSession, RankingSnapshot
};

mod args;

use args::Args;

/// Spread of the noise added to an entity's hidden strength when picking a
/// simulated winner. Larger values produce more upsets.
const SIM_NOISE: f64 = 30.0;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    let catalog = synthetic_catalog(args.entities);
    let mut config = EngineConfig::default();
    config.initial_tier = TierId(args.tier_size);

    let session_rng = ChaCha8Rng::seed_from_u64(args.seed);
    // Separate stream so simulated picks do not perturb matchmaking draws
    let mut sim_rng = ChaCha8Rng::seed_from_u64(args.seed.wrapping_add(1));

    let mut session = match &args.data_dir {
        Some(dir) => {
            let backend = JsonFileBackend::new(dir).expect("failed to prepare data directory");
            RankSession::with_persistence(
                config,
                Box::new(catalog),
                CatalogFilter::all(),
                session_rng,
                Arc::new(backend)
            )
        }
        None => RankSession::new(config, Box::new(catalog), CatalogFilter::all(), session_rng)
    }
    .expect("engine construction failed");

    info!(
        "simulating {} comparisons over {} entities (seed {})",
        args.comparisons, args.entities, args.seed
    );

    let group_size = if args.group_size == 3 {
        GroupSize::Triple
    } else {
        GroupSize::Pair
    };

    let bar = progress_bar(args.comparisons as u64, "Simulating comparisons".to_string());

    for _ in 0..args.comparisons {
        let group = match session.select_next_group(group_size) {
            Ok(group) => group,
            Err(e) => {
                eprintln!("selection failed: {e}");
                break;
            }
        };

        let winner = simulated_winner(group.members(), args.entities, &mut sim_rng);
        if let Err(e) = session.process_outcome(&[winner]) {
            eprintln!("outcome rejected: {e}");
            continue;
        }

        if let Some(milestone) = session.milestone_reached() {
            bar.suspend(|| {
                println!("\n=== milestone: {milestone} comparisons ===");
                print_snapshot(&session.generate_tier_snapshot(), 10);
            });
            session.acknowledge_milestone();
        }

        bar.inc(1);
    }
    bar.finish();

    println!("\n=== final ranking ===");
    print_snapshot(&session.generate_snapshot(), 20);
}

/// Catalog with ids 1..=size. Hidden strength decreases with id, so a
/// correct run ranks low ids near the top.
fn synthetic_catalog(size: usize) -> InMemoryCatalog {
    let mut entries = HashMap::new();
    for id in 1..=size as EntityId {
        entries.insert(
            id,
            EntityAttributes {
                name: format!("entity-{id:03}"),
                category: None
            }
        );
    }

    InMemoryCatalog::new(entries)
}

fn simulated_winner(members: &[EntityId], population: usize, rng: &mut ChaCha8Rng) -> EntityId {
    members
        .iter()
        .map(|&id| {
            let performance = (population as f64 - id as f64) + rng.random_range(-SIM_NOISE..SIM_NOISE);
            (id, performance)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
        .expect("group is never empty")
}

fn print_snapshot(snapshot: &RankingSnapshot, limit: usize) {
    println!("{:>4}  {:<12} {:>8} {:>8} {:>6} {:>11}", "rank", "name", "score", "mean", "n", "confidence");
    for entry in snapshot.entries.iter().take(limit) {
        println!(
            "{:>4}  {:<12} {:>8.2} {:>8.2} {:>6} {:>10.0}%",
            entry.rank, entry.name, entry.conservative_score, entry.mean, entry.comparisons, entry.confidence_percent
        );
    }
}
