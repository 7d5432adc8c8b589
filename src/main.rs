use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use moo::display::ProbabilityReport;
use moo::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DEALS, DEFAULT_SAMPLES, DegeneratePolicy, Estimator,
    EstimatorConfig, Rules, read_record,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Estimates who holds each unseen card from the rounds played so far.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Game record to analyse.
    record: PathBuf,

    /// Number of deals to sample.
    #[arg(short, long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (defaults to the number of CPUs).
    #[arg(short, long)]
    threads: Option<usize>,

    /// Deals per unit of parallel work.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Report cards without evidence as evenly spread instead of failing.
    #[arg(long)]
    uniform_fallback: bool,

    /// Deals played out per candidate card when ranking the observer's moves.
    #[arg(short, long, default_value_t = DEFAULT_DEALS)]
    deals: usize,

    /// Skip ranking the observer's moves.
    #[arg(long)]
    no_moves: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let rules = Rules::default();

    let file = File::open(&args.record)
        .with_context(|| format!("cannot open {}", args.record.display()))?;
    let record = read_record(BufReader::new(file), &rules)
        .with_context(|| format!("cannot read {}", args.record.display()))?;

    log::info!(
        "{:<24}{} players, {} rounds",
        "loaded record",
        record.player_count(),
        record.rounds.len()
    );

    let config = EstimatorConfig {
        samples: args.samples,
        seed: args.seed,
        threads: args.threads.unwrap_or_else(num_cpus::get),
        chunk_size: args.chunk_size,
        degenerate: if args.uniform_fallback {
            DegeneratePolicy::Uniform
        } else {
            DegeneratePolicy::Reject
        },
    };

    let names = record.players.clone();
    let ranks_moves =
        !args.no_moves && record.observer.is_some() && record.current_table.is_some();
    let estimator = Estimator::new(rules, record, config)?;
    let table = estimator.estimate()?;

    print!(
        "{}",
        ProbabilityReport {
            table: &table,
            names: &names,
        }
    );

    if ranks_moves {
        let seed = args.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let ranked = estimator.recommend(&table, args.deals, &mut rng)?;

        println!();
        println!("Relative cost of each play, best first:");
        for cost in &ranked {
            println!("{cost}");
        }
    }

    Ok(())
}
