//! RateVault Simulator
//!
//! Drives one shared rate cache from many concurrent converter tasks: round
//! one provokes the cold-start refresh, then the table is left to expire and
//! round two shows exactly one more refresh regardless of worker count.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratevault_common::{Currency, DurationExt, Money};
use ratevault_fx::{CurrencyConverter, RateCache, RateCacheConfig, SimulatedRateSource};

/// RateVault Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "RateVault concurrent conversion demo")]
struct Args {
    /// Number of concurrent converter tasks
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Conversions performed by each worker per round
    #[arg(short, long, default_value = "6")]
    conversions: usize,

    /// Amount converted each time
    #[arg(short, long, default_value = "1000")]
    amount: Decimal,

    /// Seconds before the rate table goes stale
    #[arg(long, default_value = "2")]
    refresh_secs: i64,

    /// Fluctuation band half-width in basis points
    #[arg(long, default_value = "200")]
    fluctuation_bps: u32,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting RateVault simulator");
    info!("Workers: {}", args.workers);
    info!("Refresh interval: {}s", args.refresh_secs);

    let config = RateCacheConfig {
        refresh_interval: Duration::seconds(args.refresh_secs),
        fluctuation_bps: args.fluctuation_bps,
        ..Default::default()
    };

    let source = Arc::new(
        SimulatedRateSource::with_default_quotes(args.fluctuation_bps, args.seed)
            .context("building simulated source")?,
    );
    let cache = Arc::new(RateCache::new(config, source).context("building rate cache")?);

    for round in 1..=2usize {
        run_round(round, &cache, &args).await?;

        let stats = cache.stats();
        info!(
            round,
            generation = stats.generation,
            pairs = stats.pairs,
            refreshes = stats.refreshes,
            "round complete"
        );

        if round == 1 {
            // Let the table expire so the next round provokes exactly one
            // more refresh.
            info!("Waiting for the rate table to expire...");
            let wait = Duration::seconds(args.refresh_secs) + Duration::milliseconds(100);
            tokio::time::sleep(wait.as_std()).await;
        }
    }

    let stats = cache.stats();
    info!("Simulation complete");
    info!("Final generation: {}", stats.generation);
    info!("Total refreshes: {}", stats.refreshes);

    Ok(())
}

/// Spawn one converter task per worker and wait for all of them.
async fn run_round(round: usize, cache: &Arc<RateCache>, args: &Args) -> anyhow::Result<()> {
    let mut handles = Vec::new();

    for worker in 0..args.workers {
        let converter = CurrencyConverter::new(Arc::clone(cache));
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s ^ ((round as u64) << 32) ^ worker as u64),
            None => StdRng::from_entropy(),
        };

        handles.push(tokio::spawn(run_worker(
            worker,
            converter,
            args.conversions,
            args.amount,
            rng,
        )));
    }

    for handle in handles {
        handle.await??;
    }

    Ok(())
}

async fn run_worker(
    id: usize,
    converter: CurrencyConverter,
    conversions: usize,
    amount: Decimal,
    mut rng: StdRng,
) -> anyhow::Result<()> {
    let currencies = [
        Currency::usd(),
        Currency::eur(),
        Currency::gbp(),
        Currency::jpy(),
    ];

    for _ in 0..conversions {
        let from = currencies[rng.gen_range(0..currencies.len())].clone();
        let to = currencies[rng.gen_range(0..currencies.len())].clone();

        let input = Money::new(amount, from);
        let output = converter.convert(&input, &to).await?;

        info!(worker = id, input = %input, output = %output, "converted");
    }

    Ok(())
}
