use anyhow::{bail, Context, Result};
use chainwalk::{CancelToken, Evaluation, Genome, MutationConfig, PhysicsConfig, Rollout};
use clap::Parser;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::info;

const PRINT_INTERVAL: u64 = 30;

/// Run one chain offline and print its trajectory.
#[derive(Debug, Parser)]
#[command(name = "chainwalk")]
struct Args {
    /// Ticks to simulate
    #[arg(default_value_t = 500)]
    ticks: u64,

    /// Control table as JSON, e.g. '[[3,-3,3],[0,1,0]]'
    #[arg(long)]
    genome: Option<String>,

    /// Seed for a random genome when --genome is absent
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let genome = match &args.genome {
        Some(raw) => serde_json::from_str::<Genome>(raw).context("invalid --genome table")?,
        None => {
            let mut rng = SmallRng::seed_from_u64(args.seed);
            Genome::random(&mut rng, &MutationConfig::default())
        }
    };

    info!(
        "Running offline simulation of {} segments for {} ticks...",
        genome.segment_count(),
        args.ticks
    );

    let start_time = Instant::now();
    let cancel = CancelToken::new();
    let mut rollout = Rollout::new(&genome, args.ticks, &PhysicsConfig::default());
    let outcome = loop {
        if let Some(outcome) = rollout.advance(&cancel) {
            break outcome.clone();
        }
        let tick = rollout.world().tick();
        if tick % PRINT_INTERVAL == 0 {
            let world = rollout.world();
            let head = &world.segments()[0];
            info!(
                "tick {:>4} t={:.2}s (phase {}): head=({:+.1}, {:+.1}) vel=({:+.1}, {:+.1}) distance={:+.3} joint sweeps={}",
                tick,
                world.time(),
                world.phase(),
                head.position.x,
                head.position.y,
                head.velocity.x,
                head.velocity.y,
                world.displacement(),
                world.last_solve().sweeps,
            );
        }
    };

    let duration = start_time.elapsed();
    let ticks_per_second = rollout.world().tick() as f64 / duration.as_secs_f64().max(1e-9);
    info!("Total time: {:.3} seconds ({:.0} ticks/s)", duration.as_secs_f64(), ticks_per_second);
    println!("{}", serde_json::to_string(&genome)?);

    match outcome {
        Evaluation::Completed { displacement } => {
            println!("distance: {displacement:.4}");
            Ok(())
        }
        Evaluation::Unstable { error } => bail!("simulation became unstable: {error}"),
        Evaluation::Cancelled { tick } => bail!("simulation cancelled at tick {tick}"),
    }
}
