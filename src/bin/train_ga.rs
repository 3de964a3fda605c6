use anyhow::{Context, Result};
use chainwalk::{evaluate, Config, Evolution, GenerationReport, Progress};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Evolve locomotion controllers for a segment chain.
#[derive(Debug, Parser)]
#[command(name = "train_ga")]
struct Args {
    /// JSON configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    lineages: Option<usize>,

    /// Random genomes sampled per lineage when seeding
    #[arg(long)]
    seed_samples: Option<usize>,

    #[arg(long)]
    mutants: Option<usize>,

    #[arg(long)]
    generations: Option<usize>,

    #[arg(long)]
    search_ticks: Option<u64>,

    #[arg(long)]
    demo_ticks: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    workers: Option<usize>,

    /// Replay each generation's best for the demonstration budget and log it
    #[arg(long)]
    demo: bool,

    /// Hide the per-evaluation progress bar
    #[arg(long)]
    no_progress: bool,
}

/// Terminal bar over the evaluations of the current batch.
struct EvaluationBar(ProgressBar);

impl EvaluationBar {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} evaluations ({eta})")?
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Ok(Self(bar))
    }
}

impl Progress for EvaluationBar {
    fn batch_started(&self, label: &str, total: usize) {
        self.0.reset();
        self.0.set_length(total as u64);
        self.0.set_message(label.to_string());
    }

    fn evaluated(&self) {
        self.0.inc(1);
    }

    fn batch_finished(&self) {
        self.0.finish_and_clear();
    }
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed reading {}", path.display()))?;
                Config::from_json(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
            None => Config::default(),
        };

        let evolution = &mut config.evolution;
        if let Some(v) = self.lineages {
            evolution.lineages = v;
        }
        if let Some(v) = self.seed_samples {
            evolution.seed_samples = v;
        }
        if let Some(v) = self.mutants {
            evolution.mutants_per_lineage = v;
        }
        if let Some(v) = self.generations {
            evolution.generations = v;
        }
        if let Some(v) = self.search_ticks {
            evolution.search_ticks = v;
        }
        if let Some(v) = self.demo_ticks {
            evolution.demo_ticks = v;
        }
        if self.seed.is_some() {
            evolution.seed = self.seed;
        }
        if self.workers.is_some() {
            evolution.workers = self.workers;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    let evolution_config = &config.evolution;

    info!(
        "Running GA training: lineages={}, seed_samples={}, mutants={}, generations={}, search_ticks={}",
        evolution_config.lineages,
        evolution_config.seed_samples,
        evolution_config.mutants_per_lineage,
        evolution_config.generations,
        evolution_config.search_ticks,
    );

    let demo_ticks = evolution_config.demo_ticks;
    let physics = config.physics.clone();
    let demo = args.demo;
    let mut evolution = Evolution::new(config).context("failed to start evolution")?;
    if !args.no_progress {
        evolution = evolution.with_progress(Arc::new(EvaluationBar::new()?));
    }

    let summary = evolution.run(&mut |report: &GenerationReport| {
        if !demo {
            return;
        }
        let outcome = evaluate(&report.best.genome, demo_ticks, &physics);
        match outcome.displacement() {
            Some(distance) => info!(
                "generation {} demonstration: {} ticks, distance {:.4}",
                report.generation, demo_ticks, distance
            ),
            None => info!(
                "generation {} demonstration aborted: {:?}",
                report.generation, outcome
            ),
        }
    });

    info!(
        "Best genome: distance {:.4} with {} segments",
        summary.best.fitness,
        summary.best.genome.segment_count()
    );
    println!("{}", serde_json::to_string_pretty(&summary.best)?);
    Ok(())
}
