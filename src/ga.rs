use crate::config::Config;
use crate::error::EvolutionError;
use crate::evaluator::{evaluate, Evaluation};
use crate::genome::Genome;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A genome and the best fitness observed for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub genome: Genome,
    pub fitness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Init,
    Seeded,
    Running { generation: usize },
    Terminal,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generation: usize,
    pub best: Candidate,
    pub mean_fitness: f64,
    pub worst_fitness: f64,
    /// Lineages whose parent was replaced by a strictly better mutant
    pub improved_lineages: usize,
    pub evaluations: usize,
    pub unstable: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
    pub ticks_per_sec: f64,
}

/// Receives the outcome of each generation. Observational only.
pub trait Reporter {
    fn on_generation(&mut self, report: &GenerationReport);
}

impl<F: FnMut(&GenerationReport)> Reporter for F {
    fn on_generation(&mut self, report: &GenerationReport) {
        self(report)
    }
}

/// Notified from worker threads as each evaluation of a batch finishes.
pub trait Progress: Send + Sync {
    fn batch_started(&self, _label: &str, _total: usize) {}
    fn evaluated(&self);
    fn batch_finished(&self) {}
}

#[derive(Debug, Clone)]
pub struct EvolutionSummary {
    pub population: Vec<Candidate>,
    pub best: Candidate,
    /// Best fitness after each generation
    pub history: Vec<f64>,
}

#[derive(Debug, Default)]
struct BatchStats {
    evaluations: usize,
    unstable: usize,
    cancelled: usize,
}

impl BatchStats {
    fn record(&mut self, outcomes: &[Evaluation]) {
        self.evaluations += outcomes.len();
        self.unstable += outcomes.iter().filter(|o| o.is_unstable()).count();
        self.cancelled += outcomes.iter().filter(|o| o.is_cancelled()).count();
    }
}

/// Lineage-based elitist search: seed, then per generation mutate every
/// lineage, evaluate all mutants in parallel, keep strict improvements and
/// truncate to the lineage count.
pub struct Evolution {
    config: Config,
    rng: SmallRng,
    pool: rayon::ThreadPool,
    population: Vec<Candidate>,
    state: SearchState,
    next_generation: usize,
    progress: Option<Arc<dyn Progress>>,
}

impl Evolution {
    pub fn new(config: Config) -> Result<Self, EvolutionError> {
        config.validate()?;
        let rng = match config.evolution.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.evolution.workers.unwrap_or(0))
            .thread_name(|idx| format!("chainwalk-eval-{idx}"))
            .build()?;

        Ok(Self {
            config,
            rng,
            pool,
            population: Vec::new(),
            state: SearchState::Init,
            next_generation: 0,
            progress: None,
        })
    }

    /// Attach a progress sink fed once per finished evaluation.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Best candidate so far, if seeded.
    pub fn best(&self) -> Option<&Candidate> {
        self.population.first()
    }

    /// Every lineage samples `seed_samples` random genomes and keeps its best.
    pub fn seed(&mut self) -> &[Candidate] {
        let evolution = &self.config.evolution;
        let samples = evolution.seed_samples;
        let tasks: Vec<Genome> = (0..evolution.lineages * samples)
            .map(|_| Genome::random(&mut self.rng, &self.config.mutation))
            .collect();

        let started = Instant::now();
        let outcomes = self.evaluate_all(&tasks, "seeding");
        let mut stats = BatchStats::default();
        stats.record(&outcomes);

        let mut population: Vec<Candidate> = tasks
            .chunks(samples)
            .zip(outcomes.chunks(samples))
            .map(|(genomes, results)| {
                let first = Candidate {
                    genome: genomes[0].clone(),
                    fitness: results[0].fitness().unwrap_or(f64::NEG_INFINITY),
                };
                genomes[1..]
                    .iter()
                    .zip(&results[1..])
                    .fold(first, |best, (genome, outcome)| improve(best, genome, outcome))
            })
            .collect();
        select(&mut population, evolution.lineages);

        debug!(
            lineages = population.len(),
            evaluations = stats.evaluations,
            unstable = stats.unstable,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "seeded population"
        );
        self.population = population;
        self.state = SearchState::Seeded;
        &self.population
    }

    /// One MUTATE → EVALUATE → SELECT round. Seeds first if needed.
    pub fn step_generation(&mut self) -> GenerationReport {
        if self.state == SearchState::Init {
            self.seed();
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let gen_start = Instant::now();
        let mutants_per_lineage = self.config.evolution.mutants_per_lineage;

        let mut tasks: Vec<Genome> = Vec::with_capacity(self.population.len() * mutants_per_lineage);
        for parent in &self.population {
            for _ in 0..mutants_per_lineage {
                tasks.push(parent.genome.mutated(&mut self.rng, &self.config.mutation));
            }
        }

        // collect() is the barrier: selection only sees complete batches
        let outcomes = self.evaluate_all(&tasks, &format!("generation {generation}"));
        let mut stats = BatchStats::default();
        stats.record(&outcomes);

        let mut improved_lineages = 0;
        let mut representatives: Vec<Candidate> = Vec::with_capacity(self.population.len());
        for (lineage, parent) in self.population.iter().enumerate() {
            let start = lineage * mutants_per_lineage;
            let end = start + mutants_per_lineage;
            let representative = tasks[start..end]
                .iter()
                .zip(&outcomes[start..end])
                .fold(parent.clone(), |best, (genome, outcome)| improve(best, genome, outcome));
            if representative.fitness > parent.fitness {
                improved_lineages += 1;
            }
            representatives.push(representative);
        }

        select(&mut representatives, self.config.evolution.lineages);
        self.population = representatives;
        self.state = SearchState::Running { generation };

        let elapsed = gen_start.elapsed();
        let secs = elapsed.as_secs_f64().max(1e-9);
        let simulated = stats.evaluations as f64 * self.config.evolution.search_ticks as f64;
        let finite: Vec<f64> = self
            .population
            .iter()
            .map(|c| c.fitness)
            .filter(|f| f.is_finite())
            .collect();
        let mean_fitness = if finite.is_empty() {
            f64::NEG_INFINITY
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        let worst_fitness = self
            .population
            .last()
            .map(|c| c.fitness)
            .unwrap_or(f64::NEG_INFINITY);

        GenerationReport {
            generation,
            best: self.population[0].clone(),
            mean_fitness,
            worst_fitness,
            improved_lineages,
            evaluations: stats.evaluations,
            unstable: stats.unstable,
            cancelled: stats.cancelled,
            elapsed,
            ticks_per_sec: simulated / secs,
        }
    }

    /// Seed, run the configured number of generations, and stop. There is no
    /// convergence-based early exit.
    pub fn run<R: Reporter + ?Sized>(&mut self, reporter: &mut R) -> EvolutionSummary {
        if self.state == SearchState::Init {
            self.seed();
        }
        let mut history = Vec::with_capacity(self.config.evolution.generations);

        for _ in 0..self.config.evolution.generations {
            let report = self.step_generation();
            info!(
                "generation {}: best = {:.4} ({} segments), mean = {:.4}, improved = {}/{}, evaluations = {}, ticks_per_sec = {:.0}",
                report.generation,
                report.best.fitness,
                report.best.genome.segment_count(),
                report.mean_fitness,
                report.improved_lineages,
                self.population.len(),
                report.evaluations,
                report.ticks_per_sec,
            );
            if report.unstable > 0 {
                warn!(
                    generation = report.generation,
                    unstable = report.unstable,
                    "discarded numerically unstable mutants"
                );
            }
            history.push(report.best.fitness);
            reporter.on_generation(&report);
        }

        self.state = SearchState::Terminal;
        let best = self.population[0].clone();
        EvolutionSummary {
            population: self.population.clone(),
            best,
            history,
        }
    }

    fn evaluate_all(&self, genomes: &[Genome], label: &str) -> Vec<Evaluation> {
        let ticks = self.config.evolution.search_ticks;
        let physics = &self.config.physics;
        let progress = self.progress.as_deref();
        if let Some(progress) = progress {
            progress.batch_started(label, genomes.len());
        }
        let outcomes: Vec<Evaluation> = self.pool.install(|| {
            genomes
                .par_iter()
                .map(|genome| {
                    let outcome = evaluate(genome, ticks, physics);
                    if let Some(progress) = progress {
                        progress.evaluated();
                    }
                    outcome
                })
                .collect()
        });
        if let Some(progress) = progress {
            progress.batch_finished();
        }
        outcomes
    }
}

/// Replace `best` only on a strictly greater fitness. Cancelled runs never win.
fn improve(best: Candidate, genome: &Genome, outcome: &Evaluation) -> Candidate {
    match outcome.fitness() {
        Some(fitness) if fitness > best.fitness => Candidate {
            genome: genome.clone(),
            fitness,
        },
        _ => best,
    }
}

/// Stable sort by fitness, best first, then truncate to `cap`.
pub fn select(pool: &mut Vec<Candidate>, cap: usize) {
    pool.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
    pool.truncate(cap);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingProgress {
        evaluated: AtomicUsize,
        batches: Mutex<Vec<(String, usize)>>,
        finished: AtomicUsize,
    }

    impl Progress for CountingProgress {
        fn batch_started(&self, label: &str, total: usize) {
            self.batches.lock().unwrap().push((label.to_string(), total));
        }

        fn evaluated(&self) {
            self.evaluated.fetch_add(1, Ordering::Relaxed);
        }

        fn batch_finished(&self) {
            self.finished.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn small_config(seed: u64) -> Config {
        let mut config = Config::default();
        config.evolution.lineages = 4;
        config.evolution.seed_samples = 3;
        config.evolution.mutants_per_lineage = 4;
        config.evolution.generations = 3;
        config.evolution.search_ticks = 90;
        config.evolution.seed = Some(seed);
        config.evolution.workers = Some(2);
        config
    }

    fn candidate(fitness: f64) -> Candidate {
        Candidate {
            genome: Genome::new(vec![[fitness.clamp(-3.0, 3.0); 3]]).unwrap(),
            fitness,
        }
    }

    #[test]
    fn test_select_keeps_the_best() {
        let mut pool: Vec<Candidate> = [0.5, -1.0, 2.0, f64::NEG_INFINITY, 1.5, 0.0]
            .iter()
            .map(|f| candidate(*f))
            .collect();
        let all = pool.clone();
        select(&mut pool, 3);
        let kept: Vec<f64> = pool.iter().map(|c| c.fitness).collect();
        assert_eq!(kept, vec![2.0, 1.5, 0.5]);
        let cutoff = kept[kept.len() - 1];
        for discarded in all.iter().filter(|c| !pool.contains(c)) {
            assert!(discarded.fitness <= cutoff);
        }
    }

    #[test]
    fn test_improve_requires_strict_gain() {
        let parent = candidate(1.0);
        let other = Genome::new(vec![[0.1, 0.2, 0.3]]).unwrap();

        let tie = improve(parent.clone(), &other, &Evaluation::Completed { displacement: 1.0 });
        assert_eq!(tie, parent);

        let cancelled = improve(parent.clone(), &other, &Evaluation::Cancelled { tick: 10 });
        assert_eq!(cancelled, parent);

        let unstable = improve(
            parent.clone(),
            &other,
            &Evaluation::Unstable {
                error: SimulationError::NonFiniteState { tick: 3, segment: 0 },
            },
        );
        assert_eq!(unstable, parent);

        let better = improve(parent, &other, &Evaluation::Completed { displacement: 1.25 });
        assert_eq!(better.genome, other);
        assert_eq!(better.fitness, 1.25);
    }

    #[test]
    fn test_seed_builds_sorted_population() {
        let mut evolution = Evolution::new(small_config(11)).unwrap();
        assert_eq!(evolution.state(), SearchState::Init);
        let population = evolution.seed().to_vec();
        assert_eq!(population.len(), 4);
        assert!(population.windows(2).all(|w| w[0].fitness >= w[1].fitness));
        assert!(population.iter().all(|c| c.fitness.is_finite()));
        assert_eq!(evolution.state(), SearchState::Seeded);
    }

    #[test]
    fn test_generations_are_elitist_and_bounded() {
        let mut evolution = Evolution::new(small_config(7)).unwrap();
        evolution.seed();
        let mut previous: Vec<f64> = evolution.population().iter().map(|c| c.fitness).collect();
        for expected_generation in 0..3 {
            let report = evolution.step_generation();
            assert_eq!(report.generation, expected_generation);
            assert_eq!(report.evaluations, 16);
            assert_eq!(report.cancelled, 0);

            let current: Vec<f64> = evolution.population().iter().map(|c| c.fitness).collect();
            assert!(current.len() <= 4);
            assert!(current.windows(2).all(|w| w[0] >= w[1]));
            for (now, before) in current.iter().zip(&previous) {
                assert!(now >= before, "fitness dropped from {before} to {now}");
            }
            assert_eq!(report.best.fitness, current[0]);
            previous = current;
        }
    }

    #[test]
    fn test_run_reports_every_generation() {
        let mut evolution = Evolution::new(small_config(3)).unwrap();
        let mut seen = Vec::new();
        let summary = evolution.run(&mut |report: &GenerationReport| seen.push(report.generation));
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(summary.history.len(), 3);
        assert!(summary.history.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(summary.best, summary.population[0]);
        assert_eq!(evolution.state(), SearchState::Terminal);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = |seed| {
            let mut evolution = Evolution::new(small_config(seed)).unwrap();
            evolution.run(&mut |_: &GenerationReport| {})
        };
        let a = run(99);
        let b = run(99);
        assert_eq!(a.history, b.history);
        assert_eq!(a.best, b.best);
    }

    #[test]
    fn test_progress_counts_every_evaluation() {
        let progress = Arc::new(CountingProgress::default());
        let mut evolution = Evolution::new(small_config(5))
            .unwrap()
            .with_progress(progress.clone());
        evolution.run(&mut |_: &GenerationReport| {});

        // 4 lineages x 3 seed samples, then 4 x 4 mutants for each of 3 generations
        assert_eq!(progress.evaluated.load(Ordering::Relaxed), 12 + 3 * 16);
        assert_eq!(progress.finished.load(Ordering::Relaxed), 4);
        let batches = progress.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![
                ("seeding".to_string(), 12),
                ("generation 0".to_string(), 16),
                ("generation 1".to_string(), 16),
                ("generation 2".to_string(), 16),
            ]
        );
    }

    #[test]
    fn test_unstable_mutants_do_not_stop_the_search() {
        // any chain longer than one segment diverges under this joint budget
        let mut config = small_config(21);
        config.physics.joint_iterations = 1;
        config.physics.max_joint_correction = 1e-6;
        config.mutation.max_segments = 2;
        config.mutation.grow_probability = 0.5;
        config.mutation.shrink_probability = 0.0;
        config.evolution.seed_samples = 4;

        let mut evolution = Evolution::new(config).unwrap();
        let seeded: Vec<f64> = evolution.seed().iter().map(|c| c.fitness).collect();
        assert!(seeded[0].is_finite());

        let mut unstable = 0;
        let mut previous = seeded;
        for _ in 0..3 {
            let report = evolution.step_generation();
            unstable += report.unstable;
            assert_eq!(report.evaluations, 16);

            let current: Vec<f64> = evolution.population().iter().map(|c| c.fitness).collect();
            assert_eq!(current.len(), previous.len());
            for (now, before) in current.iter().zip(&previous) {
                if before.is_finite() {
                    assert!(now.is_finite(), "unstable mutant displaced a finite lineage");
                }
                assert!(now >= before);
            }
            assert!(report.best.fitness.is_finite());
            previous = current;
        }
        assert!(unstable > 0);
        assert!(matches!(evolution.state(), SearchState::Running { generation: 2 }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config(1);
        config.evolution.seed_samples = 0;
        assert!(matches!(
            Evolution::new(config),
            Err(EvolutionError::Config(_))
        ));
    }
}
