use crate::config::PhysicsConfig;
use crate::error::SimulationError;
use crate::genome::Genome;
use crate::physics::SegmentPose;
use crate::world::SimulationWorld;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared flag used by an outside party (usually a viewer) to stop a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a single run ended. A cancelled run carries no distance at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Completed { displacement: f64 },
    Unstable { error: SimulationError },
    Cancelled { tick: u64 },
}

impl Evaluation {
    /// Score used for ranking. Unstable runs rank below everything;
    /// cancelled runs have no score and must not be compared.
    pub fn fitness(&self) -> Option<f64> {
        match self {
            Evaluation::Completed { displacement } => Some(*displacement),
            Evaluation::Unstable { .. } => Some(f64::NEG_INFINITY),
            Evaluation::Cancelled { .. } => None,
        }
    }

    pub fn displacement(&self) -> Option<f64> {
        match self {
            Evaluation::Completed { displacement } => Some(*displacement),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Evaluation::Cancelled { .. })
    }

    pub fn is_unstable(&self) -> bool {
        matches!(self, Evaluation::Unstable { .. })
    }
}

/// Per-tick view handed to a renderer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub tick: u64,
    pub phase: usize,
    pub displacement: f64,
    pub poses: Vec<SegmentPose>,
}

pub trait FrameObserver {
    fn on_frame(&mut self, frame: &Frame);
}

impl<F: FnMut(&Frame)> FrameObserver for F {
    fn on_frame(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// A run in progress: one owned world plus its tick budget. Can be driven a
/// tick at a time (viewer) or to completion (search).
pub struct Rollout {
    world: SimulationWorld,
    ticks: u64,
    outcome: Option<Evaluation>,
}

impl Rollout {
    pub fn new(genome: &Genome, ticks: u64, config: &PhysicsConfig) -> Self {
        Self {
            world: SimulationWorld::new(genome, config),
            ticks,
            outcome: None,
        }
    }

    /// Step once unless finished or cancelled. Returns the outcome once the
    /// run has ended, and keeps returning it afterwards.
    pub fn advance(&mut self, cancel: &CancelToken) -> Option<&Evaluation> {
        if self.outcome.is_none() {
            self.outcome = self.next_outcome(cancel);
        }
        self.outcome.as_ref()
    }

    fn next_outcome(&mut self, cancel: &CancelToken) -> Option<Evaluation> {
        if self.world.tick() >= self.ticks {
            return Some(Evaluation::Completed {
                displacement: self.world.displacement(),
            });
        }
        if cancel.is_cancelled() {
            return Some(Evaluation::Cancelled {
                tick: self.world.tick(),
            });
        }
        if let Err(error) = self.world.step() {
            debug!(
                segments = self.world.segments().len(),
                "abandoning unstable run: {error}"
            );
            return Some(Evaluation::Unstable { error });
        }
        if self.world.tick() >= self.ticks {
            return Some(Evaluation::Completed {
                displacement: self.world.displacement(),
            });
        }
        None
    }

    pub fn frame(&self) -> Frame {
        Frame {
            tick: self.world.tick(),
            phase: self.world.phase(),
            displacement: self.world.displacement(),
            poses: self.world.poses(),
        }
    }

    pub fn world(&self) -> &SimulationWorld {
        &self.world
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn outcome(&self) -> Option<&Evaluation> {
        self.outcome.as_ref()
    }

    pub fn finish(mut self, cancel: &CancelToken) -> Evaluation {
        loop {
            if let Some(outcome) = self.advance(cancel) {
                return outcome.clone();
            }
        }
    }
}

/// Simulate `genome` for `ticks` ticks in a fresh world and report the
/// displacement of the first segment. The world is dropped before returning.
pub fn run(genome: &Genome, ticks: u64, config: &PhysicsConfig, cancel: &CancelToken) -> Evaluation {
    Rollout::new(genome, ticks, config).finish(cancel)
}

/// Like [`run`], emitting a frame after every completed tick.
pub fn run_observed<O: FrameObserver + ?Sized>(
    genome: &Genome,
    ticks: u64,
    config: &PhysicsConfig,
    cancel: &CancelToken,
    observer: &mut O,
) -> Evaluation {
    let mut rollout = Rollout::new(genome, ticks, config);
    loop {
        let before = rollout.world().tick();
        let finished = rollout.advance(cancel).cloned();
        if rollout.world().tick() > before {
            observer.on_frame(&rollout.frame());
        }
        if let Some(outcome) = finished {
            return outcome;
        }
    }
}

/// Uncancellable run used by the search.
pub fn evaluate(genome: &Genome, ticks: u64, config: &PhysicsConfig) -> Evaluation {
    run(genome, ticks, config, &CancelToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genome(rows: Vec<[f64; 3]>) -> Genome {
        Genome::new(rows).unwrap()
    }

    #[test]
    fn test_zero_ticks_completes_at_origin() {
        let outcome = evaluate(&genome(vec![[1.0; 3]]), 0, &PhysicsConfig::default());
        assert_eq!(outcome, Evaluation::Completed { displacement: 0.0 });
    }

    #[test]
    fn test_pre_cancelled_run_is_aborted() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = run(&genome(vec![[3.0, -3.0, 3.0]]), 500, &PhysicsConfig::default(), &cancel);
        assert_eq!(outcome, Evaluation::Cancelled { tick: 0 });
        assert_eq!(outcome.fitness(), None);
        assert_eq!(outcome.displacement(), None);
    }

    #[test]
    fn test_observer_sees_every_tick() {
        let mut ticks = Vec::new();
        let outcome = run_observed(
            &genome(vec![[0.5, 0.0, -0.5], [1.0, 1.0, 1.0]]),
            120,
            &PhysicsConfig::default(),
            &CancelToken::new(),
            &mut |frame: &Frame| {
                assert_eq!(frame.poses.len(), 2);
                ticks.push(frame.tick);
            },
        );
        assert!(matches!(outcome, Evaluation::Completed { .. }));
        assert_eq!(ticks, (1..=120).collect::<Vec<u64>>());
    }

    #[test]
    fn test_observed_and_plain_runs_agree() {
        let g = genome(vec![[2.0, -1.0, 0.3], [-2.0, 2.5, 1.0]]);
        let config = PhysicsConfig::default();
        let plain = evaluate(&g, 300, &config);
        let observed = run_observed(&g, 300, &config, &CancelToken::new(), &mut |_: &Frame| {});
        assert_eq!(plain, observed);
    }

    #[test]
    fn test_rollout_outcome_is_sticky() {
        let cancel = CancelToken::new();
        let mut rollout = Rollout::new(&genome(vec![[0.0; 3]]), 3, &PhysicsConfig::default());
        assert!(rollout.advance(&cancel).is_none());
        assert!(rollout.advance(&cancel).is_none());
        let done = rollout.advance(&cancel).cloned();
        assert!(matches!(done, Some(Evaluation::Completed { .. })));
        cancel.cancel();
        assert_eq!(rollout.advance(&cancel).cloned(), done);
        assert_eq!(rollout.world().tick(), 3);
    }

    #[test]
    fn test_unstable_runs_rank_last() {
        let config = PhysicsConfig {
            joint_iterations: 1,
            max_joint_correction: 1e-6,
            ..PhysicsConfig::default()
        };
        let outcome = evaluate(&genome(vec![[3.0; 3], [-3.0; 3]]), 100, &config);
        assert!(outcome.is_unstable());
        assert_eq!(outcome.fitness(), Some(f64::NEG_INFINITY));
        assert_eq!(outcome.displacement(), None);
    }
}
