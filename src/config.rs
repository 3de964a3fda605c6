//! Configuration for the simulator, the mutation operator and the search

use crate::error::{ConfigError, ConfigResult};
use crate::physics::MAX_SEGMENTS;
use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from JSON. Missing fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub physics: PhysicsConfig,
    pub mutation: MutationConfig,
    pub evolution: EvolutionConfig,
}

impl Config {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.physics.validate()?;
        self.mutation.validate()?;
        self.evolution.validate()
    }
}

/// World geometry, materials and solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravitational acceleration magnitude (units/s²), pointing to -y
    pub gravity: f64,
    pub segment_length: f64,
    /// Capsule radius of each segment
    pub segment_thickness: f64,
    pub segment_mass: f64,
    pub segment_friction: f64,
    pub segment_restitution: f64,
    /// Horizontal distance between consecutive segment spawn points
    pub segment_spacing: f64,
    /// Spawn point of the first segment's left end
    pub origin: [f64; 2],
    pub ground_height: f64,
    pub ground_start: f64,
    pub ground_end: f64,
    pub ground_friction: f64,
    pub ground_restitution: f64,
    /// Maximum anchor separation tolerated after a joint solve
    pub joint_tolerance: f64,
    /// Sweep budget per tick for the joint solver
    pub joint_iterations: usize,
    pub joint_relaxation: f64,
    /// Per-iteration clamp on a single joint correction
    pub max_joint_correction: f64,
    /// Approach speeds below this are resting contact (no restitution)
    pub resting_speed: f64,
    pub max_linear_speed: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 1000.0,
            segment_length: 80.0,
            segment_thickness: 10.0,
            segment_mass: 2.0,
            segment_friction: 0.7,
            segment_restitution: 0.5,
            segment_spacing: 80.0,
            origin: [400.0, 100.0],
            ground_height: 0.0,
            ground_start: 0.0,
            ground_end: 8000.0,
            ground_friction: 0.5,
            ground_restitution: 1.0,
            joint_tolerance: 1e-3,
            joint_iterations: 128,
            joint_relaxation: 1.0,
            max_joint_correction: 20.0,
            resting_speed: 40.0,
            max_linear_speed: 5000.0,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        positive("physics.gravity", self.gravity, true)?;
        positive("physics.segment_length", self.segment_length, false)?;
        positive("physics.segment_thickness", self.segment_thickness, true)?;
        positive("physics.segment_mass", self.segment_mass, false)?;
        positive("physics.segment_friction", self.segment_friction, true)?;
        positive("physics.segment_restitution", self.segment_restitution, true)?;
        positive("physics.ground_friction", self.ground_friction, true)?;
        positive("physics.ground_restitution", self.ground_restitution, true)?;
        positive("physics.joint_tolerance", self.joint_tolerance, false)?;
        positive("physics.max_joint_correction", self.max_joint_correction, false)?;
        positive("physics.resting_speed", self.resting_speed, true)?;
        positive("physics.max_linear_speed", self.max_linear_speed, false)?;
        if self.joint_iterations == 0 {
            return Err(invalid("physics.joint_iterations", "must be at least 1"));
        }
        if !(self.joint_relaxation > 0.0 && self.joint_relaxation < 2.0) {
            return Err(invalid(
                "physics.joint_relaxation",
                format!("{} outside (0, 2)", self.joint_relaxation),
            ));
        }
        if !(self.ground_end > self.ground_start) {
            return Err(invalid(
                "physics.ground_end",
                format!("{} not beyond ground_start {}", self.ground_end, self.ground_start),
            ));
        }
        if !self.origin.iter().all(|v| v.is_finite()) || !self.segment_spacing.is_finite() {
            return Err(invalid("physics.origin", "spawn geometry must be finite"));
        }
        Ok(())
    }
}

/// Genome sampling and mutation rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub max_segments: usize,
    /// Fresh control values are drawn from [-spawn_range, spawn_range]
    pub spawn_range: f64,
    pub perturb_range: f64,
    pub perturb_probability: f64,
    pub grow_probability: f64,
    pub shrink_probability: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_segments: MAX_SEGMENTS,
            spawn_range: 3.0,
            perturb_range: 0.5,
            perturb_probability: 0.5,
            grow_probability: 0.25,
            shrink_probability: 0.25,
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_segments == 0 || self.max_segments > MAX_SEGMENTS {
            return Err(invalid(
                "mutation.max_segments",
                format!("{} outside [1, {MAX_SEGMENTS}]", self.max_segments),
            ));
        }
        positive("mutation.spawn_range", self.spawn_range, true)?;
        positive("mutation.perturb_range", self.perturb_range, true)?;
        probability("mutation.perturb_probability", self.perturb_probability)?;
        probability("mutation.grow_probability", self.grow_probability)?;
        probability("mutation.shrink_probability", self.shrink_probability)?;
        if self.grow_probability + self.shrink_probability > 1.0 {
            return Err(ConfigError::StructuralProbabilitySum {
                grow: self.grow_probability,
                shrink: self.shrink_probability,
            });
        }
        Ok(())
    }
}

/// Search sizes and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub lineages: usize,
    /// Random genomes sampled per lineage when seeding
    pub seed_samples: usize,
    pub mutants_per_lineage: usize,
    pub generations: usize,
    pub search_ticks: u64,
    pub demo_ticks: u64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Worker threads for evaluation (defaults to available parallelism)
    pub workers: Option<usize>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            lineages: 100,
            seed_samples: 50,
            mutants_per_lineage: 200,
            generations: 100,
            search_ticks: 500,
            demo_ticks: 1500,
            seed: None,
            workers: None,
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lineages == 0 {
            return Err(invalid("evolution.lineages", "must be at least 1"));
        }
        if self.seed_samples == 0 {
            return Err(invalid("evolution.seed_samples", "must be at least 1"));
        }
        if self.search_ticks == 0 {
            return Err(invalid("evolution.search_ticks", "must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(invalid("evolution.workers", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f64, allow_zero: bool) -> ConfigResult<()> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if ok {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must be finite and positive")))
    }
}

fn probability(field: &'static str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange { field, value })
    }
}
