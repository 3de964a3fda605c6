mod body;
mod config;
mod contact;
mod error;
mod evaluator;
mod ga;
mod genome;
mod joint;
mod physics;
mod world;

// Re-export public items
pub use physics::{
    phase_for_tick, SegmentPose, Vec2, CONTROL_PHASES, DISPLACEMENT_SCALE, FIXED_TIME_STEP,
    MAX_SEGMENTS, TICKS_PER_PHASE,
};
pub use body::Segment;
pub use joint::{max_separation, JointSolver, PivotJoint, SolveStats};
pub use contact::{ContactResolver, Ground};
pub use world::SimulationWorld;
pub use genome::{ControlRow, Genome, StructuralMutation};
pub use evaluator::{
    evaluate, run, run_observed, CancelToken, Evaluation, Frame, FrameObserver, Rollout,
};
pub use ga::{
    select, Candidate, Evolution, EvolutionSummary, GenerationReport, Progress, Reporter,
    SearchState,
};
pub use config::{Config, EvolutionConfig, MutationConfig, PhysicsConfig};
pub use error::{ConfigError, EvolutionError, GenomeError, SimulationError};
