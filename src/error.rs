//! Error types for genome construction, simulation and configuration

use thiserror::Error;

/// Rejected genome shapes. Invalid genomes never reach the evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenomeError {
    #[error("segment count {count} outside [1, {max}]")]
    SegmentCountOutOfRange { count: usize, max: usize },

    #[error("control table has {rows} rows but the genome declares {segments} segments")]
    RowCountMismatch { rows: usize, segments: usize },

    #[error("control row {row} has {width} values, expected {expected}")]
    RowWidthMismatch {
        row: usize,
        width: usize,
        expected: usize,
    },

    #[error("control value at row {row}, phase {phase} is not finite")]
    NonFiniteControl { row: usize, phase: usize },
}

/// Failures raised while stepping a world.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("joint solver did not converge at tick {tick}: separation {separation:.6} above tolerance {tolerance}")]
    JointDivergence {
        tick: u64,
        separation: f64,
        tolerance: f64,
    },

    #[error("segment {segment} has non-finite state at tick {tick}")]
    NonFiniteState { tick: u64, segment: usize },
}

impl SimulationError {
    pub fn tick(&self) -> u64 {
        match self {
            SimulationError::JointDivergence { tick, .. } => *tick,
            SimulationError::NonFiniteState { tick, .. } => *tick,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("probability {field} = {value} outside [0, 1]")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("grow ({grow}) and shrink ({shrink}) probabilities sum above 1")]
    StructuralProbabilitySum { grow: f64, shrink: f64 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_count_error_message() {
        let error = GenomeError::SegmentCountOutOfRange { count: 6, max: 5 };
        assert_eq!(error.to_string(), "segment count 6 outside [1, 5]");
    }

    #[test]
    fn test_row_mismatch_error_message() {
        let error = GenomeError::RowCountMismatch {
            rows: 2,
            segments: 3,
        };
        assert_eq!(
            error.to_string(),
            "control table has 2 rows but the genome declares 3 segments"
        );
    }

    #[test]
    fn test_simulation_error_tick() {
        let error = SimulationError::NonFiniteState {
            tick: 42,
            segment: 1,
        };
        assert_eq!(error.tick(), 42);
        assert_eq!(
            error.to_string(),
            "segment 1 has non-finite state at tick 42"
        );
    }

    #[test]
    fn test_probability_error_message() {
        let error = ConfigError::ProbabilityOutOfRange {
            field: "mutation.grow_probability",
            value: 1.5,
        };
        assert_eq!(
            error.to_string(),
            "probability mutation.grow_probability = 1.5 outside [0, 1]"
        );
    }
}
