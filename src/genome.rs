use crate::config::MutationConfig;
use crate::error::GenomeError;
use crate::physics::{CONTROL_PHASES, MAX_SEGMENTS};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prescribed angular velocity of one segment for each control phase.
pub type ControlRow = [f64; CONTROL_PHASES];

/// Controller for a chain: one control row per segment, so the row count is
/// the segment count. Always holds between 1 and `MAX_SEGMENTS` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ControlRow>", into = "Vec<ControlRow>")]
pub struct Genome {
    rows: Vec<ControlRow>,
}

/// Outcome of the single structural draw made per mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralMutation {
    Grow,
    Shrink,
    Keep,
}

impl StructuralMutation {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, config: &MutationConfig) -> Self {
        let draw: f64 = rng.gen();
        if draw < config.grow_probability {
            StructuralMutation::Grow
        } else if draw < config.grow_probability + config.shrink_probability {
            StructuralMutation::Shrink
        } else {
            StructuralMutation::Keep
        }
    }
}

impl Genome {
    pub fn new(rows: Vec<ControlRow>) -> Result<Self, GenomeError> {
        if rows.is_empty() || rows.len() > MAX_SEGMENTS {
            return Err(GenomeError::SegmentCountOutOfRange {
                count: rows.len(),
                max: MAX_SEGMENTS,
            });
        }
        for (row_idx, row) in rows.iter().enumerate() {
            if let Some(phase) = row.iter().position(|v| !v.is_finite()) {
                return Err(GenomeError::NonFiniteControl { row: row_idx, phase });
            }
        }
        Ok(Self { rows })
    }

    /// Build from an explicit segment count and an untyped table, checking
    /// that the table has exactly `segment_count` rows of `CONTROL_PHASES`.
    pub fn from_table(segment_count: usize, table: Vec<Vec<f64>>) -> Result<Self, GenomeError> {
        if segment_count == 0 || segment_count > MAX_SEGMENTS {
            return Err(GenomeError::SegmentCountOutOfRange {
                count: segment_count,
                max: MAX_SEGMENTS,
            });
        }
        if table.len() != segment_count {
            return Err(GenomeError::RowCountMismatch {
                rows: table.len(),
                segments: segment_count,
            });
        }
        let rows = table
            .into_iter()
            .enumerate()
            .map(|(row, values)| {
                let parsed: Result<ControlRow, _> = values.as_slice().try_into();
                parsed.map_err(|_| GenomeError::RowWidthMismatch {
                    row,
                    width: values.len(),
                    expected: CONTROL_PHASES,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rows)
    }

    /// Sample a segment count uniformly, then every control value uniformly
    /// in `[-spawn_range, spawn_range]`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, config: &MutationConfig) -> Self {
        let max = config.max_segments.clamp(1, MAX_SEGMENTS);
        let segments = rng.gen_range(1..=max);
        let rows = (0..segments).map(|_| random_row(rng, config)).collect();
        Self { rows }
    }

    pub fn segment_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[ControlRow] {
        &self.rows
    }

    /// Angular velocity commanded for `segment` during `phase`.
    pub fn control(&self, segment: usize, phase: usize) -> f64 {
        self.rows[segment][phase]
    }

    /// Append a row. Returns false and leaves the genome untouched at `max_segments`.
    pub fn grow(&mut self, row: ControlRow, max_segments: usize) -> bool {
        if self.rows.len() >= max_segments.min(MAX_SEGMENTS) || row.iter().any(|v| !v.is_finite()) {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Drop the last row. Returns false and leaves the genome untouched at one segment.
    pub fn shrink(&mut self) -> bool {
        if self.rows.len() <= 1 {
            return false;
        }
        self.rows.pop();
        true
    }

    /// Each value independently, with `perturb_probability`, moves by a
    /// uniform step in `[-perturb_range, perturb_range]`.
    pub fn perturb<R: Rng + ?Sized>(&mut self, rng: &mut R, config: &MutationConfig) {
        for value in self.rows.iter_mut().flat_map(|row| row.iter_mut()) {
            if rng.gen::<f64>() < config.perturb_probability {
                *value += symmetric(rng, config.perturb_range);
            }
        }
    }

    pub fn mutated<R: Rng + ?Sized>(&self, rng: &mut R, config: &MutationConfig) -> Genome {
        let mut child = self.clone();
        child.perturb(rng, config);
        match StructuralMutation::sample(rng, config) {
            StructuralMutation::Grow => {
                if child.segment_count() < config.max_segments {
                    let row = random_row(rng, config);
                    child.grow(row, config.max_segments);
                }
            }
            StructuralMutation::Shrink => {
                child.shrink();
            }
            StructuralMutation::Keep => {}
        }
        child
    }
}

impl TryFrom<Vec<ControlRow>> for Genome {
    type Error = GenomeError;

    fn try_from(rows: Vec<ControlRow>) -> Result<Self, Self::Error> {
        Genome::new(rows)
    }
}

impl From<Genome> for Vec<ControlRow> {
    fn from(genome: Genome) -> Self {
        genome.rows
    }
}

fn random_row<R: Rng + ?Sized>(rng: &mut R, config: &MutationConfig) -> ControlRow {
    let mut row = [0.0; CONTROL_PHASES];
    for value in row.iter_mut() {
        *value = symmetric(rng, config.spawn_range);
    }
    row
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f64) -> f64 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}
