use rapier2d::na::Vector2;

// Simulation constants
pub const FIXED_TIME_STEP: f64 = 1.0 / 60.0;
pub const TICKS_PER_PHASE: u64 = 60;
pub const CONTROL_PHASES: usize = 3;
pub const MAX_SEGMENTS: usize = 5;

// Displacement is reported in hundreds of world units.
pub const DISPLACEMENT_SCALE: f64 = 100.0;

pub type Vec2 = Vector2<f64>;

/// 2D cross product of two vectors (z component of the 3D cross).
#[inline]
pub fn cross(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar angular velocity with a vector: `ω × r`.
#[inline]
pub fn cross_scalar(omega: f64, r: &Vec2) -> Vec2 {
    Vec2::new(-omega * r.y, omega * r.x)
}

/// Control phase active during the given zero-based tick.
#[inline]
pub fn phase_for_tick(tick: u64) -> usize {
    ((tick / TICKS_PER_PHASE) % CONTROL_PHASES as u64) as usize
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPose {
    pub position: [f64; 2],
    pub velocity: [f64; 2],
    pub rotation: f64,
    pub length: f64,
    pub thickness: f64,
}

impl SegmentPose {
    /// World-space end points of the segment's centre line.
    pub fn endpoints(&self) -> ([f64; 2], [f64; 2]) {
        let half = self.length * 0.5;
        let (sin, cos) = self.rotation.sin_cos();
        let dx = cos * half;
        let dy = sin * half;
        (
            [self.position[0] - dx, self.position[1] - dy],
            [self.position[0] + dx, self.position[1] + dy],
        )
    }
}
