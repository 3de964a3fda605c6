use crate::body::Segment;
use crate::config::PhysicsConfig;
use crate::physics::{cross, Vec2};

// The solver aims below a tenth of the tolerance so the post-solve check has slack.
const CONVERGENCE_FACTOR: f64 = 0.1;

/// Pins a point on one body to a point on another. Bodies joined this way
/// never collide with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotJoint {
    pub body_a: usize,
    pub body_b: usize,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
}

impl PivotJoint {
    fn new(body_a: usize, body_b: usize, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        debug_assert_ne!(body_a, body_b, "a pivot joint needs two distinct bodies");
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
        }
    }

    /// Joints linking the right end of segment `i` to the left end of `i + 1`.
    pub fn chain(segment_count: usize, segment_length: f64) -> Vec<PivotJoint> {
        let half = segment_length * 0.5;
        (1..segment_count)
            .map(|i| {
                PivotJoint::new(i - 1, i, Vec2::new(half, 0.0), Vec2::new(-half, 0.0))
            })
            .collect()
    }

    pub fn world_anchors(&self, bodies: &[Segment]) -> (Vec2, Vec2) {
        (
            bodies[self.body_a].world_point(&self.local_anchor_a),
            bodies[self.body_b].world_point(&self.local_anchor_b),
        )
    }

    /// Distance between the two world anchors.
    pub fn separation(&self, bodies: &[Segment]) -> f64 {
        let (a, b) = self.world_anchors(bodies);
        (b - a).norm()
    }
}

pub fn max_separation(joints: &[PivotJoint], bodies: &[Segment]) -> f64 {
    joints
        .iter()
        .map(|joint| joint.separation(bodies))
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    pub sweeps: usize,
    pub max_separation: f64,
}

/// Sequential (Gauss-Seidel) position projection of pivot constraints.
#[derive(Debug, Clone)]
pub struct JointSolver {
    pub iterations: usize,
    pub tolerance: f64,
    pub relaxation: f64,
    pub max_correction: f64,
}

impl JointSolver {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            iterations: config.joint_iterations,
            tolerance: config.joint_tolerance,
            relaxation: config.joint_relaxation,
            max_correction: config.max_joint_correction,
        }
    }

    /// Project every joint until the worst separation drops under the target
    /// or the sweep budget runs out. The linear displacement each body picks
    /// up here is added to its velocity.
    pub fn solve(&self, joints: &[PivotJoint], bodies: &mut [Segment], dt: f64) -> SolveStats {
        if joints.is_empty() {
            return SolveStats {
                sweeps: 0,
                max_separation: 0.0,
            };
        }

        let target = self.tolerance * CONVERGENCE_FACTOR;
        let before: Vec<Vec2> = bodies.iter().map(|body| body.position).collect();

        let mut sweeps = 0;
        let mut separation = max_separation(joints, bodies);
        while separation > target && sweeps < self.iterations {
            // alternate sweep direction so corrections travel both ways along the chain
            if sweeps % 2 == 0 {
                joints.iter().for_each(|joint| self.project(joint, bodies));
            } else {
                joints.iter().rev().for_each(|joint| self.project(joint, bodies));
            }
            sweeps += 1;
            separation = max_separation(joints, bodies);
        }

        if dt > 0.0 {
            for (body, start) in bodies.iter_mut().zip(before) {
                body.velocity += (body.position - start) / dt;
            }
        }

        SolveStats {
            sweeps,
            max_separation: separation,
        }
    }

    fn project(&self, joint: &PivotJoint, bodies: &mut [Segment]) {
        let (a, b) = pair_mut(bodies, joint.body_a, joint.body_b);

        let ra = a.rotate(&joint.local_anchor_a);
        let rb = b.rotate(&joint.local_anchor_b);
        let delta = (b.position + rb) - (a.position + ra);
        let distance = delta.norm();
        if distance <= f64::EPSILON {
            return;
        }
        let normal = delta / distance;

        let wa = a.inverse_mass() + cross(&ra, &normal).powi(2) * a.inverse_inertia();
        let wb = b.inverse_mass() + cross(&rb, &normal).powi(2) * b.inverse_inertia();
        let correction = (self.relaxation * distance).min(self.max_correction);
        let impulse = normal * (correction / (wa + wb));

        a.position += impulse * a.inverse_mass();
        a.angle += cross(&ra, &impulse) * a.inverse_inertia();
        b.position -= impulse * b.inverse_mass();
        b.angle -= cross(&rb, &impulse) * b.inverse_inertia();
    }
}

fn pair_mut(bodies: &mut [Segment], a: usize, b: usize) -> (&mut Segment, &mut Segment) {
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(count: usize) -> (Vec<Segment>, Vec<PivotJoint>) {
        let config = PhysicsConfig::default();
        let bodies = (0..count)
            .map(|i| Segment::new(Vec2::new(440.0 + 80.0 * i as f64, 100.0), &config))
            .collect();
        (bodies, PivotJoint::chain(count, config.segment_length))
    }

    fn solver() -> JointSolver {
        JointSolver::from_config(&PhysicsConfig::default())
    }

    #[test]
    fn test_chain_anchors_start_coincident() {
        let (bodies, joints) = chain(5);
        assert_eq!(joints.len(), 4);
        assert!(max_separation(&joints, &bodies) < 1e-12);
    }

    #[test]
    fn test_single_segment_has_no_joints() {
        let (mut bodies, joints) = chain(1);
        assert!(joints.is_empty());
        let stats = solver().solve(&joints, &mut bodies, 1.0 / 60.0);
        assert_eq!(stats.sweeps, 0);
        assert_eq!(stats.max_separation, 0.0);
    }

    #[test]
    fn test_pair_converges() {
        let (mut bodies, joints) = chain(2);
        bodies[1].position += Vec2::new(5.0, 3.0);
        bodies[1].angle = 0.3;
        bodies[0].angle = -0.2;

        let stats = solver().solve(&joints, &mut bodies, 1.0 / 60.0);
        assert!(stats.max_separation < 1e-3, "separation {}", stats.max_separation);
        assert!(joints[0].separation(&bodies) < 1e-3);
    }

    #[test]
    fn test_chains_of_every_length_converge() {
        for count in 2..=5 {
            let (mut bodies, joints) = chain(count);
            for (i, body) in bodies.iter_mut().enumerate() {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                body.angle = 0.08 * sign;
                body.position.y += 2.0 * i as f64;
            }
            let stats = solver().solve(&joints, &mut bodies, 1.0 / 60.0);
            assert!(
                stats.max_separation < 1e-3,
                "chain of {count}: separation {}",
                stats.max_separation
            );
        }
    }

    #[test]
    fn test_corrections_are_clamped() {
        let (mut bodies, joints) = chain(2);
        bodies[1].position.y += 30.0;
        let clamped = JointSolver {
            iterations: 1,
            max_correction: 1.0,
            ..solver()
        };
        let stats = clamped.solve(&joints, &mut bodies, 0.0);
        assert_eq!(stats.sweeps, 1);
        assert!(stats.max_separation > 28.0);
    }

    #[test]
    fn test_projection_preserves_centre_of_mass() {
        let (mut bodies, joints) = chain(3);
        bodies[2].position += Vec2::new(-4.0, 6.0);
        let centre = |bodies: &[Segment]| {
            bodies.iter().map(|b| b.position * b.mass).sum::<Vec2>()
                / bodies.iter().map(|b| b.mass).sum::<f64>()
        };
        let before = centre(&bodies);
        solver().solve(&joints, &mut bodies, 0.0);
        assert!((centre(&bodies) - before).norm() < 1e-9);
    }

    #[test]
    fn test_displacement_feeds_velocity() {
        let (mut bodies, joints) = chain(2);
        bodies[1].position.y += 6.0;
        let dt = 1.0 / 60.0;
        let start = bodies[0].position;
        solver().solve(&joints, &mut bodies, dt);
        let expected = (bodies[0].position - start) / dt;
        assert!((bodies[0].velocity - expected).norm() < 1e-9);
        assert!(bodies[0].velocity.y > 0.0);
        assert!(bodies[1].velocity.y < 0.0);
    }
}
