use crate::config::PhysicsConfig;
use crate::physics::{SegmentPose, Vec2};
use rapier2d::na::Rotation2;

/// A rigid rod with rounded ends (capsule), spanning `[-length/2, length/2]`
/// along its local x axis around the centre of mass.
#[derive(Debug, Clone)]
pub struct Segment {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f64,
    pub angular_velocity: f64,
    pub mass: f64,
    pub length: f64,
    pub thickness: f64,
    pub friction: f64,
    pub restitution: f64,
    inertia: f64,
}

impl Segment {
    pub fn new(position: Vec2, config: &PhysicsConfig) -> Self {
        let mass = config.segment_mass;
        let length = config.segment_length;
        Self {
            position,
            velocity: Vec2::zeros(),
            angle: 0.0,
            angular_velocity: 0.0,
            mass,
            length,
            thickness: config.segment_thickness,
            friction: config.segment_friction,
            restitution: config.segment_restitution,
            // thin rod about its centre
            inertia: mass * length * length / 12.0,
        }
    }

    pub fn inverse_mass(&self) -> f64 {
        1.0 / self.mass
    }

    pub fn inverse_inertia(&self) -> f64 {
        1.0 / self.inertia
    }

    /// Gravity only ever changes linear velocity.
    pub fn apply_gravity(&mut self, dt: f64, gravity: f64) {
        self.velocity.y -= gravity * dt;
    }

    /// Overwrite the angular velocity with an actuator command. No torque is
    /// involved; whatever the solver did to the previous value is discarded.
    pub fn set_prescribed_angular_velocity(&mut self, omega: f64) {
        self.angular_velocity = omega;
    }

    pub fn clamp_linear_speed(&mut self, max_speed: f64) {
        let speed = self.velocity.norm();
        if speed > max_speed {
            self.velocity *= max_speed / speed;
        }
    }

    pub fn integrate(&mut self, dt: f64) {
        self.position += self.velocity * dt;
        self.angle += self.angular_velocity * dt;
    }

    /// Rotate a body-local offset into world orientation (no translation).
    pub fn rotate(&self, local: &Vec2) -> Vec2 {
        Rotation2::new(self.angle) * *local
    }

    pub fn world_point(&self, local: &Vec2) -> Vec2 {
        self.position + self.rotate(local)
    }

    /// Local offsets of the two end-cap centres.
    pub fn local_endpoints(&self) -> [Vec2; 2] {
        let half = self.length * 0.5;
        [Vec2::new(-half, 0.0), Vec2::new(half, 0.0)]
    }

    pub fn endpoints(&self) -> [Vec2; 2] {
        let [a, b] = self.local_endpoints();
        [self.world_point(&a), self.world_point(&b)]
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.angle.is_finite()
            && self.angular_velocity.is_finite()
    }

    pub fn pose(&self) -> SegmentPose {
        SegmentPose {
            position: [self.position.x, self.position.y],
            velocity: [self.velocity.x, self.velocity.y],
            rotation: self.angle,
            length: self.length,
            thickness: self.thickness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        Segment::new(Vec2::new(440.0, 100.0), &PhysicsConfig::default())
    }

    #[test]
    fn test_gravity_touches_linear_velocity_only() {
        let mut body = segment();
        body.set_prescribed_angular_velocity(2.0);
        body.apply_gravity(0.5, 1000.0);
        assert_eq!(body.velocity, Vec2::new(0.0, -500.0));
        assert_eq!(body.angular_velocity, 2.0);
    }

    #[test]
    fn test_prescribed_velocity_overwrites() {
        let mut body = segment();
        body.angular_velocity = 7.5;
        body.set_prescribed_angular_velocity(-1.0);
        assert_eq!(body.angular_velocity, -1.0);
    }

    #[test]
    fn test_integrate_advances_pose() {
        let mut body = segment();
        body.velocity = Vec2::new(60.0, -30.0);
        body.set_prescribed_angular_velocity(1.5);
        body.integrate(0.5);
        assert!((body.position.x - 470.0).abs() < 1e-12);
        assert!((body.position.y - 85.0).abs() < 1e-12);
        assert!((body.angle - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_endpoints_follow_rotation() {
        let mut body = segment();
        let [a, b] = body.endpoints();
        assert!((a - Vec2::new(400.0, 100.0)).norm() < 1e-12);
        assert!((b - Vec2::new(480.0, 100.0)).norm() < 1e-12);

        body.angle = std::f64::consts::FRAC_PI_2;
        let [a, b] = body.endpoints();
        assert!((a - Vec2::new(440.0, 60.0)).norm() < 1e-9);
        assert!((b - Vec2::new(440.0, 140.0)).norm() < 1e-9);
    }

    #[test]
    fn test_rod_inertia() {
        let body = segment();
        let expected = 2.0 * 80.0 * 80.0 / 12.0;
        assert!((body.inverse_inertia() - 1.0 / expected).abs() < 1e-15);
        assert_eq!(body.inverse_mass(), 0.5);
    }

    #[test]
    fn test_speed_clamp() {
        let mut body = segment();
        body.velocity = Vec2::new(3000.0, 4000.0);
        body.clamp_linear_speed(500.0);
        assert!((body.velocity.norm() - 500.0).abs() < 1e-9);
        assert!((body.velocity.x - 300.0).abs() < 1e-9);
    }
}
