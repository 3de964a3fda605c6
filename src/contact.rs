use crate::body::Segment;
use crate::config::PhysicsConfig;
use crate::physics::{cross_scalar, Vec2};

/// Static horizontal ground surface. Only `[start, end]` on x supports bodies.
#[derive(Debug, Clone)]
pub struct Ground {
    pub height: f64,
    pub start: f64,
    pub end: f64,
    pub friction: f64,
    pub restitution: f64,
}

impl Ground {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            height: config.ground_height,
            start: config.ground_start,
            end: config.ground_end,
            friction: config.ground_friction,
            restitution: config.ground_restitution,
        }
    }

    pub fn spans(&self, x: f64) -> bool {
        x >= self.start && x <= self.end
    }
}

/// Resolves end-cap penetration against the ground with a restitution-scaled
/// normal impulse and Coulomb friction. Segment rotation is prescribed, so
/// impulses act on linear velocity alone.
#[derive(Debug, Clone)]
pub struct ContactResolver {
    pub resting_speed: f64,
}

impl ContactResolver {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            resting_speed: config.resting_speed,
        }
    }

    /// Returns the number of end caps found touching the ground.
    pub fn resolve(&self, ground: &Ground, bodies: &mut [Segment]) -> usize {
        let mut contacts = 0;
        for body in bodies.iter_mut() {
            for local in body.local_endpoints() {
                if self.resolve_point(ground, body, &local) {
                    contacts += 1;
                }
            }
        }
        contacts
    }

    fn resolve_point(&self, ground: &Ground, body: &mut Segment, local: &Vec2) -> bool {
        let cap = body.world_point(local);
        if !ground.spans(cap.x) {
            return false;
        }
        let penetration = ground.height - (cap.y - body.thickness);
        if penetration <= 0.0 {
            return false;
        }
        body.position.y += penetration;

        // lever arm from the centre of mass to the lowest point of the cap
        let r = body.rotate(local) - Vec2::new(0.0, body.thickness);
        let point_velocity = body.velocity + cross_scalar(body.angular_velocity, &r);
        let normal_speed = point_velocity.y;
        if normal_speed >= 0.0 {
            return true;
        }

        let restitution = if -normal_speed > self.resting_speed {
            body.restitution * ground.restitution
        } else {
            0.0
        };
        let normal_impulse = -(1.0 + restitution) * normal_speed * body.mass;
        body.velocity.y += normal_impulse * body.inverse_mass();

        let max_friction = body.friction * ground.friction * normal_impulse;
        // clamp panics on NaN bounds; non-finite bodies are reported by the stepper
        let friction_impulse = (-point_velocity.x * body.mass).max(-max_friction).min(max_friction);
        body.velocity.x += friction_impulse * body.inverse_mass();

        true
    }
}
