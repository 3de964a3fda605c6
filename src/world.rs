use crate::body::Segment;
use crate::config::PhysicsConfig;
use crate::contact::{ContactResolver, Ground};
use crate::error::SimulationError;
use crate::genome::Genome;
use crate::joint::{max_separation, JointSolver, PivotJoint, SolveStats};
use crate::physics::{phase_for_tick, SegmentPose, Vec2, DISPLACEMENT_SCALE, FIXED_TIME_STEP};

/// A chain of segments on the ground, driven by one genome. Each world is
/// owned by exactly one evaluation and dropped with it.
pub struct SimulationWorld {
    bodies: Vec<Segment>,
    joints: Vec<PivotJoint>,
    ground: Ground,
    contacts: ContactResolver,
    solver: JointSolver,
    controls: Genome,
    gravity: f64,
    max_linear_speed: f64,
    dt: f64,
    tick: u64,
    initial_x: f64,
    last_solve: SolveStats,
    contact_count: usize,
}

impl SimulationWorld {
    pub fn new(genome: &Genome, config: &PhysicsConfig) -> Self {
        let half = config.segment_length * 0.5;
        let bodies: Vec<Segment> = (0..genome.segment_count())
            .map(|i| {
                let centre = Vec2::new(
                    config.origin[0] + config.segment_spacing * i as f64 + half,
                    config.origin[1],
                );
                Segment::new(centre, config)
            })
            .collect();
        let joints = PivotJoint::chain(bodies.len(), config.segment_length);
        let initial_x = anchor_x(&bodies[0]);

        Self {
            bodies,
            joints,
            ground: Ground::from_config(config),
            contacts: ContactResolver::from_config(config),
            solver: JointSolver::from_config(config),
            controls: genome.clone(),
            gravity: config.gravity,
            max_linear_speed: config.max_linear_speed,
            dt: FIXED_TIME_STEP,
            tick: 0,
            initial_x,
            last_solve: SolveStats {
                sweeps: 0,
                max_separation: 0.0,
            },
            contact_count: 0,
        }
    }

    /// Advance one fixed tick: gravity, prescribed actuation, integration,
    /// ground contact, then the joint solve.
    pub fn step(&mut self) -> Result<(), SimulationError> {
        let tick = self.tick;
        let phase = phase_for_tick(tick);

        for body in self.bodies.iter_mut() {
            body.apply_gravity(self.dt, self.gravity);
            body.clamp_linear_speed(self.max_linear_speed);
        }
        for (segment, body) in self.bodies.iter_mut().enumerate() {
            body.set_prescribed_angular_velocity(self.controls.control(segment, phase));
        }
        for body in self.bodies.iter_mut() {
            body.integrate(self.dt);
        }

        self.contact_count = self.contacts.resolve(&self.ground, &mut self.bodies);
        self.last_solve = self.solver.solve(&self.joints, &mut self.bodies, self.dt);
        self.tick += 1;

        if let Some(segment) = self.bodies.iter().position(|body| !body.is_finite()) {
            return Err(SimulationError::NonFiniteState { tick, segment });
        }
        let separation = self.last_solve.max_separation;
        if !(separation < self.solver.tolerance) {
            return Err(SimulationError::JointDivergence {
                tick,
                separation,
                tolerance: self.solver.tolerance,
            });
        }
        Ok(())
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn time(&self) -> f64 {
        self.tick as f64 * self.dt
    }

    /// Control phase the next tick will use.
    pub fn phase(&self) -> usize {
        phase_for_tick(self.tick)
    }

    /// Horizontal travel of the first segment's left end, in hundreds of units.
    pub fn displacement(&self) -> f64 {
        (anchor_x(&self.bodies[0]) - self.initial_x) / DISPLACEMENT_SCALE
    }

    pub fn segments(&self) -> &[Segment] {
        &self.bodies
    }

    pub fn joints(&self) -> &[PivotJoint] {
        &self.joints
    }

    pub fn poses(&self) -> Vec<SegmentPose> {
        self.bodies.iter().map(Segment::pose).collect()
    }

    pub fn max_joint_error(&self) -> f64 {
        max_separation(&self.joints, &self.bodies)
    }

    pub fn last_solve(&self) -> SolveStats {
        self.last_solve
    }

    pub fn contact_count(&self) -> usize {
        self.contact_count
    }
}

/// World x of the left end cap, the chain's origin point.
fn anchor_x(body: &Segment) -> f64 {
    body.endpoints()[0].x
}
