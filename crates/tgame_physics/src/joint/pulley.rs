//! Pulley joint: two bodies hang from fixed ground points on one rope

use super::{body_pair, Constraint, LINEAR_SLOP};
use crate::body::{Body, BodyHandle, BodySet};
use tgame_math::Vec2;

/// Shortest rope segment the joint still solves
const MIN_SEGMENT: f32 = 1e-3;

/// Configuration of a [`PulleyJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct PulleyJointPrimitive {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_point_a: Vec2,
    pub local_point_b: Vec2,
    /// World point A's rope runs over
    pub ground_a: Vec2,
    /// World point B's rope runs over
    pub ground_b: Vec2,
    /// Mechanical advantage; B's segment counts `ratio` times
    pub ratio: f32,
    /// `len_a + ratio * len_b`; captured from the bodies when `None`
    pub length: Option<f32>,
}

impl PulleyJointPrimitive {
    pub fn new(
        body_a: BodyHandle,
        body_b: BodyHandle,
        ground_a: Vec2,
        ground_b: Vec2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_point_a: Vec2::ZERO,
            local_point_b: Vec2::ZERO,
            ground_a,
            ground_b,
            ratio: 1.0,
            length: None,
        }
    }

    pub fn with_anchors(mut self, local_point_a: Vec2, local_point_b: Vec2) -> Self {
        self.local_point_a = local_point_a;
        self.local_point_b = local_point_b;
        self
    }

    pub fn with_ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = Some(length);
        self
    }
}

/// `len_a + ratio * len_b == constant`
#[derive(Debug, Clone)]
pub struct PulleyJoint {
    primitive: PulleyJointPrimitive,
    constant: f32,
    ra: Vec2,
    rb: Vec2,
    ua: Vec2,
    ub: Vec2,
    effective_mass: f32,
    impulse: f32,
}

struct RopeGeometry {
    ra: Vec2,
    rb: Vec2,
    ua: Vec2,
    ub: Vec2,
    len_a: f32,
    len_b: f32,
}

impl PulleyJoint {
    /// Build the joint. The rope length is measured from the current poses
    /// unless the primitive fixes it.
    pub fn new(primitive: PulleyJointPrimitive, bodies: &BodySet) -> Self {
        let constant = primitive.length.unwrap_or_else(|| {
            match (bodies.get(primitive.body_a.0), bodies.get(primitive.body_b.0)) {
                (Some(a), Some(b)) => {
                    let len_a = a.to_world_point(primitive.local_point_a).distance(primitive.ground_a);
                    let len_b = b.to_world_point(primitive.local_point_b).distance(primitive.ground_b);
                    len_a + primitive.ratio * len_b
                }
                _ => 0.0,
            }
        });

        Self {
            primitive,
            constant,
            ra: Vec2::ZERO,
            rb: Vec2::ZERO,
            ua: Vec2::ZERO,
            ub: Vec2::ZERO,
            effective_mass: 0.0,
            impulse: 0.0,
        }
    }

    pub fn primitive(&self) -> &PulleyJointPrimitive {
        &self.primitive
    }

    /// Total rope length the joint maintains
    pub fn constant(&self) -> f32 {
        self.constant
    }

    pub fn accumulated_impulse(&self) -> f32 {
        self.impulse
    }

    fn geometry(&self, a: &Body, b: &Body) -> Option<RopeGeometry> {
        let ra = a.to_actual_point(self.primitive.local_point_a);
        let rb = b.to_actual_point(self.primitive.local_point_b);
        let da = a.position + ra - self.primitive.ground_a;
        let db = b.position + rb - self.primitive.ground_b;
        let (len_a, len_b) = (da.length(), db.length());
        if len_a < MIN_SEGMENT || len_b < MIN_SEGMENT {
            return None;
        }
        Some(RopeGeometry {
            ra,
            rb,
            ua: da / len_a,
            ub: db / len_b,
            len_a,
            len_b,
        })
    }

    fn mass(&self, a: &Body, b: &Body, g: &RopeGeometry) -> Option<f32> {
        let rua = g.ra.cross(g.ua);
        let rub = g.rb.cross(g.ub);
        let ma = a.inv_mass + a.inv_inertia * rua * rua;
        let mb = b.inv_mass + b.inv_inertia * rub * rub;
        let k = ma + self.primitive.ratio * self.primitive.ratio * mb;
        (k > 0.0).then(|| 1.0 / k)
    }

    fn apply(&self, a: &mut Body, b: &mut Body, impulse: f32) {
        a.apply_impulse(self.ua * -impulse, self.ra);
        b.apply_impulse(self.ub * (-self.primitive.ratio * impulse), self.rb);
    }
}

impl Constraint for PulleyJoint {
    fn prepare(&mut self, bodies: &mut BodySet, _dt: f32) -> bool {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return false;
        };
        let Some(geometry) = self.geometry(a, b) else {
            return false;
        };
        let Some(mass) = self.mass(a, b, &geometry) else {
            return false;
        };

        self.ra = geometry.ra;
        self.rb = geometry.rb;
        self.ua = geometry.ua;
        self.ub = geometry.ub;
        self.effective_mass = mass;

        self.apply(a, b, self.impulse);
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, _dt: f32) {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };

        let cdot = -self.ua.dot(a.velocity_at(self.ra))
            - self.primitive.ratio * self.ub.dot(b.velocity_at(self.rb));
        let lambda = -self.effective_mass * cdot;
        self.impulse += lambda;
        self.apply(a, b, lambda);
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };
        let Some(g) = self.geometry(a, b) else {
            return;
        };
        let error = self.constant - g.len_a - self.primitive.ratio * g.len_b;
        if error.abs() < LINEAR_SLOP {
            return;
        }
        let Some(mass) = self.mass(a, b, &g) else {
            return;
        };

        let lambda = -mass * error * bias_factor;
        let pa = g.ua * -lambda;
        let pb = g.ub * (-self.primitive.ratio * lambda);
        a.position += pa * a.inv_mass;
        a.rotation += a.inv_inertia * g.ra.cross(pa);
        b.position += pb * b.inv_mass;
        b.rotation += b.inv_inertia * g.rb.cross(pb);
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body_a, Some(self.primitive.body_b))
    }
}
