//! Revolute joint: two bodies share an anchor and rotate freely about it

use super::{body_pair, Constraint, Softness, LINEAR_SLOP};
use crate::body::{Body, BodyHandle, BodySet};
use tgame_math::{Mat2, Vec2};

/// Configuration of a [`RevoluteJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct RevoluteJointPrimitive {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor in A's local frame
    pub local_point_a: Vec2,
    /// Anchor in B's local frame
    pub local_point_b: Vec2,
    /// Spring frequency in Hz; `0` makes the joint rigid
    pub frequency: f32,
    pub damping_ratio: f32,
    pub max_force: f32,
}

impl RevoluteJointPrimitive {
    /// Rigid hinge
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, local_point_a: Vec2, local_point_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_point_a,
            local_point_b,
            frequency: 0.0,
            damping_ratio: 0.0,
            max_force: f32::INFINITY,
        }
    }

    pub fn with_spring(mut self, frequency: f32, damping_ratio: f32) -> Self {
        self.frequency = frequency;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }
}

/// Two-DOF point-to-point constraint between two bodies
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    primitive: RevoluteJointPrimitive,
    ra: Vec2,
    rb: Vec2,
    effective_mass: Mat2,
    bias: Vec2,
    softness: Softness,
    impulse: Vec2,
}

/// `K = (ma + mb) I + ia [ra]x^T [ra]x + ib [rb]x^T [rb]x`
fn pair_mass_matrix(a: &Body, b: &Body, ra: Vec2, rb: Vec2) -> Mat2 {
    let m = a.inv_mass + b.inv_mass;
    let (ia, ib) = (a.inv_inertia, b.inv_inertia);
    let off = -ia * ra.x * ra.y - ib * rb.x * rb.y;
    Mat2::new(
        m + ia * ra.y * ra.y + ib * rb.y * rb.y,
        off,
        off,
        m + ia * ra.x * ra.x + ib * rb.x * rb.x,
    )
}

impl RevoluteJoint {
    pub fn new(primitive: RevoluteJointPrimitive) -> Self {
        Self {
            primitive,
            ra: Vec2::ZERO,
            rb: Vec2::ZERO,
            effective_mass: Mat2::ZERO,
            bias: Vec2::ZERO,
            softness: Softness::RIGID,
            impulse: Vec2::ZERO,
        }
    }

    pub fn primitive(&self) -> &RevoluteJointPrimitive {
        &self.primitive
    }

    pub fn primitive_mut(&mut self) -> &mut RevoluteJointPrimitive {
        &mut self.primitive
    }

    pub fn accumulated_impulse(&self) -> Vec2 {
        self.impulse
    }
}

impl Constraint for RevoluteJoint {
    fn prepare(&mut self, bodies: &mut BodySet, dt: f32) -> bool {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return false;
        };

        self.ra = a.to_actual_point(self.primitive.local_point_a);
        self.rb = b.to_actual_point(self.primitive.local_point_b);

        let inv_mass_sum = a.inv_mass + b.inv_mass;
        let mass = if inv_mass_sum > 0.0 { 1.0 / inv_mass_sum } else { 0.0 };
        self.softness = Softness::new(self.primitive.frequency, self.primitive.damping_ratio, mass, dt);

        let mut k = pair_mass_matrix(a, b, self.ra, self.rb);
        k.cols[0].x += self.softness.gamma;
        k.cols[1].y += self.softness.gamma;
        let Some(effective_mass) = k.try_inverse() else {
            return false;
        };
        self.effective_mass = effective_mass;

        let error = (b.position + self.rb) - (a.position + self.ra);
        self.bias = error * self.softness.bias_rate;

        a.apply_impulse(-self.impulse, self.ra);
        b.apply_impulse(self.impulse, self.rb);
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, dt: f32) {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };

        let cdot = b.velocity_at(self.rb) - a.velocity_at(self.ra);
        let lambda = self.effective_mass * -(cdot + self.bias + self.impulse * self.softness.gamma);

        let old = self.impulse;
        self.impulse += lambda;
        let max_impulse = self.primitive.max_force * dt;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse = self.impulse.normalize() * max_impulse;
        }
        let applied = self.impulse - old;

        a.apply_impulse(-applied, self.ra);
        b.apply_impulse(applied, self.rb);
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        if self.softness.is_soft() {
            return;
        }
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };

        let ra = a.to_actual_point(self.primitive.local_point_a);
        let rb = b.to_actual_point(self.primitive.local_point_b);
        let error = (b.position + rb) - (a.position + ra);
        if error.length() < LINEAR_SLOP {
            return;
        }
        let Some(mass) = pair_mass_matrix(a, b, ra, rb).try_inverse() else {
            return;
        };

        let correction = mass * -error * bias_factor;
        a.position -= correction * a.inv_mass;
        a.rotation -= a.inv_inertia * ra.cross(correction);
        b.position += correction * b.inv_mass;
        b.rotation += b.inv_inertia * rb.cross(correction);
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body_a, Some(self.primitive.body_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyId, BodyType};
    use approx::assert_abs_diff_eq;

    fn pendulum() -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::new();
        let mut anchor = Body::new(BodyId(1));
        anchor.set_type(BodyType::Static);
        let mut bob = Body::new(BodyId(2));
        bob.position = Vec2::new(1.0, 0.0);
        let a = BodyHandle(bodies.insert(anchor));
        let b = BodyHandle(bodies.insert(bob));
        (bodies, a, b)
    }

    #[test]
    fn test_relative_anchor_velocity_vanishes() {
        let (mut bodies, a, b) = pendulum();
        bodies[b.0].velocity = Vec2::new(0.5, -2.0);
        bodies[b.0].angular_velocity = 1.0;

        let mut joint = RevoluteJoint::new(RevoluteJointPrimitive::new(a, b, Vec2::ZERO, Vec2::new(-1.0, 0.0)));
        assert!(joint.prepare(&mut bodies, 0.016));

        let relative = |bodies: &BodySet| {
            let rb = bodies[b.0].to_actual_point(Vec2::new(-1.0, 0.0));
            (bodies[b.0].velocity_at(rb) - bodies[a.0].velocity_at(Vec2::ZERO)).length()
        };
        let mut previous = relative(&bodies);
        for _ in 0..4 {
            joint.solve_velocity(&mut bodies, 0.016);
            let current = relative(&bodies);
            assert!(current <= previous + 1e-6);
            previous = current;
        }
        assert_abs_diff_eq!(previous, 0.0, epsilon = 1e-5);

        // The static anchor never moves
        assert_eq!(bodies[a.0].velocity, Vec2::ZERO);
    }

    #[test]
    fn test_position_drift_corrected() {
        let (mut bodies, a, b) = pendulum();
        bodies[b.0].position = Vec2::new(1.3, -0.2);

        let mut joint = RevoluteJoint::new(RevoluteJointPrimitive::new(a, b, Vec2::ZERO, Vec2::new(-1.0, 0.0)));
        assert!(joint.prepare(&mut bodies, 0.016));
        for _ in 0..30 {
            joint.solve_position(&mut bodies, 0.016, 0.8);
        }
        let anchor_b = bodies[b.0].to_world_point(Vec2::new(-1.0, 0.0));
        assert_abs_diff_eq!(anchor_b.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(anchor_b.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_same_body_is_degenerate() {
        let (mut bodies, a, _) = pendulum();
        let mut joint = RevoluteJoint::new(RevoluteJointPrimitive::new(a, a, Vec2::ZERO, Vec2::ZERO));
        assert!(!joint.prepare(&mut bodies, 0.016));
    }
}
