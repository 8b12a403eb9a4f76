//! Rotation joint: limits the relative angle between two bodies

use super::{body_pair, Constraint, LimitState, ANGULAR_SLOP};
use crate::body::{BodyHandle, BodySet};
use tgame_math::consts;

/// Configuration of a [`RotationJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct RotationJointPrimitive {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Relative angle `rot_a - rot_b` treated as zero
    pub reference_rotation: f32,
    pub min_angle: f32,
    pub max_angle: f32,
}

impl RotationJointPrimitive {
    /// Lock the relative angle at `reference_rotation`
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, reference_rotation: f32) -> Self {
        Self {
            body_a,
            body_b,
            reference_rotation,
            min_angle: 0.0,
            max_angle: 0.0,
        }
    }

    pub fn with_limits(mut self, min_angle: f32, max_angle: f32) -> Self {
        self.min_angle = min_angle.min(max_angle);
        self.max_angle = max_angle.max(min_angle);
        self
    }
}

/// Angular constraint on `rot_a - rot_b - reference`
#[derive(Debug, Clone)]
pub struct RotationJoint {
    primitive: RotationJointPrimitive,
    state: LimitState,
    effective_mass: f32,
    impulse: f32,
}

impl RotationJoint {
    pub fn new(primitive: RotationJointPrimitive) -> Self {
        Self {
            primitive,
            state: LimitState::Inactive,
            effective_mass: 0.0,
            impulse: 0.0,
        }
    }

    pub fn primitive(&self) -> &RotationJointPrimitive {
        &self.primitive
    }

    pub fn primitive_mut(&mut self) -> &mut RotationJointPrimitive {
        &mut self.primitive
    }

    pub fn state(&self) -> LimitState {
        self.state
    }

    fn relative_angle(&self, rot_a: f32, rot_b: f32) -> f32 {
        rot_a - rot_b - self.primitive.reference_rotation
    }
}

impl Constraint for RotationJoint {
    fn prepare(&mut self, bodies: &mut BodySet, _dt: f32) -> bool {
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return false;
        };

        let k = a.inv_inertia + b.inv_inertia;
        if k <= 0.0 {
            return false;
        }
        self.effective_mass = 1.0 / k;

        let angle = self.relative_angle(a.rotation, b.rotation);
        let previous = self.state;
        self.state = LimitState::classify(
            angle,
            self.primitive.min_angle,
            self.primitive.max_angle,
            consts::EPSILON,
        );
        if self.state != previous || self.state == LimitState::Inactive {
            self.impulse = 0.0;
        }

        a.angular_velocity += a.inv_inertia * self.impulse;
        b.angular_velocity -= b.inv_inertia * self.impulse;
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, _dt: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };

        let cdot = a.angular_velocity - b.angular_velocity;
        let lambda = self.state.accumulate(&mut self.impulse, -self.effective_mass * cdot);
        a.angular_velocity += a.inv_inertia * lambda;
        b.angular_velocity -= b.inv_inertia * lambda;
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some((a, b)) = body_pair(bodies, self.primitive.body_a, self.primitive.body_b) else {
            return;
        };

        let angle = self.relative_angle(a.rotation, b.rotation);
        let error = self
            .state
            .error(angle, self.primitive.min_angle, self.primitive.max_angle);
        if error.abs() < ANGULAR_SLOP {
            return;
        }

        let lambda = -self.effective_mass * error * bias_factor;
        a.rotation += a.inv_inertia * lambda;
        b.rotation -= b.inv_inertia * lambda;
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body_a, Some(self.primitive.body_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, BodyId};
    use approx::assert_abs_diff_eq;

    fn two_bodies() -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::new();
        let a = BodyHandle(bodies.insert(Body::new(BodyId(1))));
        let b = BodyHandle(bodies.insert(Body::new(BodyId(2))));
        (bodies, a, b)
    }

    #[test]
    fn test_locked_angle_spins_together() {
        let (mut bodies, a, b) = two_bodies();
        bodies[a.0].angular_velocity = 2.0;

        let mut joint = RotationJoint::new(RotationJointPrimitive::new(a, b, 0.0));
        assert!(joint.prepare(&mut bodies, 0.016));
        assert_eq!(joint.state(), LimitState::Equal);
        joint.solve_velocity(&mut bodies, 0.016);

        assert_abs_diff_eq!(bodies[a.0].angular_velocity, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bodies[b.0].angular_velocity, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_limit_corrects_position() {
        let (mut bodies, a, b) = two_bodies();
        bodies[a.0].rotation = 1.0;

        let mut joint = RotationJoint::new(RotationJointPrimitive::new(a, b, 0.0).with_limits(-0.5, 0.5));
        assert!(joint.prepare(&mut bodies, 0.016));
        assert_eq!(joint.state(), LimitState::AtUpper);
        for _ in 0..20 {
            joint.solve_position(&mut bodies, 0.016, 0.8);
        }
        let relative = bodies[a.0].rotation - bodies[b.0].rotation;
        assert_abs_diff_eq!(relative, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_within_limits_is_free() {
        let (mut bodies, a, b) = two_bodies();
        bodies[a.0].angular_velocity = 3.0;
        let mut joint = RotationJoint::new(RotationJointPrimitive::new(a, b, 0.0).with_limits(-1.0, 1.0));
        assert!(joint.prepare(&mut bodies, 0.016));
        joint.solve_velocity(&mut bodies, 0.016);
        assert_eq!(bodies[a.0].angular_velocity, 3.0);
    }
}
