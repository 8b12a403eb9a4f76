//! Orientation joint: turns a body to face a world point

use super::{body_mut, Constraint, LimitState, ANGULAR_SLOP};
use crate::body::{Body, BodyHandle, BodySet};
use tgame_math::{consts, wrap_angle, Vec2};

/// Configuration of an [`OrientationJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationJointPrimitive {
    pub body: BodyHandle,
    /// World point the body faces
    pub target_point: Vec2,
    /// Offset added to the bearing of the target
    pub reference_rotation: f32,
    pub min_angle: f32,
    pub max_angle: f32,
}

impl OrientationJointPrimitive {
    pub fn new(body: BodyHandle, target_point: Vec2, reference_rotation: f32) -> Self {
        Self {
            body,
            target_point,
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

/// Keeps `rotation - (bearing(target) + reference)` within limits
#[derive(Debug, Clone)]
pub struct OrientationJoint {
    primitive: OrientationJointPrimitive,
    state: LimitState,
    effective_mass: f32,
    impulse: f32,
}

impl OrientationJoint {
    pub fn new(primitive: OrientationJointPrimitive) -> Self {
        Self {
            primitive,
            state: LimitState::Inactive,
            effective_mass: 0.0,
            impulse: 0.0,
        }
    }

    pub fn primitive(&self) -> &OrientationJointPrimitive {
        &self.primitive
    }

    pub fn set_target(&mut self, target: Vec2) {
        self.primitive.target_point = target;
    }

    pub fn state(&self) -> LimitState {
        self.state
    }

    /// `None` while the body sits on the target
    fn angle(&self, body: &Body) -> Option<f32> {
        let to_target = self.primitive.target_point - body.position;
        if to_target.length_squared() <= consts::EPSILON {
            return None;
        }
        Some(wrap_angle(
            body.rotation - (to_target.theta() + self.primitive.reference_rotation),
        ))
    }
}

impl Constraint for OrientationJoint {
    fn prepare(&mut self, bodies: &mut BodySet, _dt: f32) -> bool {
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return false;
        };
        if body.inv_inertia <= 0.0 {
            return false;
        }
        let Some(angle) = self.angle(body) else {
            return false;
        };
        self.effective_mass = 1.0 / body.inv_inertia;

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

        body.angular_velocity += body.inv_inertia * self.impulse;
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, _dt: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return;
        };

        let lambda = self
            .state
            .accumulate(&mut self.impulse, -self.effective_mass * body.angular_velocity);
        body.angular_velocity += body.inv_inertia * lambda;
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return;
        };
        let Some(angle) = self.angle(body) else {
            return;
        };

        let error = self
            .state
            .error(angle, self.primitive.min_angle, self.primitive.max_angle);
        if error.abs() < ANGULAR_SLOP {
            return;
        }
        body.rotation -= error * bias_factor;
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyId;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_turns_towards_target() {
        let mut bodies = BodySet::new();
        let handle = BodyHandle(bodies.insert(Body::new(BodyId(1))));

        // Target straight up: bearing is pi/2
        let mut joint = OrientationJoint::new(OrientationJointPrimitive::new(handle, Vec2::new(0.0, 5.0), 0.0));
        assert!(joint.prepare(&mut bodies, 0.016));
        assert_eq!(joint.state(), LimitState::Equal);
        for _ in 0..20 {
            joint.solve_position(&mut bodies, 0.016, 0.8);
        }
        assert_abs_diff_eq!(bodies[handle.0].rotation, consts::FRAC_PI_2, epsilon = 1e-4);
    }

    #[test]
    fn test_on_target_is_degenerate() {
        let mut bodies = BodySet::new();
        let handle = BodyHandle(bodies.insert(Body::new(BodyId(1))));
        let mut joint = OrientationJoint::new(OrientationJointPrimitive::new(handle, Vec2::ZERO, 0.0));
        assert!(!joint.prepare(&mut bodies, 0.016));
    }
}
