//! Distance joint: keeps a body anchor within a distance range of a world point

use super::{body_mut, Constraint, LimitState, LINEAR_SLOP};
use crate::body::{BodyHandle, BodySet};
use tgame_math::{consts, Vec2};

/// Configuration of a [`DistanceJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceJointPrimitive {
    pub body: BodyHandle,
    /// Anchor in the body's local frame
    pub local_point: Vec2,
    /// Fixed world point
    pub target_point: Vec2,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl DistanceJointPrimitive {
    /// Rod of fixed length
    pub fn new(body: BodyHandle, local_point: Vec2, target_point: Vec2, length: f32) -> Self {
        Self {
            body,
            local_point,
            target_point,
            min_distance: length,
            max_distance: length,
        }
    }

    /// Allow the distance anywhere in `[min, max]`
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min.min(max);
        self.max_distance = max.max(min);
        self
    }
}

/// One-dimensional distance constraint, two-sided when `min == max`
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    primitive: DistanceJointPrimitive,
    state: LimitState,
    r: Vec2,
    axis: Vec2,
    effective_mass: f32,
    impulse: f32,
}

impl DistanceJoint {
    pub fn new(primitive: DistanceJointPrimitive) -> Self {
        Self {
            primitive,
            state: LimitState::Inactive,
            r: Vec2::ZERO,
            axis: Vec2::ZERO,
            effective_mass: 0.0,
            impulse: 0.0,
        }
    }

    pub fn primitive(&self) -> &DistanceJointPrimitive {
        &self.primitive
    }

    pub fn primitive_mut(&mut self) -> &mut DistanceJointPrimitive {
        &mut self.primitive
    }

    /// Which side of the range was violated at the start of the step
    pub fn state(&self) -> LimitState {
        self.state
    }

    pub fn accumulated_impulse(&self) -> f32 {
        self.impulse
    }
}

impl Constraint for DistanceJoint {
    fn prepare(&mut self, bodies: &mut BodySet, _dt: f32) -> bool {
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return false;
        };

        self.r = body.to_actual_point(self.primitive.local_point);
        let offset = body.position + self.r - self.primitive.target_point;
        let Some(axis) = offset.try_normalize() else {
            return false;
        };
        self.axis = axis;

        let length = offset.length();
        let previous = self.state;
        self.state = LimitState::classify(
            length,
            self.primitive.min_distance,
            self.primitive.max_distance,
            consts::EPSILON,
        );
        if self.state != previous || self.state == LimitState::Inactive {
            self.impulse = 0.0;
        }
        if self.state == LimitState::Inactive {
            return true;
        }

        let rn = self.r.cross(self.axis);
        let k = body.inv_mass + body.inv_inertia * rn * rn;
        if k <= 0.0 {
            return false;
        }
        self.effective_mass = 1.0 / k;

        body.apply_impulse(self.axis * self.impulse, self.r);
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, _dt: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return;
        };

        let cdot = self.axis.dot(body.velocity_at(self.r));
        let lambda = self.state.accumulate(&mut self.impulse, -self.effective_mass * cdot);
        body.apply_impulse(self.axis * lambda, self.r);
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        if self.state == LimitState::Inactive {
            return;
        }
        let Some(body) = body_mut(bodies, self.primitive.body) else {
            return;
        };

        let r = body.to_actual_point(self.primitive.local_point);
        let offset = body.position + r - self.primitive.target_point;
        let Some(axis) = offset.try_normalize() else {
            return;
        };
        let error = self.state.error(
            offset.length(),
            self.primitive.min_distance,
            self.primitive.max_distance,
        );
        if error.abs() < LINEAR_SLOP {
            return;
        }

        let rn = r.cross(axis);
        let k = body.inv_mass + body.inv_inertia * rn * rn;
        if k <= 0.0 {
            return;
        }
        let correction = axis * (-error * bias_factor / k);
        body.position += correction * body.inv_mass;
        body.rotation += body.inv_inertia * r.cross(correction);
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body, None)
    }
}
