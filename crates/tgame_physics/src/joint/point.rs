//! Point joint: pins a body-local point to a target
//!
//! The target is a fixed world point, or a point carried by a second body.

use super::{body_mut, body_pair, Constraint, Softness, LINEAR_SLOP};
use crate::body::{Body, BodyHandle, BodySet};
use tgame_math::{Mat2, Vec2};

/// Configuration of a [`PointJoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct PointJointPrimitive {
    pub body: BodyHandle,
    /// Anchor in the body's local frame
    pub local_point: Vec2,
    /// Point the anchor is pulled to. World space, or the local frame of
    /// `target_body` when one is set.
    pub target_point: Vec2,
    /// Body that carries the target
    pub target_body: Option<BodyHandle>,
    /// Spring frequency in Hz; `0` makes the joint rigid
    pub frequency: f32,
    pub damping_ratio: f32,
    /// Upper bound on the constraint force
    pub max_force: f32,
}

impl PointJointPrimitive {
    /// Soft joint (8 Hz, damping ratio 0.7), suitable for dragging bodies
    pub fn new(body: BodyHandle, local_point: Vec2, target_point: Vec2) -> Self {
        Self {
            body,
            local_point,
            target_point,
            target_body: None,
            frequency: 8.0,
            damping_ratio: 0.7,
            max_force: 1000.0,
        }
    }

    /// Make the joint rigid with unbounded force
    pub fn rigid(mut self) -> Self {
        self.frequency = 0.0;
        self.max_force = f32::INFINITY;
        self
    }

    /// Let `target` carry the target point, read in its local frame
    pub fn attached_to(mut self, target: BodyHandle) -> Self {
        self.target_body = Some(target);
        self
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

/// Two-DOF constraint between a body point and its target
#[derive(Debug, Clone)]
pub struct PointJoint {
    primitive: PointJointPrimitive,
    r: Vec2,
    r_target: Vec2,
    effective_mass: Mat2,
    bias: Vec2,
    softness: Softness,
    impulse: Vec2,
}

impl PointJoint {
    pub fn new(primitive: PointJointPrimitive) -> Self {
        Self {
            primitive,
            r: Vec2::ZERO,
            r_target: Vec2::ZERO,
            effective_mass: Mat2::ZERO,
            bias: Vec2::ZERO,
            softness: Softness::RIGID,
            impulse: Vec2::ZERO,
        }
    }

    pub fn primitive(&self) -> &PointJointPrimitive {
        &self.primitive
    }

    /// Moving the target keeps the accumulated impulse
    pub fn set_target(&mut self, target: Vec2) {
        self.primitive.target_point = target;
    }

    pub fn primitive_mut(&mut self) -> &mut PointJointPrimitive {
        &mut self.primitive
    }

    /// Impulse accumulated over the current step
    pub fn accumulated_impulse(&self) -> Vec2 {
        self.impulse
    }

    fn bodies_mut<'a>(&self, bodies: &'a mut BodySet) -> Option<(&'a mut Body, Option<&'a mut Body>)> {
        match self.primitive.target_body {
            None => Some((body_mut(bodies, self.primitive.body)?, None)),
            Some(target) => {
                let (body, carrier) = body_pair(bodies, self.primitive.body, target)?;
                Some((body, Some(carrier)))
            }
        }
    }

    /// Arm from the carrier's centre and world position of the target
    fn target(&self, carrier: Option<&Body>) -> (Vec2, Vec2) {
        match carrier {
            None => (Vec2::ZERO, self.primitive.target_point),
            Some(carrier) => {
                let r = carrier.to_actual_point(self.primitive.target_point);
                (r, carrier.position + r)
            }
        }
    }
}

/// `[[im + ii ry^2, -ii rx ry], [-ii rx ry, im + ii rx^2]]`
fn point_mass_matrix(inv_mass: f32, inv_inertia: f32, r: Vec2) -> Mat2 {
    Mat2::new(
        inv_mass + inv_inertia * r.y * r.y,
        -inv_inertia * r.x * r.y,
        -inv_inertia * r.x * r.y,
        inv_mass + inv_inertia * r.x * r.x,
    )
}

/// Effective-mass matrix of the body plus, if present, the carrier
fn joint_mass_matrix(body: &Body, r: Vec2, carrier: Option<&Body>, r_target: Vec2) -> Mat2 {
    let mut k = point_mass_matrix(body.inv_mass, body.inv_inertia, r);
    if let Some(carrier) = carrier {
        let kc = point_mass_matrix(carrier.inv_mass, carrier.inv_inertia, r_target);
        k.cols[0] += kc.cols[0];
        k.cols[1] += kc.cols[1];
    }
    k
}

impl Constraint for PointJoint {
    fn prepare(&mut self, bodies: &mut BodySet, dt: f32) -> bool {
        let Some((body, mut carrier)) = self.bodies_mut(bodies) else {
            return false;
        };
        let inv_mass_sum = body.inv_mass + carrier.as_deref().map_or(0.0, |c| c.inv_mass);
        if inv_mass_sum == 0.0 {
            return false;
        }

        let r = body.to_actual_point(self.primitive.local_point);
        let (r_target, target) = self.target(carrier.as_deref());
        let softness = Softness::new(
            self.primitive.frequency,
            self.primitive.damping_ratio,
            1.0 / inv_mass_sum,
            dt,
        );

        let mut k = joint_mass_matrix(body, r, carrier.as_deref(), r_target);
        k.cols[0].x += softness.gamma;
        k.cols[1].y += softness.gamma;
        let Some(effective_mass) = k.try_inverse() else {
            return false;
        };

        let error = body.position + r - target;
        body.apply_impulse(self.impulse, r);
        if let Some(carrier) = carrier.as_deref_mut() {
            carrier.apply_impulse(-self.impulse, r_target);
        }

        self.r = r;
        self.r_target = r_target;
        self.softness = softness;
        self.effective_mass = effective_mass;
        self.bias = error * softness.bias_rate;
        true
    }

    fn solve_velocity(&mut self, bodies: &mut BodySet, dt: f32) {
        let (r, r_target) = (self.r, self.r_target);
        let Some((body, mut carrier)) = self.bodies_mut(bodies) else {
            return;
        };

        let target_velocity = carrier.as_deref().map_or(Vec2::ZERO, |c| c.velocity_at(r_target));
        let cdot = body.velocity_at(r) - target_velocity;
        let lambda = self.effective_mass * -(cdot + self.bias + self.impulse * self.softness.gamma);

        let old = self.impulse;
        self.impulse += lambda;
        let max_impulse = self.primitive.max_force * dt;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse = self.impulse.normalize() * max_impulse;
        }
        let applied = self.impulse - old;

        body.apply_impulse(applied, r);
        if let Some(carrier) = carrier.as_deref_mut() {
            carrier.apply_impulse(-applied, r_target);
        }
    }

    fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32, bias_factor: f32) {
        // A spring handles its own drift through the velocity bias
        if self.softness.is_soft() {
            return;
        }
        let Some((body, mut carrier)) = self.bodies_mut(bodies) else {
            return;
        };

        let r = body.to_actual_point(self.primitive.local_point);
        let (r_target, target) = self.target(carrier.as_deref());
        let error = body.position + r - target;
        if error.length() < LINEAR_SLOP {
            return;
        }
        let Some(mass) = joint_mass_matrix(body, r, carrier.as_deref(), r_target).try_inverse() else {
            return;
        };

        let correction = mass * -error * bias_factor;
        body.position += correction * body.inv_mass;
        body.rotation += body.inv_inertia * r.cross(correction);
        if let Some(carrier) = carrier.as_deref_mut() {
            carrier.position -= correction * carrier.inv_mass;
            carrier.rotation -= carrier.inv_inertia * r_target.cross(correction);
        }
    }

    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.primitive.body, self.primitive.target_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, BodyId};
    use approx::assert_abs_diff_eq;

    fn single_body() -> (BodySet, BodyHandle) {
        let mut bodies = BodySet::new();
        let handle = BodyHandle(bodies.insert(Body::new(BodyId(1))));
        (bodies, handle)
    }

    #[test]
    fn test_rigid_joint_stops_anchor() {
        let (mut bodies, handle) = single_body();
        bodies[handle.0].velocity = Vec2::new(1.0, -2.0);
        bodies[handle.0].angular_velocity = 0.5;

        let anchor = Vec2::new(0.5, 0.0);
        let mut joint = PointJoint::new(PointJointPrimitive::new(handle, anchor, anchor).rigid());
        assert!(joint.prepare(&mut bodies, 1.0 / 60.0));
        joint.solve_velocity(&mut bodies, 1.0 / 60.0);

        let v = bodies[handle.0].velocity_at(anchor);
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_soft_joint_at_rest_applies_nothing() {
        let (mut bodies, handle) = single_body();
        let mut joint = PointJoint::new(PointJointPrimitive::new(handle, Vec2::ZERO, Vec2::ZERO));
        assert!(joint.prepare(&mut bodies, 1.0 / 60.0));
        joint.solve_velocity(&mut bodies, 1.0 / 60.0);
        assert_eq!(bodies[handle.0].velocity, Vec2::ZERO);
        assert_eq!(joint.accumulated_impulse(), Vec2::ZERO);
    }

    #[test]
    fn test_max_force_clamps_impulse() {
        let (mut bodies, handle) = single_body();
        bodies[handle.0].velocity = Vec2::new(100.0, 0.0);
        let dt = 0.1;
        let mut joint = PointJoint::new(
            PointJointPrimitive::new(handle, Vec2::ZERO, Vec2::ZERO)
                .rigid()
                .with_max_force(5.0),
        );
        assert!(joint.prepare(&mut bodies, dt));
        joint.solve_velocity(&mut bodies, dt);
        assert_abs_diff_eq!(joint.accumulated_impulse().length(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_rigid_position_correction_reduces_error() {
        let (mut bodies, handle) = single_body();
        let target = Vec2::new(1.0, 0.0);
        let mut joint = PointJoint::new(PointJointPrimitive::new(handle, Vec2::ZERO, target).rigid());
        assert!(joint.prepare(&mut bodies, 0.016));
        for _ in 0..10 {
            joint.solve_position(&mut bodies, 0.016, 0.8);
        }
        assert_abs_diff_eq!(bodies[handle.0].position.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_carried_target_matches_anchor_velocities() {
        let mut bodies = BodySet::new();
        let mut first = Body::new(BodyId(1));
        first.velocity = Vec2::new(1.0, 0.5);
        first.angular_velocity = -0.3;
        let mut second = Body::new(BodyId(2));
        second.position = Vec2::new(1.0, 0.0);
        second.velocity = Vec2::new(-0.5, -1.0);
        second.angular_velocity = 0.8;
        let a = BodyHandle(bodies.insert(first));
        let b = BodyHandle(bodies.insert(second));

        // Anchors coincide at (0.5, 0)
        let (local_a, local_b) = (Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0));
        let mut joint = PointJoint::new(
            PointJointPrimitive::new(a, local_a, local_b)
                .attached_to(b)
                .rigid(),
        );
        assert_eq!(joint.bodies(), (a, Some(b)));
        assert!(joint.prepare(&mut bodies, 1.0 / 60.0));
        joint.solve_velocity(&mut bodies, 1.0 / 60.0);

        let va = bodies[a.0].velocity_at(bodies[a.0].to_actual_point(local_a));
        let vb = bodies[b.0].velocity_at(bodies[b.0].to_actual_point(local_b));
        assert_abs_diff_eq!(va.x, vb.x, epsilon = 1e-5);
        assert_abs_diff_eq!(va.y, vb.y, epsilon = 1e-5);

        // Equal and opposite impulses leave total momentum unchanged
        let momentum = bodies[a.0].velocity + bodies[b.0].velocity;
        assert_abs_diff_eq!(momentum.x, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(momentum.y, -0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_carried_target_position_correction() {
        let mut bodies = BodySet::new();
        let a = BodyHandle(bodies.insert(Body::new(BodyId(1))));
        let mut second = Body::new(BodyId(2));
        second.position = Vec2::new(2.0, 0.0);
        let b = BodyHandle(bodies.insert(second));

        let mut joint = PointJoint::new(
            PointJointPrimitive::new(a, Vec2::ZERO, Vec2::ZERO)
                .attached_to(b)
                .rigid(),
        );
        assert!(joint.prepare(&mut bodies, 0.016));
        for _ in 0..10 {
            joint.solve_position(&mut bodies, 0.016, 0.8);
        }
        // Equal masses meet in the middle
        assert_abs_diff_eq!(bodies[a.0].position.x, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(bodies[b.0].position.x, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_static_body_is_degenerate() {
        let (mut bodies, handle) = single_body();
        bodies[handle.0].set_type(crate::body::BodyType::Static);
        let mut joint = PointJoint::new(PointJointPrimitive::new(handle, Vec2::ZERO, Vec2::X));
        assert!(!joint.prepare(&mut bodies, 0.016));
    }
}
