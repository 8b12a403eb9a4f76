//! Persistent contact manifolds with warm starting
//!
//! The maintainer keeps one [`ContactManifold`] per touching body pair. Each
//! step the world marks every manifold inactive, re-runs the narrow phase on
//! the broad-phase candidates and prunes whatever was not refreshed. Points
//! that survive from the previous step keep their accumulated impulses, which
//! are re-applied in [`ContactMaintainer::prepare`].

use crate::body::{Body, BodyHandle, BodySet};
use crate::narrow_phase::{Manifold, NarrowPhase};
use std::collections::BTreeMap;
use tgame_math::Vec2;

/// Approach speed below which restitution is ignored
const RESTITUTION_THRESHOLD: f32 = 1.0;
/// Largest positional correction applied by one position pass
const MAX_CORRECTION: f32 = 0.2;
/// Anchor matching radius, in multiples of the penetration slop
const MATCH_SCALE: f32 = 10.0;

/// Unordered body pair, stored with the smaller handle first
pub type BodyPair = (BodyHandle, BodyHandle);

fn ordered(a: BodyHandle, b: BodyHandle) -> (BodyPair, bool) {
    if a <= b {
        ((a, b), false)
    } else {
        ((b, a), true)
    }
}

/// One persistent contact point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPointState {
    /// Anchor in body A's frame
    pub local_a: Vec2,
    /// Anchor in body B's frame
    pub local_b: Vec2,
    /// Penetration depth at detection time
    pub penetration: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    ra: Vec2,
    rb: Vec2,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

impl ContactPointState {
    fn new(local_a: Vec2, local_b: Vec2, penetration: f32) -> Self {
        Self {
            local_a,
            local_b,
            penetration,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            ra: Vec2::ZERO,
            rb: Vec2::ZERO,
            normal_mass: 0.0,
            tangent_mass: 0.0,
            velocity_bias: 0.0,
        }
    }
}

/// Contact state between two bodies
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// World normal from A to B
    pub normal: Vec2,
    pub points: Vec<ContactPointState>,
    /// `sqrt(friction_a * friction_b)`
    pub friction: f32,
    /// `min(restitution_a, restitution_b)`
    pub restitution: f32,
    active: bool,
}

impl ContactManifold {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sum of the accumulated normal impulses
    pub fn total_normal_impulse(&self) -> f32 {
        self.points.iter().map(|p| p.normal_impulse).sum()
    }

    /// Average world-space contact point on body A
    pub fn average_point(&self, body_a: &Body) -> Vec2 {
        if self.points.is_empty() {
            return body_a.position;
        }
        let sum: Vec2 = self.points.iter().map(|p| body_a.to_world_point(p.local_a)).sum();
        sum / self.points.len() as f32
    }
}

fn effective_mass(a: &Body, b: &Body, ra: Vec2, rb: Vec2, axis: Vec2) -> f32 {
    let rna = ra.cross(axis);
    let rnb = rb.cross(axis);
    let k = a.inv_mass + b.inv_mass + a.inv_inertia * rna * rna + b.inv_inertia * rnb * rnb;
    if k > 0.0 {
        1.0 / k
    } else {
        0.0
    }
}

fn apply_pair(a: &mut Body, b: &mut Body, impulse: Vec2, ra: Vec2, rb: Vec2) {
    a.apply_impulse(-impulse, ra);
    b.apply_impulse(impulse, rb);
}

/// Owner of all persistent manifolds
#[derive(Debug, Clone)]
pub struct ContactMaintainer {
    manifolds: BTreeMap<BodyPair, ContactManifold>,
    max_penetration: f32,
    bias_factor: f32,
}

impl Default for ContactMaintainer {
    fn default() -> Self {
        Self::new(0.005, 0.2)
    }
}

impl ContactMaintainer {
    pub fn new(max_penetration: f32, bias_factor: f32) -> Self {
        Self {
            manifolds: BTreeMap::new(),
            max_penetration,
            bias_factor,
        }
    }

    /// Slop and correction factor used by [`solve_position`](Self::solve_position)
    pub fn set_position_correction(&mut self, max_penetration: f32, bias_factor: f32) {
        self.max_penetration = max_penetration;
        self.bias_factor = bias_factor;
    }

    // ==================== Detection ====================

    /// Run `narrow_phase` on a candidate pair and record the result.
    ///
    /// Returns `true` when the pair is touching.
    pub fn collide(
        &mut self,
        narrow_phase: &dyn NarrowPhase,
        bodies: &BodySet,
        a: BodyHandle,
        b: BodyHandle,
    ) -> bool {
        let (Some(body_a), Some(body_b)) = (bodies.get(a.0), bodies.get(b.0)) else {
            return false;
        };
        let (Some(shape_a), Some(shape_b)) = (body_a.shape_primitive(), body_b.shape_primitive())
        else {
            return false;
        };
        match narrow_phase.detect(&shape_a, &shape_b) {
            Some(manifold) => {
                self.add(bodies, a, b, manifold);
                true
            }
            None => false,
        }
    }

    /// Merge a fresh manifold for `a` against `b` into the persistent state.
    ///
    /// Points close to a point from the previous step inherit its impulses.
    /// Returns `true` when the pair had no manifold before.
    pub fn add(&mut self, bodies: &BodySet, a: BodyHandle, b: BodyHandle, manifold: Manifold) -> bool {
        let ((first, second), swapped) = ordered(a, b);
        let manifold = if swapped { manifold.flipped() } else { manifold };
        let (Some(body_a), Some(body_b)) = (bodies.get(first.0), bodies.get(second.0)) else {
            return false;
        };

        let tolerance = self.max_penetration * MATCH_SCALE;
        let tolerance_sq = tolerance * tolerance;
        let friction = (body_a.friction * body_b.friction).sqrt();
        let restitution = body_a.restitution.min(body_b.restitution);

        let previous = self.manifolds.get(&(first, second));
        let is_new = previous.is_none();

        // Each old point hands its impulses to at most one new point
        let mut consumed = vec![false; previous.map_or(0, |old| old.points.len())];
        let mut points = Vec::with_capacity(manifold.points.len());
        for p in &manifold.points {
            let mut state = ContactPointState::new(
                body_a.to_local_point(p.point_a),
                body_b.to_local_point(p.point_b),
                -p.separation(manifold.normal),
            );
            let matched = previous.and_then(|old| {
                old.points.iter().enumerate().find(|(i, o)| {
                    !consumed[*i] && (o.local_a - state.local_a).length_squared() < tolerance_sq
                })
            });
            if let Some((i, old)) = matched {
                consumed[i] = true;
                state.normal_impulse = old.normal_impulse;
                state.tangent_impulse = old.tangent_impulse;
            }
            points.push(state);
        }

        self.manifolds.insert(
            (first, second),
            ContactManifold {
                body_a: first,
                body_b: second,
                normal: manifold.normal,
                points,
                friction,
                restitution,
                active: true,
            },
        );
        is_new
    }

    /// Mark every manifold stale ahead of a detection pass
    pub fn deactivate_all(&mut self) {
        for manifold in self.manifolds.values_mut() {
            manifold.active = false;
        }
    }

    /// Drop manifolds not refreshed since [`deactivate_all`](Self::deactivate_all).
    /// Returns the pairs that stopped touching.
    pub fn prune_inactive(&mut self) -> Vec<BodyPair> {
        let stale: Vec<BodyPair> = self
            .manifolds
            .iter()
            .filter(|(_, m)| !m.active)
            .map(|(pair, _)| *pair)
            .collect();
        for pair in &stale {
            self.manifolds.remove(pair);
        }
        if !stale.is_empty() {
            log::trace!("pruned {} stale manifolds", stale.len());
        }
        stale
    }

    // ==================== Solver ====================

    /// Compute anchors, effective masses and restitution bias, then apply
    /// last step's impulses.
    pub fn prepare(&mut self, bodies: &mut BodySet, _dt: f32) {
        for manifold in self.manifolds.values_mut() {
            let Some((a, b)) = bodies.get_pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };
            let normal = manifold.normal;
            let tangent = normal.perpendicular();

            for point in &mut manifold.points {
                point.ra = a.to_actual_point(point.local_a);
                point.rb = b.to_actual_point(point.local_b);
                point.normal_mass = effective_mass(a, b, point.ra, point.rb, normal);
                point.tangent_mass = effective_mass(a, b, point.ra, point.rb, tangent);

                let approach = (b.velocity_at(point.rb) - a.velocity_at(point.ra)).dot(normal);
                point.velocity_bias = if approach < -RESTITUTION_THRESHOLD {
                    -manifold.restitution * approach
                } else {
                    0.0
                };

                let impulse = normal * point.normal_impulse + tangent * point.tangent_impulse;
                apply_pair(a, b, impulse, point.ra, point.rb);
            }
        }
    }

    /// One velocity pass: friction first, then the non-penetration impulse
    pub fn solve_velocity(&mut self, bodies: &mut BodySet, _dt: f32) {
        for manifold in self.manifolds.values_mut() {
            let Some((a, b)) = bodies.get_pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };
            let normal = manifold.normal;
            let tangent = normal.perpendicular();

            for point in &mut manifold.points {
                let dv = b.velocity_at(point.rb) - a.velocity_at(point.ra);
                let lambda = -point.tangent_mass * dv.dot(tangent);
                let max_friction = manifold.friction * point.normal_impulse;
                let old = point.tangent_impulse;
                point.tangent_impulse = (old + lambda).clamp(-max_friction, max_friction);
                apply_pair(a, b, tangent * (point.tangent_impulse - old), point.ra, point.rb);

                let dv = b.velocity_at(point.rb) - a.velocity_at(point.ra);
                let lambda = point.normal_mass * (point.velocity_bias - dv.dot(normal));
                let old = point.normal_impulse;
                point.normal_impulse = (old + lambda).max(0.0);
                apply_pair(a, b, normal * (point.normal_impulse - old), point.ra, point.rb);
            }
        }
    }

    /// One position pass pushing overlapping bodies apart, leaving
    /// `max_penetration` of overlap in place
    pub fn solve_position(&mut self, bodies: &mut BodySet, _dt: f32) {
        for manifold in self.manifolds.values() {
            let Some((a, b)) = bodies.get_pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };
            let normal = manifold.normal;

            for point in &manifold.points {
                let pa = a.to_world_point(point.local_a);
                let pb = b.to_world_point(point.local_b);
                let separation = (pb - pa).dot(normal);
                let correction = (self.bias_factor * (separation + self.max_penetration))
                    .clamp(-MAX_CORRECTION, 0.0);
                if correction == 0.0 {
                    continue;
                }

                let ra = pa - a.position;
                let rb = pb - b.position;
                let mass = effective_mass(a, b, ra, rb, normal);
                let impulse = normal * (-mass * correction);

                a.position -= impulse * a.inv_mass;
                a.rotation -= a.inv_inertia * ra.cross(impulse);
                b.position += impulse * b.inv_mass;
                b.rotation += b.inv_inertia * rb.cross(impulse);
            }
        }
    }

    // ==================== Bookkeeping ====================

    /// Forget every manifold involving `body`
    /// Drop every manifold involving `body`. Returns the dropped pairs.
    pub fn remove_body(&mut self, body: BodyHandle) -> Vec<BodyPair> {
        let mut dropped = Vec::new();
        self.manifolds.retain(|&(a, b), _| {
            let keep = a != body && b != body;
            if !keep {
                dropped.push((a, b));
            }
            keep
        });
        dropped
    }

    pub fn clear(&mut self) {
        self.manifolds.clear();
    }

    /// Manifold for a pair, in either order
    pub fn manifold(&self, a: BodyHandle, b: BodyHandle) -> Option<&ContactManifold> {
        self.manifolds.get(&ordered(a, b).0)
    }

    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactManifold> {
        self.manifolds.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyId, BodyType};
    use crate::narrow_phase::{BasicNarrowPhase, ContactPoint};
    use crate::shape::Shape;
    use approx::assert_abs_diff_eq;

    fn ball_on_ground(gap: f32) -> (BodySet, BodyHandle, BodyHandle) {
        let mut bodies = BodySet::new();
        let mut ground = Body::new(BodyId(1));
        ground.set_shape(Shape::rectangle(10.0, 1.0)).unwrap();
        ground.set_type(BodyType::Static);
        let mut ball = Body::new(BodyId(2));
        ball.set_shape(Shape::circle(0.5)).unwrap();
        ball.position = Vec2::new(0.0, 1.0 + gap);
        let ground = BodyHandle(bodies.insert(ground));
        let ball = BodyHandle(bodies.insert(ball));
        (bodies, ground, ball)
    }

    #[test]
    fn test_collide_and_prune() {
        let (bodies, ground, ball) = ball_on_ground(-0.01);
        let mut contacts = ContactMaintainer::default();

        assert!(contacts.collide(&BasicNarrowPhase, &bodies, ball, ground));
        assert_eq!(contacts.len(), 1);
        let m = contacts.manifold(ground, ball).unwrap();
        assert_eq!(m.body_a, ground.min(ball));
        assert_eq!(m.points.len(), 1);

        contacts.deactivate_all();
        assert_eq!(contacts.prune_inactive(), vec![(ground.min(ball), ground.max(ball))]);
        assert!(contacts.is_empty());
    }

    #[test]
    fn test_old_point_warm_starts_one_new_point() {
        let (bodies, ground, ball) = ball_on_ground(-0.01);
        let mut contacts = ContactMaintainer::default();
        let point = |x: f32| ContactPoint {
            point_a: Vec2::new(x, 0.5),
            point_b: Vec2::new(x, 0.49),
        };

        contacts.add(&bodies, ground, ball, Manifold { normal: Vec2::Y, points: vec![point(0.0)] });
        let (pair, _) = ordered(ground, ball);
        contacts.manifolds.get_mut(&pair).unwrap().points[0].normal_impulse = 2.0;

        // Both new points lie within the matching tolerance of the old one
        let fresh = Manifold {
            normal: Vec2::Y,
            points: vec![point(0.0), point(0.01)],
        };
        assert!(!contacts.add(&bodies, ground, ball, fresh));
        let carried: Vec<f32> = contacts
            .manifold(ground, ball)
            .unwrap()
            .points
            .iter()
            .map(|p| p.normal_impulse)
            .collect();
        assert_eq!(carried, [2.0, 0.0]);
    }

    #[test]
    fn test_normal_points_from_first_to_second() {
        let (bodies, ground, ball) = ball_on_ground(-0.01);
        let mut contacts = ContactMaintainer::default();
        contacts.collide(&BasicNarrowPhase, &bodies, ground, ball);
        let m = contacts.manifold(ball, ground).unwrap();
        let direction = bodies[m.body_b.0].position - bodies[m.body_a.0].position;
        assert!(m.normal.dot(direction) > 0.0);
    }

    #[test]
    fn test_solver_stops_falling_ball() {
        let (mut bodies, ground, ball) = ball_on_ground(-0.01);
        bodies[ball.0].velocity = Vec2::new(0.0, -0.5);

        let mut contacts = ContactMaintainer::default();
        contacts.collide(&BasicNarrowPhase, &bodies, ground, ball);
        contacts.prepare(&mut bodies, 0.016);
        for _ in 0..8 {
            contacts.solve_velocity(&mut bodies, 0.016);
        }
        assert_abs_diff_eq!(bodies[ball.0].velocity.y, 0.0, epsilon = 1e-5);
        assert_eq!(bodies[ground.0].velocity, Vec2::ZERO);
        assert!(contacts.manifold(ground, ball).unwrap().total_normal_impulse() > 0.0);
    }

    #[test]
    fn test_impulses_persist_across_detection() {
        let (mut bodies, ground, ball) = ball_on_ground(-0.01);
        bodies[ball.0].velocity = Vec2::new(0.0, -0.5);

        let mut contacts = ContactMaintainer::default();
        contacts.collide(&BasicNarrowPhase, &bodies, ground, ball);
        contacts.prepare(&mut bodies, 0.016);
        contacts.solve_velocity(&mut bodies, 0.016);
        let impulse = contacts.manifold(ground, ball).unwrap().total_normal_impulse();

        contacts.deactivate_all();
        assert!(contacts.collide(&BasicNarrowPhase, &bodies, ground, ball));
        assert!(contacts.prune_inactive().is_empty());
        let carried = contacts.manifold(ground, ball).unwrap().total_normal_impulse();
        assert_abs_diff_eq!(carried, impulse, epsilon = 1e-6);
    }

    #[test]
    fn test_position_pass_leaves_slop() {
        let (mut bodies, ground, ball) = ball_on_ground(-0.1);
        let mut contacts = ContactMaintainer::new(0.005, 0.2);
        contacts.collide(&BasicNarrowPhase, &bodies, ground, ball);
        for _ in 0..100 {
            contacts.solve_position(&mut bodies, 0.016);
        }
        let penetration = 1.0 - bodies[ball.0].position.y;
        assert!(penetration <= 0.005 + 1e-4);
        assert!(penetration >= 0.0);
        assert_eq!(bodies[ground.0].position, Vec2::ZERO);
    }

    #[test]
    fn test_remove_body() {
        let (bodies, ground, ball) = ball_on_ground(-0.01);
        let mut contacts = ContactMaintainer::default();
        contacts.collide(&BasicNarrowPhase, &bodies, ground, ball);
        assert_eq!(contacts.remove_body(ball), vec![(ground.min(ball), ground.max(ball))]);
        assert!(contacts.manifold(ground, ball).is_none());
        assert!(contacts.remove_body(ball).is_empty());
    }
}
