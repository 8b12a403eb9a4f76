//! Physics world - main simulation container

use crate::body::{Body, BodyDesc, BodyHandle, BodyId, BodySet, BodyType};
use crate::broad_phase::BroadPhaseTree;
use crate::config::PhysicsConfig;
use crate::contact::ContactMaintainer;
use crate::error::{PhysicsError, Result};
use crate::events::{
    CollisionEvent, CollisionEventType, ContactData, EventCollector, PhysicsEventHandler,
};
use crate::joint::{Joint, JointHandle, JointId, JointKind, JointPrimitive};
use crate::narrow_phase::{BasicNarrowPhase, NarrowPhase};
use std::collections::HashSet;
use tgame_math::Vec2;
use tgame_structures::{IdPool, SlotMap};

/// The main physics world containing all simulation state
pub struct PhysicsWorld {
    /// Configuration
    config: PhysicsConfig,

    /// Body arena
    bodies: BodySet,

    /// Joint arena
    joints: SlotMap<Joint>,

    /// Small reusable body ids
    body_ids: IdPool,

    /// Small reusable joint ids
    joint_ids: IdPool,

    /// Broad phase
    tree: BroadPhaseTree,

    /// Persistent contacts
    contacts: ContactMaintainer,

    /// Narrow phase
    narrow_phase: Box<dyn NarrowPhase>,

    /// Events recorded by the last step
    events: EventCollector,

    /// Events raised between steps, reported with the next step
    pending_events: Vec<CollisionEvent>,
}

impl PhysicsWorld {
    /// Create a new physics world
    pub fn new(config: PhysicsConfig) -> Self {
        let tree = BroadPhaseTree::new(config.fat_margin, config.velocity_fattening);
        let contacts = ContactMaintainer::new(config.max_penetration, config.contact_bias_factor);
        Self {
            config,
            bodies: BodySet::new(),
            joints: SlotMap::new(),
            body_ids: IdPool::new(),
            joint_ids: IdPool::new(),
            tree,
            contacts,
            narrow_phase: Box::new(BasicNarrowPhase),
            events: EventCollector::new(),
            pending_events: Vec::new(),
        }
    }

    /// Create a world after checking the configuration
    pub fn try_new(config: PhysicsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Replace the contact generator
    pub fn with_narrow_phase(mut self, narrow_phase: impl NarrowPhase + 'static) -> Self {
        self.narrow_phase = Box::new(narrow_phase);
        self
    }

    /// Get the physics configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Mutable configuration; changes apply from the next step
    pub fn config_mut(&mut self) -> &mut PhysicsConfig {
        &mut self.config
    }

    // ==================== Bodies ====================

    /// Create a neutral dynamic body at the origin
    pub fn create_body(&mut self) -> BodyHandle {
        let id = BodyId(self.body_ids.allocate());
        let handle = BodyHandle(self.bodies.insert(Body::new(id)));
        log::debug!("created body {:?}", id);
        handle
    }

    /// Create a body from a description
    pub fn create_body_from(&mut self, desc: &BodyDesc) -> Result<BodyHandle> {
        let id = BodyId(self.body_ids.allocate());
        let body = match desc.build(id) {
            Ok(body) => body,
            Err(err) => {
                self.body_ids.release(id.0);
                return Err(err);
            }
        };
        let handle = BodyHandle(self.bodies.insert(body));
        log::debug!("created {:?} body {:?}", desc.body_type, id);
        Ok(handle)
    }

    /// Remove a body. Unknown handles are ignored.
    ///
    /// The body must not be referenced by an active joint. Contacts it was
    /// part of end with a `Stopped` event in the next step's events.
    pub fn remove_body(&mut self, handle: BodyHandle) {
        if !self.bodies.contains_key(handle.0) {
            return;
        }
        debug_assert!(
            !self
                .joints
                .values()
                .any(|joint| joint.is_active() && joint.references(handle)),
            "removing body {:?} still referenced by an active joint",
            handle
        );

        if let Some(body) = self.bodies.remove(handle.0) {
            self.body_ids.release(body.id.0);
            self.tree.remove(handle);
            for (a, b) in self.contacts.remove_body(handle) {
                self.pending_events.push(stopped_event(a, b));
            }
            log::debug!("removed body {:?}", body.id);
        }
    }

    /// Get a body by handle
    pub fn body(&self, handle: BodyHandle) -> Result<&Body> {
        self.bodies
            .get(handle.0)
            .ok_or(PhysicsError::BodyNotFound(handle))
    }

    /// Get a mutable body by handle. Edits do not wake a sleeping body.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body> {
        self.bodies
            .get_mut(handle.0)
            .ok_or(PhysicsError::BodyNotFound(handle))
    }

    /// Add a force at the mass centre until the end of the next step
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.apply_force(force);
        body.wake();
        Ok(())
    }

    /// Add a force at a world point
    pub fn apply_force_at_point(&mut self, handle: BodyHandle, force: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        let r = point - body.position;
        body.apply_force_at(force, r);
        body.wake();
        Ok(())
    }

    /// Add a torque until the end of the next step
    pub fn apply_torque(&mut self, handle: BodyHandle, torque: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.apply_torque(torque);
        body.wake();
        Ok(())
    }

    /// Apply an impulse at a world point
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        let r = point - body.position;
        body.apply_impulse(impulse, r);
        body.wake();
        Ok(())
    }

    /// Set a body's linear velocity and wake it
    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.set_velocity(velocity);
        body.wake();
        Ok(())
    }

    /// Wake a sleeping body
    pub fn wake_body(&mut self, handle: BodyHandle) -> Result<()> {
        self.body_mut(handle)?.wake();
        Ok(())
    }

    /// Iterate over all bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(key, body)| (BodyHandle(key), body))
    }

    /// Bodies whose shape contains a world point
    ///
    /// Bodies created or moved out of their leaf since the last step are
    /// checked against their current bounds.
    pub fn query_point(&self, point: Vec2) -> Vec<BodyHandle> {
        let mut candidates = self.tree.query_point(point);
        for (key, body) in self.bodies.iter() {
            let handle = BodyHandle(key);
            let bounds = body.aabb(0.0);
            let untracked = self
                .tree
                .fat_aabb(handle)
                .map_or(true, |fat| !fat.contains_aabb(&bounds));
            if untracked && bounds.contains_point(point) {
                candidates.push(handle);
            }
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates.retain(|handle| {
            self.bodies
                .get(handle.0)
                .and_then(Body::shape_primitive)
                .is_some_and(|shape| shape.contains(point))
        });
        candidates
    }

    // ==================== Joints ====================

    /// Create a joint. The primitive's variant selects the joint type.
    pub fn create_joint(&mut self, primitive: impl Into<JointPrimitive>) -> JointHandle {
        let id = JointId(self.joint_ids.allocate());
        let kind = JointKind::from_primitive(primitive.into(), &self.bodies);
        log::debug!("created {} joint {:?}", kind.name(), id);
        let joint = Joint::new(id, kind);
        wake_attached(&mut self.bodies, &joint);
        JointHandle(self.joints.insert(joint))
    }

    /// Enable or disable a joint. Enabling wakes the bodies it holds.
    pub fn set_joint_active(&mut self, handle: JointHandle, active: bool) -> Result<()> {
        let joint = self
            .joints
            .get_mut(handle.0)
            .ok_or(PhysicsError::JointNotFound(handle))?;
        joint.set_active(active);
        if active {
            wake_attached(&mut self.bodies, joint);
        }
        Ok(())
    }

    /// Remove a joint. Unknown handles are ignored.
    pub fn remove_joint(&mut self, handle: JointHandle) {
        if let Some(joint) = self.joints.remove(handle.0) {
            self.joint_ids.release(joint.id().0);
            log::debug!("removed {} joint {:?}", joint.kind().name(), joint.id());
        }
    }

    /// Get a joint by handle
    pub fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints
            .get(handle.0)
            .ok_or(PhysicsError::JointNotFound(handle))
    }

    /// Get a mutable joint by handle
    pub fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut Joint> {
        self.joints
            .get_mut(handle.0)
            .ok_or(PhysicsError::JointNotFound(handle))
    }

    /// Iterate over all joints
    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter().map(|(key, joint)| (JointHandle(key), joint))
    }

    // ==================== Simulation ====================

    /// Advance the simulation by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        self.events.clear();
        for event in self.pending_events.drain(..) {
            self.events.on_collision(&event);
        }
        if !(dt > 0.0) {
            return;
        }

        // Covers joints re-enabled through `joint_mut`
        for joint in self.joints.values().filter(|joint| joint.is_active()) {
            wake_attached(&mut self.bodies, joint);
        }

        self.detect_collisions(dt);
        self.prepare_velocity_constraint(dt);
        self.step_velocity(dt);
        self.solve_velocity_constraint(dt);
        self.step_position(dt);
        self.solve_position_constraint(dt);
        if self.config.sleeping_enabled {
            self.update_sleep();
        }

        log::trace!(
            "step dt={} bodies={} joints={} contacts={} events={}",
            dt,
            self.bodies.len(),
            self.joints.len(),
            self.contacts.len(),
            self.events.len()
        );
    }

    /// Refresh the broad phase, run the narrow phase on candidate pairs and
    /// record collision events
    pub fn detect_collisions(&mut self, dt: f32) {
        self.tree
            .set_margins(self.config.fat_margin, self.config.velocity_fattening);
        self.contacts
            .set_position_correction(self.config.max_penetration, self.config.contact_bias_factor);

        for (key, body) in self.bodies.iter() {
            self.tree.update(BodyHandle(key), body, dt);
        }

        self.contacts.deactivate_all();
        let mut to_wake = Vec::new();
        for (a, b) in self.tree.query_overlaps() {
            let (Some(body_a), Some(body_b)) = (self.bodies.get(a.0), self.bodies.get(b.0)) else {
                continue;
            };
            if body_a.bitmask & body_b.bitmask == 0 {
                continue;
            }
            if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
                continue;
            }

            let is_new = self.contacts.manifold(a, b).is_none();
            if !self
                .contacts
                .collide(self.narrow_phase.as_ref(), &self.bodies, a, b)
            {
                continue;
            }

            if body_a.is_sleeping() && disturbs(body_b, is_new, &self.config) {
                to_wake.push(a);
            }
            if body_b.is_sleeping() && disturbs(body_a, is_new, &self.config) {
                to_wake.push(b);
            }
            if is_new {
                if let Some(event) = self.started_event(a, b) {
                    self.events.on_collision(&event);
                }
            }
        }

        for (a, b) in self.contacts.prune_inactive() {
            self.events.on_collision(&stopped_event(a, b));
        }

        for handle in to_wake {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                body.wake();
            }
        }
    }

    fn started_event(&self, a: BodyHandle, b: BodyHandle) -> Option<CollisionEvent> {
        let manifold = self.contacts.manifold(a, b)?;
        let body_a = self.bodies.get(manifold.body_a.0)?;
        Some(CollisionEvent {
            body_a: manifold.body_a,
            body_b: manifold.body_b,
            event_type: CollisionEventType::Started,
            contacts: manifold
                .points
                .iter()
                .map(|p| ContactData {
                    point: body_a.to_world_point(p.local_a),
                    normal: manifold.normal,
                    depth: p.penetration,
                })
                .collect(),
        })
    }

    /// Prepare every active joint and contact, applying warm-start impulses
    pub fn prepare_velocity_constraint(&mut self, dt: f32) {
        for joint in self.joints.values_mut() {
            joint.prepare(&mut self.bodies, dt);
        }
        self.contacts.prepare(&mut self.bodies, dt);
    }

    /// Integrate forces, gravity and damping into velocities
    pub fn step_velocity(&mut self, dt: f32) {
        let config = &self.config;
        let gravity = if config.gravity_enabled {
            config.gravity
        } else {
            Vec2::ZERO
        };

        for body in self.bodies.values_mut() {
            let acceleration = match body.body_type {
                BodyType::Static => {
                    body.velocity = Vec2::ZERO;
                    body.angular_velocity = 0.0;
                    continue;
                }
                BodyType::Bullet => continue,
                _ if body.is_sleeping() => continue,
                BodyType::Dynamic => gravity,
                BodyType::Kinematic => Vec2::ZERO,
            };

            body.velocity += (body.force * body.inv_mass + acceleration) * dt;
            body.angular_velocity += body.torque * body.inv_inertia * dt;

            if config.damping_enabled {
                let drag = body.velocity * -config.air_friction_coefficient;
                body.velocity += drag * body.inv_mass * dt;
                body.velocity *= 1.0 / (1.0 + dt * config.linear_velocity_damping);
                body.angular_velocity *= 1.0 / (1.0 + dt * config.angular_velocity_damping);
            }
        }
    }

    /// Run the velocity iterations over joints, then contacts
    pub fn solve_velocity_constraint(&mut self, dt: f32) {
        for _ in 0..self.config.velocity_iterations {
            for joint in self.joints.values_mut() {
                joint.solve_velocity(&mut self.bodies, dt);
            }
            self.contacts.solve_velocity(&mut self.bodies, dt);
        }
    }

    /// Integrate velocities into poses and clear accumulated forces
    pub fn step_position(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            match body.body_type {
                BodyType::Static | BodyType::Bullet => continue,
                BodyType::Dynamic | BodyType::Kinematic => {}
            }
            if body.is_sleeping() {
                body.velocity = Vec2::ZERO;
                body.angular_velocity = 0.0;
            } else {
                body.position += body.velocity * dt;
                body.rotation += body.angular_velocity * dt;
            }
            body.clear_forces();
        }
    }

    /// Run the position iterations over joints, then contacts
    pub fn solve_position_constraint(&mut self, dt: f32) {
        let bias_factor = self.config.bias_factor;
        for _ in 0..self.config.position_iterations {
            for joint in self.joints.values_mut() {
                joint.solve_position(&mut self.bodies, dt, bias_factor);
            }
            self.contacts.solve_position(&mut self.bodies, dt);
        }
    }

    /// Put resting dynamic bodies to sleep. Bodies held by an active joint
    /// stay awake.
    fn update_sleep(&mut self) {
        let jointed: HashSet<BodyHandle> = self
            .joints
            .values()
            .filter(|joint| joint.is_active())
            .flat_map(|joint| {
                let (a, b) = joint.bodies();
                std::iter::once(a).chain(b)
            })
            .collect();

        let config = &self.config;
        for (key, body) in self.bodies.iter_mut() {
            if body.body_type != BodyType::Dynamic || body.is_sleeping() {
                continue;
            }
            if is_moving(body, config) || jointed.contains(&BodyHandle(key)) {
                body.sleep.countdown = 0;
                continue;
            }
            body.sleep.countdown += 1;
            if body.sleep.countdown >= config.sleep_countdown {
                body.put_to_sleep();
                log::trace!("body {:?} fell asleep", body.id);
            }
        }
    }

    // ==================== Events ====================

    /// Get collision events from the last step
    pub fn collision_events(&self) -> &[CollisionEvent] {
        &self.events.collision_events
    }

    /// Get collision start events
    pub fn collision_started(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.started_collisions()
    }

    /// Get collision end events
    pub fn collision_stopped(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.stopped_collisions()
    }

    /// Forward the last step's events to `handler`
    pub fn dispatch_events(&self, handler: &mut dyn PhysicsEventHandler) {
        for event in &self.events.collision_events {
            handler.on_collision(event);
        }
    }

    // ==================== Debug ====================

    /// Broad-phase tree, for debug overlays of the fat AABBs
    pub fn broad_phase(&self) -> &BroadPhaseTree {
        &self.tree
    }

    /// Persistent contact manifolds
    pub fn contacts(&self) -> &ContactMaintainer {
        &self.contacts
    }

    /// Get number of bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Get number of joints
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Get number of awake dynamic bodies
    pub fn active_body_count(&self) -> usize {
        self.bodies
            .values()
            .filter(|b| b.body_type == BodyType::Dynamic && !b.is_sleeping())
            .count()
    }

    /// Remove every body, joint and contact and restart id allocation
    pub fn clear(&mut self) {
        self.joints.clear();
        self.bodies.clear();
        self.tree.clear();
        self.contacts.clear();
        self.events.clear();
        self.pending_events.clear();
        self.body_ids.reset();
        self.joint_ids.reset();
        log::debug!("physics world cleared");
    }
}

fn stopped_event(body_a: BodyHandle, body_b: BodyHandle) -> CollisionEvent {
    CollisionEvent {
        body_a,
        body_b,
        event_type: CollisionEventType::Stopped,
        contacts: Vec::new(),
    }
}

/// Above either sleep threshold
fn is_moving(body: &Body, config: &PhysicsConfig) -> bool {
    body.velocity.length() >= config.linear_velocity_threshold
        || body.angular_velocity.abs() >= config.angular_velocity_threshold
}

/// Whether touching `partner` should wake a sleeping body. Static and
/// sleeping partners never do. An awake partner does when the contact is
/// new or when it is moving.
fn disturbs(partner: &Body, first_contact: bool, config: &PhysicsConfig) -> bool {
    match partner.body_type {
        BodyType::Static | BodyType::Bullet => false,
        BodyType::Dynamic | BodyType::Kinematic => {
            !partner.is_sleeping() && (first_contact || is_moving(partner, config))
        }
    }
}

/// Wake the sleeping bodies a joint acts on
fn wake_attached(bodies: &mut BodySet, joint: &Joint) {
    let (a, b) = joint.bodies();
    for handle in std::iter::once(a).chain(b) {
        if let Some(body) = bodies.get_mut(handle.0) {
            if body.is_sleeping() {
                body.wake();
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{DistanceJointPrimitive, RevoluteJointPrimitive};
    use crate::shape::Shape;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_create_world() {
        let world = PhysicsWorld::new(PhysicsConfig::default());
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn test_try_new_rejects_bad_config() {
        let config = PhysicsConfig {
            velocity_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            PhysicsWorld::try_new(config),
            Err(PhysicsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_body_ids_are_reused() {
        let mut world = PhysicsWorld::default();
        let a = world.create_body();
        let b = world.create_body();
        assert_eq!(world.body(a).unwrap().id(), BodyId(1));
        assert_eq!(world.body(b).unwrap().id(), BodyId(2));

        world.remove_body(a);
        assert!(matches!(world.body(a), Err(PhysicsError::BodyNotFound(_))));
        let c = world.create_body();
        assert_eq!(world.body(c).unwrap().id(), BodyId(1));

        // Double removal is a no-op
        world.remove_body(a);
        assert_eq!(world.body_count(), 2);
    }

    #[test]
    fn test_create_body_from_invalid_desc() {
        let mut world = PhysicsWorld::default();
        let desc = BodyDesc::dynamic().with_mass(-1.0);
        assert!(matches!(world.create_body_from(&desc), Err(PhysicsError::InvalidMass(_))));
        let ok = world.create_body();
        assert_eq!(world.body(ok).unwrap().id(), BodyId(1));
    }

    #[test]
    fn test_gravity_fall() {
        let mut world = PhysicsWorld::default();
        let body = world
            .create_body_from(&BodyDesc::dynamic().with_position(0.0, 10.0))
            .unwrap();
        let initial_y = world.body(body).unwrap().position().y;

        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }

        let final_y = world.body(body).unwrap().position().y;
        assert!(final_y < initial_y, "Body should fall due to gravity");
    }

    #[test]
    fn test_damping_slows_bodies() {
        let config = PhysicsConfig::default()
            .with_gravity_enabled(false)
            .with_damping(1.0, 1.0);
        let mut world = PhysicsWorld::new(config);
        let body = world.create_body();
        world.set_velocity(body, Vec2::new(2.0, 0.0)).unwrap();
        world.step_velocity(0.5);
        assert_abs_diff_eq!(world.body(body).unwrap().velocity().x, 2.0 / 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_kinematic_ignores_gravity() {
        let mut world = PhysicsWorld::default();
        let body = world
            .create_body_from(&BodyDesc::kinematic().with_velocity(1.0, 0.0))
            .unwrap();
        world.step(0.1);
        let body = world.body(body).unwrap();
        assert_eq!(body.velocity(), Vec2::new(1.0, 0.0));
        assert_abs_diff_eq!(body.position().x, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_bullet_is_left_alone() {
        let mut world = PhysicsWorld::default();
        let handle = world.create_body();
        world.body_mut(handle).unwrap().set_type(BodyType::Bullet);
        world.set_velocity(handle, Vec2::new(1.0, 0.0)).unwrap();
        world.step(0.1);
        let body = world.body(handle).unwrap();
        assert_eq!(body.position(), Vec2::ZERO);
        assert_eq!(body.velocity(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_forces_cleared_after_step() {
        let mut world = PhysicsWorld::default();
        let body = world.create_body();
        world.apply_force(body, Vec2::new(5.0, 0.0)).unwrap();
        world.step(0.1);
        assert_eq!(world.body(body).unwrap().force(), Vec2::ZERO);
        assert_abs_diff_eq!(world.body(body).unwrap().velocity().x, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_joint_lifecycle() {
        let mut world = PhysicsWorld::default();
        let a = world.create_body();
        let b = world.create_body();
        let joint = world.create_joint(RevoluteJointPrimitive::new(a, b, Vec2::ZERO, Vec2::ZERO));
        assert_eq!(world.joint(joint).unwrap().kind().name(), "revolute");
        assert!(world.joint(joint).unwrap().references(b));

        world.remove_joint(joint);
        assert!(matches!(world.joint(joint), Err(PhysicsError::JointNotFound(_))));
        world.remove_joint(joint);
        world.remove_body(a);
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn test_tree_tracks_bodies() {
        let mut world = PhysicsWorld::default();
        let body = world
            .create_body_from(&BodyDesc::dynamic().with_shape(Shape::circle(1.0)))
            .unwrap();
        world.step(0.016);
        assert!(world.broad_phase().contains(body));
        assert_eq!(world.query_point(Vec2::new(0.0, 0.5)), vec![body]);
        assert!(world.query_point(Vec2::new(3.0, 0.0)).is_empty());

        world.remove_body(body);
        assert!(world.broad_phase().is_empty());
    }

    #[test]
    fn test_sleeping() {
        let config = PhysicsConfig::default()
            .with_gravity_enabled(false)
            .with_sleeping(true);
        let mut world = PhysicsWorld::new(config);
        let resting = world.create_body();
        let tethered = world.create_body();
        let anchor = world.create_body_from(&BodyDesc::fixed()).unwrap();
        world.create_joint(DistanceJointPrimitive::new(tethered, Vec2::ZERO, Vec2::X, 1.0));

        for _ in 0..40 {
            world.step(0.016);
        }
        assert!(world.body(resting).unwrap().is_sleeping());
        assert!(!world.body(tethered).unwrap().is_sleeping());
        assert!(!world.body(anchor).unwrap().is_sleeping());

        world.apply_force(resting, Vec2::X).unwrap();
        assert!(!world.body(resting).unwrap().is_sleeping());
    }

    #[test]
    fn test_clear() {
        let mut world = PhysicsWorld::default();
        let a = world.create_body();
        world.create_joint(DistanceJointPrimitive::new(a, Vec2::ZERO, Vec2::X, 1.0));
        world.clear();
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.joint_count(), 0);
        let b = world.create_body();
        assert_eq!(world.body(b).unwrap().id(), BodyId(1));
    }

    fn sleepy_world() -> PhysicsWorld {
        PhysicsWorld::new(
            PhysicsConfig::default()
                .with_gravity_enabled(false)
                .with_sleeping(true),
        )
    }

    #[test]
    fn test_new_joint_wakes_sleeping_body() {
        let mut world = sleepy_world();
        let body = world
            .create_body_from(&BodyDesc::dynamic().with_position(5.0, 0.0))
            .unwrap();
        world.body_mut(body).unwrap().put_to_sleep();

        world.create_joint(DistanceJointPrimitive::new(body, Vec2::ZERO, Vec2::ZERO, 1.0));
        assert!(!world.body(body).unwrap().is_sleeping());

        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        let body = world.body(body).unwrap();
        assert!(!body.is_sleeping());
        assert!(body.position().x < 5.0);
    }

    #[test]
    fn test_enabling_joint_wakes_bodies() {
        let mut world = sleepy_world();
        let body = world.create_body();
        let joint = world.create_joint(DistanceJointPrimitive::new(body, Vec2::ZERO, Vec2::X, 1.0));
        world.set_joint_active(joint, false).unwrap();
        world.body_mut(body).unwrap().put_to_sleep();

        world.set_joint_active(joint, true).unwrap();
        assert!(!world.body(body).unwrap().is_sleeping());

        // Re-enabling through `joint_mut` takes effect on the next step
        world.set_joint_active(joint, false).unwrap();
        world.body_mut(body).unwrap().put_to_sleep();
        world.joint_mut(joint).unwrap().set_active(true);
        world.step(1.0 / 60.0);
        assert!(!world.body(body).unwrap().is_sleeping());

        world.remove_joint(joint);
        assert!(matches!(
            world.set_joint_active(joint, true),
            Err(PhysicsError::JointNotFound(_))
        ));
    }

    #[test]
    fn test_static_partner_does_not_wake_sleeper() {
        let mut world = sleepy_world();
        let ground = BodyDesc::fixed().with_shape(Shape::rectangle(20.0, 1.0));
        world.create_body_from(&ground).unwrap();
        let ball = world
            .create_body_from(
                &BodyDesc::dynamic()
                    .with_position(0.0, 0.99)
                    .with_shape(Shape::circle(0.5)),
            )
            .unwrap();
        world.body_mut(ball).unwrap().put_to_sleep();

        world.step(1.0 / 60.0);
        assert_eq!(world.contacts().len(), 1);
        assert!(world.body(ball).unwrap().is_sleeping());
    }

    #[test]
    fn test_falling_body_wakes_sleeper() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default().with_sleeping(true));
        world
            .create_body_from(&BodyDesc::fixed().with_shape(Shape::rectangle(20.0, 1.0)))
            .unwrap();
        let ball = BodyDesc::dynamic().with_shape(Shape::circle(0.5));
        let sleeper = world
            .create_body_from(&ball.clone().with_position(0.0, 1.0))
            .unwrap();
        let falling = world
            .create_body_from(&ball.with_position(0.0, 3.0))
            .unwrap();
        world.body_mut(sleeper).unwrap().put_to_sleep();

        let mut hit = false;
        for _ in 0..120 {
            world.step(1.0 / 60.0);
            hit = world
                .collision_started()
                .any(|event| event.involves(sleeper) && event.involves(falling));
            if hit {
                break;
            }
            assert!(world.body(sleeper).unwrap().is_sleeping());
        }
        assert!(hit);
        assert!(!world.body(sleeper).unwrap().is_sleeping());
    }

    #[test]
    fn test_removing_touching_body_reports_stopped() {
        let mut world = PhysicsWorld::default();
        world
            .create_body_from(&BodyDesc::fixed().with_shape(Shape::rectangle(20.0, 1.0)))
            .unwrap();
        let ball = world
            .create_body_from(
                &BodyDesc::dynamic()
                    .with_position(0.0, 0.99)
                    .with_shape(Shape::circle(0.5)),
            )
            .unwrap();
        world.step(1.0 / 60.0);
        assert_eq!(world.collision_started().count(), 1);

        world.remove_body(ball);
        world.step(1.0 / 60.0);
        let stopped: Vec<_> = world.collision_stopped().collect();
        assert_eq!(stopped.len(), 1);
        assert!(stopped[0].involves(ball));

        // Reported once
        world.step(1.0 / 60.0);
        assert!(world.collision_events().is_empty());
    }

    #[test]
    fn test_query_point_sees_bodies_before_first_step() {
        let mut world = PhysicsWorld::default();
        let body = world
            .create_body_from(&BodyDesc::dynamic().with_shape(Shape::circle(1.0)))
            .unwrap();
        assert_eq!(world.query_point(Vec2::new(0.0, 0.5)), vec![body]);

        // Teleported far outside its leaf
        world.step(0.016);
        world.body_mut(body).unwrap().set_position(Vec2::new(10.0, 0.0));
        assert_eq!(world.query_point(Vec2::new(10.0, 0.5)), vec![body]);
        assert!(world.query_point(Vec2::new(0.0, 0.5)).is_empty());
    }

    #[test]
    fn test_non_finite_dt_is_ignored() {
        let mut world = PhysicsWorld::default();
        let body = world.create_body();
        world.step(f32::NAN);
        world.step(0.0);
        world.step(-1.0);
        let body = world.body(body).unwrap();
        assert_eq!(body.velocity(), Vec2::ZERO);
        assert_eq!(body.position(), Vec2::ZERO);
    }
}
