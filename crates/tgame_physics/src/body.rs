//! Rigid body types and state

use crate::error::{PhysicsError, Result};
use crate::shape::{Shape, ShapePrimitive};
use serde::{Deserialize, Serialize};
use tgame_math::{consts, Vec2, AABB};
use tgame_structures::{SlotKey, SlotMap};

/// Arena the world keeps its bodies in
pub type BodySet = SlotMap<Body>;

/// Handle to a body in the physics world
///
/// Handles are generation-checked: a handle kept past `remove_body`
/// no longer resolves, even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) SlotKey<Body>);

impl BodyHandle {
    /// Get the raw arena key
    pub fn raw(&self) -> SlotKey<Body> {
        self.0
    }
}

/// Small integer id, reused after the body is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// Type of rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves, infinite mass
    Static,
    /// Fully simulated
    #[default]
    Dynamic,
    /// Integrated like a dynamic body but ignores gravity
    Kinematic,
    /// Reserved for continuous collision; not simulated
    Bullet,
}

/// Sleep bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SleepState {
    pub asleep: bool,
    pub countdown: u32,
}

/// A rigid body
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) body_type: BodyType,

    pub(crate) position: Vec2,
    pub(crate) rotation: f32,
    pub(crate) velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) shape: Option<Shape>,
    pub(crate) restitution: f32,
    pub(crate) friction: f32,
    pub(crate) bitmask: u32,

    pub(crate) sleep: SleepState,
}

impl Body {
    /// Neutral dynamic body: unit mass and inertia, at the origin
    pub(crate) fn new(id: BodyId) -> Self {
        Self {
            id,
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 1.0,
            inv_mass: 1.0,
            inertia: 1.0,
            inv_inertia: 1.0,
            shape: None,
            restitution: 0.0,
            friction: 0.1,
            bitmask: 0x01,
            sleep: SleepState::default(),
        }
    }

    // ==================== Identity ====================

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Change the body type. Static bodies lose their inverse mass.
    pub fn set_type(&mut self, body_type: BodyType) {
        self.body_type = body_type;
        if body_type == BodyType::Static {
            self.velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
        }
        self.refresh_inverse_mass();
    }

    // ==================== Kinematic state ====================

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Rotation in radians, counter-clockwise
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        self.rotation = rotation;
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity = velocity;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: f32) {
        self.angular_velocity = angular_velocity;
    }

    // ==================== Forces ====================

    /// Accumulated force, cleared after position integration
    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    /// Add a force through the mass centre
    pub fn apply_force(&mut self, force: Vec2) {
        self.force += force;
    }

    /// Add a force at arm `r` from the mass centre (world orientation)
    pub fn apply_force_at(&mut self, force: Vec2, r: Vec2) {
        self.force += force;
        self.torque += r.cross(force);
    }

    pub fn apply_torque(&mut self, torque: f32) {
        self.torque += torque;
    }

    /// Change velocity immediately by an impulse at arm `r`
    pub fn apply_impulse(&mut self, impulse: Vec2, r: Vec2) {
        self.velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * r.cross(impulse);
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    // ==================== Mass properties ====================

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Zero for static bodies
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Zero for static bodies
    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    /// Set the mass and recompute inertia from the shape
    pub fn set_mass(&mut self, mass: f32) -> Result<()> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(PhysicsError::InvalidMass(mass));
        }
        self.mass = mass;
        self.recompute_inertia();
        Ok(())
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// Attach a shape and recompute inertia
    pub fn set_shape(&mut self, shape: Shape) -> Result<()> {
        shape.validate()?;
        self.shape = Some(shape);
        self.recompute_inertia();
        Ok(())
    }

    fn recompute_inertia(&mut self) {
        self.inertia = self
            .shape
            .as_ref()
            .map(|s| s.inertia(self.mass))
            .filter(|i| *i > consts::EPSILON)
            .unwrap_or(self.mass);
        self.refresh_inverse_mass();
    }

    fn refresh_inverse_mass(&mut self) {
        if self.body_type == BodyType::Static {
            self.inv_mass = 0.0;
            self.inv_inertia = 0.0;
        } else {
            self.inv_mass = 1.0 / self.mass;
            self.inv_inertia = 1.0 / self.inertia;
        }
    }

    // ==================== Material & filtering ====================

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution.clamp(0.0, 1.0);
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction.max(0.0);
    }

    /// Collision filter; two bodies collide when their masks share a bit
    pub fn bitmask(&self) -> u32 {
        self.bitmask
    }

    pub fn set_bitmask(&mut self, bitmask: u32) {
        self.bitmask = bitmask;
    }

    // ==================== Sleeping ====================

    pub fn is_sleeping(&self) -> bool {
        self.sleep.asleep
    }

    pub fn wake(&mut self) {
        self.sleep = SleepState::default();
    }

    pub(crate) fn put_to_sleep(&mut self) {
        self.sleep.asleep = true;
        self.velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
    }

    // ==================== Frames ====================

    /// World point to body-local coordinates
    pub fn to_local_point(&self, world: Vec2) -> Vec2 {
        (world - self.position).rotate(-self.rotation)
    }

    /// Body-local point to world coordinates
    pub fn to_world_point(&self, local: Vec2) -> Vec2 {
        local.rotate(self.rotation) + self.position
    }

    /// Body-local point rotated into world orientation, relative to the mass centre
    pub fn to_actual_point(&self, local: Vec2) -> Vec2 {
        local.rotate(self.rotation)
    }

    /// Velocity of the material point at arm `r`
    pub fn velocity_at(&self, r: Vec2) -> Vec2 {
        self.velocity + Vec2::cross_scalar(self.angular_velocity, r)
    }

    /// World bounds enlarged by `margin`. Shapeless bodies are a point.
    pub fn aabb(&self, margin: f32) -> AABB {
        let tight = match &self.shape {
            Some(shape) => shape.aabb(self.position, self.rotation),
            None => AABB::new(self.position, self.position),
        };
        tight.expand(margin)
    }

    pub fn shape_primitive(&self) -> Option<ShapePrimitive<'_>> {
        self.shape
            .as_ref()
            .map(|shape| ShapePrimitive::new(shape, self.position, self.rotation))
    }

    pub fn kinetic_energy(&self) -> f32 {
        if self.body_type == BodyType::Static {
            return 0.0;
        }
        0.5 * self.mass * self.velocity.length_squared()
            + 0.5 * self.inertia * self.angular_velocity * self.angular_velocity
    }
}

/// Description for creating a body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDesc {
    /// Type of body
    pub body_type: BodyType,
    /// Initial position
    pub position: Vec2,
    /// Initial rotation (radians)
    pub rotation: f32,
    /// Initial linear velocity
    pub velocity: Vec2,
    /// Initial angular velocity
    pub angular_velocity: f32,
    /// Mass; inertia follows from the shape
    pub mass: f32,
    /// Collision shape
    pub shape: Option<Shape>,
    /// Bounciness in `[0, 1]`
    pub restitution: f32,
    /// Friction coefficient
    pub friction: f32,
    /// Collision filter mask
    pub bitmask: u32,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            mass: 1.0,
            shape: None,
            restitution: 0.0,
            friction: 0.1,
            bitmask: 0x01,
        }
    }
}

impl BodyDesc {
    /// Create a static body description
    pub fn fixed() -> Self {
        Self {
            body_type: BodyType::Static,
            ..Default::default()
        }
    }

    /// Create a dynamic body description
    pub fn dynamic() -> Self {
        Self::default()
    }

    /// Create a kinematic body description
    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Vec2::new(x, y);
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, x: f32, y: f32) -> Self {
        self.velocity = Vec2::new(x, y);
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f32) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_bitmask(mut self, bitmask: u32) -> Self {
        self.bitmask = bitmask;
        self
    }

    /// Build the body, validating mass and shape
    pub(crate) fn build(&self, id: BodyId) -> Result<Body> {
        let mut body = Body::new(id);
        body.body_type = self.body_type;
        body.position = self.position;
        body.rotation = self.rotation;
        body.set_restitution(self.restitution);
        body.set_friction(self.friction);
        body.bitmask = self.bitmask;
        if let Some(shape) = &self.shape {
            shape.validate()?;
            body.shape = Some(shape.clone());
        }
        body.set_mass(self.mass)?;
        if self.body_type != BodyType::Static {
            body.velocity = self.velocity;
            body.angular_velocity = self.angular_velocity;
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_static_has_zero_inverse_mass() {
        let mut body = Body::new(BodyId(1));
        assert!(body.inv_mass() > 0.0);
        assert!(body.inv_inertia() > 0.0);

        body.set_type(BodyType::Static);
        assert_eq!(body.inv_mass(), 0.0);
        assert_eq!(body.inv_inertia(), 0.0);

        body.set_mass(5.0).unwrap();
        assert_eq!(body.inv_mass(), 0.0);

        body.set_type(BodyType::Kinematic);
        assert_relative_eq!(body.inv_mass(), 0.2);
        assert!(body.inv_inertia() > 0.0);
    }

    #[test]
    fn test_mass_follows_shape() {
        let mut body = Body::new(BodyId(1));
        body.set_shape(Shape::circle(2.0)).unwrap();
        body.set_mass(3.0).unwrap();
        assert_relative_eq!(body.inertia(), 6.0);
        assert_relative_eq!(body.inv_inertia(), 1.0 / 6.0);

        // Zero-area shape falls back to inertia == mass
        body.set_shape(Shape::edge(Vec2::ZERO, Vec2::X)).unwrap();
        assert_relative_eq!(body.inertia(), 3.0);

        assert_eq!(body.set_mass(0.0), Err(PhysicsError::InvalidMass(0.0)));
        assert!(body.set_mass(f32::NAN).is_err());
    }

    #[test]
    fn test_local_world_round_trip() {
        let mut body = Body::new(BodyId(1));
        body.set_position(Vec2::new(2.0, 1.0));
        body.set_rotation(consts::FRAC_PI_2);

        let world = body.to_world_point(Vec2::X);
        assert_relative_eq!(world.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(world.y, 2.0, epsilon = 1e-6);

        let local = body.to_local_point(world);
        assert_relative_eq!(local.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(local.y, 0.0, epsilon = 1e-6);

        let actual = body.to_actual_point(Vec2::X);
        assert_relative_eq!(actual.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_impulse_and_force_at_point() {
        let mut body = Body::new(BodyId(1));
        body.apply_impulse(Vec2::new(0.0, 2.0), Vec2::new(1.0, 0.0));
        assert_eq!(body.velocity(), Vec2::new(0.0, 2.0));
        assert_relative_eq!(body.angular_velocity(), 2.0);

        let v = body.velocity_at(Vec2::new(1.0, 0.0));
        assert_relative_eq!(v.y, 4.0);

        body.apply_force_at(Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        assert_eq!(body.force(), Vec2::new(1.0, 0.0));
        assert_relative_eq!(body.torque(), -1.0);
        body.clear_forces();
        assert_eq!(body.force(), Vec2::ZERO);
    }

    #[test]
    fn test_desc_build() {
        let body = BodyDesc::fixed()
            .with_position(0.0, -1.0)
            .with_velocity(3.0, 0.0)
            .with_shape(Shape::rectangle(10.0, 1.0))
            .build(BodyId(7))
            .unwrap();
        assert_eq!(body.id(), BodyId(7));
        assert_eq!(body.velocity(), Vec2::ZERO);
        assert_eq!(body.inv_mass(), 0.0);

        let aabb = body.aabb(0.0);
        assert_relative_eq!(aabb.min.y, -1.5);
        assert_relative_eq!(aabb.max.x, 5.0);

        assert!(BodyDesc::dynamic().with_mass(-1.0).build(BodyId(1)).is_err());
        assert!(BodyDesc::dynamic()
            .with_shape(Shape::circle(0.0))
            .build(BodyId(1))
            .is_err());
    }
}
