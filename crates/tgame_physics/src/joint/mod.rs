//! Joints: sequential-impulse constraints between bodies
//!
//! Every joint variant implements [`Constraint`]. The world drives them in
//! three phases per step:
//!
//! 1. `prepare` computes anchors, effective masses and bias, then re-applies
//!    the impulse accumulated last step (warm starting)
//! 2. `solve_velocity` runs once per velocity iteration
//! 3. `solve_position` runs once per position iteration and nudges poses
//!    directly
//!
//! A joint whose configuration is degenerate for the current step (zero-length
//! axis, singular effective mass, missing body) sits the step out.

mod distance;
mod orientation;
mod point;
mod pulley;
mod revolute;
mod rotation;

pub use distance::{DistanceJoint, DistanceJointPrimitive};
pub use orientation::{OrientationJoint, OrientationJointPrimitive};
pub use point::{PointJoint, PointJointPrimitive};
pub use pulley::{PulleyJoint, PulleyJointPrimitive};
pub use revolute::{RevoluteJoint, RevoluteJointPrimitive};
pub use rotation::{RotationJoint, RotationJointPrimitive};

use crate::body::{Body, BodyHandle, BodySet};
use serde::{Deserialize, Serialize};
use tgame_math::consts;
use tgame_structures::SlotKey;

/// Positional error below which correction is skipped
pub(crate) const LINEAR_SLOP: f32 = 1e-5;
/// Angular error below which correction is skipped
pub(crate) const ANGULAR_SLOP: f32 = 1e-5;

/// Handle to a joint in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub(crate) SlotKey<Joint>);

impl JointHandle {
    /// Get the raw arena key
    pub fn raw(&self) -> SlotKey<Joint> {
        self.0
    }
}

/// Small integer id, reused after the joint is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointId(pub u32);

/// Where a joint is in the current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JointPhase {
    /// Disabled, or skipped for this step
    #[default]
    Inactive,
    /// Effective masses computed and warm start applied
    Prepared,
    /// Inside the velocity iterations
    SolvingVelocity,
    /// Inside the position iterations
    SolvingPosition,
}

/// Shared capability of every joint variant
pub trait Constraint {
    /// Precompute effective mass and bias, then apply the warm-start impulse.
    ///
    /// Returns `false` when the configuration is degenerate and the joint
    /// must be skipped for the rest of the step.
    fn prepare(&mut self, bodies: &mut BodySet, dt: f32) -> bool;

    /// One sequential-impulse pass on velocities
    fn solve_velocity(&mut self, bodies: &mut BodySet, dt: f32);

    /// One pass of positional correction scaled by `bias_factor`
    fn solve_position(&mut self, bodies: &mut BodySet, dt: f32, bias_factor: f32);

    /// Bodies the joint acts on
    fn bodies(&self) -> (BodyHandle, Option<BodyHandle>);
}

/// Configuration for a new joint; the variant selects the joint type
#[derive(Debug, Clone, PartialEq)]
pub enum JointPrimitive {
    Point(PointJointPrimitive),
    Distance(DistanceJointPrimitive),
    Revolute(RevoluteJointPrimitive),
    Pulley(PulleyJointPrimitive),
    Rotation(RotationJointPrimitive),
    Orientation(OrientationJointPrimitive),
}

macro_rules! impl_from_primitive {
    ($($variant:ident => $primitive:ty),* $(,)?) => {
        $(
            impl From<$primitive> for JointPrimitive {
                fn from(primitive: $primitive) -> Self {
                    Self::$variant(primitive)
                }
            }
        )*
    };
}

impl_from_primitive! {
    Point => PointJointPrimitive,
    Distance => DistanceJointPrimitive,
    Revolute => RevoluteJointPrimitive,
    Pulley => PulleyJointPrimitive,
    Rotation => RotationJointPrimitive,
    Orientation => OrientationJointPrimitive,
}

/// Concrete joint state
#[derive(Debug, Clone)]
pub enum JointKind {
    Point(PointJoint),
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Pulley(PulleyJoint),
    Rotation(RotationJoint),
    Orientation(OrientationJoint),
}

impl JointKind {
    /// Build joint state from a primitive. Bodies are read for values
    /// captured at creation (the pulley rope length).
    pub(crate) fn from_primitive(primitive: JointPrimitive, bodies: &BodySet) -> Self {
        match primitive {
            JointPrimitive::Point(p) => Self::Point(PointJoint::new(p)),
            JointPrimitive::Distance(p) => Self::Distance(DistanceJoint::new(p)),
            JointPrimitive::Revolute(p) => Self::Revolute(RevoluteJoint::new(p)),
            JointPrimitive::Pulley(p) => Self::Pulley(PulleyJoint::new(p, bodies)),
            JointPrimitive::Rotation(p) => Self::Rotation(RotationJoint::new(p)),
            JointPrimitive::Orientation(p) => Self::Orientation(OrientationJoint::new(p)),
        }
    }

    fn constraint(&self) -> &dyn Constraint {
        match self {
            Self::Point(j) => j,
            Self::Distance(j) => j,
            Self::Revolute(j) => j,
            Self::Pulley(j) => j,
            Self::Rotation(j) => j,
            Self::Orientation(j) => j,
        }
    }

    fn constraint_mut(&mut self) -> &mut dyn Constraint {
        match self {
            Self::Point(j) => j,
            Self::Distance(j) => j,
            Self::Revolute(j) => j,
            Self::Pulley(j) => j,
            Self::Rotation(j) => j,
            Self::Orientation(j) => j,
        }
    }

    /// Short name of the variant, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Point(_) => "point",
            Self::Distance(_) => "distance",
            Self::Revolute(_) => "revolute",
            Self::Pulley(_) => "pulley",
            Self::Rotation(_) => "rotation",
            Self::Orientation(_) => "orientation",
        }
    }
}

/// A joint owned by the world
#[derive(Debug, Clone)]
pub struct Joint {
    id: JointId,
    active: bool,
    phase: JointPhase,
    kind: JointKind,
}

impl Joint {
    pub(crate) fn new(id: JointId, kind: JointKind) -> Self {
        Self {
            id,
            active: true,
            phase: JointPhase::Inactive,
            kind,
        }
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    /// Inactive joints stay in the world but are skipped by every phase
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.phase = JointPhase::Inactive;
        }
    }

    pub fn phase(&self) -> JointPhase {
        self.phase
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    pub fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        self.kind.constraint().bodies()
    }

    /// Check whether the joint acts on `body`
    pub fn references(&self, body: BodyHandle) -> bool {
        let (a, b) = self.bodies();
        a == body || b == Some(body)
    }

    pub(crate) fn prepare(&mut self, bodies: &mut BodySet, dt: f32) {
        if !self.active {
            self.phase = JointPhase::Inactive;
            return;
        }
        if self.kind.constraint_mut().prepare(bodies, dt) {
            self.phase = JointPhase::Prepared;
        } else {
            log::warn!(
                "{} joint {:?} skipped this step: degenerate configuration or missing body",
                self.kind.name(),
                self.id
            );
            self.phase = JointPhase::Inactive;
        }
    }

    pub(crate) fn solve_velocity(&mut self, bodies: &mut BodySet, dt: f32) {
        if self.phase == JointPhase::Inactive {
            return;
        }
        self.phase = JointPhase::SolvingVelocity;
        self.kind.constraint_mut().solve_velocity(bodies, dt);
    }

    pub(crate) fn solve_position(&mut self, bodies: &mut BodySet, dt: f32, bias_factor: f32) {
        if self.phase == JointPhase::Inactive {
            return;
        }
        self.phase = JointPhase::SolvingPosition;
        self.kind.constraint_mut().solve_position(bodies, dt, bias_factor);
    }
}

// ==================== Shared solver helpers ====================

/// Spring parameters of a soft constraint for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Softness {
    /// Impulse mixing added to the effective-mass diagonal
    pub gamma: f32,
    /// Fraction of the position error fed back as velocity, per second
    pub bias_rate: f32,
}

impl Softness {
    pub const RIGID: Self = Self {
        gamma: 0.0,
        bias_rate: 0.0,
    };

    /// Mass-spring-damper with natural frequency `frequency` (Hz).
    /// A non-positive frequency yields a rigid constraint.
    pub fn new(frequency: f32, damping_ratio: f32, mass: f32, dt: f32) -> Self {
        if frequency <= 0.0 || mass <= 0.0 || dt <= 0.0 || !mass.is_finite() {
            return Self::RIGID;
        }
        let omega = consts::TAU * frequency;
        let stiffness = mass * omega * omega;
        let damping = 2.0 * mass * damping_ratio * omega;
        let denominator = dt * (damping + dt * stiffness);
        if denominator <= 0.0 {
            return Self::RIGID;
        }
        let gamma = 1.0 / denominator;
        Self {
            gamma,
            bias_rate: dt * stiffness * gamma,
        }
    }

    pub fn is_soft(&self) -> bool {
        self.gamma > 0.0
    }
}

/// Which side of a `[min, max]` range a one-dimensional constraint pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    /// Inside the range, nothing to do
    #[default]
    Inactive,
    /// Below `min`; impulses may only increase the value
    AtLower,
    /// Above `max`; impulses may only decrease the value
    AtUpper,
    /// `min == max`; two-sided
    Equal,
}

impl LimitState {
    pub(crate) fn classify(value: f32, min: f32, max: f32, tolerance: f32) -> Self {
        if (max - min).abs() <= tolerance {
            Self::Equal
        } else if value < min {
            Self::AtLower
        } else if value > max {
            Self::AtUpper
        } else {
            Self::Inactive
        }
    }

    /// Signed violation of the range
    pub(crate) fn error(self, value: f32, min: f32, max: f32) -> f32 {
        match self {
            Self::Inactive => 0.0,
            Self::Equal => value - min,
            Self::AtLower => (value - min).min(0.0),
            Self::AtUpper => (value - max).max(0.0),
        }
    }

    /// Accumulate `delta` into `accumulated` respecting the one-sided sign.
    /// Returns the impulse to actually apply.
    pub(crate) fn accumulate(self, accumulated: &mut f32, delta: f32) -> f32 {
        let old = *accumulated;
        *accumulated = match self {
            Self::Inactive => 0.0,
            Self::Equal => old + delta,
            Self::AtLower => (old + delta).max(0.0),
            Self::AtUpper => (old + delta).min(0.0),
        };
        *accumulated - old
    }
}

pub(crate) fn body_pair(
    bodies: &mut BodySet,
    a: BodyHandle,
    b: BodyHandle,
) -> Option<(&mut Body, &mut Body)> {
    bodies.get_pair_mut(a.0, b.0)
}

pub(crate) fn body_mut(bodies: &mut BodySet, handle: BodyHandle) -> Option<&mut Body> {
    bodies.get_mut(handle.0)
}
