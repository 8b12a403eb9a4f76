//! tgame Physics - 2D Rigid-Body Dynamics
//!
//! Constraint-based 2D rigid-body simulation: sequential impulses with warm
//! starting, Baumgarte-style position correction and a dynamic bounding
//! volume tree for the broad phase.
//!
//! # Features
//!
//! - Rigid body dynamics (static, dynamic, kinematic)
//! - Joints: point, distance, revolute, pulley, rotation, orientation
//! - Dynamic AABB tree broad phase with fat, velocity-swept leaves
//! - Persistent contacts with friction and restitution
//! - Pluggable narrow phase
//! - Collision events and optional sleeping
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                   PhysicsWorld                     │
//! │  ┌──────────┐  ┌──────────┐  ┌───────────────────┐ │
//! │  │ BodySet  │  │  Joints  │  │  BroadPhaseTree   │ │
//! │  └──────────┘  └──────────┘  └───────────────────┘ │
//! │  ┌───────────────────────────────────────────────┐ │
//! │  │                  step(dt)                     │ │
//! │  │ detect → prepare → velocity → solve velocity  │ │
//! │  │        → position → solve position            │ │
//! │  └───────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────┘
//!                         │
//!         ┌───────────────┼────────────────┐
//!         ▼               ▼                ▼
//!   ┌───────────┐  ┌──────────────┐  ┌────────────┐
//!   │NarrowPhase│  │ContactMaint- │  │  Collision │
//!   │  (trait)  │  │    ainer     │  │   Events   │
//!   └───────────┘  └──────────────┘  └────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tgame_physics::prelude::*;
//!
//! let mut physics = PhysicsWorld::new(PhysicsConfig::default());
//!
//! let ground = physics
//!     .create_body_from(&BodyDesc::fixed().with_shape(Shape::rectangle(20.0, 1.0)))
//!     .unwrap();
//! let ball = physics
//!     .create_body_from(
//!         &BodyDesc::dynamic()
//!             .with_position(0.0, 5.0)
//!             .with_shape(Shape::circle(0.5)),
//!     )
//!     .unwrap();
//!
//! // Pin the ball to a world point with a soft spring
//! physics.create_joint(PointJointPrimitive::new(ball, Vec2::ZERO, Vec2::new(0.0, 6.0)));
//!
//! physics.step(1.0 / 60.0);
//! assert!(physics.body(ground).is_ok());
//! ```

pub mod body;
pub mod broad_phase;
pub mod config;
pub mod contact;
pub mod error;
pub mod events;
pub mod joint;
pub mod narrow_phase;
pub mod shape;
pub mod world;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::body::{Body, BodyDesc, BodyHandle, BodyId, BodySet, BodyType};
    pub use crate::broad_phase::{BroadPhaseTree, TreeNode, NULL_NODE};
    pub use crate::config::PhysicsConfig;
    pub use crate::contact::{ContactMaintainer, ContactManifold, ContactPointState};
    pub use crate::error::{PhysicsError, Result};
    pub use crate::events::{
        CollisionEvent, CollisionEventType, ContactData, EventCollector, PhysicsEventHandler,
    };
    pub use crate::joint::{
        Constraint, DistanceJointPrimitive, Joint, JointHandle, JointId, JointKind, JointPhase,
        JointPrimitive, LimitState, OrientationJointPrimitive, PointJointPrimitive,
        PulleyJointPrimitive, RevoluteJointPrimitive, RotationJointPrimitive,
    };
    pub use crate::narrow_phase::{BasicNarrowPhase, ContactPoint, Manifold, NarrowPhase};
    pub use crate::shape::{Shape, ShapePrimitive};
    pub use crate::world::PhysicsWorld;
    pub use tgame_math::{Vec2, AABB};
}

pub use prelude::*;
