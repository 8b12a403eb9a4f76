//! Error types for the physics system

use crate::body::BodyHandle;
use crate::joint::JointHandle;
use thiserror::Error;

/// Physics system errors
///
/// Only the world's keyed accessors and constructors return these. The
/// stepping phases are total and never fail.
#[derive(Debug, Error, PartialEq)]
pub enum PhysicsError {
    /// Body handle is stale or was never issued by this world
    #[error("Body not found: {0:?}")]
    BodyNotFound(BodyHandle),

    /// Joint handle is stale or was never issued by this world
    #[error("Joint not found: {0:?}")]
    JointNotFound(JointHandle),

    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// Non-finite or non-positive mass
    #[error("Invalid mass: {0}")]
    InvalidMass(f32),

    /// Shape parameters cannot describe a body
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
