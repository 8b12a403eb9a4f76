//! Physics configuration

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};
use tgame_math::Vec2;

/// Physics world configuration
///
/// Read at the start of every step, so changes made through
/// [`crate::PhysicsWorld::config_mut`] between steps take effect on the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration (default: -9.8 in Y)
    pub gravity: Vec2,

    /// Apply gravity to dynamic bodies
    pub gravity_enabled: bool,

    /// Apply velocity damping and air friction
    pub damping_enabled: bool,

    /// Linear damping coefficient, velocity scaled by `1 / (1 + dt * d)`
    pub linear_velocity_damping: f32,

    /// Angular damping coefficient
    pub angular_velocity_damping: f32,

    /// Linear drag force coefficient (`F = -c * v`), applied with damping
    pub air_friction_coefficient: f32,

    /// Linear velocity below which a body counts as resting
    pub linear_velocity_threshold: f32,

    /// Angular velocity below which a body counts as resting
    pub angular_velocity_threshold: f32,

    /// Consecutive resting steps before a body falls asleep
    pub sleep_countdown: u32,

    /// Enable sleeping for resting bodies
    pub sleeping_enabled: bool,

    /// Fraction of positional error corrected per position iteration
    pub bias_factor: f32,

    /// Solver iterations for velocity
    pub velocity_iterations: usize,

    /// Solver iterations for position
    pub position_iterations: usize,

    /// Static margin added around every broad-phase leaf
    pub fat_margin: f32,

    /// Predictive fattening, in multiples of one step's displacement
    pub velocity_fattening: f32,

    /// Allowed contact penetration before position correction kicks in
    pub max_penetration: f32,

    /// Fraction of contact penetration corrected per position iteration
    pub contact_bias_factor: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.8),
            gravity_enabled: true,
            damping_enabled: false,
            linear_velocity_damping: 0.1,
            angular_velocity_damping: 0.1,
            air_friction_coefficient: 0.0,
            linear_velocity_threshold: 0.02,
            angular_velocity_threshold: 0.02,
            sleep_countdown: 32,
            sleeping_enabled: false,
            bias_factor: 0.8,
            velocity_iterations: 8,
            position_iterations: 3,
            fat_margin: 0.1,
            velocity_fattening: 1.0,
            max_penetration: 0.005,
            contact_bias_factor: 0.2,
        }
    }
}

impl PhysicsConfig {
    /// Create a configuration for high-precision simulation
    pub fn high_precision() -> Self {
        Self {
            velocity_iterations: 16,
            position_iterations: 8,
            ..Default::default()
        }
    }

    /// Create a configuration for fast simulation (lower quality)
    pub fn fast() -> Self {
        Self {
            velocity_iterations: 4,
            position_iterations: 1,
            ..Default::default()
        }
    }

    /// Set gravity
    pub fn with_gravity(mut self, x: f32, y: f32) -> Self {
        self.gravity = Vec2::new(x, y);
        self
    }

    /// Enable or disable gravity
    pub fn with_gravity_enabled(mut self, enabled: bool) -> Self {
        self.gravity_enabled = enabled;
        self
    }

    /// Enable damping with the given linear and angular coefficients
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping_enabled = true;
        self.linear_velocity_damping = linear;
        self.angular_velocity_damping = angular;
        self
    }

    /// Set solver iteration counts
    pub fn with_iterations(mut self, velocity: usize, position: usize) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    /// Enable sleeping
    pub fn with_sleeping(mut self, enabled: bool) -> Self {
        self.sleeping_enabled = enabled;
        self
    }

    /// Check every value is usable by the solver
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".into()));
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "velocity_iterations must be at least 1".into(),
            ));
        }
        if !(self.bias_factor > 0.0 && self.bias_factor <= 1.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "bias_factor must lie in (0, 1], got {}",
                self.bias_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.contact_bias_factor) {
            return Err(PhysicsError::InvalidConfig(format!(
                "contact_bias_factor must lie in [0, 1], got {}",
                self.contact_bias_factor
            )));
        }
        let non_negative = [
            ("linear_velocity_damping", self.linear_velocity_damping),
            ("angular_velocity_damping", self.angular_velocity_damping),
            ("air_friction_coefficient", self.air_friction_coefficient),
            ("linear_velocity_threshold", self.linear_velocity_threshold),
            ("angular_velocity_threshold", self.angular_velocity_threshold),
            ("fat_margin", self.fat_margin),
            ("velocity_fattening", self.velocity_fattening),
            ("max_penetration", self.max_penetration),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
