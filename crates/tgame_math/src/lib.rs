//! # tgame_math - 2D Math for Rigid-Body Dynamics
//!
//! Small, `Copy` math primitives used by the physics core:
//! vectors, 2x2 matrices and axis-aligned boxes.

pub mod vector;
pub mod matrix;
pub mod bounds;

pub use vector::*;
pub use matrix::*;
pub use bounds::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const TAU: f32 = PI * 2.0;
    pub const FRAC_PI_2: f32 = PI / 2.0;
    pub const EPSILON: f32 = 1e-6;
}

/// Equality within `consts::EPSILON`
#[inline]
pub fn real_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < consts::EPSILON
}

/// Wrap an angle into `(-PI, PI]`
#[inline]
pub fn wrap_angle(radians: f32) -> f32 {
    let mut r = radians % consts::TAU;
    if r > consts::PI {
        r -= consts::TAU;
    } else if r <= -consts::PI {
        r += consts::TAU;
    }
    r
}
