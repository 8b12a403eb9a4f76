//! 2x2 matrix used for constraint effective masses

use crate::vector::Vec2;
use core::ops::Mul;

/// 2x2 matrix (column-major)
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Mat2 {
    pub cols: [Vec2; 2],
}

impl Mat2 {
    pub const ZERO: Self = Self {
        cols: [Vec2::ZERO, Vec2::ZERO],
    };

    #[inline]
    pub const fn from_cols(c0: Vec2, c1: Vec2) -> Self {
        Self { cols: [c0, c1] }
    }

    /// Build from row-major entries `[[e11, e12], [e21, e22]]`
    #[inline]
    pub const fn new(e11: f32, e12: f32, e21: f32, e22: f32) -> Self {
        Self::from_cols(Vec2::new(e11, e21), Vec2::new(e12, e22))
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cols[0].x * self.cols[1].y - self.cols[1].x * self.cols[0].y
    }

    /// Inverse, or `None` when the matrix is singular
    pub fn try_inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() <= crate::consts::EPSILON || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Self::new(
            self.cols[1].y * inv_det,
            -self.cols[1].x * inv_det,
            -self.cols[0].y * inv_det,
            self.cols[0].x * inv_det,
        ))
    }

    #[inline]
    pub fn mul_vec2(&self, v: Vec2) -> Vec2 {
        self.cols[0] * v.x + self.cols[1] * v.y
    }
}

impl Mul<Vec2> for Mat2 {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: Vec2) -> Vec2 {
        self.mul_vec2(rhs)
    }
}
