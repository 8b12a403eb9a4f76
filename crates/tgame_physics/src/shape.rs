//! Collision shapes and their mass properties
//!
//! Shapes are described in body-local space with the mass centre at the
//! origin. [`ShapePrimitive`] pairs a shape with a world pose for the
//! narrow phase.

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};
use tgame_math::{consts, Vec2, AABB};

/// Geometry attached to a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Single point at a local position
    Point { position: Vec2 },
    /// Convex polygon, counter-clockwise, centred on its centroid
    Polygon { vertices: Vec<Vec2> },
    /// Axis-aligned box centred on the origin
    Rectangle { width: f32, height: f32 },
    /// Circle centred on the origin
    Circle { radius: f32 },
    /// Ellipse with full axis lengths
    Ellipse { width: f32, height: f32 },
    /// Stadium; the round caps sit on the longer axis
    Capsule { width: f32, height: f32 },
    /// Line segment
    Edge { start: Vec2, end: Vec2 },
}

impl Shape {
    /// Circle of the given radius
    pub fn circle(radius: f32) -> Self {
        Self::Circle { radius }
    }

    /// Rectangle of the given size
    pub fn rectangle(width: f32, height: f32) -> Self {
        Self::Rectangle { width, height }
    }

    /// Ellipse of the given axis lengths
    pub fn ellipse(width: f32, height: f32) -> Self {
        Self::Ellipse { width, height }
    }

    /// Capsule of the given overall size
    pub fn capsule(width: f32, height: f32) -> Self {
        Self::Capsule { width, height }
    }

    /// Line segment
    pub fn edge(start: Vec2, end: Vec2) -> Self {
        Self::Edge { start, end }
    }

    /// Convex polygon from vertices in either winding.
    ///
    /// The vertices are reordered counter-clockwise and translated so that
    /// the centroid lies at the origin.
    pub fn polygon(vertices: impl Into<Vec<Vec2>>) -> Result<Self> {
        let mut vertices = vertices.into();
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let area = signed_area(&vertices);
        if area.abs() <= consts::EPSILON {
            return Err(PhysicsError::InvalidShape("polygon has zero area".into()));
        }
        if area < 0.0 {
            vertices.reverse();
        }

        let centroid = polygon_centroid(&vertices);
        for v in &mut vertices {
            *v -= centroid;
        }

        let shape = Self::Polygon { vertices };
        shape.validate()?;
        Ok(shape)
    }

    /// Check dimensions and convexity
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f32| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(PhysicsError::InvalidShape(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        };

        match self {
            Self::Point { position } => {
                if !position.is_finite() {
                    return Err(PhysicsError::InvalidShape("point must be finite".into()));
                }
            }
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(PhysicsError::InvalidShape(
                        "polygon needs at least 3 vertices".into(),
                    ));
                }
                let n = vertices.len();
                for i in 0..n {
                    let a = vertices[i];
                    let b = vertices[(i + 1) % n];
                    let c = vertices[(i + 2) % n];
                    if (b - a).cross(c - b) < -consts::EPSILON {
                        return Err(PhysicsError::InvalidShape(
                            "polygon must be convex and counter-clockwise".into(),
                        ));
                    }
                }
            }
            Self::Rectangle { width, height }
            | Self::Ellipse { width, height }
            | Self::Capsule { width, height } => {
                positive("width", *width)?;
                positive("height", *height)?;
            }
            Self::Circle { radius } => positive("radius", *radius)?,
            Self::Edge { start, end } => {
                if !(start.is_finite() && end.is_finite()) {
                    return Err(PhysicsError::InvalidShape("edge must be finite".into()));
                }
                if start.distance(*end) <= consts::EPSILON {
                    return Err(PhysicsError::InvalidShape("edge has zero length".into()));
                }
            }
        }
        Ok(())
    }

    /// Area in square units. Points and edges have none.
    pub fn area(&self) -> f32 {
        match self {
            Self::Point { .. } | Self::Edge { .. } => 0.0,
            Self::Polygon { vertices } => signed_area(vertices).abs(),
            Self::Rectangle { width, height } => width * height,
            Self::Circle { radius } => consts::PI * radius * radius,
            Self::Ellipse { width, height } => consts::PI * width * height * 0.25,
            Self::Capsule { width, height } => {
                let (half_segment, radius) = capsule_core(*width, *height);
                2.0 * half_segment.length() * 2.0 * radius + consts::PI * radius * radius
            }
        }
    }

    /// Local geometric centre
    pub fn center(&self) -> Vec2 {
        match self {
            Self::Point { position } => *position,
            Self::Edge { start, end } => (*start + *end) * 0.5,
            Self::Polygon { vertices } => polygon_centroid(vertices),
            _ => Vec2::ZERO,
        }
    }

    /// Moment of inertia about the local origin for the given mass.
    ///
    /// Zero for shapes without area.
    pub fn inertia(&self, mass: f32) -> f32 {
        match self {
            Self::Point { .. } | Self::Edge { .. } => 0.0,
            Self::Circle { radius } => mass * radius * radius * 0.5,
            Self::Rectangle { width, height } => mass * (width * width + height * height) / 12.0,
            Self::Ellipse { width, height } => {
                let (a, b) = (width * 0.5, height * 0.5);
                mass * (a * a + b * b) * 0.25
            }
            Self::Polygon { vertices } => polygon_inertia(vertices, mass),
            Self::Capsule { width, height } => {
                let (half_segment, r) = capsule_core(*width, *height);
                let l = 2.0 * half_segment.length();
                let rect_area = l * 2.0 * r;
                let disc_area = consts::PI * r * r;
                let total = rect_area + disc_area;
                if total <= 0.0 {
                    return 0.0;
                }
                let rect_mass = mass * rect_area / total;
                let disc_mass = mass * disc_area / total;

                // Each half disc: centroid 4r/3pi from its flat side, shifted
                // out to the end of the core segment.
                let d = 4.0 * r / (3.0 * consts::PI);
                let rect = rect_mass * (l * l + 4.0 * r * r) / 12.0;
                let caps = disc_mass * (r * r * 0.5 + l * l * 0.25 + l * d);
                rect + caps
            }
        }
    }

    /// Vertices for polygonal shapes, counter-clockwise
    pub fn vertices(&self) -> Option<Vec<Vec2>> {
        match self {
            Self::Polygon { vertices } => Some(vertices.clone()),
            Self::Rectangle { width, height } => {
                let (hw, hh) = (width * 0.5, height * 0.5);
                Some(vec![
                    Vec2::new(-hw, -hh),
                    Vec2::new(hw, -hh),
                    Vec2::new(hw, hh),
                    Vec2::new(-hw, hh),
                ])
            }
            _ => None,
        }
    }

    /// Test a body-local point
    pub fn contains(&self, point: Vec2) -> bool {
        match self {
            Self::Point { position } => position.fuzzy_eq(point),
            Self::Polygon { vertices } => polygon_contains(vertices, point),
            Self::Rectangle { width, height } => {
                point.x.abs() <= width * 0.5 && point.y.abs() <= height * 0.5
            }
            Self::Circle { radius } => point.length_squared() <= radius * radius,
            Self::Ellipse { width, height } => {
                let (a, b) = (width * 0.5, height * 0.5);
                (point.x * point.x) / (a * a) + (point.y * point.y) / (b * b) <= 1.0
            }
            Self::Capsule { width, height } => {
                let (half_segment, radius) = capsule_core(*width, *height);
                let closest = closest_on_segment(-half_segment, half_segment, point);
                point.distance(closest) <= radius
            }
            Self::Edge { start, end } => {
                let closest = closest_on_segment(*start, *end, point);
                point.distance(closest) <= consts::EPSILON * 10.0
            }
        }
    }

    /// Uniformly scale the shape about the local origin
    pub fn scale(&mut self, factor: f32) {
        match self {
            Self::Point { position } => *position *= factor,
            Self::Polygon { vertices } => {
                for v in vertices {
                    *v *= factor;
                }
            }
            Self::Rectangle { width, height }
            | Self::Ellipse { width, height }
            | Self::Capsule { width, height } => {
                *width *= factor;
                *height *= factor;
            }
            Self::Circle { radius } => *radius *= factor,
            Self::Edge { start, end } => {
                *start *= factor;
                *end *= factor;
            }
        }
    }

    /// Bounds of the rotated shape, relative to the body position
    pub fn local_aabb(&self, rotation: f32) -> AABB {
        match self {
            Self::Point { position } => {
                let p = position.rotate(rotation);
                AABB::new(p, p)
            }
            Self::Polygon { .. } | Self::Rectangle { .. } => {
                let points: Vec<Vec2> = self
                    .vertices()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| v.rotate(rotation))
                    .collect();
                AABB::from_points(&points)
            }
            Self::Circle { radius } => {
                AABB::from_center_half_extents(Vec2::ZERO, Vec2::splat(*radius))
            }
            Self::Ellipse { width, height } => {
                let (a, b) = (width * 0.5, height * 0.5);
                let (s, c) = rotation.sin_cos();
                let hx = (a * a * c * c + b * b * s * s).sqrt();
                let hy = (a * a * s * s + b * b * c * c).sqrt();
                AABB::from_center_half_extents(Vec2::ZERO, Vec2::new(hx, hy))
            }
            Self::Capsule { width, height } => {
                let (half_segment, radius) = capsule_core(*width, *height);
                let tip = half_segment.rotate(rotation);
                AABB::from_points(&[tip, -tip]).expand(radius)
            }
            Self::Edge { start, end } => {
                AABB::from_points(&[start.rotate(rotation), end.rotate(rotation)])
            }
        }
    }

    /// World bounds at the given pose
    pub fn aabb(&self, position: Vec2, rotation: f32) -> AABB {
        let local = self.local_aabb(rotation);
        AABB::new(local.min + position, local.max + position)
    }
}

/// A shape placed in the world
#[derive(Debug, Clone, Copy)]
pub struct ShapePrimitive<'a> {
    pub shape: &'a Shape,
    pub position: Vec2,
    pub rotation: f32,
}

impl<'a> ShapePrimitive<'a> {
    pub fn new(shape: &'a Shape, position: Vec2, rotation: f32) -> Self {
        Self {
            shape,
            position,
            rotation,
        }
    }

    /// Shape-local point to world space
    #[inline]
    pub fn transform(&self, local: Vec2) -> Vec2 {
        local.rotate(self.rotation) + self.position
    }

    /// World point to shape-local space
    #[inline]
    pub fn to_local(&self, world: Vec2) -> Vec2 {
        (world - self.position).rotate(-self.rotation)
    }

    pub fn aabb(&self) -> AABB {
        self.shape.aabb(self.position, self.rotation)
    }

    /// Test a world-space point
    pub fn contains(&self, world: Vec2) -> bool {
        self.shape.contains(self.to_local(world))
    }
}

/// Half of the core segment and the cap radius of a capsule
pub(crate) fn capsule_core(width: f32, height: f32) -> (Vec2, f32) {
    if width >= height {
        (Vec2::new((width - height) * 0.5, 0.0), height * 0.5)
    } else {
        (Vec2::new(0.0, (height - width) * 0.5), width * 0.5)
    }
}

/// Closest point to `p` on the segment `a`..`b`
pub(crate) fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= consts::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

fn signed_area(vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    (0..n)
        .map(|i| vertices[i].cross(vertices[(i + 1) % n]))
        .sum::<f32>()
        * 0.5
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let n = vertices.len();
    let area = signed_area(vertices);
    if area.abs() <= consts::EPSILON {
        return vertices.iter().copied().sum::<Vec2>() / n.max(1) as f32;
    }
    let sum: Vec2 = (0..n)
        .map(|i| {
            let (a, b) = (vertices[i], vertices[(i + 1) % n]);
            (a + b) * a.cross(b)
        })
        .sum();
    sum / (6.0 * area)
}

fn polygon_inertia(vertices: &[Vec2], mass: f32) -> f32 {
    let n = vertices.len();
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..n {
        let (a, b) = (vertices[i], vertices[(i + 1) % n]);
        let cross = a.cross(b).abs();
        numerator += cross * (a.dot(a) + a.dot(b) + b.dot(b));
        denominator += cross;
    }
    if denominator <= consts::EPSILON {
        return 0.0;
    }
    mass * numerator / (6.0 * denominator)
}

fn polygon_contains(vertices: &[Vec2], point: Vec2) -> bool {
    let n = vertices.len();
    (0..n).all(|i| {
        let (a, b) = (vertices[i], vertices[(i + 1) % n]);
        (b - a).cross(point - a) >= -consts::EPSILON
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_polygon_is_recentred_and_ccw() {
        // Clockwise square offset from the origin
        let shape = Shape::polygon(vec![
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 1.0),
        ])
        .unwrap();

        let Shape::Polygon { vertices } = &shape else {
            panic!("expected polygon");
        };
        assert!(signed_area(vertices) > 0.0);
        let centroid = polygon_centroid(vertices);
        assert_relative_eq!(centroid.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(centroid.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(shape.area(), 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_polygon_rejects_degenerate() {
        assert!(Shape::polygon(vec![Vec2::ZERO, Vec2::X]).is_err());
        assert!(Shape::polygon(vec![Vec2::ZERO, Vec2::X, Vec2::X * 2.0]).is_err());
    }

    #[test]
    fn test_square_polygon_inertia_matches_rectangle() {
        let square = Shape::polygon(vec![
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ])
        .unwrap();
        let rect = Shape::rectangle(2.0, 2.0);
        assert_relative_eq!(square.inertia(3.0), rect.inertia(3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_inertia_formulas() {
        assert_relative_eq!(Shape::circle(2.0).inertia(1.0), 2.0);
        assert_relative_eq!(Shape::ellipse(2.0, 2.0).inertia(1.0), Shape::circle(1.0).inertia(1.0));
        // A capsule as tall as it is wide is a circle
        assert_relative_eq!(
            Shape::capsule(2.0, 2.0).inertia(1.0),
            Shape::circle(1.0).inertia(1.0),
            epsilon = 1e-6
        );
        assert_eq!(Shape::edge(Vec2::ZERO, Vec2::X).inertia(1.0), 0.0);
    }

    #[test]
    fn test_contains() {
        assert!(Shape::circle(1.0).contains(Vec2::new(0.5, 0.5)));
        assert!(!Shape::circle(1.0).contains(Vec2::new(1.0, 1.0)));
        assert!(Shape::rectangle(2.0, 1.0).contains(Vec2::new(0.9, 0.4)));
        assert!(!Shape::rectangle(2.0, 1.0).contains(Vec2::new(0.9, 0.6)));
        assert!(Shape::capsule(4.0, 2.0).contains(Vec2::new(1.9, 0.0)));
        assert!(!Shape::capsule(4.0, 2.0).contains(Vec2::new(1.9, 0.9)));
        assert!(Shape::edge(Vec2::ZERO, Vec2::X).contains(Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn test_rotated_aabb() {
        let rect = Shape::rectangle(2.0, 1.0);
        let aabb = rect.aabb(Vec2::new(5.0, 0.0), consts::FRAC_PI_2);
        assert_relative_eq!(aabb.min.x, 4.5, epsilon = 1e-5);
        assert_relative_eq!(aabb.max.y, 1.0, epsilon = 1e-5);

        let ellipse = Shape::ellipse(4.0, 2.0).local_aabb(consts::FRAC_PI_2);
        assert_relative_eq!(ellipse.max.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(ellipse.max.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_scale_and_validate() {
        let mut circle = Shape::circle(1.0);
        circle.scale(3.0);
        assert_eq!(circle, Shape::circle(3.0));
        assert!(Shape::circle(-1.0).validate().is_err());
        assert!(Shape::rectangle(1.0, 0.0).validate().is_err());
        assert!(Shape::edge(Vec2::X, Vec2::X).validate().is_err());
    }

    #[test]
    fn test_primitive_transform() {
        let shape = Shape::rectangle(2.0, 2.0);
        let primitive = ShapePrimitive::new(&shape, Vec2::new(1.0, 0.0), consts::FRAC_PI_2);
        let world = primitive.transform(Vec2::X);
        assert_relative_eq!(world.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(world.y, 1.0, epsilon = 1e-6);
        let back = primitive.to_local(world);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-6);
        assert!(primitive.contains(Vec2::new(1.5, 0.5)));
    }
}
