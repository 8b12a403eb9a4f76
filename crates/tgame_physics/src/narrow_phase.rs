//! Narrow phase: exact contact generation for broad-phase candidates
//!
//! The world only depends on the [`NarrowPhase`] trait. [`BasicNarrowPhase`]
//! covers circles and convex polygons (rectangles included); every other
//! shape pair reports no contact.

use crate::shape::{closest_on_segment, Shape, ShapePrimitive};
use tgame_math::{consts, Vec2};

/// One contact point, both ends in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Deepest point of A inside B (or closest point of A)
    pub point_a: Vec2,
    /// Deepest point of B inside A (or closest point of B)
    pub point_b: Vec2,
}

impl ContactPoint {
    /// Signed distance along `normal`; negative when penetrating
    #[inline]
    pub fn separation(&self, normal: Vec2) -> f32 {
        (self.point_b - self.point_a).dot(normal)
    }
}

/// Contact between two shapes
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    /// Unit normal pointing from A to B
    pub normal: Vec2,
    /// One or two points
    pub points: Vec<ContactPoint>,
}

impl Manifold {
    /// Deepest penetration, positive when overlapping
    pub fn penetration(&self) -> f32 {
        self.points
            .iter()
            .map(|p| -p.separation(self.normal))
            .fold(f32::MIN, f32::max)
    }

    /// Swap the roles of A and B
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        for p in &mut self.points {
            std::mem::swap(&mut p.point_a, &mut p.point_b);
        }
        self
    }
}

/// Contact generation between two placed shapes
pub trait NarrowPhase: Send + Sync {
    /// Contact manifold for `a` against `b`, or `None` when they are apart
    fn detect(&self, a: &ShapePrimitive, b: &ShapePrimitive) -> Option<Manifold>;
}

/// Circle and convex polygon contacts
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicNarrowPhase;

enum Convex {
    Circle { center: Vec2, radius: f32 },
    Polygon(Vec<Vec2>),
}

impl Convex {
    fn from_primitive(primitive: &ShapePrimitive) -> Option<Self> {
        match primitive.shape {
            Shape::Circle { radius } => Some(Self::Circle {
                center: primitive.position,
                radius: *radius,
            }),
            shape @ (Shape::Polygon { .. } | Shape::Rectangle { .. }) => {
                let vertices = shape.vertices()?;
                Some(Self::Polygon(
                    vertices.into_iter().map(|v| primitive.transform(v)).collect(),
                ))
            }
            _ => None,
        }
    }
}

impl NarrowPhase for BasicNarrowPhase {
    fn detect(&self, a: &ShapePrimitive, b: &ShapePrimitive) -> Option<Manifold> {
        match (Convex::from_primitive(a)?, Convex::from_primitive(b)?) {
            (
                Convex::Circle { center: ca, radius: ra },
                Convex::Circle { center: cb, radius: rb },
            ) => circle_circle(ca, ra, cb, rb),
            (Convex::Polygon(poly), Convex::Circle { center, radius }) => {
                polygon_circle(&poly, center, radius)
            }
            (Convex::Circle { center, radius }, Convex::Polygon(poly)) => {
                polygon_circle(&poly, center, radius).map(Manifold::flipped)
            }
            (Convex::Polygon(pa), Convex::Polygon(pb)) => polygon_polygon(&pa, &pb),
        }
    }
}

fn circle_circle(ca: Vec2, ra: f32, cb: Vec2, rb: f32) -> Option<Manifold> {
    let d = cb - ca;
    let distance = d.length();
    if distance > ra + rb {
        return None;
    }
    let normal = d.try_normalize().unwrap_or(Vec2::Y);
    Some(Manifold {
        normal,
        points: vec![ContactPoint {
            point_a: ca + normal * ra,
            point_b: cb - normal * rb,
        }],
    })
}

/// Outward unit normal of edge `i` of a counter-clockwise polygon
fn edge_normal(poly: &[Vec2], i: usize) -> Vec2 {
    let edge = poly[(i + 1) % poly.len()] - poly[i];
    Vec2::new(edge.y, -edge.x).normalize()
}

/// Polygon is A, circle is B
fn polygon_circle(poly: &[Vec2], center: Vec2, radius: f32) -> Option<Manifold> {
    let n = poly.len();
    let (face, separation) = (0..n)
        .map(|i| (i, edge_normal(poly, i).dot(center - poly[i])))
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if separation > radius {
        return None;
    }

    if separation <= 0.0 {
        // Centre inside: push out through the nearest face
        let normal = edge_normal(poly, face);
        return Some(Manifold {
            normal,
            points: vec![ContactPoint {
                point_a: center - normal * separation,
                point_b: center - normal * radius,
            }],
        });
    }

    let closest = (0..n)
        .map(|i| closest_on_segment(poly[i], poly[(i + 1) % n], center))
        .min_by(|p, q| {
            p.distance(center)
                .total_cmp(&q.distance(center))
        })?;
    let offset = center - closest;
    if offset.length() > radius {
        return None;
    }
    let normal = offset.try_normalize().unwrap_or_else(|| edge_normal(poly, face));
    Some(Manifold {
        normal,
        points: vec![ContactPoint {
            point_a: closest,
            point_b: center - normal * radius,
        }],
    })
}

/// Largest separation of `b` from any face of `a`
fn max_separation(a: &[Vec2], b: &[Vec2]) -> (usize, f32) {
    (0..a.len())
        .map(|i| {
            let normal = edge_normal(a, i);
            let deepest = b
                .iter()
                .map(|v| normal.dot(*v - a[i]))
                .fold(f32::MAX, f32::min);
            (i, deepest)
        })
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
}

/// Keep the part of segment `points` on the inner side of the plane
/// `normal . x <= offset`
fn clip_segment(points: [Vec2; 2], normal: Vec2, offset: f32) -> Option<[Vec2; 2]> {
    let d0 = normal.dot(points[0]) - offset;
    let d1 = normal.dot(points[1]) - offset;

    let mut out = Vec::with_capacity(2);
    if d0 <= 0.0 {
        out.push(points[0]);
    }
    if d1 <= 0.0 {
        out.push(points[1]);
    }
    if d0 * d1 < 0.0 {
        let t = d0 / (d0 - d1);
        out.push(points[0] + (points[1] - points[0]) * t);
    }
    match out.as_slice() {
        [p, q, ..] => Some([*p, *q]),
        _ => None,
    }
}

fn polygon_polygon(a: &[Vec2], b: &[Vec2]) -> Option<Manifold> {
    let (edge_a, sep_a) = max_separation(a, b);
    if sep_a > 0.0 {
        return None;
    }
    let (edge_b, sep_b) = max_separation(b, a);
    if sep_b > 0.0 {
        return None;
    }

    // Prefer A as reference unless B is clearly better
    const TOLERANCE: f32 = 5e-4;
    let (reference, incident, ref_edge, flip) = if sep_b > sep_a + TOLERANCE {
        (b, a, edge_b, true)
    } else {
        (a, b, edge_a, false)
    };

    let ref_normal = edge_normal(reference, ref_edge);

    // Incident edge: most anti-parallel to the reference normal
    let inc_edge = (0..incident.len())
        .map(|i| (i, edge_normal(incident, i).dot(ref_normal)))
        .fold((0, f32::MAX), |best, cur| if cur.1 < best.1 { cur } else { best })
        .0;
    let incident_points = [
        incident[inc_edge],
        incident[(inc_edge + 1) % incident.len()],
    ];

    let v1 = reference[ref_edge];
    let v2 = reference[(ref_edge + 1) % reference.len()];
    let tangent = (v2 - v1).try_normalize()?;

    let clipped = clip_segment(incident_points, -tangent, -tangent.dot(v1))?;
    let clipped = clip_segment(clipped, tangent, tangent.dot(v2))?;

    let mut points = Vec::with_capacity(2);
    for p in clipped {
        let separation = ref_normal.dot(p - v1);
        if separation <= consts::EPSILON {
            let on_reference = p - ref_normal * separation;
            points.push(if flip {
                ContactPoint {
                    point_a: p,
                    point_b: on_reference,
                }
            } else {
                ContactPoint {
                    point_a: on_reference,
                    point_b: p,
                }
            });
        }
    }
    if points.is_empty() {
        return None;
    }

    Some(Manifold {
        normal: if flip { -ref_normal } else { ref_normal },
        points,
    })
}
