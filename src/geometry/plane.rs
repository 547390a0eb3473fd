//! Planar helpers shared by topology, banking and rasterization.

use glam::Vec2;

/// Hermite smoothstep of `x` between `edge0` and `edge1`, clamped to [0, 1].
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Right-hand perpendicular of a direction (rotates clockwise by 90°).
#[inline]
pub fn right_normal(tangent: Vec2) -> Vec2 {
    Vec2::new(tangent.y, -tangent.x)
}

/// Signed angle from `a` to `b` in radians, positive counter-clockwise.
#[inline]
pub fn signed_angle(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b).atan2(a.dot(b))
}

/// Projects `p` onto segment `a→b`. Returns the clamped parameter in [0, 1] and the
/// closest point.
pub fn project_onto_segment(p: Vec2, a: Vec2, b: Vec2) -> (f32, Vec2) {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= f32::EPSILON {
        return (0.0, a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (t, a + ab * t)
}

/// Intersection of segments `p0→p1` and `q0→q1`, if they cross.
pub fn segment_intersection(p0: Vec2, p1: Vec2, q0: Vec2, q1: Vec2) -> Option<Vec2> {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let denom = d1.perp_dot(d2);
    if denom.abs() < 1e-10 {
        return None;
    }
    let d3 = q0 - p0;
    let t = d3.perp_dot(d2) / denom;
    let u = d3.perp_dot(d1) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(p0 + d1 * t)
    } else {
        None
    }
}

/// Point-in-quad test by ray casting. Works for any simple quad regardless of winding.
pub fn point_in_quad(p: Vec2, quad: &[Vec2; 4]) -> bool {
    let mut inside = false;
    let mut j = 3;
    for i in 0..4 {
        let vi = quad[i];
        let vj = quad[j];
        if ((vi.y > p.y) != (vj.y > p.y))
            && (p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
