use glam::DVec2;
use std::f64::consts::PI;

use crate::float::{feq, fle, flt};

/// A 2-D point or vector in floor-plan coordinates.
pub type Point = DVec2;

/// Tolerant point equality.
#[inline]
pub fn point_eq(p: Point, q: Point) -> bool {
    feq(p.x, q.x) && feq(p.y, q.y)
}

/// Tolerant lexicographic order: x first, then y.
#[inline]
pub fn point_lt(p: Point, q: Point) -> bool {
    flt(p.x, q.x) || (feq(p.x, q.x) && flt(p.y, q.y))
}

/// Tolerant lexicographic less-than-or-equal.
#[inline]
pub fn point_le(p: Point, q: Point) -> bool {
    flt(p.x, q.x) || (feq(p.x, q.x) && fle(p.y, q.y))
}

/// Rotate `p` by `angle` radians about the origin.
#[inline]
pub fn rotate(p: Point, angle: f64) -> Point {
    DVec2::from_angle(angle).rotate(p)
}

/// Unit vector along `p`.
#[inline]
pub fn unit(p: Point) -> Point {
    p / p.length()
}

/// Signed angle from `k` to `l`, in (-pi, pi]. The argument order matters.
pub fn signed_angle(k: Point, l: Point) -> f64 {
    let a = (k.perp_dot(l) / (k.length() * l.length()))
        .clamp(-1.0, 1.0)
        .asin();

    if fle(0.0, k.dot(l)) {
        a
    } else if fle(0.0, a) {
        PI - a
    } else {
        -(PI + a)
    }
}
