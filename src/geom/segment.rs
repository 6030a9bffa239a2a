use super::point::{point_eq, point_le, point_lt, Point};
use crate::float::{feq, fle, flt};

/// A line segment. Stored segments keep the lexicographic invariant `a <= b`;
/// use [`Segment::ordered`] to enforce it after construction.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    #[inline]
    pub fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Construct with endpoints swapped into lexicographic order.
    #[inline]
    pub fn ordered(a: Point, b: Point) -> Self {
        if point_le(a, b) {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    #[inline]
    pub fn midpoint(&self) -> Point {
        (self.a + self.b) * 0.5
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// Tolerant endpoint equality.
    #[inline]
    pub fn coincides(&self, other: &Segment) -> bool {
        point_eq(self.a, other.a) && point_eq(self.b, other.b)
    }

    /// Tolerant lexicographic order on (a, b).
    #[inline]
    pub fn lex_lt(&self, other: &Segment) -> bool {
        point_lt(self.a, other.a) || (point_eq(self.a, other.a) && point_lt(self.b, other.b))
    }
}

/// A triangle given by its corner points.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub a: Point,
    pub b: Point,
    pub c: Point,
}

impl Triangle {
    #[inline]
    pub fn new(a: Point, b: Point, c: Point) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn centroid(&self) -> Point {
        (self.a + self.b + self.c) / 3.0
    }

    /// Whether `p` lies inside or on the boundary, accepting either winding.
    pub fn contains(&self, p: Point) -> bool {
        let l1 = (p - self.a).perp_dot(self.b - self.a);
        let l2 = (p - self.b).perp_dot(self.c - self.b);
        let l3 = (p - self.c).perp_dot(self.a - self.c);

        (fle(0.0, l1) && fle(0.0, l2) && fle(0.0, l3))
            || (fle(l1, 0.0) && fle(l2, 0.0) && fle(l3, 0.0))
    }
}

/// Proper segment intersection test, with collinear overlap resolved by
/// scalar projection.
pub fn segments_intersect(pr: &Segment, qs: &Segment) -> bool {
    let p = pr.a;
    let r = pr.b - pr.a;
    let q = qs.a;
    let s = qs.b - qs.a;

    let qp = q - p;
    let rs = r.perp_dot(s);
    let qpr = qp.perp_dot(r);

    if feq(rs, 0.0) {
        if !feq(qpr, 0.0) {
            // parallel, not collinear
            return false;
        }

        let rr = r.dot(r);
        let t0 = qp.dot(r) / rr;
        let t1 = t0 + s.dot(r) / rr;

        if fle(0.0, t0) && fle(t0, 1.0) {
            return true;
        }
        if fle(0.0, t1) && fle(t1, 1.0) {
            return true;
        }
        return flt(t0.min(t1), 0.0) && flt(1.0, t0.max(t1));
    }

    let t = qp.perp_dot(s) / rs;
    let u = qpr / rs;

    fle(0.0, u) && fle(u, 1.0) && fle(0.0, t) && fle(t, 1.0)
}

/// Intersection test that also fires when the segments pass within `cpa` of
/// each other.
pub fn intersect_or_near(k: &Segment, l: &Segment, cpa: f64) -> bool {
    segments_intersect(k, l) || fle(segment_distance(k, l), cpa)
}

/// Parameter along `pr` of its crossing with `qs`.
///
/// Assumes the lines intersect and are not collinear; the value is the
/// fraction of `pr` measured from `pr.a`.
pub fn intersection_param(pr: &Segment, qs: &Segment) -> f64 {
    let s = qs.b - qs.a;
    (qs.a - pr.a).perp_dot(s) / (pr.b - pr.a).perp_dot(s)
}

/// Distance from `p` to the segment `l` (projection clamped to the span).
pub fn point_segment_distance(p: Point, l: &Segment) -> f64 {
    let lv = l.b - l.a;
    let t = lv.dot(p - l.a) / lv.length_squared();

    if flt(t, 0.0) {
        p.distance(l.a)
    } else if flt(1.0, t) {
        p.distance(l.b)
    } else {
        p.distance(l.a + t * lv)
    }
}

/// Distance between two non-intersecting segments: the least of the four
/// endpoint-to-other-segment distances. Degenerate segments are not handled.
pub fn segment_distance(k: &Segment, l: &Segment) -> f64 {
    let kv = k.b - k.a;
    let lv = l.b - l.a;
    let kn2 = kv.length_squared();
    let ln2 = lv.length_squared();

    let endpoint = |t: f64, from: Point, base: Point, dir: Point, tip: Point| -> f64 {
        if flt(t, 0.0) {
            from.distance(base)
        } else if flt(1.0, t) {
            from.distance(tip)
        } else {
            from.distance(base + t * dir)
        }
    };

    let d0 = endpoint(lv.dot(k.a - l.a) / ln2, k.a, l.a, lv, l.b);
    let d1 = endpoint(lv.dot(k.b - l.a) / ln2, k.b, l.a, lv, l.b);
    let d2 = endpoint(kv.dot(l.a - k.a) / kn2, l.a, k.a, kv, k.b);
    let d3 = endpoint(kv.dot(l.b - k.a) / kn2, l.b, k.a, kv, k.b);

    d0.min(d1).min(d2).min(d3)
}

/// Distance between the midpoints of two segments.
#[inline]
pub fn midpoint_distance(k: &Segment, l: &Segment) -> f64 {
    k.midpoint().distance(l.midpoint())
}

/// Weighted point-to-segment proxy used when ranking candidate edges: the
/// average of the endpoint distances with the midpoint counted twice.
pub fn proxy_distance(p: Point, l: &Segment) -> f64 {
    (p.distance(l.a) + p.distance(l.b) + 2.0 * p.distance(l.midpoint())) / 4.0
}
