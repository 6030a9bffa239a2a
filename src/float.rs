//! Tolerant floating-point comparisons.
//!
//! Coordinates are compared with a scaled-epsilon tolerance everywhere in the
//! crate; a bare `==` or `<` on coordinates is a bug. The tolerance scales
//! with the magnitude of the operands (two units in the last place) and
//! treats subnormal differences as equal.

const ULP: f64 = 2.0;

/// Tolerant equality.
#[inline]
pub fn feq(x: f64, y: f64) -> bool {
    (x - y).abs() <= f64::EPSILON * (x + y).abs() * ULP || (x - y).abs() < f64::MIN_POSITIVE
}

/// Tolerant strict less-than.
#[inline]
pub fn flt(x: f64, y: f64) -> bool {
    (y - x) > f64::EPSILON * (x + y).abs() * ULP || (y - x) >= f64::MIN_POSITIVE
}

/// Tolerant less-than-or-equal.
#[inline]
pub fn fle(x: f64, y: f64) -> bool {
    flt(x, y) || feq(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulated_rounding_compares_equal() {
        assert!(feq(0.1 + 0.2, 0.3));
        assert!(feq(1.0 / 3.0 * 3.0, 1.0));
        assert!(!feq(1.0, 1.0 + 1e-9));
    }

    #[test]
    fn ordering_is_antisymmetric() {
        assert!(flt(1.0, 2.0));
        assert!(!flt(2.0, 1.0));
        assert!(!flt(1.0, 1.0));
        assert!(fle(1.0, 1.0));
        assert!(fle(0.3, 0.1 + 0.2));
        assert!(fle(0.1 + 0.2, 0.3));
    }

    #[test]
    fn zero_and_subnormals() {
        assert!(feq(0.0, 0.0));
        assert!(feq(0.0, f64::MIN_POSITIVE / 2.0));
        assert!(flt(0.0, 1e-300));
    }

    #[test]
    fn scales_with_magnitude() {
        let big = 1e12;
        assert!(feq(big, big + big * f64::EPSILON));
        assert!(flt(big, big + 1.0));
    }
}
