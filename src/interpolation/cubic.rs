//! Cubic interpolation.
//!
//! Uses two images on each side of the target to produce a smoother curve
//! than linear interpolation.

use super::Interpolator;

/// Four-point cubic interpolation between `y1` and `y2` at fractional position `mu`
pub fn cubic(y0: f64, y1: f64, y2: f64, y3: f64, mu: f64) -> f64 {
    let mu2 = mu * mu;
    let a0 = y3 - y2 - y0 + y1;
    let a1 = y0 - y1 - a0;
    let a2 = y2 - y0;
    let a3 = y1;

    a0 * mu * mu2 + a1 * mu2 + a2 * mu + a3
}

/// Cubic interpolator
pub struct CubicInterpolator;

impl Interpolator for CubicInterpolator {
    fn neighbors(&self) -> (usize, usize) {
        (2, 2)
    }

    fn kernel(&self, values: &[f32], mu: f64) -> f32 {
        cubic(
            f64::from(values[0]),
            f64::from(values[1]),
            f64::from(values[2]),
            f64::from(values[3]),
            mu,
        ) as f32
    }

    fn name(&self) -> &str {
        "cubic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_kernel() {
        assert!((cubic(-2.0, 3.0, 9.0, 15.0, 0.34) - 5.322744).abs() < 1e-9);
    }

    #[test]
    fn test_cubic_endpoints() {
        assert_eq!(cubic(1.0, 2.0, 7.0, 3.0, 0.0), 2.0);
        assert!((cubic(1.0, 2.0, 7.0, 3.0, 1.0) - 7.0).abs() < 1e-12);
    }
}
