//! Linear interpolation between the two bracketing images.

use super::Interpolator;

/// Weighted blend of `y1` and `y2` at fractional position `mu`
pub fn linear(y1: f64, y2: f64, mu: f64) -> f64 {
    y1 * (1.0 - mu) + y2 * mu
}

/// Linear interpolator
pub struct LinearInterpolator;

impl Interpolator for LinearInterpolator {
    fn neighbors(&self) -> (usize, usize) {
        (1, 1)
    }

    fn kernel(&self, values: &[f32], mu: f64) -> f32 {
        linear(f64::from(values[0]), f64::from(values[1]), mu) as f32
    }

    fn name(&self) -> &str {
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_kernel() {
        assert_eq!(linear(0.0, 10.0, 0.5), 5.0);
        assert!((linear(0.0, 10.0, 0.9) - 9.0).abs() < 1e-12);
        assert_eq!(linear(4.0, 8.0, 0.0), 4.0);
        assert_eq!(linear(4.0, 8.0, 1.0), 8.0);
    }

    #[test]
    fn test_linear_kernel_on_pixels() {
        assert_eq!(LinearInterpolator.kernel(&[2.0, 4.0], 0.25), 2.5);
    }
}
