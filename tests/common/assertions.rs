//! Float and mask-aware assertions for raster values.

/// Tolerance used when none is given
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// Assert that a pixel lookup is valid and within `epsilon` of `expected`.
pub fn assert_pixel_approx_eq(actual: Option<f32>, expected: f32, epsilon: Option<f32>) {
    let epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
    match actual {
        Some(value) => assert!(
            (value - expected).abs() <= epsilon,
            "Pixel is {}, expected {} (epsilon {})",
            value,
            expected,
            epsilon
        ),
        None => panic!("Pixel is masked, expected {}", expected),
    }
}

/// Assert that every valid pixel value matches `expected`, in order.
pub fn assert_array_approx_eq(actual: &[f32], expected: &[f32], epsilon: Option<f32>) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Got {} values {:?}, expected {:?}",
        actual.len(),
        actual,
        expected
    );
    for (a, e) in actual.iter().zip(expected) {
        assert_pixel_approx_eq(Some(*a), *e, epsilon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_within_tolerance() {
        assert_pixel_approx_eq(Some(1.0000001), 1.0, None);
        assert_pixel_approx_eq(Some(2.004), 2.0, Some(0.01));
        assert_array_approx_eq(&[5.0, 35.0], &[5.0, 35.0000001], None);
    }

    #[test]
    #[should_panic(expected = "Pixel is masked")]
    fn test_masked_pixel() {
        assert_pixel_approx_eq(None, 1.0, None);
    }

    #[test]
    #[should_panic(expected = "Pixel is 1.5")]
    fn test_pixel_out_of_tolerance() {
        assert_pixel_approx_eq(Some(1.5), 1.0, None);
    }
}
