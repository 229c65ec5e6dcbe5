//! Distance functions over coordinate vectors.
//!
//! Nearest-center assignment only needs relative ordering, so the squared
//! form is the one used on the hot path.

/// Compute the squared Euclidean distance between two points.
///
/// Returns sum((a[i] - b[i])^2)
#[inline]
pub fn euclidean_distance_squared(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Coordinate dimensions must match");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Compute the Euclidean (L2) distance between two points.
///
/// Returns sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    euclidean_distance_squared(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(euclidean_distance_squared(&a, &a), 0.0);
        assert_eq!(euclidean_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_simple() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-12);
        assert!((euclidean_distance_squared(&a, &b) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_non_negative() {
        let a = vec![1.5, -2.0];
        let b = vec![-7.25, 4.0];
        let d1 = euclidean_distance_squared(&a, &b);
        let d2 = euclidean_distance_squared(&b, &a);
        assert_eq!(d1, d2);
        assert!(d1 >= 0.0);
    }

    #[test]
    #[should_panic(expected = "Coordinate dimensions must match")]
    fn test_dimension_mismatch_panics() {
        euclidean_distance_squared(&[1.0], &[1.0, 2.0]);
    }
}
