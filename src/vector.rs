use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, SubAssign};

/// An ordered set of coordinate vectors: a full dataset or one mapper's partition.
pub type Observations = Vec<Coordinates>;

/// A point in the coordinate space shared by every observation and center of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinates(Vec<f64>);

impl Coordinates {
    /// Create coordinates from raw components.
    pub fn new(components: Vec<f64>) -> Self {
        Self(components)
    }

    /// The origin of a `dim`-dimensional space.
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Create a point with each component uniform in `[0, range)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, dim: usize, range: f64) -> Self {
        Self((0..dim).map(|_| rng.gen_range(0.0..range)).collect())
    }

    /// Return the dimensionality of this point.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Return the components as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Divide every component by `n`.
    pub fn divide(&mut self, n: f64) {
        for c in &mut self.0 {
            *c /= n;
        }
    }

    /// Return a copy with every component multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|c| c * factor).collect())
    }
}

impl From<Vec<f64>> for Coordinates {
    fn from(components: Vec<f64>) -> Self {
        Self(components)
    }
}

impl<const N: usize> From<[f64; N]> for Coordinates {
    fn from(components: [f64; N]) -> Self {
        Self(components.to_vec())
    }
}

// Component-wise; callers check dimensions first.
impl AddAssign<&Coordinates> for Coordinates {
    fn add_assign(&mut self, rhs: &Coordinates) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += b;
        }
    }
}

impl SubAssign<&Coordinates> for Coordinates {
    fn sub_assign(&mut self, rhs: &Coordinates) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a -= b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sum_and_divide() {
        let mut acc = Coordinates::zeros(2);
        acc += &Coordinates::from([1.0, 2.0]);
        acc += &Coordinates::from([3.0, 4.0]);
        assert_eq!(acc, Coordinates::from([4.0, 6.0]));

        acc.divide(2.0);
        assert_eq!(acc.as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn test_scaled_and_subtract() {
        let mut p = Coordinates::from([10.0, -20.0]);
        let share = p.scaled(0.01);
        assert_eq!(share, Coordinates::from([0.1, -0.2]));

        p -= &share;
        assert!((p.as_slice()[0] - 9.9).abs() < 1e-12);
        assert!((p.as_slice()[1] + 19.8).abs() < 1e-12);
    }

    #[test]
    fn test_random_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let p = Coordinates::random(&mut rng, 2, 100.0);
            assert_eq!(p.dim(), 2);
            assert!(p.as_slice().iter().all(|&c| (0.0..100.0).contains(&c)));
        }
    }
}
