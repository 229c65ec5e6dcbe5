//! Initial cluster-center selection.
//!
//! The master seeds the cluster list once per run, before any worker is
//! contacted. Seeding is a pluggable policy: anything implementing
//! [`Seeder`] can be installed with `Master::with_seeder`.

use crate::cluster::Clusters;
use crate::distance::euclidean_distance_squared;
use crate::error::{KmeansError, Result};
use crate::vector::Coordinates;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Chooses the `k` starting centers for a run.
pub trait Seeder: Send + Sync {
    /// Pick `k` centers for `observations`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `k` is zero or exceeds the number
    /// of observations.
    fn seed(&self, k: usize, observations: &[Coordinates]) -> Result<Clusters>;
}

/// Reject `k == 0` and `k` larger than the dataset.
pub(crate) fn check_k(k: usize, n_points: usize) -> Result<()> {
    if k == 0 {
        return Err(KmeansError::configuration("k must be at least 1"));
    }
    if k > n_points {
        return Err(KmeansError::configuration(format!(
            "the size of the data set ({}) must at least equal k ({})",
            n_points, k
        )));
    }
    Ok(())
}

/// Use the first `k` observations, in dataset order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstK;

impl Seeder for FirstK {
    fn seed(&self, k: usize, observations: &[Coordinates]) -> Result<Clusters> {
        check_k(k, observations.len())?;
        Clusters::new(observations[..k].to_vec())
    }
}

/// Use `k` distinct observations sampled uniformly at random.
#[derive(Debug, Clone, Copy)]
pub struct RandomSample {
    /// RNG seed; the same seed and dataset always give the same centers.
    pub seed: u64,
}

impl Seeder for RandomSample {
    fn seed(&self, k: usize, observations: &[Coordinates]) -> Result<Clusters> {
        check_k(k, observations.len())?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let centers = index::sample(&mut rng, observations.len(), k)
            .into_iter()
            .map(|i| observations[i].clone())
            .collect();
        Clusters::new(centers)
    }
}

/// k-means++ selection.
///
/// Each further center is drawn with probability proportional to its squared
/// distance from the nearest center already chosen, which spreads the
/// starting centers out and cuts the number of rounds a run needs.
#[derive(Debug, Clone, Copy)]
pub struct KMeansPlusPlus {
    /// RNG seed.
    pub seed: u64,
}

impl Seeder for KMeansPlusPlus {
    fn seed(&self, k: usize, observations: &[Coordinates]) -> Result<Clusters> {
        check_k(k, observations.len())?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centers: Vec<Coordinates> = Vec::with_capacity(k);

        centers.push(observations[rng.gen_range(0..observations.len())].clone());

        while centers.len() < k {
            // Distance from each point to its nearest chosen center
            let distances: Vec<f64> = observations
                .par_iter()
                .map(|p| {
                    centers
                        .iter()
                        .map(|c| euclidean_distance_squared(p.as_slice(), c.as_slice()))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            let total: f64 = distances.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                // Every point sits on a chosen center
                centers.push(observations[rng.gen_range(0..observations.len())].clone());
                continue;
            }

            let mut r = rng.gen_range(0.0..total);
            let mut chosen = observations.len() - 1;
            for (i, &d) in distances.iter().enumerate() {
                r -= d;
                if r <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            centers.push(observations[chosen].clone());
        }

        Clusters::new(centers)
    }
}

/// Caller-supplied starting centers.
#[derive(Debug, Clone)]
pub struct Fixed(pub Clusters);

impl Seeder for Fixed {
    fn seed(&self, k: usize, observations: &[Coordinates]) -> Result<Clusters> {
        check_k(k, observations.len())?;
        if self.0.k() != k {
            return Err(KmeansError::configuration(format!(
                "fixed seeding supplies {} centers but k = {}",
                self.0.k(),
                k
            )));
        }
        if let Some(p) = observations.iter().find(|p| p.dim() != self.0.dim()) {
            return Err(KmeansError::dimension_mismatch(self.0.dim(), p.dim()));
        }
        Ok(self.0.clone())
    }
}
