//! Cluster lists and the partial aggregates exchanged between workers.
//!
//! A [`Clusters`] value holds exactly `k` centers for the lifetime of a run;
//! only the center values change, replaced wholesale once per iteration.
//! [`KeyValue`] is the per-cluster `(sum, count)` record a mapper emits after
//! combining its partition and the reducer folds into new centers.

use crate::distance::euclidean_distance_squared;
use crate::error::{KmeansError, Result};
use crate::vector::Coordinates;
use serde::{Deserialize, Serialize};

/// A fixed-length list of `k` cluster centers, indexed `0..k`.
///
/// Decoding goes through [`Clusters::new`], so a list received from a peer
/// is never empty or ragged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinates>", into = "Vec<Coordinates>")]
pub struct Clusters {
    centers: Vec<Coordinates>,
}

impl Clusters {
    /// Build a cluster list, checking it is non-empty and dimensionally consistent.
    pub fn new(centers: Vec<Coordinates>) -> Result<Self> {
        let first = centers
            .first()
            .ok_or_else(|| KmeansError::configuration("a cluster list needs at least one center"))?;
        let dim = first.dim();
        if let Some(bad) = centers.iter().find(|c| c.dim() != dim) {
            return Err(KmeansError::dimension_mismatch(dim, bad.dim()));
        }
        Ok(Self { centers })
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.centers.len()
    }

    /// Dimensionality of the coordinate space.
    pub fn dim(&self) -> usize {
        self.centers.first().map_or(0, Coordinates::dim)
    }

    /// The centers in index order.
    pub fn centers(&self) -> &[Coordinates] {
        &self.centers
    }

    /// Consume the list, returning the centers.
    pub fn into_centers(self) -> Vec<Coordinates> {
        self.centers
    }

    /// Index of the center nearest to `point`.
    ///
    /// Centers are scanned in index order and only strictly smaller distances
    /// replace the current best, so ties go to the lowest index.
    pub fn nearest(&self, point: &Coordinates) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (idx, center) in self.centers.iter().enumerate() {
            let d = euclidean_distance_squared(point.as_slice(), center.as_slice());
            if d < best_distance {
                best = idx;
                best_distance = d;
            }
        }
        best
    }

    /// Check that a list received from a peer has the shape this run expects.
    pub fn validate(&self, k: usize, dim: usize) -> Result<()> {
        if self.k() != k {
            return Err(KmeansError::configuration(format!(
                "expected {} clusters, got {}",
                k,
                self.k()
            )));
        }
        if let Some(bad) = self.centers.iter().find(|c| c.dim() != dim) {
            return Err(KmeansError::dimension_mismatch(dim, bad.dim()));
        }
        Ok(())
    }
}

impl TryFrom<Vec<Coordinates>> for Clusters {
    type Error = KmeansError;

    fn try_from(centers: Vec<Coordinates>) -> Result<Self> {
        Self::new(centers)
    }
}

impl From<Clusters> for Vec<Coordinates> {
    fn from(clusters: Clusters) -> Self {
        clusters.centers
    }
}

/// Partial aggregate for one cluster from one mapper in one iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Cluster index in `[0, k)`.
    pub center: usize,
    /// Component-wise sum of the points assigned to `center`.
    pub sum: Coordinates,
    /// Number of points contributing to `sum`.
    pub count: usize,
}

impl KeyValue {
    /// Create a new partial aggregate.
    pub fn new(center: usize, sum: Coordinates, count: usize) -> Self {
        Self { center, sum, count }
    }

    /// A zero-count aggregate for `center` in a `dim`-dimensional space.
    pub fn empty(center: usize, dim: usize) -> Self {
        Self::new(center, Coordinates::zeros(dim), 0)
    }

    /// Fold one point into the aggregate.
    #[inline]
    pub fn absorb(&mut self, point: &Coordinates) {
        self.sum += point;
        self.count += 1;
    }
}
