//! Reducer worker: merges partial aggregates into the next cluster list.
//!
//! The reducer folds every mapper's `(sum, count)` records into one running
//! sum and weight per cluster, repairs clusters that received no points, and
//! divides to obtain the new centers.
//!
//! # Empty-cluster repair
//!
//! A cluster with weight 0 takes a synthetic point from the lowest-indexed
//! cluster holding at least two points: 1% of the donor's mean is moved from
//! the donor's sum into the recipient's sum, and one unit of weight moves
//! with it. Total weight is preserved and no cluster is emptied by the
//! transfer. If no such donor exists the round fails with
//! [`KmeansError::NoDonorCluster`].

use crate::cluster::{Clusters, KeyValue};
use crate::constants::repair::{DONOR_FRACTION, MIN_DONOR_WEIGHT};
use crate::error::{KmeansError, Result};
use crate::vector::Coordinates;
use tracing::debug;

/// Per-cluster running sums and weights for one reduce step.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAccumulator {
    sums: Vec<Coordinates>,
    weights: Vec<usize>,
}

impl ClusterAccumulator {
    /// Zeroed sums and weights for `k` clusters in a `dim`-dimensional space.
    pub fn new(k: usize, dim: usize) -> Self {
        Self {
            sums: vec![Coordinates::zeros(dim); k],
            weights: vec![0; k],
        }
    }

    /// Fold one partial aggregate into its cluster.
    pub fn add(&mut self, kv: &KeyValue) -> Result<()> {
        let k = self.weights.len();
        let sum = self
            .sums
            .get_mut(kv.center)
            .ok_or(KmeansError::InvalidCluster {
                index: kv.center,
                k,
            })?;
        if sum.dim() != kv.sum.dim() {
            return Err(KmeansError::dimension_mismatch(sum.dim(), kv.sum.dim()));
        }
        *sum += &kv.sum;
        self.weights[kv.center] += kv.count;
        Ok(())
    }

    /// Current weight (point count) of each cluster.
    pub fn weights(&self) -> &[usize] {
        &self.weights
    }

    /// Sum of all cluster weights.
    pub fn total_weight(&self) -> usize {
        self.weights.iter().sum()
    }

    /// Give every empty cluster one synthetic point from a donor.
    ///
    /// Clusters are repaired in index order. Returns the `(recipient, donor)`
    /// pairs that were applied.
    pub fn repair_empty_clusters(&mut self) -> Result<Vec<(usize, usize)>> {
        let mut transfers = Vec::new();

        for i in 0..self.weights.len() {
            if self.weights[i] != 0 {
                continue;
            }
            let donor = self
                .weights
                .iter()
                .position(|&w| w >= MIN_DONOR_WEIGHT)
                .ok_or(KmeansError::NoDonorCluster { cluster: i })?;

            let share = self.sums[donor].scaled(DONOR_FRACTION / self.weights[donor] as f64);
            self.sums[i] += &share;
            self.sums[donor] -= &share;
            self.weights[i] += 1;
            self.weights[donor] -= 1;
            transfers.push((i, donor));
        }

        Ok(transfers)
    }

    /// Divide each sum by its weight to produce the new centers.
    ///
    /// Every weight must be non-zero; run [`repair_empty_clusters`](Self::repair_empty_clusters) first.
    pub fn into_clusters(self) -> Result<Clusters> {
        let mut centers = Vec::with_capacity(self.sums.len());
        for (cluster, (mut sum, weight)) in self.sums.into_iter().zip(self.weights).enumerate() {
            if weight == 0 {
                return Err(KmeansError::NoDonorCluster { cluster });
            }
            sum.divide(weight as f64);
            centers.push(sum);
        }
        Clusters::new(centers)
    }
}

/// State of the reducer session: the current cluster list.
///
/// The list mirrors the master's and is replaced by `init_reducer` at the
/// start of each run.
#[derive(Debug, Default)]
pub struct ReducerService {
    clusters: Option<Clusters>,
}

impl ReducerService {
    /// Create an uninitialised reducer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the initial cluster list; `k` is derived from its length.
    pub fn init_reducer(&mut self, clusters: Clusters) {
        debug!(k = clusters.k(), "reducer initialised");
        self.clusters = Some(clusters);
    }

    /// Number of clusters, or 0 before `init_reducer`.
    pub fn k(&self) -> usize {
        self.clusters.as_ref().map_or(0, Clusters::k)
    }

    /// The most recently produced (or initial) cluster list.
    pub fn clusters(&self) -> Option<&Clusters> {
        self.clusters.as_ref()
    }

    /// Merge partial aggregates into the next cluster list.
    ///
    /// # Errors
    ///
    /// Fails if the reducer was never initialised, if an aggregate names a
    /// cluster outside `[0, k)`, or if an empty cluster cannot be repaired.
    pub fn reduce(&mut self, aggregates: &[KeyValue]) -> Result<Clusters> {
        let current = self
            .clusters
            .as_ref()
            .ok_or_else(|| KmeansError::reducer_failure("reducer has not been initialised"))?;

        let mut acc = ClusterAccumulator::new(current.k(), current.dim());
        for kv in aggregates {
            acc.add(kv)?;
        }

        let transfers = acc.repair_empty_clusters()?;
        if !transfers.is_empty() {
            debug!(?transfers, "repaired empty clusters");
        }

        let next = acc.into_clusters()?;
        self.clusters = Some(next.clone());
        Ok(next)
    }
}
