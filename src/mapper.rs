//! Mapper worker: nearest-center assignment with a local combiner.
//!
//! A mapper owns one partition of the dataset and the assignment of each of
//! its points. Every `map` call assigns each point to its nearest center and
//! pre-aggregates the partition into exactly `k` `(sum, count)` records, so
//! the message size depends on `k` and not on the partition size.

use crate::cluster::{Clusters, KeyValue};
use crate::constants::mapper::UNASSIGNED;
use crate::error::{KmeansError, Result};
use crate::vector::{Coordinates, Observations};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reply to a `Mapper` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapOutput {
    /// Exactly `k` partial aggregates, one per cluster index, in index order.
    pub aggregates: Vec<KeyValue>,
    /// Points whose assignment differs from the previous round.
    pub changes: usize,
}

/// State of one mapper session: its partition and current assignments.
#[derive(Debug, Default)]
pub struct MapperService {
    observations: Observations,
    assignments: Vec<usize>,
}

impl MapperService {
    /// Create a mapper with an empty partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held partition wholesale.
    ///
    /// Every assignment is reset, so the next `map` reports each point as changed.
    pub fn init_obs(&mut self, observations: Observations) {
        self.assignments = vec![UNASSIGNED; observations.len()];
        self.observations = observations;
        debug!(points = self.observations.len(), "mapper partition initialised");
    }

    /// Assign every held point to its nearest center and combine per cluster.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if a held point does not live in the
    /// centers' coordinate space.
    pub fn map(&mut self, clusters: &Clusters) -> Result<MapOutput> {
        let k = clusters.k();
        let dim = clusters.dim();
        if let Some(p) = self.observations.iter().find(|p| p.dim() != dim) {
            return Err(KmeansError::dimension_mismatch(dim, p.dim()));
        }

        let nearest: Vec<usize> = self
            .observations
            .par_iter()
            .map(|p| clusters.nearest(p))
            .collect();

        // Combiner: fold in point order so sums are reproducible.
        let mut aggregates: Vec<KeyValue> = (0..k).map(|c| KeyValue::empty(c, dim)).collect();
        let mut changes = 0;
        for ((point, &ci), assigned) in self
            .observations
            .iter()
            .zip(nearest.iter())
            .zip(self.assignments.iter_mut())
        {
            aggregates[ci].absorb(point);
            if *assigned != ci {
                *assigned = ci;
                changes += 1;
            }
        }

        debug!(points = self.observations.len(), k, changes, "mapper round complete");
        Ok(MapOutput {
            aggregates,
            changes,
        })
    }

    /// Number of points in the held partition.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Returns true if the mapper holds no points.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Current assignment of each held point (`usize::MAX` before the first round).
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// The held partition.
    pub fn observations(&self) -> &[Coordinates] {
        &self.observations
    }
}
