//! Master configuration.
//!
//! A [`KmeansConfig`] can only be obtained through validation, so a master
//! never starts a run with an out-of-range mapper count or threshold.

use crate::constants::limits::MAX_MAPPERS;
use crate::error::{KmeansError, Result};
use serde::{Deserialize, Serialize};

/// Validated settings for clustering runs.
///
/// On the wire a config travels as a [`TestInput`] and is validated again
/// when decoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TestInput", into = "TestInput")]
pub struct KmeansConfig {
    num_mappers: usize,
    max_iterations: usize,
    delta_threshold: f64,
}

impl KmeansConfig {
    /// Create a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `KmeansError::Configuration` unless `0 < num_mappers < 99` and
    /// `0.0 < delta_threshold < 1.0`.
    pub fn new(num_mappers: usize, max_iterations: usize, delta_threshold: f64) -> Result<Self> {
        // Written so that NaN fails the check.
        if !(delta_threshold > 0.0 && delta_threshold < 1.0) {
            return Err(KmeansError::configuration(format!(
                "threshold {} is out of bounds (must be > 0.0 and < 1.0)",
                delta_threshold
            )));
        }
        if num_mappers == 0 || num_mappers >= MAX_MAPPERS {
            return Err(KmeansError::configuration(format!(
                "number of mappers {} is out of range (must be > 0 and < {})",
                num_mappers, MAX_MAPPERS
            )));
        }
        Ok(Self {
            num_mappers,
            max_iterations,
            delta_threshold,
        })
    }

    /// Number of mappers a run starts with.
    pub fn num_mappers(&self) -> usize {
        self.num_mappers
    }

    /// Iteration cap.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Fraction of points whose reassignment still counts as "moving".
    pub fn delta_threshold(&self) -> f64 {
        self.delta_threshold
    }

    /// Largest change count that counts as converged for `n_points` points.
    pub fn change_budget(&self, n_points: usize) -> usize {
        (n_points as f64 * self.delta_threshold).floor() as usize
    }

    /// The convergence predicate, evaluated after each successful round.
    pub fn should_stop(&self, iteration: usize, changes: usize, n_points: usize) -> bool {
        iteration >= self.max_iterations
            || changes == 0
            || changes <= self.change_budget(n_points)
    }
}

/// Raw input of the `SetKmeans` hook, as a remote caller sends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestInput {
    pub num_map: i64,
    pub max_iter: i64,
    pub threshold: f64,
}

impl TryFrom<TestInput> for KmeansConfig {
    type Error = KmeansError;

    fn try_from(input: TestInput) -> Result<Self> {
        if input.max_iter < 0 {
            return Err(KmeansError::configuration(format!(
                "maximum iterations {} is out of range (must be >= 0)",
                input.max_iter
            )));
        }
        let num_mappers = usize::try_from(input.num_map).map_err(|_| {
            KmeansError::configuration(format!(
                "number of mappers {} is out of range (must be > 0 and < {})",
                input.num_map, MAX_MAPPERS
            ))
        })?;
        Self::new(num_mappers, input.max_iter as usize, input.threshold)
    }
}

impl From<KmeansConfig> for TestInput {
    fn from(config: KmeansConfig) -> Self {
        Self {
            num_map: config.num_mappers as i64,
            max_iter: config.max_iterations as i64,
            threshold: config.delta_threshold,
        }
    }
}
