//! Error types for mr-kmeans operations.
//!
//! Every failure a clustering run can hit is surfaced as a [`KmeansError`]
//! and returned to the caller of `MapReduce`. Worker-level failures are
//! recovered inside the master where possible; the rest propagate.

use std::io;
use thiserror::Error;

/// Result type alias using [`KmeansError`].
pub type Result<T> = std::result::Result<T, KmeansError>;

/// Errors that can occur while configuring or running a clustering job.
#[derive(Error, Debug)]
pub enum KmeansError {
    /// Invalid run or master configuration (k, mapper count, thresholds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dataset file is malformed.
    #[error("dataset error at line {line}: {reason}")]
    Dataset {
        /// 1-based line number of the offending record.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// I/O error during file or socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Coordinate dimensions do not match the run's coordinate space.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Dimensionality actually provided.
        actual: usize,
    },

    /// A worker could not be reached or failed to answer.
    #[error("worker unavailable at {endpoint}: {reason}")]
    WorkerUnavailable {
        /// Endpoint of the worker, as resolved by the master.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// Every mapper in the active pool has failed.
    #[error("all mappers have failed: no active mappers remain")]
    FatalWorker,

    /// The reducer failed to answer or returned an invalid cluster list.
    #[error("reducer failure: {0}")]
    ReducerFailure(String),

    /// Empty-cluster repair found no cluster able to donate a point.
    #[error("cluster {cluster} is empty and no cluster holds at least two points")]
    NoDonorCluster {
        /// Index of the cluster left empty.
        cluster: usize,
    },

    /// A partial aggregate referenced a cluster outside `[0, k)`.
    #[error("cluster index {index} out of range for k = {k}")]
    InvalidCluster {
        /// Offending cluster index.
        index: usize,
        /// Number of clusters in the run.
        k: usize,
    },

    /// A peer sent an unexpected or malformed message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A peer reported an error while handling a request.
    #[error("remote error: {0}")]
    Remote(String),

    /// Frame checksum verification failed.
    #[error("checksum mismatch: frame may be corrupted")]
    ChecksumMismatch,

    /// Error during serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KmeansError {
    /// Creates a new `Configuration` error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a new `Dataset` error.
    pub fn dataset(line: usize, reason: impl Into<String>) -> Self {
        Self::Dataset {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `WorkerUnavailable` error.
    pub fn worker_unavailable(endpoint: impl ToString, reason: impl Into<String>) -> Self {
        Self::WorkerUnavailable {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ReducerFailure` error.
    pub fn reducer_failure(msg: impl Into<String>) -> Self {
        Self::ReducerFailure(msg.into())
    }

    /// Creates a new `Protocol` error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<bincode::Error> for KmeansError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KmeansError::dimension_mismatch(2, 3);
        assert_eq!(err.to_string(), "dimension mismatch: expected 2, got 3");

        let err = KmeansError::dataset(7, "expected 2 fields, found 3");
        assert_eq!(
            err.to_string(),
            "dataset error at line 7: expected 2 fields, found 3"
        );

        let err = KmeansError::FatalWorker;
        assert_eq!(
            err.to_string(),
            "all mappers have failed: no active mappers remain"
        );

        let err = KmeansError::InvalidCluster { index: 4, k: 3 };
        assert_eq!(err.to_string(), "cluster index 4 out of range for k = 3");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: KmeansError = io_err.into();
        assert!(matches!(err, KmeansError::Io(_)));
    }

    #[test]
    fn test_worker_unavailable_names_endpoint() {
        let err = KmeansError::worker_unavailable("code-mapper-1:8000", "connection refused");
        assert_eq!(
            err.to_string(),
            "worker unavailable at code-mapper-1:8000: connection refused"
        );
    }
}
