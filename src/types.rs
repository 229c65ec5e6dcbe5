//! Core newtypes for type-safe orchestration.
//!
//! Mapper identities are plain indices on the wire, but inside the master
//! they must not be confused with partition offsets or cluster indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a mapper worker in the configured pool.
///
/// Stable for the lifetime of a run: dropping a mapper from the active pool
/// never renumbers the survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MapperId(pub usize);

impl MapperId {
    /// Create a new MapperId.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// The 1-based ordinal used by the hostname convention.
    #[inline]
    pub const fn ordinal(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for MapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mapper-{}", self.0)
    }
}

impl From<usize> for MapperId {
    #[inline]
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl From<MapperId> for usize {
    #[inline]
    fn from(id: MapperId) -> Self {
        id.0
    }
}
