//! Named constants for addressing, limits and the wire format.

/// Constants for worker addressing.
pub mod addressing {
    /// Port every worker (and the master) listens on.
    pub const DEFAULT_PORT: u16 = 8000;

    /// Mapper hostnames are this prefix followed by `index + 1`.
    pub const MAPPER_NAME_PREFIX: &str = "code-mapper-";

    /// Hostname of the single reducer.
    pub const REDUCER_HOST: &str = "reducer";
}

/// Constants bounding master configuration.
pub mod limits {
    /// Exclusive upper bound on the number of mappers.
    pub const MAX_MAPPERS: usize = 99;
}

/// Constants for reducer-side empty-cluster repair.
pub mod repair {
    /// Fraction of the donor's mean moved into an empty cluster.
    pub const DONOR_FRACTION: f64 = 0.01;

    /// A donor must keep at least one point after giving one away.
    pub const MIN_DONOR_WEIGHT: usize = 2;
}

/// Constants for the mapper.
pub mod mapper {
    /// Assignment value meaning "not yet assigned to any cluster".
    pub const UNASSIGNED: usize = usize::MAX;
}

/// Constants for dataset generation.
pub mod dataset {
    /// Generated coordinates are uniform in `[0, GENERATED_RANGE)`.
    pub const GENERATED_RANGE: f64 = 100.0;

    /// Fields per line in the text dataset format.
    pub const FIELDS_PER_LINE: usize = 2;
}

/// Constants for the wire protocol.
pub mod wire {
    /// Magic bytes opening every frame: "KMR\0"
    pub const MAGIC: [u8; 4] = *b"KMR\0";

    /// Current protocol version.
    pub const PROTOCOL_VERSION: u32 = 1;

    /// Largest accepted frame body (256 MiB).
    pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;
}

/// Default seed for random initial-center selection.
pub const DEFAULT_SEED: u64 = 42;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_constants() {
        assert!(repair::DONOR_FRACTION > 0.0 && repair::DONOR_FRACTION < 1.0);
        assert_eq!(repair::MIN_DONOR_WEIGHT, 2);
    }

    #[test]
    fn test_wire_magic() {
        assert_eq!(&wire::MAGIC, b"KMR\0");
    }
}
