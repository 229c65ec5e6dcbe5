//! mr-kmeans: distributed k-means over a master/mapper/reducer protocol.
//!
//! A [`Master`] splits a dataset across mapper workers, broadcasts the current
//! centers each iteration, and hands the mappers' combined partial sums to a
//! single reducer that recomputes the centers. Mappers that stop answering
//! are dropped from the pool and their points redistributed.
//!
//! # Features
//!
//! - **Combiner**: each mapper sends exactly `k` partial aggregates per round
//! - **Failure recovery**: shrink-and-retry over the mapper pool
//! - **Empty-cluster repair**: the reducer never returns a cluster with no weight
//! - **Pluggable transport**: in-process workers or framed `bincode` over TCP
//!
//! # Example
//!
//! ```
//! use mr_kmeans::{Dataset, KmeansConfig, LocalConnector, Master, NamingConvention};
//! use std::sync::Arc;
//!
//! let connector = LocalConnector::with_workers(&NamingConvention::default(), 3).unwrap();
//! let config = KmeansConfig::new(3, 50, 0.001).unwrap();
//! let master = Master::new(config, Arc::new(connector));
//!
//! let dataset = Dataset::generate(500, 7);
//! let out = master.map_reduce_observations(4, dataset.into_observations()).unwrap();
//! assert_eq!(out.clusters.k(), 4);
//! println!("{}", out.stats.summary());
//! ```

pub mod cluster;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod mapper;
pub mod master;
pub mod metrics;
pub mod reducer;
pub mod seeding;
pub mod transport;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use cluster::{Clusters, KeyValue};
pub use config::{KmeansConfig, TestInput};
pub use dataset::Dataset;
pub use error::{KmeansError, Result};
pub use mapper::{MapOutput, MapperService};
pub use master::{MapReduceOutput, Master};
pub use metrics::RunStatistics;
pub use reducer::ReducerService;
pub use seeding::{FirstK, Fixed, KMeansPlusPlus, RandomSample, Seeder};
pub use transport::{
    AddressResolver, Connector, Endpoint, LocalConnector, NamingConvention, StaticResolver,
    TcpConnector,
};
pub use types::MapperId;
pub use vector::{Coordinates, Observations};
