//! Cluster a generated dataset over in-process workers, one of which fails.
//!
//! Run with: cargo run --example local_cluster

use mr_kmeans::{Dataset, Endpoint, KmeansConfig, LocalConnector, Master, NamingConvention};
use std::sync::Arc;

fn main() -> mr_kmeans::Result<()> {
    println!("=== Distributed k-means over local workers ===\n");

    let dir = std::env::temp_dir().join("mr-kmeans-demo");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("points.txt");
    Dataset::generate(5_000, 1).write(&path)?;
    println!("Wrote 5000 points to {}\n", path.display());

    let connector = Arc::new(LocalConnector::with_workers(&NamingConvention::default(), 4)?);
    let config = KmeansConfig::new(4, 100, 0.001)?;
    let master = Master::new(config, connector.clone());

    let out = master.map_reduce(8, &path)?;
    println!("Healthy pool: {} iterations", out.iterations);
    println!("{}\n", out.stats.summary());

    // The third mapper answers two rounds and then drops its connection.
    connector.break_mapper_after(&Endpoint::new("code-mapper-3", 8000), 2);
    let out = master.map_reduce(8, &path)?;
    println!("Degraded pool: {} iterations", out.iterations);
    println!("{}\n", out.stats.summary());

    for (i, center) in out.clusters.centers().iter().enumerate() {
        println!("  cluster {}: {:?}", i, center.as_slice());
    }
    Ok(())
}
