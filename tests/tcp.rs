//! Full runs over loopback TCP.

use mr_kmeans::transport::serve;
use mr_kmeans::{
    Dataset, Endpoint, FirstK, KmeansConfig, LocalConnector, MapperService, Master,
    NamingConvention, ReducerService, StaticResolver, TcpConnector,
};
use parking_lot::Mutex;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

fn spawn_mapper() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let service = Arc::new(Mutex::new(MapperService::new()));
    thread::spawn(move || serve(listener, service));
    Endpoint::new("127.0.0.1", port)
}

fn spawn_reducer() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let service = Arc::new(Mutex::new(ReducerService::new()));
    thread::spawn(move || serve(listener, service));
    Endpoint::new("127.0.0.1", port)
}

fn unused_endpoint() -> Endpoint {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    Endpoint::new("127.0.0.1", port)
}

#[test]
fn test_tcp_run_matches_in_process_run() {
    let observations = Dataset::generate(240, 31).into_observations();
    let config = KmeansConfig::new(3, 50, 0.001).unwrap();

    let resolver = StaticResolver {
        mappers: (0..3).map(|_| spawn_mapper()).collect(),
        reducer: spawn_reducer(),
    };
    let remote = Master::new(config, Arc::new(TcpConnector))
        .with_resolver(resolver)
        .with_seeder(FirstK)
        .map_reduce_observations(4, observations.clone())
        .unwrap();

    let local = LocalConnector::with_workers(&NamingConvention::default(), 3).unwrap();
    let in_process = Master::new(config, Arc::new(local))
        .with_seeder(FirstK)
        .map_reduce_observations(4, observations)
        .unwrap();

    assert_eq!(remote.clusters, in_process.clusters);
    assert_eq!(remote.iterations, in_process.iterations);
    assert_eq!(
        remote.stats.changes_per_round,
        in_process.stats.changes_per_round
    );
}

#[test]
fn test_unreachable_mapper_is_dropped() {
    let resolver = StaticResolver {
        mappers: vec![spawn_mapper(), unused_endpoint(), spawn_mapper()],
        reducer: spawn_reducer(),
    };
    let config = KmeansConfig::new(3, 20, 0.01).unwrap();

    let out = Master::new(config, Arc::new(TcpConnector))
        .with_resolver(resolver)
        .map_reduce_observations(3, Dataset::generate(90, 4).into_observations())
        .unwrap();

    assert_eq!(out.stats.mappers_dropped, 1);
    assert_eq!(out.stats.active_mappers, 2);
    assert_eq!(out.n_points, 90);
}

#[test]
fn test_unreachable_reducer_is_fatal() {
    let resolver = StaticResolver {
        mappers: vec![spawn_mapper()],
        reducer: unused_endpoint(),
    };
    let config = KmeansConfig::new(1, 20, 0.01).unwrap();

    let result = Master::new(config, Arc::new(TcpConnector))
        .with_resolver(resolver)
        .map_reduce_observations(2, Dataset::generate(10, 4).into_observations());
    assert!(matches!(result, Err(mr_kmeans::KmeansError::ReducerFailure(_))));
}
