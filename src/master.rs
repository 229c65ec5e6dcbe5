//! The master orchestrator.
//!
//! A run proceeds as follows:
//!
//! 1. Seed `k` centers from the dataset.
//! 2. Split the dataset into contiguous chunks, one per active mapper, and
//!    initialize every mapper concurrently. Mappers that fail are dropped and
//!    the dataset is re-split across the survivors until a full pass succeeds.
//! 3. Initialize the reducer with the seeded centers.
//! 4. Iterate: broadcast centers, collect one reply per mapper, hand the
//!    concatenated aggregates to the reducer, test the convergence predicate.
//!    A mapper failing mid-round sends the run back to step 2 without
//!    advancing the iteration counter.
//!
//! Each mapper session and the reducer session is owned by its own
//! communication thread. The orchestration loop talks to them over bounded
//! channels holding at most one request and one reply, and drains both before
//! every broadcast so a restarted round never sees a reply from an abandoned
//! one.

use crate::cluster::{Clusters, KeyValue};
use crate::config::{KmeansConfig, TestInput};
use crate::constants::DEFAULT_SEED;
use crate::dataset::Dataset;
use crate::error::{KmeansError, Result};
use crate::mapper::MapOutput;
use crate::metrics::RunStatistics;
use crate::seeding::{check_k, RandomSample, Seeder};
use crate::transport::{AddressResolver, Connector, MapperClient, NamingConvention};
use crate::types::MapperId;
use crate::vector::{Coordinates, Observations};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of a successful `MapReduce`.
#[derive(Debug, Clone)]
pub struct MapReduceOutput {
    /// Final cluster list.
    pub clusters: Clusters,
    /// Number of points in the dataset.
    pub n_points: usize,
    /// Value of the iteration counter when the run stopped.
    pub iterations: usize,
    /// What happened along the way.
    pub stats: RunStatistics,
}

/// Drives clustering runs over a pool of mapper workers and one reducer.
pub struct Master {
    config: KmeansConfig,
    resolver: Arc<dyn AddressResolver>,
    connector: Arc<dyn Connector>,
    seeder: Box<dyn Seeder>,
}

impl Master {
    /// Create a master that reaches workers through `connector`.
    ///
    /// Workers are addressed by the default hostname convention and centers
    /// are seeded by [`RandomSample`] with a fixed seed.
    pub fn new(config: KmeansConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            resolver: Arc::new(NamingConvention::default()),
            connector,
            seeder: Box::new(RandomSample { seed: DEFAULT_SEED }),
        }
    }

    /// Use `resolver` to map worker identities to endpoints.
    pub fn with_resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Use `seeder` to choose initial centers.
    pub fn with_seeder(mut self, seeder: impl Seeder + 'static) -> Self {
        self.seeder = Box::new(seeder);
        self
    }

    /// Configuration used by the next run.
    pub fn config(&self) -> &KmeansConfig {
        &self.config
    }

    /// Replace the configuration from raw test-hook input.
    ///
    /// Returns `0` if the input was accepted and `-1` if it was rejected, in
    /// which case the previous configuration stays in force.
    pub fn set_kmeans(&mut self, input: TestInput) -> i32 {
        match KmeansConfig::try_from(input) {
            Ok(config) => {
                info!(
                    mappers = config.num_mappers(),
                    max_iterations = config.max_iterations(),
                    threshold = config.delta_threshold(),
                    "configuration updated"
                );
                self.config = config;
                0
            }
            Err(e) => {
                warn!(error = %e, "configuration rejected");
                -1
            }
        }
    }

    /// Cluster the dataset stored at `path` into `k` clusters.
    ///
    /// # Errors
    ///
    /// - `Io` / `Dataset` if the file cannot be read or parsed
    /// - `Configuration` if `k` is zero or larger than the dataset
    /// - `FatalWorker` if every mapper fails
    /// - `ReducerFailure` if the reducer fails or answers with an invalid list
    pub fn map_reduce(&self, k: usize, path: impl AsRef<Path>) -> Result<MapReduceOutput> {
        let dataset = Dataset::load(path)?;
        self.map_reduce_observations(k, dataset.into_observations())
    }

    /// Cluster an in-memory dataset into `k` clusters.
    pub fn map_reduce_observations(
        &self,
        k: usize,
        observations: Observations,
    ) -> Result<MapReduceOutput> {
        let started = Instant::now();
        let n_points = observations.len();
        check_k(k, n_points)?;
        let clusters = self.seeder.seed(k, &observations)?;

        let dim = clusters.dim();
        clusters.validate(k, dim)?;
        if let Some(point) = observations.iter().find(|p| p.dim() != dim) {
            return Err(KmeansError::dimension_mismatch(dim, point.dim()));
        }

        info!(
            k,
            n_points,
            mappers = self.config.num_mappers(),
            "starting map-reduce run"
        );

        let mut run = Run::new(self, &observations);
        let (clusters, iterations) = run.execute(clusters)?;

        let mut stats = run.finish();
        stats.iterations = iterations;
        stats.elapsed = started.elapsed();
        info!(
            iterations,
            rounds = stats.rounds,
            restarts = stats.restarts,
            elapsed_ms = stats.elapsed_ms(),
            "map-reduce run complete"
        );

        Ok(MapReduceOutput {
            clusters,
            n_points,
            iterations,
            stats,
        })
    }
}

/// Split `n_points` into `n_mappers` contiguous ranges.
///
/// Every range has `n_points / n_mappers` points, except the first, which
/// also takes the remainder.
///
/// # Panics
///
/// Panics if `n_mappers` is zero.
pub fn partition(n_points: usize, n_mappers: usize) -> Vec<Range<usize>> {
    assert!(n_mappers > 0, "cannot partition across zero mappers");
    let base = n_points / n_mappers;
    let first = base + n_points % n_mappers;

    let mut ranges = Vec::with_capacity(n_mappers);
    let mut start = 0;
    for i in 0..n_mappers {
        let len = if i == 0 { first } else { base };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// State of one run: the active pool and its communication tasks.
struct Run<'m> {
    master: &'m Master,
    observations: &'m [Coordinates],
    pool: Vec<MapperId>,
    links: Vec<MapperLink>,
    stats: RunStatistics,
}

/// Outcome of one broadcast/collect round.
struct Round {
    aggregates: Vec<KeyValue>,
    changes: usize,
    failed: Vec<MapperId>,
}

impl<'m> Run<'m> {
    fn new(master: &'m Master, observations: &'m [Coordinates]) -> Self {
        Self {
            master,
            observations,
            pool: (0..master.config.num_mappers()).map(MapperId::new).collect(),
            links: Vec::new(),
            stats: RunStatistics::default(),
        }
    }

    /// Run the iteration loop, returning the final clusters and iteration count.
    fn execute(&mut self, mut clusters: Clusters) -> Result<(Clusters, usize)> {
        let config = self.master.config;
        let (k, dim) = (clusters.k(), clusters.dim());
        let n_points = self.observations.len();

        self.start_mappers()?;
        let reducer = ReducerLink::start(
            self.master.resolver.as_ref(),
            self.master.connector.as_ref(),
            &clusters,
        )?;

        let mut iteration = 0;
        loop {
            let round = self.round(&clusters);
            if !round.failed.is_empty() {
                warn!(
                    iteration,
                    failed = round.failed.len(),
                    "mappers failed mid-round, restarting iteration"
                );
                self.stats.restarts += 1;
                self.drop_mappers(&round.failed);
                self.start_mappers()?;
                continue;
            }

            clusters = reducer.reduce(round.aggregates, k, dim)?;
            self.stats.record_round(round.changes);
            debug!(iteration, changes = round.changes, "round complete");

            if config.should_stop(iteration, round.changes, n_points) {
                break;
            }
            iteration += 1;
        }

        Ok((clusters, iteration))
    }

    /// Tear down the communication tasks and hand back the statistics.
    fn finish(mut self) -> RunStatistics {
        self.links.clear();
        self.stats.active_mappers = self.pool.len();
        self.stats
    }

    /// Broadcast `clusters` to every active mapper and collect the replies.
    fn round(&self, clusters: &Clusters) -> Round {
        for link in &self.links {
            link.drain();
        }

        let mut failed = Vec::new();
        let mut dispatched = Vec::with_capacity(self.links.len());
        for link in &self.links {
            if link.dispatch(clusters.clone()) {
                dispatched.push(link);
            } else {
                failed.push(link.id);
            }
        }

        let mut aggregates = Vec::with_capacity(clusters.k() * dispatched.len());
        let mut changes = 0;
        for link in dispatched {
            match link.collect() {
                Some(out) => {
                    changes += out.changes;
                    aggregates.extend(out.aggregates);
                }
                None => failed.push(link.id),
            }
        }

        Round {
            aggregates,
            changes,
            failed,
        }
    }

    fn drop_mappers(&mut self, failed: &[MapperId]) {
        self.pool.retain(|id| !failed.contains(id));
        self.stats.mappers_dropped += failed.len();
    }

    /// Replace all communication tasks with fresh ones over a new partition.
    fn start_mappers(&mut self) -> Result<()> {
        self.links.clear();
        let sessions = self.init_mappers()?;
        self.links = sessions
            .into_iter()
            .map(|(id, client)| MapperLink::spawn(id, client))
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Partition the dataset across the pool and initialize every mapper,
    /// shrinking the pool until one full pass succeeds.
    fn init_mappers(&mut self) -> Result<Vec<(MapperId, Box<dyn MapperClient>)>> {
        let master = self.master;
        let observations = self.observations;
        let resolver = master.resolver.as_ref();
        let connector = master.connector.as_ref();

        loop {
            if self.pool.is_empty() {
                error!("no active mappers remain");
                return Err(KmeansError::FatalWorker);
            }

            let ranges = partition(observations.len(), self.pool.len());
            let results: Vec<(MapperId, Result<Box<dyn MapperClient>>)> = thread::scope(|s| {
                let handles: Vec<_> = self
                    .pool
                    .iter()
                    .zip(ranges)
                    .map(|(&id, range)| {
                        let chunk = &observations[range];
                        (id, s.spawn(move || init_mapper(resolver, connector, id, chunk)))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(id, handle)| {
                        let result = handle.join().unwrap_or_else(|_| {
                            Err(KmeansError::worker_unavailable(id, "init task panicked"))
                        });
                        (id, result)
                    })
                    .collect()
            });

            let mut sessions = Vec::with_capacity(results.len());
            let mut failed = Vec::new();
            for (id, result) in results {
                match result {
                    Ok(client) => sessions.push((id, client)),
                    Err(e) => {
                        warn!(mapper = %id, error = %e, "dropping mapper after failed init");
                        failed.push(id);
                    }
                }
            }

            if failed.is_empty() {
                debug!(mappers = sessions.len(), "partition initialized");
                return Ok(sessions);
            }
            self.drop_mappers(&failed);
        }
    }
}

fn init_mapper(
    resolver: &dyn AddressResolver,
    connector: &dyn Connector,
    id: MapperId,
    chunk: &[Coordinates],
) -> Result<Box<dyn MapperClient>> {
    let endpoint = resolver.mapper(id)?;
    let mut client = connector.connect_mapper(&endpoint)?;
    client.init_obs(chunk.to_vec())?;
    debug!(mapper = %id, %endpoint, points = chunk.len(), "mapper initialized");
    Ok(client)
}

/// Communication task owning one mapper session.
///
/// A reply of `None` means the session failed and the task has exited.
struct MapperLink {
    id: MapperId,
    requests: Option<Sender<Clusters>>,
    stale_requests: Receiver<Clusters>,
    replies: Receiver<Option<MapOutput>>,
    handle: Option<JoinHandle<()>>,
}

impl MapperLink {
    fn spawn(id: MapperId, mut client: Box<dyn MapperClient>) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<Clusters>(1);
        let (reply_tx, reply_rx) = bounded(1);
        let stale_requests = request_rx.clone();

        let handle = thread::Builder::new()
            .name(format!("mr-kmeans-{}", id))
            .spawn(move || {
                for clusters in request_rx.iter() {
                    match client.map(&clusters) {
                        Ok(out) => {
                            if reply_tx.send(Some(out)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(mapper = %id, error = %e, "map request failed");
                            let _ = reply_tx.send(None);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            id,
            requests: Some(request_tx),
            stale_requests,
            replies: reply_rx,
            handle: Some(handle),
        })
    }

    /// Discard anything left over from an abandoned round.
    fn drain(&self) {
        while self.stale_requests.try_recv().is_ok() {}
        while self.replies.try_recv().is_ok() {}
    }

    fn dispatch(&self, clusters: Clusters) -> bool {
        self.requests
            .as_ref()
            .map_or(false, |tx| tx.send(clusters).is_ok())
    }

    fn collect(&self) -> Option<MapOutput> {
        self.replies.recv().ok().flatten()
    }
}

impl Drop for MapperLink {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(mapper = %self.id, "communication task panicked");
            }
        }
    }
}

/// Communication task owning the reducer session.
struct ReducerLink {
    requests: Option<Sender<Vec<KeyValue>>>,
    replies: Receiver<Result<Clusters>>,
    handle: Option<JoinHandle<()>>,
}

impl ReducerLink {
    fn start(
        resolver: &dyn AddressResolver,
        connector: &dyn Connector,
        clusters: &Clusters,
    ) -> Result<Self> {
        let endpoint = resolver.reducer().map_err(reducer_failure)?;
        let mut client = connector
            .connect_reducer(&endpoint)
            .map_err(reducer_failure)?;
        client.init_reducer(clusters).map_err(reducer_failure)?;
        debug!(%endpoint, k = clusters.k(), "reducer initialized");

        let (request_tx, request_rx) = bounded::<Vec<KeyValue>>(1);
        let (reply_tx, reply_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("mr-kmeans-reducer".to_string())
            .spawn(move || {
                for aggregates in request_rx.iter() {
                    let reply = client.reduce(aggregates);
                    let failed = reply.is_err();
                    if reply_tx.send(reply).is_err() || failed {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            handle: Some(handle),
        })
    }

    /// Submit one round's aggregates and wait for a valid cluster list.
    fn reduce(&self, aggregates: Vec<KeyValue>, k: usize, dim: usize) -> Result<Clusters> {
        let sent = self
            .requests
            .as_ref()
            .map_or(false, |tx| tx.send(aggregates).is_ok());
        if !sent {
            return Err(KmeansError::reducer_failure("reducer task has exited"));
        }

        let clusters = self
            .replies
            .recv()
            .map_err(|_| KmeansError::reducer_failure("reducer task exited without a reply"))?
            .map_err(reducer_failure)?;
        clusters.validate(k, dim).map_err(reducer_failure)?;
        Ok(clusters)
    }
}

impl Drop for ReducerLink {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("reducer communication task panicked");
            }
        }
    }
}

fn reducer_failure(err: KmeansError) -> KmeansError {
    match err {
        KmeansError::ReducerFailure(_) => err,
        other => KmeansError::reducer_failure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeding::{FirstK, Fixed};
    use crate::transport::{Endpoint, LocalConnector};

    fn local_master(num_mappers: usize) -> (Master, Arc<LocalConnector>) {
        let connector = Arc::new(
            LocalConnector::with_workers(&NamingConvention::default(), num_mappers).unwrap(),
        );
        let config = KmeansConfig::new(num_mappers, 20, 0.01).unwrap();
        (Master::new(config, connector.clone()), connector)
    }

    fn four_points() -> Observations {
        vec![
            Coordinates::from([0.0, 0.0]),
            Coordinates::from([0.0, 1.0]),
            Coordinates::from([10.0, 0.0]),
            Coordinates::from([10.0, 1.0]),
        ]
    }

    #[test]
    fn test_partition_remainder_goes_first() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_partition_covers_every_point_once() {
        for n_points in [0, 1, 7, 100, 101] {
            for n_mappers in 1..=8 {
                let ranges = partition(n_points, n_mappers);
                assert_eq!(ranges.len(), n_mappers);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[n_mappers - 1].end, n_points);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                let base = n_points / n_mappers;
                assert!(ranges[1..].iter().all(|r| r.len() == base));
            }
        }
    }

    #[test]
    fn test_set_kmeans_status_codes() {
        let (mut master, _) = local_master(2);
        let accepted = TestInput {
            num_map: 4,
            max_iter: 10,
            threshold: 0.05,
        };
        assert_eq!(master.set_kmeans(accepted), 0);
        assert_eq!(master.config().num_mappers(), 4);

        let rejected = TestInput {
            num_map: 4,
            max_iter: 10,
            threshold: 1.5,
        };
        assert_eq!(master.set_kmeans(rejected), -1);
        assert_eq!(master.config().delta_threshold(), 0.05);
    }

    #[test]
    fn test_single_mapper_run() {
        let (master, _) = local_master(1);
        let out = master
            .with_seeder(FirstK)
            .map_reduce_observations(1, four_points())
            .unwrap();
        assert_eq!(out.n_points, 4);
        assert_eq!(out.clusters.centers()[0], Coordinates::from([5.0, 0.5]));
    }

    #[test]
    fn test_k_larger_than_dataset_rejected() {
        let (master, _) = local_master(2);
        let result = master.map_reduce_observations(5, four_points());
        assert!(matches!(result, Err(KmeansError::Configuration(_))));
    }

    #[test]
    fn test_ragged_dataset_rejected() {
        let (master, _) = local_master(1);
        let mut observations = four_points();
        observations.push(Coordinates::from([1.0, 2.0, 3.0]));
        let result = master.with_seeder(FirstK).map_reduce_observations(2, observations);
        assert!(matches!(
            result,
            Err(KmeansError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_failed_init_shrinks_pool() {
        let (master, connector) = local_master(3);
        connector.break_peer(&Endpoint::new("code-mapper-2", 8000));

        let out = master.map_reduce_observations(2, four_points()).unwrap();
        assert_eq!(out.stats.mappers_dropped, 1);
        assert_eq!(out.stats.active_mappers, 2);
        assert_eq!(out.stats.restarts, 0);
    }

    #[test]
    fn test_partition_lands_on_mappers() {
        let (master, connector) = local_master(3);
        let centers = Clusters::new(vec![
            Coordinates::from([0.0, 0.0]),
            Coordinates::from([10.0, 0.0]),
        ])
        .unwrap();
        master
            .with_seeder(Fixed(centers))
            .map_reduce_observations(2, four_points())
            .unwrap();

        // 4 points over 3 mappers: 2, 1, 1.
        let sizes: Vec<usize> = (1..=3)
            .map(|i| {
                let endpoint = Endpoint::new(format!("code-mapper-{}", i), 8000);
                connector.mapper(&endpoint).unwrap().lock().len()
            })
            .collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn test_round_discards_stale_reply() {
        let (master, connector) = local_master(1);
        let observations = four_points();

        let mut client = connector
            .connect_mapper(&Endpoint::new("code-mapper-1", 8000))
            .unwrap();
        client.init_obs(observations.clone()).unwrap();
        let link = MapperLink::spawn(MapperId::new(0), client).unwrap();

        // Leave a one-center reply sitting in the channel.
        let stale = Clusters::new(vec![Coordinates::from([0.0, 0.0])]).unwrap();
        assert!(link.dispatch(stale));
        while link.replies.is_empty() {
            thread::yield_now();
        }

        let mut run = Run::new(&master, &observations);
        run.links.push(link);
        let current = Clusters::new(vec![
            Coordinates::from([0.0, 0.0]),
            Coordinates::from([10.0, 0.0]),
        ])
        .unwrap();
        let round = run.round(&current);

        assert!(round.failed.is_empty());
        assert_eq!(round.aggregates.len(), 2);
        assert_eq!(round.aggregates[1].count, 2);
        // Only the two points that moved to cluster 1 count as changes.
        assert_eq!(round.changes, 2);
    }
}
