//! Request/reply contract between the master and its workers.
//!
//! The master never talks to a socket directly. It resolves a worker index
//! to an [`Endpoint`] through an [`AddressResolver`] and opens a session
//! through a [`Connector`]. Two connectors ship with the crate:
//!
//! - [`LocalConnector`]: in-process services, with fault injection for tests
//! - [`TcpConnector`]: length-prefixed `bincode` frames over TCP
//!
//! # Operations
//!
//! | Target  | Operation     | Request            | Reply              |
//! |---------|---------------|--------------------|--------------------|
//! | Mapper  | `InitObs`     | observations       | ack                |
//! | Mapper  | `Map`         | cluster list       | aggregates+changes |
//! | Reducer | `InitReducer` | cluster list       | ack                |
//! | Reducer | `Reduce`      | partial aggregates | cluster list       |

pub mod codec;
pub mod local;
pub mod tcp;

pub use local::{LocalConnector, SharedMapper, SharedReducer};
pub use tcp::{serve, TcpConnector};

use crate::cluster::{Clusters, KeyValue};
use crate::constants::addressing::{DEFAULT_PORT, MAPPER_NAME_PREFIX, REDUCER_HOST};
use crate::error::{KmeansError, Result};
use crate::mapper::{MapOutput, MapperService};
use crate::reducer::ReducerService;
use crate::types::MapperId;
use crate::vector::Observations;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network location of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Maps worker identities to endpoints.
pub trait AddressResolver: Send + Sync {
    /// Endpoint of mapper `id`.
    fn mapper(&self, id: MapperId) -> Result<Endpoint>;

    /// Endpoint of the reducer.
    fn reducer(&self) -> Result<Endpoint>;
}

/// The fixed hostname convention: `{prefix}{index + 1}:{port}` for mappers
/// and `{reducer_host}:{port}` for the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    pub mapper_prefix: String,
    pub reducer_host: String,
    pub port: u16,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            mapper_prefix: MAPPER_NAME_PREFIX.to_string(),
            reducer_host: REDUCER_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl AddressResolver for NamingConvention {
    fn mapper(&self, id: MapperId) -> Result<Endpoint> {
        Ok(Endpoint::new(
            format!("{}{}", self.mapper_prefix, id.ordinal()),
            self.port,
        ))
    }

    fn reducer(&self) -> Result<Endpoint> {
        Ok(Endpoint::new(self.reducer_host.clone(), self.port))
    }
}

/// An explicit endpoint table, e.g. loopback ports chosen at bind time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResolver {
    pub mappers: Vec<Endpoint>,
    pub reducer: Endpoint,
}

impl AddressResolver for StaticResolver {
    fn mapper(&self, id: MapperId) -> Result<Endpoint> {
        self.mappers
            .get(id.as_usize())
            .cloned()
            .ok_or_else(|| KmeansError::worker_unavailable(id, "no endpoint configured"))
    }

    fn reducer(&self) -> Result<Endpoint> {
        Ok(self.reducer.clone())
    }
}

/// A session with one mapper.
pub trait MapperClient: Send {
    /// Replace the mapper's partition.
    fn init_obs(&mut self, observations: Observations) -> Result<()>;

    /// Run one assignment/combine round against `clusters`.
    fn map(&mut self, clusters: &Clusters) -> Result<MapOutput>;
}

/// A session with the reducer.
pub trait ReducerClient: Send {
    /// Establish the run's initial cluster list on the reducer.
    fn init_reducer(&mut self, clusters: &Clusters) -> Result<()>;

    /// Merge partial aggregates into the next cluster list.
    fn reduce(&mut self, aggregates: Vec<KeyValue>) -> Result<Clusters>;
}

/// Opens sessions with workers.
pub trait Connector: Send + Sync {
    /// Open a session with the mapper at `endpoint`.
    fn connect_mapper(&self, endpoint: &Endpoint) -> Result<Box<dyn MapperClient>>;

    /// Open a session with the reducer at `endpoint`.
    fn connect_reducer(&self, endpoint: &Endpoint) -> Result<Box<dyn ReducerClient>>;
}

/// A request as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    InitObs(Observations),
    Map(Clusters),
    InitReducer(Clusters),
    Reduce(Vec<KeyValue>),
}

impl Request {
    /// Operation name, for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Request::InitObs(_) => "InitObs",
            Request::Map(_) => "Map",
            Request::InitReducer(_) => "InitReducer",
            Request::Reduce(_) => "Reduce",
        }
    }
}

/// A reply as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Ack,
    Mapped(MapOutput),
    Clusters(Clusters),
    Error(String),
}

/// Server-side dispatch of decoded requests.
pub trait RequestHandler: Send + Sync {
    /// Handle one request. Errors are reported to the peer, never raised.
    fn handle(&self, request: Request) -> Reply;
}

impl RequestHandler for Mutex<MapperService> {
    fn handle(&self, request: Request) -> Reply {
        match request {
            Request::InitObs(observations) => {
                self.lock().init_obs(observations);
                Reply::Ack
            }
            Request::Map(clusters) => match self.lock().map(&clusters) {
                Ok(out) => Reply::Mapped(out),
                Err(e) => Reply::Error(e.to_string()),
            },
            other => Reply::Error(format!("mapper cannot handle {}", other.name())),
        }
    }
}

impl RequestHandler for Mutex<ReducerService> {
    fn handle(&self, request: Request) -> Reply {
        match request {
            Request::InitReducer(clusters) => {
                self.lock().init_reducer(clusters);
                Reply::Ack
            }
            Request::Reduce(aggregates) => match self.lock().reduce(&aggregates) {
                Ok(clusters) => Reply::Clusters(clusters),
                Err(e) => Reply::Error(e.to_string()),
            },
            other => Reply::Error(format!("reducer cannot handle {}", other.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Coordinates;

    #[test]
    fn test_naming_convention() {
        let naming = NamingConvention::default();
        assert_eq!(
            naming.mapper(MapperId::new(0)).unwrap().to_string(),
            "code-mapper-1:8000"
        );
        assert_eq!(
            naming.mapper(MapperId::new(11)).unwrap().to_string(),
            "code-mapper-12:8000"
        );
        assert_eq!(naming.reducer().unwrap().to_string(), "reducer:8000");
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver {
            mappers: vec![Endpoint::new("127.0.0.1", 9001)],
            reducer: Endpoint::new("127.0.0.1", 9000),
        };
        assert_eq!(resolver.mapper(MapperId::new(0)).unwrap().port, 9001);
        assert!(matches!(
            resolver.mapper(MapperId::new(1)),
            Err(KmeansError::WorkerUnavailable { .. })
        ));
    }

    #[test]
    fn test_mapper_handler_dispatch() {
        let handler = Mutex::new(MapperService::new());
        let obs = vec![Coordinates::from([0.0, 0.0]), Coordinates::from([4.0, 0.0])];
        assert_eq!(handler.handle(Request::InitObs(obs)), Reply::Ack);

        let cc = Clusters::new(vec![Coordinates::from([1.0, 0.0])]).unwrap();
        match handler.handle(Request::Map(cc.clone())) {
            Reply::Mapped(out) => {
                assert_eq!(out.changes, 2);
                assert_eq!(out.aggregates[0].count, 2);
            }
            other => panic!("unexpected reply {:?}", other),
        }

        assert!(matches!(
            handler.handle(Request::InitReducer(cc)),
            Reply::Error(_)
        ));
    }

    #[test]
    fn test_reducer_handler_reports_errors() {
        let handler = Mutex::new(ReducerService::new());
        assert!(matches!(
            handler.handle(Request::Reduce(vec![])),
            Reply::Error(_)
        ));
    }

    #[test]
    fn test_ragged_map_request_never_reaches_mapper() {
        // Same encoding as `Request::Map` (variant 1) with a ragged center list.
        let bytes = bincode::serialize(&(1u32, vec![vec![0.0, 0.0], vec![1.0]])).unwrap();
        assert!(bincode::deserialize::<Request>(&bytes).is_err());

        let well_formed = bincode::serialize(&(1u32, vec![vec![0.0, 0.0], vec![1.0, 1.0]])).unwrap();
        let request: Request = bincode::deserialize(&well_formed).unwrap();
        let handler = Mutex::new(MapperService::new());
        handler.handle(Request::InitObs(vec![Coordinates::from([0.5, 0.5])]));
        assert!(matches!(handler.handle(request), Reply::Mapped(_)));
    }
}
