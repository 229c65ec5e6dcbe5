//! In-process transport.
//!
//! Services are registered under an [`Endpoint`] and called directly through
//! a mutex, which gives each worker the one-request-at-a-time session the
//! protocol assumes. Peers can be broken on demand to exercise the master's
//! failure handling without sockets.

use super::{Connector, Endpoint, AddressResolver, MapperClient, ReducerClient};
use crate::cluster::{Clusters, KeyValue};
use crate::error::{KmeansError, Result};
use crate::mapper::{MapOutput, MapperService};
use crate::reducer::ReducerService;
use crate::types::MapperId;
use crate::vector::Observations;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A mapper service shared between its registry entry and open sessions.
pub type SharedMapper = Arc<Mutex<MapperService>>;

/// A reducer service shared between its registry entry and open sessions.
pub type SharedReducer = Arc<Mutex<ReducerService>>;

/// Health of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Healthy,
    /// Every call and connection attempt fails.
    Broken,
    /// The next `n` `map` calls succeed, then the peer breaks.
    FailAfterMaps(usize),
}

#[derive(Debug)]
struct Peer<S> {
    service: Arc<Mutex<S>>,
    fault: Arc<Mutex<Fault>>,
}

impl<S> Clone for Peer<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            fault: Arc::clone(&self.fault),
        }
    }
}

fn check(fault: &Mutex<Fault>, endpoint: &Endpoint, consumes_map: bool) -> Result<()> {
    let mut fault = fault.lock();
    match *fault {
        Fault::Healthy => Ok(()),
        Fault::Broken => Err(KmeansError::worker_unavailable(
            endpoint,
            "connection is broken",
        )),
        Fault::FailAfterMaps(0) if consumes_map => {
            *fault = Fault::Broken;
            Err(KmeansError::worker_unavailable(endpoint, "connection is broken"))
        }
        Fault::FailAfterMaps(n) => {
            if consumes_map {
                *fault = Fault::FailAfterMaps(n - 1);
            }
            Ok(())
        }
    }
}

/// Registry of in-process workers, addressable by endpoint.
#[derive(Debug, Default)]
pub struct LocalConnector {
    mappers: RwLock<HashMap<Endpoint, Peer<MapperService>>>,
    reducers: RwLock<HashMap<Endpoint, Peer<ReducerService>>>,
}

impl LocalConnector {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `num_mappers` mappers and one reducer at the endpoints `resolver` assigns.
    pub fn with_workers(resolver: &dyn AddressResolver, num_mappers: usize) -> Result<Self> {
        let connector = Self::new();
        for i in 0..num_mappers {
            connector.register_mapper(resolver.mapper(MapperId::new(i))?, MapperService::new());
        }
        connector.register_reducer(resolver.reducer()?, ReducerService::new());
        Ok(connector)
    }

    /// Register a mapper, returning a handle to its state.
    pub fn register_mapper(&self, endpoint: Endpoint, service: MapperService) -> SharedMapper {
        let service = Arc::new(Mutex::new(service));
        let peer = Peer {
            service: Arc::clone(&service),
            fault: Arc::new(Mutex::new(Fault::Healthy)),
        };
        self.mappers.write().insert(endpoint, peer);
        service
    }

    /// Register a reducer, returning a handle to its state.
    pub fn register_reducer(&self, endpoint: Endpoint, service: ReducerService) -> SharedReducer {
        let service = Arc::new(Mutex::new(service));
        let peer = Peer {
            service: Arc::clone(&service),
            fault: Arc::new(Mutex::new(Fault::Healthy)),
        };
        self.reducers.write().insert(endpoint, peer);
        service
    }

    /// State of the mapper at `endpoint`, if registered.
    pub fn mapper(&self, endpoint: &Endpoint) -> Option<SharedMapper> {
        self.mappers
            .read()
            .get(endpoint)
            .map(|p| Arc::clone(&p.service))
    }

    /// State of the reducer at `endpoint`, if registered.
    pub fn reducer(&self, endpoint: &Endpoint) -> Option<SharedReducer> {
        self.reducers
            .read()
            .get(endpoint)
            .map(|p| Arc::clone(&p.service))
    }

    /// Break the worker at `endpoint`: open sessions and new connections fail.
    pub fn break_peer(&self, endpoint: &Endpoint) {
        self.set_fault(endpoint, Fault::Broken);
    }

    /// Let the mapper at `endpoint` answer `maps` more `map` calls, then break it.
    pub fn break_mapper_after(&self, endpoint: &Endpoint, maps: usize) {
        self.set_fault(endpoint, Fault::FailAfterMaps(maps));
    }

    /// Restore a previously broken worker.
    pub fn heal_peer(&self, endpoint: &Endpoint) {
        self.set_fault(endpoint, Fault::Healthy);
    }

    fn set_fault(&self, endpoint: &Endpoint, fault: Fault) {
        if let Some(peer) = self.mappers.read().get(endpoint) {
            *peer.fault.lock() = fault;
        }
        if let Some(peer) = self.reducers.read().get(endpoint) {
            *peer.fault.lock() = fault;
        }
    }
}

impl Connector for LocalConnector {
    fn connect_mapper(&self, endpoint: &Endpoint) -> Result<Box<dyn MapperClient>> {
        let peer = self
            .mappers
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| KmeansError::worker_unavailable(endpoint, "no such host"))?;
        check(&peer.fault, endpoint, false)?;
        Ok(Box::new(LocalMapperClient {
            endpoint: endpoint.clone(),
            peer,
        }))
    }

    fn connect_reducer(&self, endpoint: &Endpoint) -> Result<Box<dyn ReducerClient>> {
        let peer = self
            .reducers
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| KmeansError::worker_unavailable(endpoint, "no such host"))?;
        check(&peer.fault, endpoint, false)?;
        Ok(Box::new(LocalReducerClient {
            endpoint: endpoint.clone(),
            peer,
        }))
    }
}

struct LocalMapperClient {
    endpoint: Endpoint,
    peer: Peer<MapperService>,
}

impl MapperClient for LocalMapperClient {
    fn init_obs(&mut self, observations: Observations) -> Result<()> {
        check(&self.peer.fault, &self.endpoint, false)?;
        self.peer.service.lock().init_obs(observations);
        Ok(())
    }

    fn map(&mut self, clusters: &Clusters) -> Result<MapOutput> {
        check(&self.peer.fault, &self.endpoint, true)?;
        self.peer.service.lock().map(clusters)
    }
}

struct LocalReducerClient {
    endpoint: Endpoint,
    peer: Peer<ReducerService>,
}

impl ReducerClient for LocalReducerClient {
    fn init_reducer(&mut self, clusters: &Clusters) -> Result<()> {
        check(&self.peer.fault, &self.endpoint, false)?;
        self.peer.service.lock().init_reducer(clusters.clone());
        Ok(())
    }

    fn reduce(&mut self, aggregates: Vec<KeyValue>) -> Result<Clusters> {
        check(&self.peer.fault, &self.endpoint, false)?;
        self.peer.service.lock().reduce(&aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NamingConvention;
    use crate::vector::Coordinates;

    fn one_center() -> Clusters {
        Clusters::new(vec![Coordinates::from([0.0, 0.0])]).unwrap()
    }

    #[test]
    fn test_with_workers_registers_by_convention() {
        let naming = NamingConvention::default();
        let connector = LocalConnector::with_workers(&naming, 3).unwrap();
        assert!(connector.mapper(&Endpoint::new("code-mapper-3", 8000)).is_some());
        assert!(connector.mapper(&Endpoint::new("code-mapper-4", 8000)).is_none());
        assert!(connector.reducer(&Endpoint::new("reducer", 8000)).is_some());
    }

    #[test]
    fn test_session_reaches_service_state() {
        let connector = LocalConnector::new();
        let endpoint = Endpoint::new("m", 1);
        let state = connector.register_mapper(endpoint.clone(), MapperService::new());

        let mut client = connector.connect_mapper(&endpoint).unwrap();
        client
            .init_obs(vec![Coordinates::from([1.0, 1.0])])
            .unwrap();
        assert_eq!(state.lock().len(), 1);

        let out = client.map(&one_center()).unwrap();
        assert_eq!(out.changes, 1);
    }

    #[test]
    fn test_unknown_endpoint_is_unavailable() {
        let connector = LocalConnector::new();
        let result = connector.connect_mapper(&Endpoint::new("nowhere", 1));
        assert!(matches!(result, Err(KmeansError::WorkerUnavailable { .. })));
    }

    #[test]
    fn test_break_after_maps() {
        let connector = LocalConnector::new();
        let endpoint = Endpoint::new("m", 1);
        connector.register_mapper(endpoint.clone(), MapperService::new());
        connector.break_mapper_after(&endpoint, 1);

        let mut client = connector.connect_mapper(&endpoint).unwrap();
        client.init_obs(vec![Coordinates::from([1.0, 1.0])]).unwrap();
        assert!(client.map(&one_center()).is_ok());
        assert!(client.map(&one_center()).is_err());
        // Stays broken for new sessions too.
        assert!(connector.connect_mapper(&endpoint).is_err());

        connector.heal_peer(&endpoint);
        assert!(connector.connect_mapper(&endpoint).is_ok());
    }

    #[test]
    fn test_broken_reducer() {
        let connector = LocalConnector::new();
        let endpoint = Endpoint::new("r", 1);
        connector.register_reducer(endpoint.clone(), ReducerService::new());
        let mut client = connector.connect_reducer(&endpoint).unwrap();
        client.init_reducer(&one_center()).unwrap();

        connector.break_peer(&endpoint);
        assert!(client.reduce(vec![]).is_err());
    }
}
