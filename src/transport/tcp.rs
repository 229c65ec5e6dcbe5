//! TCP transport: one framed request/reply exchange at a time per connection.
//!
//! Workers run [`serve`] over a bound listener with their service wrapped in
//! a mutex; the master connects through [`TcpConnector`]. There are no
//! timeouts: a hung peer blocks the calling session until the connection
//! drops.

use super::codec::{read_frame, write_frame};
use super::{Connector, Endpoint, MapperClient, ReducerClient, Reply, Request, RequestHandler};
use crate::cluster::{Clusters, KeyValue};
use crate::error::{KmeansError, Result};
use crate::mapper::MapOutput;
use crate::vector::Observations;
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Accept connections forever, answering each on its own thread.
///
/// Returns only if accepting fails.
pub fn serve<H: RequestHandler + 'static>(listener: TcpListener, handler: Arc<H>) -> Result<()> {
    let local = listener.local_addr()?;
    info!(%local, "worker is listening");

    for stream in listener.incoming() {
        let stream = stream?;
        let handler = Arc::clone(&handler);
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            if let Err(e) = handle_connection(stream, handler.as_ref()) {
                warn!(?peer, error = %e, "connection closed with error");
            }
        });
    }
    Ok(())
}

fn handle_connection<H: RequestHandler + ?Sized>(stream: TcpStream, handler: &H) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        // The body is consumed before decoding, so a bad body leaves the
        // stream aligned on the next frame.
        let reply = match read_frame::<_, Request>(&mut reader) {
            Ok(Some(request)) => {
                debug!(op = request.name(), "request received");
                handler.handle(request)
            }
            Ok(None) => return Ok(()),
            Err(KmeansError::Serialization(msg)) => {
                warn!(error = %msg, "rejecting undecodable request");
                Reply::Error(format!("malformed request: {}", msg))
            }
            Err(e) => return Err(e),
        };
        write_frame(&mut writer, &reply)?;
    }
}

/// Connects to workers over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    fn open(endpoint: &Endpoint) -> Result<TcpSession> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .map_err(|e| KmeansError::worker_unavailable(endpoint, e.to_string()))?;
        stream.set_nodelay(true)?;
        Ok(TcpSession {
            endpoint: endpoint.clone(),
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }
}

impl Connector for TcpConnector {
    fn connect_mapper(&self, endpoint: &Endpoint) -> Result<Box<dyn MapperClient>> {
        Ok(Box::new(Self::open(endpoint)?))
    }

    fn connect_reducer(&self, endpoint: &Endpoint) -> Result<Box<dyn ReducerClient>> {
        Ok(Box::new(Self::open(endpoint)?))
    }
}

struct TcpSession {
    endpoint: Endpoint,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpSession {
    fn call(&mut self, request: &Request) -> Result<Reply> {
        write_frame(&mut self.writer, request)?;
        match read_frame::<_, Reply>(&mut self.reader)? {
            Some(Reply::Error(msg)) => Err(KmeansError::Remote(msg)),
            Some(reply) => Ok(reply),
            None => Err(KmeansError::worker_unavailable(
                &self.endpoint,
                "connection closed by peer",
            )),
        }
    }
}

fn unexpected(op: &str, reply: Reply) -> KmeansError {
    KmeansError::protocol(format!("unexpected reply to {}: {:?}", op, reply))
}

impl MapperClient for TcpSession {
    fn init_obs(&mut self, observations: Observations) -> Result<()> {
        match self.call(&Request::InitObs(observations))? {
            Reply::Ack => Ok(()),
            other => Err(unexpected("InitObs", other)),
        }
    }

    fn map(&mut self, clusters: &Clusters) -> Result<MapOutput> {
        match self.call(&Request::Map(clusters.clone()))? {
            Reply::Mapped(out) => Ok(out),
            other => Err(unexpected("Map", other)),
        }
    }
}

impl ReducerClient for TcpSession {
    fn init_reducer(&mut self, clusters: &Clusters) -> Result<()> {
        match self.call(&Request::InitReducer(clusters.clone()))? {
            Reply::Ack => Ok(()),
            other => Err(unexpected("InitReducer", other)),
        }
    }

    fn reduce(&mut self, aggregates: Vec<KeyValue>) -> Result<Clusters> {
        match self.call(&Request::Reduce(aggregates))? {
            Reply::Clusters(clusters) => Ok(clusters),
            other => Err(unexpected("Reduce", other)),
        }
    }
}
