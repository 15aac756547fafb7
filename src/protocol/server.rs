use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
    num::NonZeroUsize,
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::storage::{BackingStore, StorageError};

use super::{
    Opcode, ProtocolTransport, RequestHeader, Status, ThreadPool, allocate,
    transport::TransportError,
};

/// Conditions that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to prepare backing store: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("listener io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub storage: PathBuf,
    pub capacity: u64,
    /// Serve connections from a fixed pool instead of one thread each.
    pub workers: Option<NonZeroUsize>,
}

impl ServerConfig {
    pub fn new(address: SocketAddr, storage: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            address,
            storage: storage.into(),
            capacity,
            workers: None,
        }
    }

    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = Some(workers);
        self
    }
}

/// Sockets of connections currently being served, so shutdown can close them.
#[derive(Debug, Default)]
struct Connections {
    next: AtomicU64,
    live: Mutex<HashMap<u64, TcpStream>>,
}

impl Connections {
    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let handle = stream.try_clone().ok()?;
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        Some(id)
    }

    fn release(&self, id: u64) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn close_all(&self) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, stream) in live.drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Stops a running [`BlockServer`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    address: SocketAddr,
    running: Arc<AtomicBool>,
    connections: Arc<Connections>,
}

impl ShutdownHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops accepting, closes every live connection and wakes the accept loop.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("shutting down listener at {}", self.address);
        self.connections.close_all();

        let mut wake = self.address;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        if let Err(e) = TcpStream::connect(wake) {
            debug!("failed to wake listener: {e}");
        }
    }
}

/// Listens for block clients and serves each connection on its own worker.
pub struct BlockServer {
    address: SocketAddr,
    listener: TcpListener,
    store: Arc<BackingStore>,
    pool: Option<ThreadPool>,
    running: Arc<AtomicBool>,
    connections: Arc<Connections>,
}

impl BlockServer {
    /// Prepares the backing store and binds the listening socket. Either failing
    /// is fatal.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let store = BackingStore::open(&config.storage, config.capacity)?;
        let listener = TcpListener::bind(config.address).map_err(|source| ServerError::Bind {
            address: config.address,
            source,
        })?;
        let address = listener.local_addr()?;

        Ok(Self {
            address,
            listener,
            store: Arc::new(store),
            pool: config.workers.map(|n| ThreadPool::new(n.get())),
            running: Arc::new(AtomicBool::new(true)),
            connections: Arc::new(Connections::default()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            address: self.address,
            running: Arc::clone(&self.running),
            connections: Arc::clone(&self.connections),
        }
    }

    /// Accepts connections until [`ShutdownHandle::shutdown`] is called.
    pub fn listen(self) {
        info!(
            "listening at {} serving {} ({} bytes)",
            self.address,
            self.store.path().display(),
            self.store.capacity()
        );
        match &self.pool {
            Some(pool) => info!("handling connections on {} workers", pool.size()),
            None => info!("handling each connection on its own thread"),
        }

        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => self.dispatch(stream),
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        info!("listener at {} stopped", self.address);
    }

    fn dispatch(&self, stream: TcpStream) {
        let Some(id) = self.connections.register(&stream) else {
            warn!("failed to track connection, dropping it");
            return;
        };

        let store = Arc::clone(&self.store);
        let connections = Arc::clone(&self.connections);
        let job = move || {
            serve_connection(stream, &store);
            connections.release(id);
        };

        let dispatched = match &self.pool {
            Some(pool) => pool
                .execute(job)
                .inspect_err(|e| warn!("failed to queue connection {id}: {e}"))
                .is_ok(),
            None => thread::Builder::new()
                .name(format!("netblk-conn-{id}"))
                .spawn(job)
                .inspect_err(|e| warn!("failed to spawn handler for connection {id}: {e}"))
                .is_ok(),
        };

        if !dispatched {
            self.connections.release(id);
        }
    }
}

/// Runs the request loop for one accepted socket until it ends.
pub(crate) fn serve_connection(stream: TcpStream, store: &BackingStore) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| String::from("unknown peer"));
    info!("client connected: {peer}");

    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY for {peer}: {e}");
    }

    let mut transport = ProtocolTransport::new(stream);
    match handle_connection(&mut transport, store) {
        Ok(()) => info!("disconnect requested by {peer}"),
        Err(TransportError::ConnectionClosed) => debug!("connection closed by {peer}"),
        Err(e) => warn!("dropping connection to {peer}: {e}"),
    }
    info!("client disconnected: {peer}");
}

/// Serves requests until the client disconnects. Request-level failures are
/// answered with [`Status::Error`] and the loop continues; only transport
/// failures end it.
fn handle_connection<T: Read + Write>(
    transport: &mut ProtocolTransport<T>,
    store: &BackingStore,
) -> Result<(), TransportError> {
    loop {
        let req = transport.read_request()?;

        match req.opcode {
            Opcode::Disconnect => return Ok(()),
            Opcode::Read => handle_read(transport, store, req)?,
            Opcode::Write => handle_write(transport, store, req)?,
        }
    }
}

fn handle_read<T: Read + Write>(
    transport: &mut ProtocolTransport<T>,
    store: &BackingStore,
    req: RequestHeader,
) -> Result<(), TransportError> {
    debug!("READ: sector={}, length={}", req.sector, req.length);

    let offset = match store.check_bounds(req.sector, req.length) {
        Ok(offset) => offset,
        Err(e) => {
            warn!("rejecting read: {e}");
            return transport.write_response(Status::Error);
        }
    };

    let Some(mut buf) = allocate(req.length as usize) else {
        warn!("rejecting read: failed to allocate {} bytes", req.length);
        return transport.write_response(Status::Error);
    };

    if let Err(e) = store.read_at(offset, &mut buf) {
        warn!("rejecting read: {e}");
        return transport.write_response(Status::Error);
    }

    transport.write_response(Status::Ok)?;
    transport.write_payload(&buf)
}

fn handle_write<T: Read + Write>(
    transport: &mut ProtocolTransport<T>,
    store: &BackingStore,
    req: RequestHeader,
) -> Result<(), TransportError> {
    debug!("WRITE: sector={}, length={}", req.sector, req.length);

    // The announced payload is on the wire whatever we decide; it must be
    // consumed before answering or the next header is read from the middle of it.
    let offset = match store.check_bounds(req.sector, req.length) {
        Ok(offset) => offset,
        Err(e) => {
            warn!("rejecting write: {e}");
            transport.discard_payload(u64::from(req.length))?;
            return transport.write_response(Status::Error);
        }
    };

    let Some(mut buf) = allocate(req.payload_len()) else {
        warn!("rejecting write: failed to allocate {} bytes", req.length);
        transport.discard_payload(u64::from(req.length))?;
        return transport.write_response(Status::Error);
    };
    transport.read_payload_into(&mut buf)?;

    match store.write_at(offset, &buf) {
        Ok(()) => transport.write_response(Status::Ok),
        Err(e) => {
            warn!("rejecting write: {e}");
            transport.write_response(Status::Error)
        }
    }
}
