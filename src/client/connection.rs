use std::{
    fmt, io,
    net::{Shutdown, TcpStream},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{debug, info, warn};
use socket2::SockRef;

use super::{ClientError, Endpoint};
use crate::protocol::{ProtocolTransport, RequestHeader, TransportError};

/// Lifecycle of the device's connection.
///
/// ```text
/// Disconnected --connect--> Connecting --ok--> Connected
///                           Connecting --fail--> Error --retry--> Connecting
/// Connected --disconnect or transport failure--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one connection a device owns. Callers hold the device lock for the
/// whole time they use it.
#[derive(Debug)]
pub(crate) struct Connection {
    endpoint: Endpoint,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
    state: ConnectionState,
    transport: Option<ProtocolTransport<TcpStream>>,
}

impl Connection {
    pub fn new(
        endpoint: Endpoint,
        connect_timeout: Duration,
        io_timeout: Option<Duration>,
    ) -> Self {
        Self {
            endpoint,
            connect_timeout,
            io_timeout,
            state: ConnectionState::Disconnected,
            transport: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Takes effect on the next connection attempt.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        info!("server endpoint set to {endpoint}");
        self.endpoint = endpoint;
    }

    /// Returns the live transport, connecting first if there is none.
    pub fn ensure_connected(
        &mut self,
        stop: &AtomicBool,
    ) -> Result<&mut ProtocolTransport<TcpStream>, ClientError> {
        if stop.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }

        if self.state != ConnectionState::Connected || self.transport.is_none() {
            info!("connecting to {}", self.endpoint);
            self.state = ConnectionState::Connecting;

            match self.open() {
                Ok(stream) => {
                    self.transport = Some(ProtocolTransport::new(stream));
                    self.state = ConnectionState::Connected;
                    info!("connected to {}", self.endpoint);
                }
                Err(e) => {
                    self.transport = None;
                    self.state = ConnectionState::Error;
                    warn!("failed to connect to {}: {e}", self.endpoint);
                    return Err(ClientError::Connect(e));
                }
            }
        }

        self.transport
            .as_mut()
            .ok_or(ClientError::Transport(TransportError::ConnectionClosed))
    }

    fn open(&self) -> io::Result<TcpStream> {
        let mut last = None;

        for addr in self.endpoint.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    SockRef::from(&stream).set_keepalive(true)?;
                    stream.set_read_timeout(self.io_timeout)?;
                    stream.set_write_timeout(self.io_timeout)?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last = Some(e);
                }
            }
        }

        Err(last.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.endpoint),
            )
        }))
    }

    /// Best-effort `DISCONNECT`, then closes the socket.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.write_request(&RequestHeader::disconnect()) {
                debug!("failed to send disconnect: {e}");
            }
            let _ = transport.get_ref().shutdown(Shutdown::Both);
        }

        if self.state != ConnectionState::Disconnected {
            info!("disconnected from {}", self.endpoint);
        }
        self.state = ConnectionState::Disconnected;
    }
}
