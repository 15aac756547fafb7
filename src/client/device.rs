use std::{
    net::TcpStream,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::{debug, error, info, warn};

use super::{
    ClientError, ConnectionState, DeviceConfig, Endpoint, RetryPolicy, Stats,
    connection::Connection, stats::Counters,
};
use crate::protocol::{Opcode, ProtocolTransport, RequestHeader, SECTOR_SIZE, Status, allocate};

/// A remote block volume.
///
/// One connection, one request in flight: every read or write holds the
/// connection lock from the first byte sent to the last byte received.
#[derive(Debug)]
pub struct Device {
    size: u64,
    retry: RetryPolicy,
    connection: Mutex<Connection>,
    stop: AtomicBool,
    counters: Counters,
}

impl Device {
    /// Creates a disconnected device. Nothing is sent until the first request
    /// or an explicit [`Device::connect`].
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            size: config.size,
            retry: config.retry,
            connection: Mutex::new(Connection::new(
                config.endpoint,
                config.connect_timeout,
                config.io_timeout,
            )),
            stop: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn endpoint(&self) -> Endpoint {
        self.lock().endpoint().clone()
    }

    /// Points the device at a new server. An open connection is kept until it
    /// is dropped; the new endpoint is used from the next connection attempt.
    pub fn set_endpoint(&self, host: &str, port: u16) -> Result<(), ClientError> {
        let endpoint = Endpoint::new(host, port)?;
        self.lock().set_endpoint(endpoint);
        Ok(())
    }

    /// Connects now instead of on the first request. A single attempt, no retries.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.lock().ensure_connected(&self.stop).map(|_| ())
    }

    pub fn disconnect(&self) {
        self.lock().disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// Aborts pending reconnect loops and closes the connection. Every later
    /// request fails with [`ClientError::Stopped`].
    pub fn shutdown(&self) {
        info!("shutting down device");
        self.stop.store(true, Ordering::SeqCst);
        self.disconnect();
    }

    /// Reads `length` bytes starting at `sector`.
    pub fn read(&self, sector: u64, length: u32) -> Result<Vec<u8>, ClientError> {
        self.check_range(sector, length)?;
        let mut buf = allocate(length as usize).ok_or(ClientError::Allocation(length as usize))?;

        let header = RequestHeader::read(sector, length);
        self.submit(header, |transport| {
            transport.write_request(&header)?;
            expect_ok(transport, header)?;
            transport.read_payload_into(&mut buf)?;
            Ok(())
        })?;

        Ok(buf)
    }

    /// Writes `data` starting at `sector`. Returns once the server has synced it.
    pub fn write(&self, sector: u64, data: &[u8]) -> Result<(), ClientError> {
        let length =
            u32::try_from(data.len()).map_err(|_| ClientError::PayloadTooLarge(data.len()))?;
        self.check_range(sector, length)?;

        let header = RequestHeader::write(sector, length);
        self.submit(header, |transport| {
            transport.write_request(&header)?;
            transport.write_payload(data)?;
            expect_ok(transport, header)
        })
    }

    /// Fails with [`ClientError::OutOfRange`] unless the range fits the volume.
    pub(crate) fn check_range(&self, sector: u64, length: u32) -> Result<(), ClientError> {
        let in_range = sector
            .checked_mul(SECTOR_SIZE)
            .and_then(|offset| offset.checked_add(u64::from(length)))
            .is_some_and(|end| end <= self.size);

        if in_range {
            Ok(())
        } else {
            Err(ClientError::OutOfRange {
                sector,
                length,
                size: self.size,
            })
        }
    }

    /// Runs one request/response `exchange` under the connection lock, reconnecting
    /// and retrying on transport failure as the retry policy allows.
    fn submit<F>(&self, header: RequestHeader, mut exchange: F) -> Result<(), ClientError>
    where
        F: FnMut(&mut ProtocolTransport<TcpStream>) -> Result<(), ClientError>,
    {
        let attempts = self.retry.attempts();
        let mut failures = 0;

        loop {
            let mut conn = self.lock();
            let res = conn
                .ensure_connected(&self.stop)
                .and_then(|transport| exchange(transport));

            let err = match res {
                Ok(()) => {
                    match header.opcode {
                        Opcode::Read => self.counters.record_read(header.length),
                        Opcode::Write => self.counters.record_write(header.length),
                        Opcode::Disconnect => {}
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() => e,
                Err(ClientError::Stopped) => return Err(ClientError::Stopped),
                Err(e) => {
                    warn!("{e}");
                    self.counters.record_error();
                    return Err(e);
                }
            };

            if conn.state() == ConnectionState::Connected {
                conn.disconnect();
            }
            drop(conn);

            failures += 1;
            if failures >= attempts {
                error!(
                    "{:?} at sector {} failed after {attempts} attempts: {err}",
                    header.opcode, header.sector
                );
                self.counters.record_error();
                return Err(ClientError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.backoff.delay(failures);
            warn!(
                "{:?} at sector {} failed, retry {failures} in {delay:?}: {err}",
                header.opcode, header.sector
            );
            thread::sleep(delay);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        debug!("dropping device");
        self.connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .disconnect();
    }
}

/// Reads the status byte; `ERROR` is a rejection, never retried.
fn expect_ok(
    transport: &mut ProtocolTransport<TcpStream>,
    header: RequestHeader,
) -> Result<(), ClientError> {
    match transport.read_response()? {
        Status::Ok => Ok(()),
        Status::Error => Err(ClientError::Rejected {
            opcode: header.opcode,
            sector: header.sector,
            length: header.length,
        }),
    }
}
