//! Client side of the block protocol.
//!
//! A [`Device`] is the session object an I/O layer talks to. It owns the single TCP
//! connection to the server, serializes every request/response cycle behind one lock,
//! reconnects with a bounded [`RetryPolicy`] when the transport fails, and keeps the
//! [`Stats`] counters.
//!
//! # Failure classes
//!
//! - Transport failures (connect refused, reset, short transfer) are retried. When the
//!   policy is exhausted the caller gets [`ClientError::RetriesExhausted`] and the error
//!   counter is bumped.
//! - A server answering `ERROR` is a [`ClientError::Rejected`] and is returned at once;
//!   sending the same request again would be rejected again.
//! - Range and allocation failures are detected locally before anything is sent.
//!
//! # Example
//! ```no_run
//! use netblk::client::{Device, DeviceConfig};
//!
//! let device = Device::new(DeviceConfig::default());
//! device.set_endpoint("10.0.0.2", 10809).unwrap();
//!
//! device.write(0, &[0xAA; 512]).unwrap();
//! assert_eq!(device.read(0, 512).unwrap(), vec![0xAA; 512]);
//! ```
mod config;
mod connection;
mod device;
mod error;
mod stats;

pub use config::{
    Backoff, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_SIZE, DeviceConfig, Endpoint,
    Geometry, RetryPolicy,
};
pub use connection::ConnectionState;
pub use device::Device;
pub use error::ClientError;
pub use stats::Stats;
