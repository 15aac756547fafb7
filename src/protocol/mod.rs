//! Client-server block protocol.
//!
//! This module defines the wire protocol spoken between a [`Device`](crate::client::Device)
//! and a [`BlockServer`], including the packet layouts, the framing primitives used to move
//! them over a byte stream, and the server side that answers them.
//!
//! # Overview
//!
//! Every exchange is a strict request/response pair. A client sends one request header
//! (optionally followed by a payload) and waits for one response header (optionally followed
//! by a payload) before it sends anything else on the same connection. There is no
//! pipelining, and no request identifiers are needed.
//!
//! # Binary Format
//!
//! All multi-byte integers are big-endian regardless of the host.
//!
//! Request header, 13 bytes:
//!
//! | offset | size | field    |
//! |--------|------|----------|
//! | 0      | 1    | `cmd`    |
//! | 1      | 8    | `sector` |
//! | 9      | 4    | `length` |
//!
//! A `WRITE` header is followed by exactly `length` payload bytes.
//!
//! Response header, 1 byte: `status`. A successful `READ` response is followed by exactly
//! the requested `length` payload bytes; every other response is the header alone.
//!
//! | `cmd`  | meaning      |   | `status` | meaning |
//! |--------|--------------|---|----------|---------|
//! | `0x01` | `READ`       |   | `0x00`   | `OK`    |
//! | `0x02` | `WRITE`      |   | `0x01`   | `ERROR` |
//! | `0x03` | `DISCONNECT` |   |          |         |
//!
//! # Key Components
//!
//! - [`RequestHeader`] and [`Opcode`]: the request side of the codec.
//! - [`Status`]: the response side of the codec.
//! - [`ProtocolTransport`]: full-transfer send/receive over any `Read + Write` stream.
//! - [`BlockServer`]: listener that hands every connection to its own handler.
//!
//! # See Also
//!
//! - [`storage`](crate::storage): backing store the server reads from and writes to.
use bincode::config::{BigEndian, Configuration, Fixint};

mod request;
mod response;
mod server;
mod thread;
mod transport;

use thread::ThreadPool;

pub use request::{Opcode, RequestHeader};
pub use response::Status;
pub use server::{BlockServer, ServerConfig, ServerError, ShutdownHandle};
pub use transport::{ProtocolTransport, TransportError};

#[cfg(test)]
pub(crate) use server::serve_connection;

/// Size of one addressable sector in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Encoded size of a [`RequestHeader`].
pub const REQUEST_HEADER_SIZE: usize = 13;

/// Encoded size of a response header.
pub const RESPONSE_HEADER_SIZE: usize = 1;

/// Encoding shared by both ends of the connection; fixed-width big-endian integers.
fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn allocate(length: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(length).ok()?;
    buf.resize(length, 0);
    Some(buf)
}
