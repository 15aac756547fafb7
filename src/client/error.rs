use std::io;

use thiserror::Error;

use crate::protocol::{Opcode, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server rejected {opcode:?} of {length} bytes at sector {sector}")]
    Rejected {
        opcode: Opcode,
        sector: u64,
        length: u32,
    },

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    #[error("{length} bytes at sector {sector} is beyond the {size} byte device")]
    OutOfRange { sector: u64, length: u32, size: u64 },

    #[error("payload of {0} bytes does not fit the 32-bit length field")]
    PayloadTooLarge(usize),

    #[error("failed to allocate a {0} byte buffer")]
    Allocation(usize),

    #[error("device is shutting down")]
    Stopped,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// Whether the failure came from the connection rather than from the request,
    /// so reconnecting and sending again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connect(_) | ClientError::Transport(_))
    }
}
