use bincode::{Decode, Encode, decode_from_slice, encode_into_slice};

use super::{REQUEST_HEADER_SIZE, SECTOR_SIZE, transport::TransportError, wire_config};

/// Command carried in the first byte of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Read = 0x01,
    Write = 0x02,
    Disconnect = 0x03,
}

impl TryFrom<u8> for Opcode {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Opcode::Read),
            0x02 => Ok(Opcode::Write),
            0x03 => Ok(Opcode::Disconnect),
            other => Err(TransportError::UnknownOpcode(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}

/// Fixed-size request header. A `WRITE` header is followed on the wire by
/// exactly `length` payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Opcode,
    pub sector: u64,
    pub length: u32,
}

/// On-wire shape of a request header.
#[derive(Debug, Encode, Decode)]
struct WireRequest {
    cmd: u8,
    sector: u64,
    length: u32,
}

impl RequestHeader {
    pub fn read(sector: u64, length: u32) -> Self {
        Self {
            opcode: Opcode::Read,
            sector,
            length,
        }
    }

    pub fn write(sector: u64, length: u32) -> Self {
        Self {
            opcode: Opcode::Write,
            sector,
            length,
        }
    }

    pub fn disconnect() -> Self {
        Self {
            opcode: Opcode::Disconnect,
            sector: 0,
            length: 0,
        }
    }

    /// Byte offset addressed by `sector`, or `None` if it does not fit in a `u64`.
    pub fn byte_offset(&self) -> Option<u64> {
        self.sector.checked_mul(SECTOR_SIZE)
    }

    /// Number of payload bytes that follow this header on the wire.
    pub fn payload_len(&self) -> usize {
        match self.opcode {
            Opcode::Write => self.length as usize,
            Opcode::Read | Opcode::Disconnect => 0,
        }
    }

    pub fn encode(&self) -> Result<[u8; REQUEST_HEADER_SIZE], TransportError> {
        let wire = WireRequest {
            cmd: self.opcode.into(),
            sector: self.sector,
            length: self.length,
        };
        let mut out = [0; REQUEST_HEADER_SIZE];
        let written = encode_into_slice(wire, &mut out, wire_config())?;
        debug_assert_eq!(written, REQUEST_HEADER_SIZE);
        Ok(out)
    }

    pub fn decode(bytes: &[u8; REQUEST_HEADER_SIZE]) -> Result<Self, TransportError> {
        let (wire, _): (WireRequest, usize) = decode_from_slice(bytes, wire_config())?;
        Ok(Self {
            opcode: wire.cmd.try_into()?,
            sector: wire.sector,
            length: wire.length,
        })
    }
}
