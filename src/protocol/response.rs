use bincode::{Decode, Encode, decode_from_slice, encode_into_slice};

use super::{RESPONSE_HEADER_SIZE, transport::TransportError, wire_config};

/// Outcome byte sent back for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x01,
}

#[derive(Debug, Encode, Decode)]
struct WireResponse {
    status: u8,
}

impl TryFrom<u8> for Status {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, TransportError> {
        match value {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Error),
            other => Err(TransportError::UnknownStatus(other)),
        }
    }
}

impl Status {
    pub fn encode(self) -> Result<[u8; RESPONSE_HEADER_SIZE], TransportError> {
        let mut out = [0; RESPONSE_HEADER_SIZE];
        encode_into_slice(WireResponse { status: self as u8 }, &mut out, wire_config())?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8; RESPONSE_HEADER_SIZE]) -> Result<Self, TransportError> {
        let (wire, _): (WireResponse, usize) = decode_from_slice(bytes, wire_config())?;
        wire.status.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bytes() {
        assert_eq!(Status::Ok.encode().unwrap(), [0x00]);
        assert_eq!(Status::Error.encode().unwrap(), [0x01]);
    }

    #[test]
    fn decode_status() {
        assert_eq!(Status::decode(&[0x00]).unwrap(), Status::Ok);
        assert_eq!(Status::decode(&[0x01]).unwrap(), Status::Error);
        assert!(matches!(
            Status::decode(&[0x02]),
            Err(TransportError::UnknownStatus(0x02))
        ));
    }
}
