use std::io::{self, Read, Write};

use thiserror::Error;

use super::{REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, RequestHeader, Status};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("unknown command byte 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unknown status byte 0x{0:02x}")]
    UnknownStatus(u8),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("transport io error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            // `read_exact` hit a zero-byte read, or `write_all` a zero-byte write.
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => {
                TransportError::ConnectionClosed
            }
            _ => TransportError::Io(value),
        }
    }
}

/// Framed access to a bidirectional byte stream.
///
/// Every send transfers the whole buffer and every receive fills the whole
/// buffer, or the call fails. A peer that closes mid-transfer surfaces as
/// [`TransportError::ConnectionClosed`].
#[derive(Debug)]
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    pub fn write_request(&mut self, header: &RequestHeader) -> Result<(), TransportError> {
        let bytes = header.encode()?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_request(&mut self) -> Result<RequestHeader, TransportError> {
        let mut bytes = [0; REQUEST_HEADER_SIZE];
        self.stream.read_exact(&mut bytes)?;
        RequestHeader::decode(&bytes)
    }

    pub fn write_response(&mut self, status: Status) -> Result<(), TransportError> {
        let bytes = status.encode()?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_response(&mut self) -> Result<Status, TransportError> {
        let mut bytes = [0; RESPONSE_HEADER_SIZE];
        self.stream.read_exact(&mut bytes)?;
        Status::decode(&bytes)
    }

    pub fn write_payload(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Fills `buf` completely from the stream.
    pub fn read_payload_into(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Consumes and throws away exactly `length` payload bytes, keeping the
    /// stream aligned on the next header.
    pub fn discard_payload(&mut self, length: u64) -> Result<(), TransportError> {
        let drained = io::copy(&mut (&mut self.stream).take(length), &mut io::sink())?;
        if drained < length {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;

    /// Reader that hands out at most one byte per call.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport
            .write_request(&RequestHeader::write(7, 1024))
            .unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let req = transport.read_request().unwrap();
        assert_eq!(req, RequestHeader::write(7, 1024));
    }

    #[test]
    fn read_write_response() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport.write_response(Status::Error).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let resp = transport.read_response().unwrap();
        assert_eq!(resp, Status::Error);
    }

    #[test]
    fn short_reads_are_looped() {
        let bytes = RequestHeader::read(3, 512).encode().unwrap().to_vec();
        let mut transport = ProtocolTransport::new(Trickle(Cursor::new(bytes)));

        assert_eq!(
            transport.read_request().unwrap(),
            RequestHeader::read(3, 512)
        );
    }

    #[test]
    fn truncated_header_is_connection_closed() {
        let bytes = RequestHeader::read(3, 512).encode().unwrap()[..5].to_vec();
        let mut transport = ProtocolTransport::new(Cursor::new(bytes));

        assert!(matches!(
            transport.read_request(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn empty_stream_is_connection_closed() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));

        assert!(matches!(
            transport.read_response(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn discard_keeps_stream_aligned() {
        let mut bytes = vec![0xEE; 100];
        bytes.extend_from_slice(&Status::Ok.encode().unwrap());
        let mut transport = ProtocolTransport::new(Trickle(Cursor::new(bytes)));

        transport.discard_payload(100).unwrap();
        assert_eq!(transport.read_response().unwrap(), Status::Ok);
    }

    #[test]
    fn discard_short_payload() {
        let mut transport = ProtocolTransport::new(Cursor::new(vec![0; 10]));

        assert!(matches!(
            transport.discard_payload(11),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
