//! Frame format for messages on the wire.
//!
//! ```text
//! [MAGIC 4B "KMR\0"][VERSION u32][LEN u32][CHECKSUM u32][BODY bincode, LEN bytes]
//! ```
//!
//! All integers are little-endian. The checksum is CRC32 of the body.

use crate::constants::wire::{MAGIC, MAX_FRAME_LEN, PROTOCOL_VERSION};
use crate::error::{KmeansError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};

/// Frame header preceding every message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Magic bytes (must be MAGIC)
    pub magic: [u8; 4],
    /// Protocol version
    pub version: u32,
    /// Body length in bytes
    pub len: u32,
    /// CRC32 checksum of the body
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 16;

    /// Create a header for a body of `len` bytes.
    pub fn new(len: u32, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            len,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.len.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize and verify a header.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Result<Self> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != MAGIC {
            return Err(KmeansError::protocol("invalid magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let checksum = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        if version > PROTOCOL_VERSION {
            return Err(KmeansError::protocol(format!(
                "unsupported version {} (max supported: {})",
                version, PROTOCOL_VERSION
            )));
        }
        if len > MAX_FRAME_LEN {
            return Err(KmeansError::protocol(format!(
                "frame of {} bytes exceeds limit of {}",
                len, MAX_FRAME_LEN
            )));
        }

        Ok(Self {
            magic,
            version,
            len,
            checksum,
        })
    }
}

/// Encode `message` and write it as one frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = bincode::serialize(message)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|&len| len <= MAX_FRAME_LEN)
        .ok_or_else(|| KmeansError::protocol(format!("message of {} bytes is too large", body.len())))?;

    let header = FrameHeader::new(len, crc32fast::hash(&body));
    writer.write_all(&header.to_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and decode its body.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly between frames.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    if !read_exact_or_eof(reader, &mut header_buf)? {
        return Ok(None);
    }
    let header = FrameHeader::from_bytes(&header_buf)?;

    let mut body = vec![0u8; header.len as usize];
    reader.read_exact(&mut body)?;
    if crc32fast::hash(&body) != header.checksum {
        return Err(KmeansError::ChecksumMismatch);
    }

    Ok(Some(bincode::deserialize(&body)?))
}

/// Like `read_exact`, but a stream that ends before the first byte is `Ok(false)`.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Clusters, KeyValue};
    use crate::transport::{Reply, Request};
    use crate::vector::Coordinates;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::new(42, 0x12345678);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"KMR\0");
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = FrameHeader::new(0, 0).to_bytes();
        bytes[0..4].copy_from_slice(b"BAD\0");
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(KmeansError::Protocol(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let bytes = FrameHeader::new(MAX_FRAME_LEN + 1, 0).to_bytes();
        assert!(FrameHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_frames_in_sequence() {
        let cc = Clusters::new(vec![Coordinates::from([1.0, 2.0])]).unwrap();
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Map(cc.clone())).unwrap();
        write_frame(&mut buf, &Reply::Clusters(cc.clone())).unwrap();

        let mut cursor = Cursor::new(buf);
        let first: Request = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first, Request::Map(cc.clone()));
        let second: Reply = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(second, Reply::Clusters(cc));
        let end: Option<Reply> = read_frame(&mut cursor).unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn test_corrupted_body_detected() {
        let kvs = vec![KeyValue::new(0, Coordinates::from([3.0, 4.0]), 2)];
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Reduce(kvs)).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let result: Result<Option<Request>> = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(KmeansError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Reply::Ack).unwrap();
        buf.truncate(FrameHeader::SIZE - 3);

        let result: Result<Option<Reply>> = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(KmeansError::Io(_))));
    }
}
