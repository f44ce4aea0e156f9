//! Datagram framing: `[u16 LE size][u8 type][payload]`, little-endian
//! integers, NUL-terminated strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::PacketType;

/// Size of the `[u16 size][u8 type]` header.
pub const HEADER_SIZE: usize = 3;

/// Largest datagram either side ever sends or expects to receive.
pub const SEND_MTU: usize = 1460;

/// Upper bound for strings read off the wire, terminator included.
pub const NETWORK_NAME_LENGTH: usize = 80;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram of {0} bytes is shorter than the packet header")]
    TooShort(usize),
    #[error("declared packet size {declared} does not match datagram length {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("unexpected end of packet")]
    UnexpectedEof,
    #[error("string is not NUL-terminated")]
    UnterminatedString,
    #[error("unknown server list type {0}")]
    UnknownListType(u8),
    #[error("unknown server list version {0}")]
    UnknownListVersion(u8),
}

/// Builds one outbound packet. The size field is patched in by [`PacketWriter::finish`].
#[derive(Debug)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new(packet_type: PacketType) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(0);
        buf.put_u8(packet_type as u8);
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn put_string(&mut self, value: &str) {
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
    }

    /// Current size of the packet including the header
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Overwrites a previously written little-endian u16 at `offset`.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn finish(mut self) -> Bytes {
        let size = u16::try_from(self.buf.len()).unwrap_or(u16::MAX);
        self.patch_u16(0, size);
        self.buf.freeze()
    }
}

/// Cursor over the payload of one validated inbound packet.
#[derive(Debug, Clone)]
pub struct PacketReader {
    packet_type: PacketType,
    payload: Bytes,
}

impl PacketReader {
    /// Validates the header of `datagram` and positions the cursor at the payload.
    pub fn parse(datagram: &[u8]) -> Result<Self, DecodeError> {
        if datagram.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort(datagram.len()));
        }

        let mut header = &datagram[..HEADER_SIZE];
        let declared = header.get_u16_le() as usize;
        if declared != datagram.len() {
            return Err(DecodeError::SizeMismatch {
                declared,
                actual: datagram.len(),
            });
        }

        let tag = header.get_u8();
        let packet_type = PacketType::try_from(tag)?;

        Ok(Self {
            packet_type,
            payload: Bytes::copy_from_slice(&datagram[HEADER_SIZE..]),
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn remaining(&self) -> usize {
        self.payload.remaining()
    }

    fn ensure(&self, len: usize) -> Result<(), DecodeError> {
        if self.payload.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.payload.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.payload.get_u16_le())
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.payload.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Reads a NUL-terminated string. Characters past `max_len - 1` are
    /// consumed but dropped, mirroring a fixed-size receive buffer.
    pub fn get_string(&mut self, max_len: usize) -> Result<String, DecodeError> {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString)?;

        let raw = self.payload.split_to(end);
        self.payload.advance(1);

        let keep = raw.len().min(max_len.saturating_sub(1));
        Ok(String::from_utf8_lossy(&raw[..keep]).into_owned())
    }
}
