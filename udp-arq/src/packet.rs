//! Wire-format definitions for data packets and acknowledgments.
//!
//! Every datagram the sender emits is a [`Packet`]; every datagram the
//! receiver emits is an [`Ack`].  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, flag bit, payload).
//! - Serialising a [`Packet`] / [`Ack`] into a byte buffer.
//! - Deserialising raw bytes back, returning errors for truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Sequence Number        |     Flags    F|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              Payload (0..=1024 bytes) ...     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `F` (bit 0 of the flags byte) marks the final packet of a transfer.
//!
//! An acknowledgment is just the 2-byte sequence number.  Under Go-Back-N it
//! is cumulative; under Selective-Repeat it names a single packet.
//!
//! There is no checksum: the datagram layer is assumed to either deliver a
//! datagram intact or drop it.

use thiserror::Error;

/// Bit-flag constants for the flags byte.
pub mod flags {
    /// This packet carries the last chunk of the file.
    pub const FINAL: u8 = 0b0000_0001;
}

/// Byte length of the fixed-size data header on the wire.
pub const HEADER_LEN: usize = 3;

/// Byte length of an acknowledgment datagram.
pub const ACK_LEN: usize = 2;

/// Largest payload a single packet may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Largest well-formed data datagram.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

const OFF_SEQ: usize = 0;
const OFF_FLAGS: usize = 2;

/// A data datagram: one chunk of the file plus its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u16,
    pub is_final: bool,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq: u16, is_final: bool, payload: Vec<u8>) -> Self {
        Self {
            seq,
            is_final,
            payload,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.seq, self.is_final, &self.payload)
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the payload is longer than [`MAX_PAYLOAD`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::MalformedFrame { len: buf.len() });
        }
        let payload = &buf[HEADER_LEN..];
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge { len: payload.len() });
        }

        Ok(Packet {
            seq: u16::from_be_bytes([buf[OFF_SEQ], buf[OFF_SEQ + 1]]),
            is_final: buf[OFF_FLAGS] & flags::FINAL != 0,
            payload: payload.to_vec(),
        })
    }
}

/// Encode a data packet straight from borrowed parts.
///
/// The sender keeps its chunks in the chunk store, so retransmissions go
/// through here without cloning the payload into a [`Packet`] first.
pub fn encode(seq: u16, is_final: bool, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD,
        "payload of {} bytes exceeds MAX_PAYLOAD",
        payload.len()
    );
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.push(if is_final { flags::FINAL } else { 0 });
    buf.extend_from_slice(payload);
    buf
}

/// An acknowledgment datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub seq: u16,
}

impl Ack {
    pub fn new(seq: u16) -> Self {
        Self { seq }
    }

    pub fn encode(&self) -> [u8; ACK_LEN] {
        self.seq.to_be_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let bytes: [u8; ACK_LEN] = buf
            .try_into()
            .map_err(|_| PacketError::MalformedAck { len: buf.len() })?;
        Ok(Ack {
            seq: u16::from_be_bytes(bytes),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the fixed header.
    #[error("malformed frame: {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    MalformedFrame { len: usize },
    /// Payload longer than one chunk.
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLarge { len: usize },
    /// Acknowledgment datagram of the wrong size.
    #[error("malformed ack: expected {ACK_LEN} bytes, got {len}")]
    MalformedAck { len: usize },
}
