//! Splitting a file into numbered chunks and stitching it back together.
//!
//! Sequence numbers start at [`SEQ_ORIGIN`] and are dense: chunk `k` of the
//! file (0-based) travels as sequence `SEQ_ORIGIN + k`.  Every chunk is
//! exactly [`CHUNK_SIZE`] bytes except the last, which may be shorter (or
//! empty, for an empty file).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// First sequence number of every transfer.
pub const SEQ_ORIGIN: u16 = 1;

/// Payload bytes per chunk.
pub const CHUNK_SIZE: usize = MAX_PAYLOAD;

/// Number of chunks addressable by a 16-bit sequence number starting at
/// [`SEQ_ORIGIN`].
pub const MAX_CHUNKS: usize = u16::MAX as usize - SEQ_ORIGIN as usize + 1;

/// Largest file that fits the sequence space.
pub const MAX_FILE_SIZE: u64 = (MAX_CHUNKS * CHUNK_SIZE) as u64;

/// Errors raised by the chunk store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// The input needs more chunks than there are sequence numbers.
    #[error("file of {size} bytes exceeds the {MAX_FILE_SIZE}-byte limit of the sequence space")]
    TooLarge { size: u64 },
    /// A sequence number inside the requested range was never received.
    #[error("reassembly gap: sequence {seq} missing")]
    Gap { seq: u16 },
}

/// Check a file size against [`MAX_FILE_SIZE`] without reading the file.
pub fn check_size(size: u64) -> Result<(), ChunkError> {
    if size > MAX_FILE_SIZE {
        Err(ChunkError::TooLarge { size })
    } else {
        Ok(())
    }
}

/// The immutable, ordered set of chunks for one outbound transfer.
#[derive(Debug, Clone)]
pub struct ChunkMap {
    chunks: Vec<Vec<u8>>,
    total_bytes: u64,
}

impl ChunkMap {
    /// Split `data` into [`CHUNK_SIZE`]-byte chunks.
    ///
    /// An empty input still yields one (empty) chunk so that exactly one
    /// final packet exists.
    pub fn split(data: &[u8]) -> Result<Self, ChunkError> {
        check_size(data.len() as u64)?;

        let mut chunks: Vec<Vec<u8>> = data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }
        Ok(Self {
            chunks,
            total_bytes: data.len() as u64,
        })
    }

    /// Number of chunks (and therefore packets) in the transfer.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Never true: even an empty file has one chunk.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn origin(&self) -> u16 {
        SEQ_ORIGIN
    }

    /// Sequence number of the final chunk.
    pub fn max_seq(&self) -> u16 {
        // `split` bounds the chunk count to MAX_CHUNKS, so this cannot overflow.
        SEQ_ORIGIN + (self.chunks.len() - 1) as u16
    }

    pub fn is_final(&self, seq: u16) -> bool {
        seq == self.max_seq()
    }

    /// Payload for `seq`, or `None` outside `origin..=max_seq`.
    pub fn get(&self, seq: u16) -> Option<&[u8]> {
        let idx = seq.checked_sub(SEQ_ORIGIN)? as usize;
        self.chunks.get(idx).map(Vec::as_slice)
    }

    /// Iterate `(seq, is_final, payload)` in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, bool, &[u8])> + '_ {
        let max = self.max_seq();
        self.chunks.iter().enumerate().map(move |(i, c)| {
            let seq = SEQ_ORIGIN + i as u16;
            (seq, seq == max, c.as_slice())
        })
    }
}

/// Concatenate chunks `SEQ_ORIGIN .. SEQ_ORIGIN + count` in order.
///
/// Fails on the first sequence number missing from `received`.
pub fn reassemble(received: &BTreeMap<u16, Vec<u8>>, count: usize) -> Result<Vec<u8>, ChunkError> {
    let mut out = Vec::with_capacity(count * CHUNK_SIZE);
    for k in 0..count {
        let seq = SEQ_ORIGIN.wrapping_add(k as u16);
        match received.get(&seq) {
            Some(chunk) => out.extend_from_slice(chunk),
            None => return Err(ChunkError::Gap { seq }),
        }
    }
    Ok(out)
}
