//! Errors that escalate out of a transfer.
//!
//! Loss, duplication, reordering and malformed datagrams never show up here:
//! the engines absorb them.  Retransmission timeouts are internal events too.

use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::ChunkError;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The input does not fit the 16-bit sequence space.  Raised before any
    /// socket is touched.
    #[error("precondition failed: {0}")]
    Precondition(ChunkError),

    /// Socket creation, bind, send or receive failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The receiver gave up with sequence numbers still missing.
    #[error("reassembly gap: sequence {seq} never arrived")]
    ReassemblyGap { seq: u16 },

    /// The sender spent its final-packet retry budget without seeing the
    /// closing acknowledgment.  The receiver may still have finished.
    #[error("transfer incomplete: final packet unacknowledged after {retransmissions} retransmissions")]
    TransferIncomplete { retransmissions: u32 },

    /// Reading the input or writing the output file failed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Distinct process exit status per error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            TransferError::Precondition(_) => 2,
            TransferError::Transport(_) => 3,
            TransferError::ReassemblyGap { .. } => 4,
            TransferError::TransferIncomplete { .. } => 5,
            TransferError::File { .. } => 6,
        }
    }
}

impl From<ChunkError> for TransferError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::Gap { seq } => TransferError::ReassemblyGap { seq },
            too_large @ ChunkError::TooLarge { .. } => TransferError::Precondition(too_large),
        }
    }
}
