//! `udp-arq`: reliable whole-file transfer over UDP with Go-Back-N or
//! Selective-Repeat ARQ.
//!
//! # Architecture
//!
//! ```text
//!   file                                                      file
//!    │                                                          ▲
//!  ┌─▼────────┐                                          ┌──────┴───┐
//!  │ ChunkMap │                                          │reassemble│
//!  └─┬────────┘                                          └──────▲───┘
//!  ┌─▼───────────┐     DATA [seq|flags|payload]      ┌──────────┴─────┐
//!  │SenderEngine │──────────────────────────────────▶│ ReceiverEngine │
//!  │ └ SendWindow│◀──────────────────────────────────│ └ ReceiveWindow│
//!  └─┬───────────┘          ACK [seq]                └──────────┬─────┘
//!    │ Transport                                     Transport  │
//!  ┌─▼────────────────┐                           ┌─────────────▼──┐
//!  │ Socket/Simulator │~~~~~~~~~~ UDP ~~~~~~~~~~~~│     Socket     │
//!  └──────────────────┘                           └────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]          wire format for data packets and acks
//! - [`chunk`]           file splitting and reassembly
//! - [`socket`]          `Transport` trait and the tokio UDP socket
//! - [`sender`]          send window state machine (GBN and SR)
//! - [`receiver`]        receive acceptance state machine (GBN and SR)
//! - [`sender_engine`]   async sending loop and throughput report
//! - [`receiver_engine`] async receiving loop and drain burst
//! - [`timer`]           retransmission timers
//! - [`state`]           engine finite-state-machine types
//! - [`config`]          ARQ variant and per-side settings
//! - [`error`]           errors that escalate out of a transfer
//! - [`simulator`]       lossy/duplicating/reordering layer for testing

pub mod chunk;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod receiver_engine;
pub mod sender;
pub mod sender_engine;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::{ArqVariant, ReceiverConfig, SenderConfig};
pub use error::{Result, TransferError};
pub use receiver_engine::{receive_file, ReceiveReport, ReceiverEngine};
pub use sender_engine::{send_file, SenderEngine, TransferReport};
