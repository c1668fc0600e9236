//! # chain-net
//!
//! The peer wire protocol: framed command multiplexing over a TCP
//! stream (C7), and the fixed set of signals a session publishes onto
//! the shared event bus (C8, implemented in `shared-bus`).
//!
//! ## Layout
//!
//! - [`packet`] — frame header (`packet_size`), the thirteen [`packet::Packet`]
//!   variants, and their canonical RLP codec.
//! - [`session`] — [`session::PeerSession`]: the NEW → HELLO_SENT/HELLO_ACK
//!   → READY → CLOSED state machine, flow limits, and the non-blocking
//!   send/recv loop body.
//! - [`errors`] — [`errors::NetError`] and [`errors::DisconnectReason`].

pub mod errors;
pub mod packet;
pub mod session;

pub use errors::{DisconnectReason, NetError};
pub use packet::{packet_size, Packet, WireAddress, HEADER_LEN, NODE_ID_LEN, SYNC_TOKEN};
pub use session::{
    PeerSession, SessionConfig, SessionState, MAX_BLOCKS_ACCEPTED, MAX_BLOCKS_SEND,
    MAX_GET_CHAIN_ACCEPT_HASHES, MAX_GET_CHAIN_ASK_BLOCKS, MAX_GET_CHAIN_REQUEST_BLOCKS,
    MAX_GET_CHAIN_SEND_HASHES,
};
