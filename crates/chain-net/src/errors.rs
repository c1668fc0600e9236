//! Error types for packet framing/decoding and the peer session.

use thiserror::Error;

/// Reasons a session is about to close, mirroring the wire protocol's
/// `Disconnect` reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    RequestedByPeer,
    BadProtocol,
    UselessPeer,
    TooManyPeers,
    AlreadyConnected,
    IncompatibleNetworkProtocols,
    WrongGenesisBlock,
    ClientQuitting,
}

impl DisconnectReason {
    /// Wire-level numeric code for this reason.
    pub fn code(self) -> u8 {
        match self {
            DisconnectReason::RequestedByPeer => 0,
            DisconnectReason::BadProtocol => 1,
            DisconnectReason::UselessPeer => 2,
            DisconnectReason::TooManyPeers => 3,
            DisconnectReason::AlreadyConnected => 4,
            DisconnectReason::IncompatibleNetworkProtocols => 5,
            DisconnectReason::WrongGenesisBlock => 6,
            DisconnectReason::ClientQuitting => 7,
        }
    }

    /// Recover a reason from its wire code. Unknown codes are treated
    /// as `BadProtocol`, matching the "decode failure disconnects with
    /// bad protocol" rule used for malformed packets generally.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => DisconnectReason::RequestedByPeer,
            2 => DisconnectReason::UselessPeer,
            3 => DisconnectReason::TooManyPeers,
            4 => DisconnectReason::AlreadyConnected,
            5 => DisconnectReason::IncompatibleNetworkProtocols,
            6 => DisconnectReason::WrongGenesisBlock,
            7 => DisconnectReason::ClientQuitting,
            _ => DisconnectReason::BadProtocol,
        }
    }

    /// Reasons for which the peer should be forgotten entirely (removed
    /// from the known-peers set) rather than retried later.
    pub fn forgets_peer(self) -> bool {
        matches!(
            self,
            DisconnectReason::BadProtocol
                | DisconnectReason::IncompatibleNetworkProtocols
                | DisconnectReason::WrongGenesisBlock
        )
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("bad sync token")]
    BadSyncToken,

    #[error("empty packet body")]
    EmptyBody,

    #[error("unknown command id {0}")]
    UnknownCommand(u8),

    #[error("malformed rlp payload: {0}")]
    MalformedRlp(String),

    #[error("node id must be 64 bytes, got {0}")]
    BadNodeIdLength(usize),

    #[error("ipv4 address must be 4 bytes, got {0}")]
    BadIpLength(usize),

    #[error("io error: {0}")]
    Io(String),

    #[error("protocol violation: {0}")]
    BadProtocol(String),

    #[error("too many items in {what}: got {got}, limit {limit}")]
    FlowLimitExceeded {
        what: &'static str,
        got: usize,
        limit: usize,
    },

    #[error("packet received before handshake completed")]
    NotReady,
}

impl From<rlp::DecoderError> for NetError {
    fn from(e: rlp::DecoderError) -> Self {
        NetError::MalformedRlp(e.to_string())
    }
}
