//! # Chain Events
//!
//! The fixed set of signals a peer session emits while processing the
//! wire protocol. Every event carries the id of the peer that produced
//! it; per-peer emission order is preserved because a single peer's
//! events are always published from that peer's own task, in the order
//! its packets were framed off the wire.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

/// Opaque identifier for a peer session, stable for the lifetime of the
/// TCP connection.
pub type PeerId = u64;

/// A peer address learned via the `Peers` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Dotted-quad IPv4 address.
    pub ip: String,
    /// Listen port (not the ephemeral connect port).
    pub port: u16,
    /// Raw node id bytes as advertised.
    pub node_id: Vec<u8>,
}

/// Every signal a peer session can publish to the bus.
///
/// Variant names intentionally mirror the wire-level events they signal,
/// not the packet names, since several packets (e.g. `Hello`/`Status`)
/// fan out into more than one downstream concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainEvent {
    /// Handshake (`Hello` exchange) completed successfully.
    PeerHandshakeSuccess {
        /// Peer that completed the handshake.
        peer: PeerId,
    },
    /// `Status` was received and accepted (network id, genesis hash,
    /// protocol version all matched).
    PeerStatusReceived {
        /// Peer whose status was accepted.
        peer: PeerId,
    },
    /// Either side asked to end the session.
    PeerDisconnectRequested {
        /// Peer the disconnect concerns.
        peer: PeerId,
        /// Whether the reason (if any) means the peer should be
        /// removed from the known-peers set rather than retried later.
        /// `None` when a remote disconnect carried no reason.
        forget: Option<bool>,
    },
    /// `GetPeers` was received.
    GetPeersReceived {
        /// Peer that asked for our peer table.
        peer: PeerId,
    },
    /// `Peers` was received.
    PeerAddressesReceived {
        /// Peer that sent addresses.
        peer: PeerId,
        /// Decoded peer addresses.
        addresses: Vec<PeerAddress>,
    },
    /// `GetTransactions` was received.
    GetTransactionsReceived {
        /// Peer that asked for our mempool.
        peer: PeerId,
    },
    /// `Transactions` was received.
    RemoteTransactionsReceived {
        /// Peer that sent transactions.
        peer: PeerId,
        /// Raw encoded transactions, undecoded (transaction parsing is
        /// out of scope for this crate).
        transactions: Vec<Vec<u8>>,
    },
    /// `GetBlocks` was received.
    GetBlocksReceived {
        /// Peer that asked for blocks.
        peer: PeerId,
        /// Requested block hashes.
        block_hashes: Vec<Hash>,
    },
    /// `Blocks` was received.
    RemoteBlocksReceived {
        /// Peer that sent blocks.
        peer: PeerId,
        /// Raw encoded blocks, undecoded.
        transient_blocks: Vec<Vec<u8>>,
    },
    /// `GetBlockHashes` was received.
    GetBlockHashesReceived {
        /// Peer that asked for hashes.
        peer: PeerId,
        /// Hash to walk backward from.
        block_hash: Hash,
        /// Maximum number of hashes requested.
        count: u64,
    },
    /// `BlockHashes` was received.
    RemoteBlockHashesReceived {
        /// Peer that sent hashes.
        peer: PeerId,
        /// Decoded hashes, oldest-to-newest as received.
        block_hashes: Vec<Hash>,
    },
}

/// Coarse-grained classification of a [`ChainEvent`], used by
/// [`crate::publisher::EventFilter`] to let subscribers select a subset
/// of the bus without matching on every variant themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Handshake/status/disconnect lifecycle events.
    Session,
    /// Peer discovery (`GetPeers`/`Peers`).
    Discovery,
    /// Transaction relay.
    Transactions,
    /// Block and block-hash relay.
    Blocks,
}

impl ChainEvent {
    /// The id of the peer this event concerns.
    pub fn peer(&self) -> PeerId {
        match self {
            ChainEvent::PeerHandshakeSuccess { peer }
            | ChainEvent::PeerStatusReceived { peer }
            | ChainEvent::PeerDisconnectRequested { peer, .. }
            | ChainEvent::GetPeersReceived { peer }
            | ChainEvent::PeerAddressesReceived { peer, .. }
            | ChainEvent::GetTransactionsReceived { peer }
            | ChainEvent::RemoteTransactionsReceived { peer, .. }
            | ChainEvent::GetBlocksReceived { peer, .. }
            | ChainEvent::RemoteBlocksReceived { peer, .. }
            | ChainEvent::GetBlockHashesReceived { peer, .. }
            | ChainEvent::RemoteBlockHashesReceived { peer, .. } => *peer,
        }
    }

    /// The topic this event belongs to.
    pub fn topic(&self) -> EventTopic {
        match self {
            ChainEvent::PeerHandshakeSuccess { .. }
            | ChainEvent::PeerStatusReceived { .. }
            | ChainEvent::PeerDisconnectRequested { .. } => EventTopic::Session,
            ChainEvent::GetPeersReceived { .. } | ChainEvent::PeerAddressesReceived { .. } => {
                EventTopic::Discovery
            }
            ChainEvent::GetTransactionsReceived { .. }
            | ChainEvent::RemoteTransactionsReceived { .. } => EventTopic::Transactions,
            ChainEvent::GetBlocksReceived { .. }
            | ChainEvent::RemoteBlocksReceived { .. }
            | ChainEvent::GetBlockHashesReceived { .. }
            | ChainEvent::RemoteBlockHashesReceived { .. } => EventTopic::Blocks,
        }
    }
}

/// A subscription-side filter over [`ChainEvent`]s.
///
/// An empty filter (`EventFilter::all()`) matches everything; otherwise
/// an event must match at least one configured topic AND at least one
/// configured peer (when either list is non-empty).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub(crate) topics: Vec<EventTopic>,
    pub(crate) peers: Vec<PeerId>,
}

impl EventFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches only the given topics.
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            peers: Vec::new(),
        }
    }

    /// Matches only events from the given peers.
    pub fn from_peers(peers: Vec<PeerId>) -> Self {
        Self {
            topics: Vec::new(),
            peers,
        }
    }

    /// Whether `event` satisfies this filter.
    pub fn matches(&self, event: &ChainEvent) -> bool {
        let topic_ok = self.topics.is_empty() || self.topics.contains(&event.topic());
        let peer_ok = self.peers.is_empty() || self.peers.contains(&event.peer());
        topic_ok && peer_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_classifies_session_events() {
        let ev = ChainEvent::PeerHandshakeSuccess { peer: 1 };
        assert_eq!(ev.topic(), EventTopic::Session);
        assert_eq!(ev.peer(), 1);
    }

    #[test]
    fn topic_classifies_block_events() {
        let ev = ChainEvent::RemoteBlocksReceived {
            peer: 7,
            transient_blocks: vec![],
        };
        assert_eq!(ev.topic(), EventTopic::Blocks);
    }

    #[test]
    fn filter_all_matches_everything() {
        let ev = ChainEvent::GetPeersReceived { peer: 3 };
        assert!(EventFilter::all().matches(&ev));
    }

    #[test]
    fn filter_by_topic_excludes_other_topics() {
        let ev = ChainEvent::GetPeersReceived { peer: 3 };
        let filter = EventFilter::topics(vec![EventTopic::Blocks]);
        assert!(!filter.matches(&ev));
    }

    #[test]
    fn filter_by_peer_excludes_other_peers() {
        let ev = ChainEvent::GetPeersReceived { peer: 3 };
        let filter = EventFilter::from_peers(vec![9]);
        assert!(!filter.matches(&ev));
    }
}
