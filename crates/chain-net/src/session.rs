//! # Peer session state machine
//!
//! One task per peer, driving the handshake, the flow-limited command
//! dispatch, and the signal bus emissions described in the original's
//! `Peer` class (`peer.py`): `send_Hello`/`_recv_Hello`,
//! `send_Status`/`_recv_Status`, `Ping`/`Pong`, and the
//! `Disconnect`-with-pause shutdown sequence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use shared_bus::{ChainEvent, EventPublisher, PeerAddress, PeerId};
use shared_types::Hash;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{DisconnectReason, NetError};
use crate::packet::{packet_size, Packet, WireAddress, HEADER_LEN, NODE_ID_LEN, SYNC_TOKEN};

pub const MAX_GET_CHAIN_ACCEPT_HASHES: usize = 2048;
pub const MAX_GET_CHAIN_SEND_HASHES: usize = 2048;
pub const MAX_GET_CHAIN_ASK_BLOCKS: usize = 512;
pub const MAX_GET_CHAIN_REQUEST_BLOCKS: usize = 512;
pub const MAX_BLOCKS_SEND: usize = 512;
pub const MAX_BLOCKS_ACCEPTED: usize = 512;

/// How long a session waits after sending `Disconnect` before it closes
/// the socket, giving the remote a chance to observe the frame.
const DISCONNECT_PAUSE: Duration = Duration::from_secs(2);

/// Idle backoff when a tick moves no bytes in either direction.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    HelloSent,
    HelloAck,
    Ready,
    Closed,
}

/// Identity and chain parameters a session advertises and checks the
/// remote against. Shared read-only across every peer a node runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub protocol_version: u32,
    pub network_id: u32,
    pub genesis_hash: Hash,
    pub client_version: String,
    pub capabilities: Vec<String>,
    pub node_id: Vec<u8>,
    pub listen_port: u16,
}

fn wire_to_peer_address(w: &WireAddress) -> PeerAddress {
    PeerAddress {
        ip: format!("{}.{}.{}.{}", w.ip[0], w.ip[1], w.ip[2], w.ip[3]),
        port: w.port,
        node_id: w.node_id.clone(),
    }
}

/// One TCP-connected peer: its framing buffers, handshake/status
/// progress, and the bus it publishes onto.
pub struct PeerSession<B: EventPublisher> {
    pub id: PeerId,
    stream: TcpStream,
    config: Arc<SessionConfig>,
    bus: Arc<B>,
    state: SessionState,
    hello_sent: bool,
    status_sent: bool,
    recv_buf: Vec<u8>,
    send_queue: VecDeque<Vec<u8>>,
    read_buf: [u8; 4096],

    pub remote_protocol_version: Option<u32>,
    pub remote_client_version: Option<String>,
    pub remote_capabilities: Vec<String>,
    pub remote_node_id: Option<Vec<u8>>,
    pub remote_listen_port: Option<u16>,
    pub status_total_difficulty: Option<u128>,
    pub status_head_hash: Option<Hash>,

    pub last_valid_packet_received: Instant,
    pub last_pinged: Option<Instant>,
}

impl<B: EventPublisher> PeerSession<B> {
    pub fn new(id: PeerId, stream: TcpStream, config: Arc<SessionConfig>, bus: Arc<B>) -> Self {
        Self {
            id,
            stream,
            config,
            bus,
            state: SessionState::New,
            hello_sent: false,
            status_sent: false,
            recv_buf: Vec::new(),
            send_queue: VecDeque::new(),
            read_buf: [0u8; 4096],
            remote_protocol_version: None,
            remote_client_version: None,
            remote_capabilities: Vec::new(),
            remote_node_id: None,
            remote_listen_port: None,
            status_total_difficulty: None,
            status_head_hash: None,
            last_valid_packet_received: Instant::now(),
            last_pinged: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `NEW -- send_Hello --> HELLO_SENT`.
    pub fn start_handshake(&mut self) {
        self.send_hello();
    }

    fn queue(&mut self, packet: &Packet) {
        self.send_queue.push_back(packet.encode_frame());
    }

    fn send_hello(&mut self) {
        if self.hello_sent {
            return;
        }
        self.queue(&Packet::Hello {
            protocol_version: self.config.protocol_version,
            client_version: self.config.client_version.clone(),
            capabilities: self.config.capabilities.clone(),
            listen_port: self.config.listen_port,
            node_id: self.config.node_id.clone(),
        });
        self.hello_sent = true;
        if self.state == SessionState::New {
            self.state = SessionState::HelloSent;
        }
    }

    fn send_status(&mut self, total_difficulty: u128, latest_hash: Hash) {
        if self.status_sent {
            return;
        }
        self.queue(&Packet::Status {
            protocol_version: self.config.protocol_version,
            network_id: self.config.network_id,
            total_difficulty,
            latest_hash,
            genesis_hash: self.config.genesis_hash,
        });
        self.status_sent = true;
    }

    /// Queue an outbound `Disconnect`, mark the session closed, publish
    /// the local disconnect signal, flush the queue, then pause before
    /// the caller's loop tears the socket down. Mirrors `peer.py`'s
    /// `send_Disconnect`.
    pub async fn disconnect(&mut self, reason: DisconnectReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.queue(&Packet::Disconnect {
            reason_code: reason.code(),
        });
        self.state = SessionState::Closed;
        self.bus
            .publish(ChainEvent::PeerDisconnectRequested {
                peer: self.id,
                forget: Some(reason.forgets_peer()),
            })
            .await;
        let _ = self.flush_send_queue().await;
        sleep(DISCONNECT_PAUSE).await;
        let _ = self.stream.shutdown().await;
    }

    /// Write every currently queued frame, in FIFO order, one at a
    /// time. A write failure stops the peer (`TransportError`).
    async fn flush_send_queue(&mut self) -> Result<bool, NetError> {
        let mut moved = false;
        while let Some(frame) = self.send_queue.pop_front() {
            self.stream
                .write_all(&frame)
                .await
                .map_err(|e| NetError::Io(e.to_string()))?;
            moved = true;
        }
        Ok(moved)
    }

    /// One non-blocking attempt to pull bytes off the socket into the
    /// receive buffer.
    fn try_recv(&mut self) -> Result<bool, NetError> {
        match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => Err(NetError::Io("connection closed by peer".to_string())),
            Ok(n) => {
                self.recv_buf.extend_from_slice(&self.read_buf[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(NetError::Io(e.to_string())),
        }
    }

    /// Drain as many complete frames as the receive buffer currently
    /// holds, dispatching each in arrival order.
    async fn drain_buffer(&mut self) -> Result<(), NetError> {
        loop {
            if self.recv_buf.len() < HEADER_LEN {
                return Ok(());
            }
            let Some(size) = packet_size(&self.recv_buf[..HEADER_LEN]) else {
                return Ok(());
            };
            if self.recv_buf.len() < size {
                return Ok(());
            }

            let frame: Vec<u8> = self.recv_buf.drain(..size).collect();
            if frame[..4] != SYNC_TOKEN {
                let err = NetError::BadSyncToken;
                warn!(peer = self.id, error = %err, "disconnecting");
                self.disconnect(DisconnectReason::BadProtocol).await;
                self.recv_buf.clear();
                return Ok(());
            }

            match Packet::decode_body(&frame[HEADER_LEN..]) {
                Ok(packet) => {
                    self.last_valid_packet_received = Instant::now();
                    self.handle_packet(packet).await;
                    if self.state == SessionState::Closed {
                        return Ok(());
                    }
                }
                Err(NetError::UnknownCommand(id)) => {
                    debug!(peer = self.id, cmd = id, "unknown command, ignoring");
                }
                Err(e) => {
                    warn!(peer = self.id, error = %e, "bad protocol, disconnecting");
                    self.disconnect(DisconnectReason::BadProtocol).await;
                    self.recv_buf.clear();
                    return Ok(());
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Hello {
                protocol_version,
                client_version,
                capabilities,
                listen_port,
                node_id,
            } => self.on_hello(protocol_version, client_version, capabilities, listen_port, node_id).await,
            Packet::Disconnect { reason_code } => {
                let reason = DisconnectReason::from_code(reason_code);
                self.state = SessionState::Closed;
                self.bus
                    .publish(ChainEvent::PeerDisconnectRequested {
                        peer: self.id,
                        forget: Some(reason.forgets_peer()),
                    })
                    .await;
            }
            Packet::Ping => self.queue(&Packet::Pong),
            Packet::Pong => {}
            Packet::GetPeers => {
                self.bus.publish(ChainEvent::GetPeersReceived { peer: self.id }).await;
            }
            Packet::Peers { peers } => {
                let addresses = peers.iter().map(wire_to_peer_address).collect();
                self.bus
                    .publish(ChainEvent::PeerAddressesReceived { peer: self.id, addresses })
                    .await;
            }
            Packet::Status {
                protocol_version,
                network_id,
                total_difficulty,
                latest_hash,
                genesis_hash,
            } => self.on_status(protocol_version, network_id, total_difficulty, latest_hash, genesis_hash).await,
            Packet::Transactions { transactions } => {
                self.bus
                    .publish(ChainEvent::RemoteTransactionsReceived { peer: self.id, transactions })
                    .await;
            }
            Packet::GetTransactions => {
                self.bus.publish(ChainEvent::GetTransactionsReceived { peer: self.id }).await;
            }
            Packet::Blocks { blocks } => {
                if blocks.len() > MAX_BLOCKS_ACCEPTED {
                    warn!(
                        peer = self.id,
                        got = blocks.len(),
                        limit = MAX_BLOCKS_ACCEPTED,
                        "MAX_BLOCKS_ACCEPTED exceeded, delivering anyway"
                    );
                }
                self.bus
                    .publish(ChainEvent::RemoteBlocksReceived {
                        peer: self.id,
                        transient_blocks: blocks,
                    })
                    .await;
            }
            Packet::GetBlocks { hashes } => {
                if hashes.len() > MAX_GET_CHAIN_REQUEST_BLOCKS {
                    warn!(
                        peer = self.id,
                        got = hashes.len(),
                        limit = MAX_GET_CHAIN_REQUEST_BLOCKS,
                        "MAX_GET_CHAIN_REQUEST_BLOCKS exceeded, delivering anyway"
                    );
                }
                self.bus
                    .publish(ChainEvent::GetBlocksReceived {
                        peer: self.id,
                        block_hashes: hashes,
                    })
                    .await;
            }
            Packet::BlockHashes { hashes } => {
                if hashes.len() > MAX_GET_CHAIN_ACCEPT_HASHES {
                    warn!(
                        peer = self.id,
                        got = hashes.len(),
                        limit = MAX_GET_CHAIN_ACCEPT_HASHES,
                        "MAX_GET_CHAIN_ACCEPT_HASHES exceeded, delivering anyway"
                    );
                }
                self.bus
                    .publish(ChainEvent::RemoteBlockHashesReceived {
                        peer: self.id,
                        block_hashes: hashes,
                    })
                    .await;
            }
            Packet::GetBlockHashes { hash, count } => {
                self.bus
                    .publish(ChainEvent::GetBlockHashesReceived {
                        peer: self.id,
                        block_hash: hash,
                        count,
                    })
                    .await;
            }
        }
    }

    async fn on_hello(
        &mut self,
        protocol_version: u32,
        client_version: String,
        capabilities: Vec<String>,
        listen_port: u16,
        node_id: Vec<u8>,
    ) {
        if protocol_version != self.config.protocol_version {
            self.disconnect(DisconnectReason::IncompatibleNetworkProtocols).await;
            return;
        }
        debug_assert_eq!(node_id.len(), NODE_ID_LEN);
        self.remote_protocol_version = Some(protocol_version);
        self.remote_client_version = Some(client_version);
        self.remote_capabilities = capabilities;
        self.remote_node_id = Some(node_id);
        self.remote_listen_port = Some(listen_port);

        self.send_hello();
        if self.state != SessionState::Ready {
            self.state = SessionState::HelloAck;
        }
        self.bus
            .publish(ChainEvent::PeerHandshakeSuccess { peer: self.id })
            .await;
    }

    async fn on_status(
        &mut self,
        protocol_version: u32,
        network_id: u32,
        total_difficulty: u128,
        latest_hash: Hash,
        genesis_hash: Hash,
    ) {
        if protocol_version != self.config.protocol_version || network_id != self.config.network_id {
            self.disconnect(DisconnectReason::IncompatibleNetworkProtocols).await;
            return;
        }
        if genesis_hash != self.config.genesis_hash {
            self.disconnect(DisconnectReason::WrongGenesisBlock).await;
            return;
        }
        self.status_total_difficulty = Some(total_difficulty);
        self.status_head_hash = Some(latest_hash);
        if self.state == SessionState::HelloAck && self.status_sent {
            self.state = SessionState::Ready;
        }
        self.bus
            .publish(ChainEvent::PeerStatusReceived { peer: self.id })
            .await;
    }

    /// Send our own `Status` once the handshake has produced a
    /// `HELLO_ACK`. Callers supply their current head so the packet can
    /// be built. `HELLO_ACK -- send_Status + recv_Status --> READY`: if
    /// the remote's `Status` already arrived, sending ours now is what
    /// completes the transition.
    pub fn announce_status(&mut self, total_difficulty: u128, latest_hash: Hash) {
        if self.state != SessionState::HelloAck && self.state != SessionState::Ready {
            return;
        }
        self.send_status(total_difficulty, latest_hash);
        if self.state == SessionState::HelloAck && self.status_head_hash.is_some() {
            self.state = SessionState::Ready;
        }
    }

    pub fn send_ping(&mut self) {
        self.queue(&Packet::Ping);
        self.last_pinged = Some(Instant::now());
    }

    /// Reply with a `Peers` packet. Rejected outright, not truncated,
    /// when `peers` exceeds [`MAX_GET_CHAIN_SEND_HASHES`] — a caller
    /// that built an oversized reply has a bug worth surfacing, not
    /// papering over.
    pub fn send_peers(&mut self, peers: Vec<WireAddress>) -> Result<(), NetError> {
        if peers.len() > MAX_GET_CHAIN_SEND_HASHES {
            return Err(NetError::FlowLimitExceeded {
                what: "Peers",
                got: peers.len(),
                limit: MAX_GET_CHAIN_SEND_HASHES,
            });
        }
        self.queue(&Packet::Peers { peers });
        Ok(())
    }

    pub fn send_transactions(&mut self, transactions: Vec<Vec<u8>>) {
        self.queue(&Packet::Transactions { transactions });
    }

    /// Reply with a `Blocks` packet, rejected (not truncated) past
    /// [`MAX_BLOCKS_SEND`].
    pub fn send_blocks(&mut self, blocks: Vec<Vec<u8>>) -> Result<(), NetError> {
        if blocks.len() > MAX_BLOCKS_SEND {
            return Err(NetError::FlowLimitExceeded {
                what: "Blocks",
                got: blocks.len(),
                limit: MAX_BLOCKS_SEND,
            });
        }
        self.queue(&Packet::Blocks { blocks });
        Ok(())
    }

    /// Reply with a `BlockHashes` packet, rejected (not truncated) past
    /// [`MAX_GET_CHAIN_SEND_HASHES`].
    pub fn send_block_hashes(&mut self, hashes: Vec<Hash>) -> Result<(), NetError> {
        if hashes.len() > MAX_GET_CHAIN_SEND_HASHES {
            return Err(NetError::FlowLimitExceeded {
                what: "BlockHashes",
                got: hashes.len(),
                limit: MAX_GET_CHAIN_SEND_HASHES,
            });
        }
        self.queue(&Packet::BlockHashes { hashes });
        Ok(())
    }

    fn require_ready(&self) -> Result<(), NetError> {
        if self.state != SessionState::Ready {
            return Err(NetError::NotReady);
        }
        Ok(())
    }

    /// Ask the remote for its known peer addresses. Only meaningful
    /// once the handshake has completed.
    pub fn request_peers(&mut self) -> Result<(), NetError> {
        self.require_ready()?;
        self.queue(&Packet::GetPeers);
        Ok(())
    }

    /// Ask the remote for its pending transactions.
    pub fn request_transactions(&mut self) -> Result<(), NetError> {
        self.require_ready()?;
        self.queue(&Packet::GetTransactions);
        Ok(())
    }

    /// Ask the remote for the bodies of `hashes`, rejected outright
    /// past [`MAX_GET_CHAIN_ASK_BLOCKS`] rather than asking for less
    /// than the caller requested.
    pub fn request_blocks(&mut self, hashes: Vec<Hash>) -> Result<(), NetError> {
        self.require_ready()?;
        if hashes.len() > MAX_GET_CHAIN_ASK_BLOCKS {
            return Err(NetError::FlowLimitExceeded {
                what: "GetBlocks",
                got: hashes.len(),
                limit: MAX_GET_CHAIN_ASK_BLOCKS,
            });
        }
        self.queue(&Packet::GetBlocks { hashes });
        Ok(())
    }

    /// Ask the remote for up to `count` block hashes descending from
    /// `hash`.
    pub fn request_block_hashes(&mut self, hash: Hash, count: u64) -> Result<(), NetError> {
        self.require_ready()?;
        self.queue(&Packet::GetBlockHashes { hash, count });
        Ok(())
    }

    /// One iteration of the peer loop: one non-blocking send attempt,
    /// then drain whatever the socket currently has into the receive
    /// buffer and dispatch every complete frame. Sleeps briefly if
    /// neither direction moved bytes.
    pub async fn tick(&mut self) -> Result<(), NetError> {
        let mut moved = false;

        if let Some(frame) = self.send_queue.pop_front() {
            match self.stream.try_write(&frame) {
                Ok(n) if n == frame.len() => moved = true,
                Ok(n) => {
                    // Partial write: keep the remainder at the front of
                    // the queue for the next tick.
                    self.send_queue.push_front(frame[n..].to_vec());
                    moved = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.send_queue.push_front(frame);
                }
                Err(e) => return Err(NetError::Io(e.to_string())),
            }
        }

        if self.try_recv()? {
            moved = true;
        }
        self.drain_buffer().await?;

        if !moved {
            sleep(IDLE_SLEEP).await;
        }
        Ok(())
    }

    /// Run the peer loop until the session closes or the transport
    /// errors out.
    pub async fn run(mut self) -> Result<(), NetError> {
        self.start_handshake();
        loop {
            self.tick().await?;
            if self.state == SessionState::Closed {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, InMemoryEventBus};
    use tokio::net::TcpListener;

    fn config(listen_port: u16, node_id_byte: u8) -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            protocol_version: 1,
            network_id: 7,
            genesis_hash: [9u8; 32],
            client_version: "chain-net/test".to_string(),
            capabilities: vec!["chain/1".to_string()],
            node_id: vec![node_id_byte; NODE_ID_LEN],
            listen_port,
        })
    }

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept_result, connect_result) = tokio::join!(listener.accept(), connect);
        let (accepted, _) = accept_result.unwrap();
        (connect_result.unwrap(), accepted)
    }

    async fn tick_both<B: EventPublisher>(a: &mut PeerSession<B>, b: &mut PeerSession<B>, rounds: usize) {
        for _ in 0..rounds {
            a.tick().await.unwrap();
            b.tick().await.unwrap();
        }
    }

    #[tokio::test]
    async fn handshake_reaches_ready_on_both_sides() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let mut b = PeerSession::new(2, s2, config(30304, 2), bus.clone());

        a.start_handshake();
        b.start_handshake();
        tick_both(&mut a, &mut b, 10).await;

        assert_eq!(a.state(), SessionState::HelloAck);
        assert_eq!(b.state(), SessionState::HelloAck);

        a.announce_status(1000, [5u8; 32]);
        b.announce_status(2000, [6u8; 32]);
        tick_both(&mut a, &mut b, 10).await;

        assert_eq!(a.state(), SessionState::Ready);
        assert_eq!(b.state(), SessionState::Ready);
        assert_eq!(a.status_total_difficulty, Some(2000));
        assert_eq!(b.status_total_difficulty, Some(1000));
        assert_eq!(a.remote_listen_port, Some(30304));
    }

    #[tokio::test]
    async fn protocol_version_mismatch_disconnects() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let mismatched = Arc::new(SessionConfig {
            protocol_version: 2,
            ..(*config(30304, 2)).clone()
        });
        let mut b = PeerSession::new(2, s2, mismatched, bus.clone());

        a.start_handshake();
        b.start_handshake();
        tick_both(&mut a, &mut b, 10).await;

        assert_eq!(b.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let mut b = PeerSession::new(2, s2, config(30304, 2), bus.clone());

        a.send_ping();
        tick_both(&mut a, &mut b, 5).await;

        assert!(a.last_pinged.is_some());
    }

    #[tokio::test]
    async fn get_peers_emits_event() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::all());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let mut b = PeerSession::new(2, s2, config(30304, 2), bus.clone());

        a.queue(&Packet::GetPeers);
        tick_both(&mut a, &mut b, 5).await;

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, ChainEvent::GetPeersReceived { peer: 2 }));
    }

    #[tokio::test]
    async fn send_peers_rejects_over_send_limit() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let _b = PeerSession::new(2, s2, config(30304, 2), bus);

        let oversized: Vec<WireAddress> = (0..(MAX_GET_CHAIN_SEND_HASHES + 10))
            .map(|i| WireAddress {
                ip: [127, 0, 0, 1],
                port: 30303,
                node_id: vec![i as u8; NODE_ID_LEN],
            })
            .collect();
        let err = a.send_peers(oversized).unwrap_err();
        assert!(matches!(err, NetError::FlowLimitExceeded { what: "Peers", .. }));
        assert_eq!(a.send_queue.len(), 0);
    }

    #[tokio::test]
    async fn send_blocks_rejects_over_send_limit() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let _b = PeerSession::new(2, s2, config(30304, 2), bus);

        let oversized = vec![vec![0u8]; MAX_BLOCKS_SEND + 1];
        let err = a.send_blocks(oversized).unwrap_err();
        assert!(matches!(err, NetError::FlowLimitExceeded { what: "Blocks", .. }));
    }

    #[tokio::test]
    async fn request_blocks_rejects_before_ready() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let _b = PeerSession::new(2, s2, config(30304, 2), bus);

        let err = a.request_blocks(vec![[0u8; 32]]).unwrap_err();
        assert!(matches!(err, NetError::NotReady));
    }

    #[tokio::test]
    async fn request_blocks_rejects_over_ask_limit_once_ready() {
        let (s1, s2) = connected_pair().await;
        let bus = Arc::new(InMemoryEventBus::new());
        let mut a = PeerSession::new(1, s1, config(30303, 1), bus.clone());
        let mut b = PeerSession::new(2, s2, config(30304, 2), bus.clone());

        a.start_handshake();
        b.start_handshake();
        tick_both(&mut a, &mut b, 10).await;
        a.announce_status(1000, [5u8; 32]);
        b.announce_status(2000, [6u8; 32]);
        tick_both(&mut a, &mut b, 10).await;
        assert_eq!(a.state(), SessionState::Ready);

        let ok_hashes = vec![[0u8; 32]; MAX_GET_CHAIN_ASK_BLOCKS];
        a.request_blocks(ok_hashes).unwrap();

        let too_many = vec![[0u8; 32]; MAX_GET_CHAIN_ASK_BLOCKS + 1];
        let err = a.request_blocks(too_many).unwrap_err();
        assert!(matches!(err, NetError::FlowLimitExceeded { what: "GetBlocks", .. }));
    }
}
