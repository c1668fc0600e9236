//! Exercises a session's `Status` exchange against a genesis hash built
//! by `chain-block`, the same way a node would wire this crate up: the
//! local `genesis_hash` a session checks a remote `Status` against is
//! not an arbitrary test fixture, it's `build_genesis(..).hash()`.

use std::sync::Arc;

use chain_block::build_genesis;
use chain_state::MemoryStore;
use chain_net::{PeerSession, SessionConfig, SessionState, NODE_ID_LEN};
use shared_bus::InMemoryEventBus;
use tokio::net::TcpListener;

async fn connected_pair() -> (tokio::net::TcpStream, tokio::net::TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connect = tokio::net::TcpStream::connect(addr);
    let (accept_result, connect_result) = tokio::join!(listener.accept(), connect);
    let (accepted, _) = accept_result.unwrap();
    (connect_result.unwrap(), accepted)
}

#[tokio::test]
async fn status_mismatch_against_wrong_genesis_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let genesis = build_genesis(store).unwrap();
    let real_genesis_hash = genesis.hash();
    let wrong_genesis_hash = [0xAAu8; 32];

    let (s1, s2) = connected_pair().await;
    let bus = Arc::new(InMemoryEventBus::new());

    let config_a = Arc::new(SessionConfig {
        protocol_version: 1,
        network_id: 1,
        genesis_hash: real_genesis_hash,
        client_version: "chain-net/test".to_string(),
        capabilities: vec!["chain/1".to_string()],
        node_id: vec![1u8; NODE_ID_LEN],
        listen_port: 30303,
    });
    let config_b = Arc::new(SessionConfig {
        protocol_version: 1,
        network_id: 1,
        genesis_hash: wrong_genesis_hash,
        client_version: "chain-net/test".to_string(),
        capabilities: vec!["chain/1".to_string()],
        node_id: vec![2u8; NODE_ID_LEN],
        listen_port: 30304,
    });

    let mut a = PeerSession::new(1, s1, config_a, bus.clone());
    let mut b = PeerSession::new(2, s2, config_b, bus);

    a.start_handshake();
    b.start_handshake();
    for _ in 0..10 {
        a.tick().await.unwrap();
        b.tick().await.unwrap();
    }
    assert_eq!(a.state(), SessionState::HelloAck);
    assert_eq!(b.state(), SessionState::HelloAck);

    a.announce_status(100, real_genesis_hash);
    b.announce_status(100, wrong_genesis_hash);
    for _ in 0..10 {
        a.tick().await.unwrap();
        b.tick().await.unwrap();
    }

    // `a` received `b`'s Status carrying the wrong genesis hash and
    // must have disconnected rather than advancing to READY.
    assert_eq!(a.state(), SessionState::Closed);
}
