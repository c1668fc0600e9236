//! # Wire framing and packet codec
//!
//! `packeter.py` — the module that would define the exact byte-level
//! framing the original peer session relies on — was not retrieved
//! alongside `peer.py`. The framing implemented here is a reasoned
//! reconstruction consistent with the one hard constraint spec names
//! explicitly: the first eight bytes of a packet determine its total
//! size. That header is a four-byte sync token (catches stream
//! desync) followed by a four-byte big-endian payload length; the
//! payload itself is `[command_id, rlp_encoded_fields...]`.

use chain_state::codec::{append_int, decode_int};
use rlp::{Rlp, RlpStream};
use shared_types::Hash;

use crate::errors::NetError;

/// Marks the start of a frame so a desynced stream can be detected
/// instead of silently misparsed.
pub const SYNC_TOKEN: [u8; 4] = *b"QCP1";

/// Sync token (4) + big-endian payload length (4).
pub const HEADER_LEN: usize = 8;

/// Node ids are fixed-length, matching the original's 512-bit public
/// key identifiers.
pub const NODE_ID_LEN: usize = 64;

/// Given at least [`HEADER_LEN`] bytes off the front of a stream,
/// returns the total number of bytes the full packet (header +
/// payload) will occupy, if enough bytes are present to read the
/// header at all.
pub fn packet_size(prefix: &[u8]) -> Option<usize> {
    if prefix.len() < HEADER_LEN {
        return None;
    }
    let len = u32::from_be_bytes(prefix[4..8].try_into().expect("slice is 4 bytes"));
    Some(HEADER_LEN + len as usize)
}

/// A peer address as carried in a `Peers` packet: raw 4-byte IPv4,
/// listen port, and a 64-byte node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireAddress {
    pub ip: [u8; 4],
    pub port: u16,
    pub node_id: Vec<u8>,
}

/// Every packet the wire protocol can carry, one variant per spec's
/// packet table.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Hello {
        protocol_version: u32,
        client_version: String,
        capabilities: Vec<String>,
        listen_port: u16,
        node_id: Vec<u8>,
    },
    Disconnect {
        reason_code: u8,
    },
    Ping,
    Pong,
    GetPeers,
    Peers {
        peers: Vec<WireAddress>,
    },
    Status {
        protocol_version: u32,
        network_id: u32,
        total_difficulty: u128,
        latest_hash: Hash,
        genesis_hash: Hash,
    },
    Transactions {
        transactions: Vec<Vec<u8>>,
    },
    GetTransactions,
    Blocks {
        blocks: Vec<Vec<u8>>,
    },
    GetBlocks {
        hashes: Vec<Hash>,
    },
    BlockHashes {
        hashes: Vec<Hash>,
    },
    GetBlockHashes {
        hash: Hash,
        count: u64,
    },
}

fn cmd_id(packet: &Packet) -> u8 {
    match packet {
        Packet::Hello { .. } => 0x00,
        Packet::Disconnect { .. } => 0x01,
        Packet::Ping => 0x02,
        Packet::Pong => 0x03,
        Packet::GetPeers => 0x04,
        Packet::Peers { .. } => 0x05,
        Packet::Status { .. } => 0x10,
        Packet::Transactions { .. } => 0x12,
        Packet::GetTransactions => 0x13,
        Packet::Blocks { .. } => 0x14,
        Packet::GetBlocks { .. } => 0x15,
        Packet::BlockHashes { .. } => 0x16,
        Packet::GetBlockHashes { .. } => 0x17,
    }
}

fn append_hash(s: &mut RlpStream, hash: &Hash) {
    s.append(&hash.as_slice());
}

fn decode_hash(rlp: &Rlp) -> Result<Hash, NetError> {
    let bytes: Vec<u8> = rlp.as_val()?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| NetError::MalformedRlp(format!("expected 32-byte hash, got {}", b.len())))
}

impl Packet {
    /// Encode this packet's `[command_id, rlp_payload]` body, not
    /// including the outer frame header.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(cmd_id(self));

        let mut s = RlpStream::new();
        match self {
            Packet::Hello {
                protocol_version,
                client_version,
                capabilities,
                listen_port,
                node_id,
            } => {
                s.begin_list(5);
                s.append(protocol_version);
                s.append(client_version);
                s.begin_list(capabilities.len());
                for cap in capabilities {
                    s.append(cap);
                }
                s.append(listen_port);
                s.append(node_id);
            }
            Packet::Disconnect { reason_code } => {
                s.begin_list(1);
                s.append(reason_code);
            }
            Packet::Ping | Packet::Pong | Packet::GetPeers | Packet::GetTransactions => {
                s.begin_list(0);
            }
            Packet::Peers { peers } => {
                s.begin_list(peers.len());
                for p in peers {
                    s.begin_list(3);
                    s.append(&p.ip.as_slice());
                    s.append(&p.port);
                    s.append(&p.node_id);
                }
            }
            Packet::Status {
                protocol_version,
                network_id,
                total_difficulty,
                latest_hash,
                genesis_hash,
            } => {
                s.begin_list(5);
                s.append(protocol_version);
                s.append(network_id);
                append_int(&mut s, *total_difficulty);
                append_hash(&mut s, latest_hash);
                append_hash(&mut s, genesis_hash);
            }
            Packet::Transactions { transactions } => {
                s.begin_list(transactions.len());
                for tx in transactions {
                    s.append(tx);
                }
            }
            Packet::Blocks { blocks } => {
                s.begin_list(blocks.len());
                for b in blocks {
                    s.append(b);
                }
            }
            Packet::GetBlocks { hashes } => {
                s.begin_list(hashes.len());
                for h in hashes {
                    append_hash(&mut s, h);
                }
            }
            Packet::BlockHashes { hashes } => {
                s.begin_list(hashes.len());
                for h in hashes {
                    append_hash(&mut s, h);
                }
            }
            Packet::GetBlockHashes { hash, count } => {
                s.begin_list(2);
                append_hash(&mut s, hash);
                s.append(count);
            }
        }
        body.extend_from_slice(&s.out());
        body
    }

    /// Wrap this packet's encoded body in the sync-token/length frame.
    pub fn encode_frame(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&SYNC_TOKEN);
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decode a packet from its `[command_id, rlp_payload]` body (the
    /// frame header must already have been stripped and validated by
    /// the caller).
    pub fn decode_body(body: &[u8]) -> Result<Packet, NetError> {
        let (&id, payload) = body.split_first().ok_or(NetError::EmptyBody)?;
        let rlp = Rlp::new(payload);

        Ok(match id {
            0x00 => {
                let protocol_version: u32 = rlp.val_at(0)?;
                let client_version: String = rlp.val_at(1)?;
                let caps_rlp = rlp.at(2)?;
                let mut capabilities = Vec::with_capacity(caps_rlp.item_count()?);
                for i in 0..caps_rlp.item_count()? {
                    capabilities.push(caps_rlp.val_at(i)?);
                }
                let listen_port: u16 = rlp.val_at(3)?;
                let node_id: Vec<u8> = rlp.val_at(4)?;
                if node_id.len() != NODE_ID_LEN {
                    return Err(NetError::BadNodeIdLength(node_id.len()));
                }
                Packet::Hello {
                    protocol_version,
                    client_version,
                    capabilities,
                    listen_port,
                    node_id,
                }
            }
            0x01 => Packet::Disconnect {
                reason_code: rlp.val_at(0)?,
            },
            0x02 => Packet::Ping,
            0x03 => Packet::Pong,
            0x04 => Packet::GetPeers,
            0x05 => {
                let count = rlp.item_count()?;
                let mut peers = Vec::with_capacity(count);
                for i in 0..count {
                    let entry = rlp.at(i)?;
                    let ip_bytes: Vec<u8> = entry.val_at(0)?;
                    if ip_bytes.len() != 4 {
                        return Err(NetError::BadIpLength(ip_bytes.len()));
                    }
                    let mut ip = [0u8; 4];
                    ip.copy_from_slice(&ip_bytes);
                    let port: u16 = entry.val_at(1)?;
                    let node_id: Vec<u8> = entry.val_at(2)?;
                    peers.push(WireAddress { ip, port, node_id });
                }
                Packet::Peers { peers }
            }
            0x10 => Packet::Status {
                protocol_version: rlp.val_at(0)?,
                network_id: rlp.val_at(1)?,
                total_difficulty: decode_int(&rlp.at(2)?).map_err(|e| NetError::MalformedRlp(e.to_string()))?,
                latest_hash: decode_hash(&rlp.at(3)?)?,
                genesis_hash: decode_hash(&rlp.at(4)?)?,
            },
            0x12 => {
                let count = rlp.item_count()?;
                let mut transactions = Vec::with_capacity(count);
                for i in 0..count {
                    transactions.push(rlp.val_at(i)?);
                }
                Packet::Transactions { transactions }
            }
            0x13 => Packet::GetTransactions,
            0x14 => {
                let count = rlp.item_count()?;
                let mut blocks = Vec::with_capacity(count);
                for i in 0..count {
                    blocks.push(rlp.val_at(i)?);
                }
                Packet::Blocks { blocks }
            }
            0x15 => {
                let count = rlp.item_count()?;
                let mut hashes = Vec::with_capacity(count);
                for i in 0..count {
                    hashes.push(decode_hash(&rlp.at(i)?)?);
                }
                Packet::GetBlocks { hashes }
            }
            0x16 => {
                let count = rlp.item_count()?;
                let mut hashes = Vec::with_capacity(count);
                for i in 0..count {
                    hashes.push(decode_hash(&rlp.at(i)?)?);
                }
                Packet::BlockHashes { hashes }
            }
            0x17 => Packet::GetBlockHashes {
                hash: decode_hash(&rlp.at(0)?)?,
                count: rlp.val_at(1)?,
            },
            other => return Err(NetError::UnknownCommand(other)),
        })
    }
}
