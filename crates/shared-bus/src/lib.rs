//! # Shared Bus — peer-session signal bus
//!
//! A single broadcast channel that a peer session publishes its eleven
//! signals onto, and that any number of other subsystems (mempool relay,
//! chain sync, peer-table maintenance) can subscribe to independently.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Peer session │    publish()       │  Subscriber  │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Per-peer ordering is preserved because each peer's events are always
//! published from that peer's own task, in the order its packets were
//! framed off the wire — the bus itself adds no reordering.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventTopic, PeerAddress, PeerId};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Current wire-compatible version of the event payloads themselves
/// (distinct from the peer wire protocol version in `chain-net`).
pub const PROTOCOL_VERSION: u16 = 1;

/// Default broadcast channel capacity before a lagging subscriber starts
/// missing events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_is_stable() {
        assert_eq!(PROTOCOL_VERSION, 1);
    }

    #[test]
    fn default_capacity_matches_documented_value() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
