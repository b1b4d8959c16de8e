//! RelayChat development relay.
//!
//! A minimal WebSocket relay for local testing: every text frame a peer
//! sends is forwarded to every connected peer. No persistence, rooms or
//! authentication.

pub mod registry;
pub mod server;

pub use registry::{ConnectionGuard, PeerId, PeerRegistry};
pub use server::{Relay, RelayHandle};
