//! Peer-to-peer transport for Tessera nodes.
//!
//! Length-prefixed binary frames over plain TCP, one reader and one writer
//! task per connection, and a [`network::Network`] trait the node drives.

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod messages;
pub mod network;
pub mod peer_manager;
pub mod protocol;
pub mod relay;

pub use messages::NetworkMessage;
pub use network::Network;
pub use relay::{RelayEvent, RelayNode};
