use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_types::primitives::{BlockHeight, Hash, PeerId};

use crate::error::RelayError;
use crate::messages::NetworkMessage;

/// Peer transport as seen by the node.
///
/// Sends are non-blocking: they hand encoded frames to per-peer queues and
/// never wait on a socket.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send to every connected peer except `exclude`. Returns how many
    /// peers accepted the frame.
    fn broadcast(&self, message: &NetworkMessage, exclude: Option<PeerId>) -> Result<usize, RelayError>;

    fn send_to(&self, peer: PeerId, message: &NetworkMessage) -> Result<(), RelayError>;

    fn random_peer(&self, exclude: &[PeerId]) -> Option<PeerId>;

    /// Disconnect a peer. Unknown peers are ignored.
    fn remove_peer(&self, peer: PeerId, reason: &str);

    fn peer_count(&self) -> usize;

    /// Remember the head a peer reported through PeerInfo.
    fn update_peer_head(&self, peer: PeerId, height: BlockHeight, hash: Hash);

    /// Dial a peer's listen address.
    async fn connect(&self, endpoint: SocketAddr) -> Result<PeerId, RelayError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    fn broadcast(&self, message: &NetworkMessage, exclude: Option<PeerId>) -> Result<usize, RelayError> {
        (**self).broadcast(message, exclude)
    }

    fn send_to(&self, peer: PeerId, message: &NetworkMessage) -> Result<(), RelayError> {
        (**self).send_to(peer, message)
    }

    fn random_peer(&self, exclude: &[PeerId]) -> Option<PeerId> {
        (**self).random_peer(exclude)
    }

    fn remove_peer(&self, peer: PeerId, reason: &str) {
        (**self).remove_peer(peer, reason)
    }

    fn peer_count(&self) -> usize {
        (**self).peer_count()
    }

    fn update_peer_head(&self, peer: PeerId, height: BlockHeight, hash: Hash) {
        (**self).update_peer_head(peer, height, hash)
    }

    async fn connect(&self, endpoint: SocketAddr) -> Result<PeerId, RelayError> {
        (**self).connect(endpoint).await
    }
}
