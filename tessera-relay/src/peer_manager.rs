use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use rand::seq::IteratorRandom;
use tessera_types::primitives::{BlockHeight, Hash, PeerId};

/// Information about a connected peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: PeerId,
    /// Remote socket address of the connection.
    pub endpoint: SocketAddr,
    /// Whether we dialed this peer.
    pub outbound: bool,
    /// Head last reported through PeerInfo.
    pub top_height: Option<BlockHeight>,
    pub top_hash: Option<Hash>,
    /// When this peer connected.
    pub connected_at: Instant,
}

/// Tracks connected peers and their reported heads.
pub struct PeerManager {
    peers: HashMap<PeerId, PeerInfo>,
    max_connections: usize,
}

impl PeerManager {
    /// Create a new PeerManager with a maximum connection limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_connections,
        }
    }

    /// Add a peer. Returns false if the connection limit is reached.
    pub fn add_peer(&mut self, id: PeerId, endpoint: SocketAddr, outbound: bool) -> bool {
        if self.is_full() {
            return false;
        }
        self.peers.entry(id).or_insert_with(|| PeerInfo {
            id,
            endpoint,
            outbound,
            top_height: None,
            top_hash: None,
            connected_at: Instant::now(),
        });
        true
    }

    pub fn remove_peer(&mut self, id: PeerId) -> Option<PeerInfo> {
        self.peers.remove(&id)
    }

    pub fn peer(&self, id: PeerId) -> Option<&PeerInfo> {
        self.peers.get(&id)
    }

    /// Record the head a peer reported. Unknown peers are ignored.
    pub fn update_head(&mut self, id: PeerId, height: BlockHeight, hash: Hash) -> bool {
        match self.peers.get_mut(&id) {
            Some(info) => {
                info.top_height = Some(height);
                info.top_hash = Some(hash);
                true
            }
            None => false,
        }
    }

    /// Whether a connection to `endpoint` that we dialed already exists.
    pub fn is_dialed(&self, endpoint: &SocketAddr) -> bool {
        self.peers
            .values()
            .any(|info| info.outbound && info.endpoint == *endpoint)
    }

    /// A uniformly random connected peer other than `exclude`.
    pub fn random_peer(&self, exclude: &[PeerId]) -> Option<PeerId> {
        self.peers
            .keys()
            .filter(|id| !exclude.contains(id))
            .copied()
            .choose(&mut rand::thread_rng())
    }

    /// Whether the peer manager has reached its connection limit.
    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_connections
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Iterator over the ids of all connected peers.
    pub fn connected_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }
}
