use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tessera_types::primitives::{BlockHeight, Hash, PeerId};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{encode_frame, read_frame, write_bytes};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::messages::NetworkMessage;
use crate::network::Network;
use crate::peer_manager::{PeerInfo, PeerManager};

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Timeout for an outbound TCP connect.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that happened on the peer transport.
#[derive(Debug)]
pub enum RelayEvent {
    Connected {
        peer: PeerId,
        endpoint: SocketAddr,
        outbound: bool,
    },
    Message {
        peer: PeerId,
        message: NetworkMessage,
    },
    Disconnected {
        peer: PeerId,
        reason: String,
    },
}

struct PeerHandle {
    queue: mpsc::Sender<Arc<Vec<u8>>>,
    reader: JoinHandle<()>,
}

struct Shared {
    config: RelayConfig,
    manager: Mutex<PeerManager>,
    handles: Mutex<HashMap<PeerId, PeerHandle>>,
    next_id: AtomicU64,
    events: mpsc::Sender<RelayEvent>,
}

impl Shared {
    fn manager(&self) -> MutexGuard<'_, PeerManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<PeerId, PeerHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a fresh connection and start its reader and writer tasks.
    fn attach(
        self: &Arc<Self>,
        stream: TcpStream,
        endpoint: SocketAddr,
        outbound: bool,
    ) -> Result<PeerId, RelayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.manager().add_peer(id, endpoint, outbound) {
            warn!(
                %endpoint,
                max = self.config.max_connections,
                "peer limit reached, dropping connection"
            );
            return Err(RelayError::ConnectionError {
                reason: "peer limit reached".to_string(),
            });
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%endpoint, error = %e, "set_nodelay failed");
        }

        let (reader, writer) = stream.into_split();
        let (queue, pending) = mpsc::channel(self.config.write_queue_depth.max(1));

        // Hold the handle map while spawning so an early failure in either
        // task finds the handle in place.
        let mut handles = self.handles();
        let reader = tokio::spawn(read_loop(Arc::clone(self), id, endpoint, outbound, reader));
        tokio::spawn(write_loop(Arc::clone(self), id, writer, pending));
        handles.insert(id, PeerHandle { queue, reader });
        drop(handles);

        info!(peer = id, %endpoint, outbound, "peer connected");
        Ok(id)
    }

    /// Forget a peer and tear down its tasks. Returns false if it was unknown.
    fn drop_peer(&self, peer: PeerId, reason: &str) -> bool {
        self.manager().remove_peer(peer);
        let Some(handle) = self.handles().remove(&peer) else {
            return false;
        };
        info!(peer, reason, "peer removed");
        if self
            .events
            .try_send(RelayEvent::Disconnected {
                peer,
                reason: reason.to_string(),
            })
            .is_err()
        {
            debug!(peer, "event channel full, disconnect not reported");
        }
        // Dropping the queue ends the writer task.
        handle.reader.abort();
        true
    }

    fn enqueue(&self, peer: PeerId, bytes: &Arc<Vec<u8>>) -> Result<(), RelayError> {
        let queue = self
            .handles()
            .get(&peer)
            .map(|handle| handle.queue.clone())
            .ok_or_else(|| RelayError::PeerNotFound {
                peer: peer.to_string(),
            })?;
        if queue.try_send(Arc::clone(bytes)).is_err() {
            self.drop_peer(peer, "not responding");
            return Err(RelayError::ConnectionError {
                reason: format!("peer {peer} not responding"),
            });
        }
        Ok(())
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    peer: PeerId,
    endpoint: SocketAddr,
    outbound: bool,
    mut reader: OwnedReadHalf,
) {
    let connected = RelayEvent::Connected {
        peer,
        endpoint,
        outbound,
    };
    if shared.events.send(connected).await.is_err() {
        return;
    }

    let reason = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(RelayError::ConnectionError { .. }) => break "connection closed".to_string(),
            Err(e) => break format!("bad frame: {e}"),
        };
        match NetworkMessage::from_frame(&frame) {
            Ok(message) => {
                if shared
                    .events
                    .send(RelayEvent::Message { peer, message })
                    .await
                    .is_err()
                {
                    break "relay shut down".to_string();
                }
            }
            Err(e) => break format!("malformed {:?} payload: {e}", frame.opcode),
        }
    };
    shared.drop_peer(peer, &reason);
}

async fn write_loop(
    shared: Arc<Shared>,
    peer: PeerId,
    mut writer: OwnedWriteHalf,
    mut pending: mpsc::Receiver<Arc<Vec<u8>>>,
) {
    while let Some(bytes) = pending.recv().await {
        if let Err(e) = write_bytes(&mut writer, &bytes).await {
            debug!(peer, error = %e, "write failed");
            shared.drop_peer(peer, "not responding");
            return;
        }
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, endpoint)) => {
                if let Err(e) = shared.attach(stream, endpoint, false) {
                    debug!(%endpoint, error = %e, "inbound connection refused");
                }
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

/// TCP peer transport. Cheap to clone.
#[derive(Clone)]
pub struct RelayNode {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

impl RelayNode {
    /// Bind the listener and start accepting. Inbound traffic arrives on
    /// the returned receiver.
    pub async fn bind(config: RelayConfig) -> Result<(Self, mpsc::Receiver<RelayEvent>), RelayError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| RelayError::NetworkError {
                reason: format!("listen on {}: {}", config.listen_addr, e),
            })?;
        let local_addr = listener.local_addr().map_err(|e| RelayError::NetworkError {
            reason: format!("local addr: {}", e),
        })?;

        let (events, inbound) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            manager: Mutex::new(PeerManager::new(config.max_connections)),
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            events,
            config,
        });
        tokio::spawn(accept_loop(Arc::clone(&shared), listener));

        info!(listen = %local_addr, "relay node started");
        Ok((Self { shared, local_addr }, inbound))
    }

    /// The address actually bound, useful when the config asked for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the relay config.
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    pub fn peer_info(&self, peer: PeerId) -> Option<PeerInfo> {
        self.shared.manager().peer(peer).cloned()
    }

    /// Whether we already hold an outbound connection to `endpoint`.
    pub fn is_dialed(&self, endpoint: &SocketAddr) -> bool {
        self.shared.manager().is_dialed(endpoint)
    }

    /// Drop every peer.
    pub fn disconnect_all(&self, reason: &str) {
        let peers: Vec<PeerId> = self.shared.manager().connected_peers().collect();
        for peer in peers {
            self.shared.drop_peer(peer, reason);
        }
    }
}

#[async_trait]
impl Network for RelayNode {
    fn broadcast(&self, message: &NetworkMessage, exclude: Option<PeerId>) -> Result<usize, RelayError> {
        let bytes = Arc::new(encode_frame(&message.to_frame())?);
        let peers: Vec<PeerId> = self
            .shared
            .manager()
            .connected_peers()
            .filter(|peer| Some(*peer) != exclude)
            .collect();
        let delivered = peers
            .into_iter()
            .filter(|peer| self.shared.enqueue(*peer, &bytes).is_ok())
            .count();
        debug!(opcode = ?message.opcode(), delivered, "broadcast");
        Ok(delivered)
    }

    fn send_to(&self, peer: PeerId, message: &NetworkMessage) -> Result<(), RelayError> {
        let bytes = Arc::new(encode_frame(&message.to_frame())?);
        self.shared.enqueue(peer, &bytes)
    }

    fn random_peer(&self, exclude: &[PeerId]) -> Option<PeerId> {
        self.shared.manager().random_peer(exclude)
    }

    fn remove_peer(&self, peer: PeerId, reason: &str) {
        self.shared.drop_peer(peer, reason);
    }

    fn peer_count(&self) -> usize {
        self.shared.manager().peer_count()
    }

    fn update_peer_head(&self, peer: PeerId, height: BlockHeight, hash: Hash) {
        if !self.shared.manager().update_head(peer, height, hash) {
            debug!(peer, "head reported by unknown peer");
        }
    }

    async fn connect(&self, endpoint: SocketAddr) -> Result<PeerId, RelayError> {
        if endpoint == self.local_addr {
            return Err(RelayError::ConnectionError {
                reason: "refusing to dial self".to_string(),
            });
        }
        let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(endpoint))
            .await
            .map_err(|_| RelayError::ConnectionError {
                reason: format!("dial {endpoint}: timed out"),
            })?
            .map_err(|e| RelayError::ConnectionError {
                reason: format!("dial {endpoint}: {e}"),
            })?;
        self.shared.attach(stream, endpoint, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, Frame};
    use crate::protocol::Opcode;
    use tessera_types::consensus::NodeVote;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    fn test_config(max_connections: usize) -> RelayConfig {
        RelayConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            boot_nodes: vec![],
            max_connections,
            write_queue_depth: 16,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<RelayEvent>) -> RelayEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("relay event channel closed")
    }

    fn sample_vote() -> NodeVote {
        NodeVote {
            last_block_hash: [1u8; 32],
            address: [2u8; 20],
            voted_for: [3u8; 20],
            signature: [4u8; 65],
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let (node, _rx) = RelayNode::bind(test_config(8)).await.unwrap();
        assert_ne!(node.local_addr().port(), 0);
        assert_eq!(node.peer_count(), 0);
        assert_eq!(node.random_peer(&[]), None);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let (node, _rx) = RelayNode::bind(test_config(8)).await.unwrap();
        let result = node.send_to(42, &NetworkMessage::PeerInfoRequest);
        assert!(matches!(result, Err(RelayError::PeerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_two_nodes_exchange_message() {
        let (a, mut a_rx) = RelayNode::bind(test_config(8)).await.unwrap();
        let (b, mut b_rx) = RelayNode::bind(test_config(8)).await.unwrap();

        let a_peer = b.connect(a.local_addr()).await.unwrap();
        assert!(b.is_dialed(&a.local_addr()));
        assert!(matches!(
            next_event(&mut b_rx).await,
            RelayEvent::Connected { outbound: true, .. }
        ));
        let b_peer = match next_event(&mut a_rx).await {
            RelayEvent::Connected { peer, outbound, .. } => {
                assert!(!outbound);
                peer
            }
            other => panic!("unexpected event {other:?}"),
        };

        let vote = NetworkMessage::Vote(sample_vote());
        assert_eq!(b.broadcast(&vote, None).unwrap(), 1);
        match next_event(&mut a_rx).await {
            RelayEvent::Message { peer, message } => {
                assert_eq!(peer, b_peer);
                assert_eq!(message, vote);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(b.broadcast(&vote, Some(a_peer)).unwrap(), 0);

        let reply = NetworkMessage::PeerInfo {
            height: 3,
            hash: [3u8; 32],
        };
        a.send_to(b_peer, &reply).unwrap();
        match next_event(&mut b_rx).await {
            RelayEvent::Message { message, .. } => assert_eq!(message, reply),
            other => panic!("unexpected event {other:?}"),
        }
        b.update_peer_head(a_peer, 3, [3u8; 32]);
        assert_eq!(b.peer_info(a_peer).unwrap().top_height, Some(3));
    }

    #[tokio::test]
    async fn test_remove_peer_closes_connection() {
        let (a, mut a_rx) = RelayNode::bind(test_config(8)).await.unwrap();
        let (b, mut b_rx) = RelayNode::bind(test_config(8)).await.unwrap();

        let a_peer = b.connect(a.local_addr()).await.unwrap();
        next_event(&mut a_rx).await;
        next_event(&mut b_rx).await;

        b.remove_peer(a_peer, "misbehaving");
        assert_eq!(b.peer_count(), 0);
        match next_event(&mut b_rx).await {
            RelayEvent::Disconnected { reason, .. } => assert_eq!(reason, "misbehaving"),
            other => panic!("unexpected event {other:?}"),
        }
        match next_event(&mut a_rx).await {
            RelayEvent::Disconnected { reason, .. } => assert_eq!(reason, "connection closed"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(a.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_drops_peer() {
        let (a, mut a_rx) = RelayNode::bind(test_config(8)).await.unwrap();
        let mut raw = TcpStream::connect(a.local_addr()).await.unwrap();
        next_event(&mut a_rx).await;

        // A Vote frame one byte short of a vote.
        let frame = Frame::request(Opcode::Vote, vec![0u8; 10]);
        raw.write_all(&encode_frame(&frame).unwrap()).await.unwrap();

        match next_event(&mut a_rx).await {
            RelayEvent::Disconnected { reason, .. } => assert!(reason.starts_with("malformed")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(a.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (a, mut a_rx) = RelayNode::bind(test_config(1)).await.unwrap();
        let (b, _b_rx) = RelayNode::bind(test_config(8)).await.unwrap();
        let (c, _c_rx) = RelayNode::bind(test_config(8)).await.unwrap();

        b.connect(a.local_addr()).await.unwrap();
        next_event(&mut a_rx).await;
        c.connect(a.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(a.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_refuses_to_dial_self() {
        let (a, _rx) = RelayNode::bind(test_config(8)).await.unwrap();
        assert!(a.connect(a.local_addr()).await.is_err());
    }
}
