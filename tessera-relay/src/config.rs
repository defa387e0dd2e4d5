use std::net::SocketAddr;

use tessera_types::constants::DEFAULT_P2P_PORT;

/// Default cap on simultaneously connected peers.
pub const DEFAULT_MAX_CONNECTIONS: usize = 32;

/// Default number of encoded frames queued per peer before it counts as stalled.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 256;

/// Configuration for a relay node.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Bootstrap peers as `ip:port` strings.
    pub boot_nodes: Vec<String>,
    /// Maximum number of connections, inbound and outbound together.
    pub max_connections: usize,
    /// Per-peer outbound queue length.
    pub write_queue_depth: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_P2P_PORT).into(),
            boot_nodes: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}
