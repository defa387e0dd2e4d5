//! Periodic node duties, one function per timer.

use std::net::SocketAddr;

use tessera_chain::StateGuard;
use tessera_relay::discovery::Discovery;
use tessera_relay::{Network, NetworkMessage};
use tessera_types::constants::MINIMUM_PEERS;
use tessera_types::primitives::Timestamp;

use crate::handlers::broadcast_all;

/// How many remembered peers are considered per reconnect round.
const RECENT_PEER_LIMIT: usize = 32;

fn broadcast<N: Network + ?Sized>(network: &N, message: &NetworkMessage) {
    if let Err(e) = network.broadcast(message, None) {
        tracing::warn!(opcode = ?message.opcode(), error = %e, "broadcast failed");
    }
}

/// Consensus round. A no-op until the chain is synchronized.
pub async fn consensus<N: Network + ?Sized>(guard: &StateGuard, network: &N, now: Timestamp) {
    let outbound = guard.with(|engine| engine.check_consensus(now)).await;
    broadcast_all(network, outbound);
}

/// Start a height negotiation with every connected peer. With no peers
/// there is nobody to disagree with, so the local chain counts as
/// synchronized.
pub async fn sync_blockchain<N: Network + ?Sized>(guard: &StateGuard, network: &N) {
    let peers = network.peer_count();
    if peers == 0 {
        guard
            .with(|engine| {
                if !engine.is_synchronized() {
                    tracing::info!("no peers connected, treating local chain as synchronized");
                    engine.mark_synchronized();
                }
            })
            .await;
        return;
    }
    guard.with(|engine| engine.initiate_sync(peers)).await;
    broadcast(network, &NetworkMessage::SyncBlockchainRequest);
}

pub async fn sync_transaction_pool<N: Network + ?Sized>(guard: &StateGuard, network: &N) {
    let known = guard.with(|engine| engine.transaction_hashes()).await;
    broadcast(network, &NetworkMessage::SyncTransactionPoolRequest(known));
}

/// Exchange bid and vote pools. Only while synchronized.
pub async fn sync_voting_pool<N: Network + ?Sized>(guard: &StateGuard, network: &N) {
    let digest = guard
        .with(|engine| engine.is_synchronized().then(|| engine.voting_digest()))
        .await;
    if let Some(digest) = digest {
        broadcast(network, &NetworkMessage::SyncVotingPoolRequest(digest));
    }
}

pub async fn clean_pools(guard: &StateGuard) {
    guard.with(|engine| engine.clean_pools()).await;
}

pub fn peer_info<N: Network + ?Sized>(network: &N) {
    broadcast(network, &NetworkMessage::PeerInfoRequest);
}

/// Dial boot nodes and remembered peers while under MINIMUM_PEERS.
pub async fn connect_peers<N, F>(guard: &StateGuard, network: &N, discovery: &Discovery, already_dialed: F)
where
    N: Network + ?Sized,
    F: Fn(&SocketAddr) -> bool,
{
    let connected = network.peer_count();
    if connected >= MINIMUM_PEERS {
        return;
    }
    let remembered = match guard.with(|engine| engine.recent_peers(RECENT_PEER_LIMIT)).await {
        Ok(records) => records.into_iter().map(|record| record.endpoint).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load remembered peers");
            Vec::new()
        }
    };
    let candidates = discovery.dial_candidates(&remembered, MINIMUM_PEERS - connected, already_dialed);
    for endpoint in candidates {
        match network.connect(endpoint).await {
            Ok(peer) => tracing::info!(peer, %endpoint, "dialed peer"),
            Err(e) => tracing::debug!(%endpoint, error = %e, "dial failed"),
        }
    }
}
