//! Inbound message dispatch.
//!
//! Every handler takes the engine lock only for the chain operation itself;
//! replies and rebroadcasts go out after it is released.

use tessera_chain::sync::BlockRange;
use tessera_chain::{BlockOutcome, ChainError, Outbound, StateGuard, SyncAction};
use tessera_relay::{Network, NetworkMessage, RelayEvent};
use tessera_types::constants::SYNC_BATCH_SIZE;
use tessera_types::primitives::{PeerId, Timestamp};

/// Wire form of an engine broadcast.
pub fn outbound_message(outbound: Outbound) -> NetworkMessage {
    match outbound {
        Outbound::Bid(bid) => NetworkMessage::Bid(bid),
        Outbound::Vote(vote) => NetworkMessage::Vote(vote),
        Outbound::Block { height, block } => NetworkMessage::ShareBlock { height, block },
        Outbound::Transaction(tx) => NetworkMessage::ShareTransaction(tx),
    }
}

/// Broadcast engine output to every peer.
pub fn broadcast_all<N: Network + ?Sized>(network: &N, outbound: Vec<Outbound>) {
    for item in outbound {
        let message = outbound_message(item);
        if let Err(e) = network.broadcast(&message, None) {
            tracing::warn!(opcode = ?message.opcode(), error = %e, "broadcast failed");
        }
    }
}

fn relay_on<N: Network + ?Sized>(network: &N, message: &NetworkMessage, from: PeerId) {
    if let Err(e) = network.broadcast(message, Some(from)) {
        tracing::warn!(opcode = ?message.opcode(), error = %e, "rebroadcast failed");
    }
}

fn reply<N: Network + ?Sized>(network: &N, peer: PeerId, message: &NetworkMessage) {
    if let Err(e) = network.send_to(peer, message) {
        tracing::debug!(peer, opcode = ?message.opcode(), error = %e, "reply failed");
    }
}

fn reject<N: Network + ?Sized>(network: &N, peer: PeerId, what: &str, error: &ChainError) {
    if error.is_misbehavior() {
        tracing::warn!(peer, reason = %error, "{what} rejected, dropping peer");
        network.remove_peer(peer, &format!("invalid {what}"));
    } else {
        tracing::debug!(peer, reason = %error, "{what} ignored");
    }
}

/// Ask random peers for each range, moving to another peer when a send
/// fails.
pub fn request_blocks<N: Network + ?Sized>(network: &N, ranges: &[BlockRange]) {
    for range in ranges {
        let message = NetworkMessage::SyncBlockRequest {
            start: range.start,
            count: range.count,
        };
        let mut tried = Vec::new();
        loop {
            let Some(peer) = network.random_peer(&tried) else {
                tracing::warn!(start = range.start, count = range.count, "no peer to request blocks from");
                break;
            };
            match network.send_to(peer, &message) {
                Ok(()) => {
                    tracing::info!(peer, start = range.start, count = range.count, "requested blocks");
                    break;
                }
                Err(e) => {
                    tracing::debug!(peer, error = %e, "block request failed, trying another peer");
                    tried.push(peer);
                }
            }
        }
    }
}

/// React to a transport event.
pub async fn handle_event<N: Network + ?Sized>(
    guard: &StateGuard,
    network: &N,
    event: RelayEvent,
    now: Timestamp,
) {
    match event {
        RelayEvent::Connected {
            peer,
            endpoint,
            outbound,
        } => {
            if outbound {
                let endpoint = endpoint.to_string();
                let recorded = guard.with(|engine| engine.record_peer(&endpoint, now)).await;
                if let Err(e) = recorded {
                    tracing::warn!(%endpoint, error = %e, "failed to persist peer");
                }
            }
            reply(network, peer, &NetworkMessage::PeerInfoRequest);
        }
        RelayEvent::Message { peer, message } => handle_message(guard, network, peer, message).await,
        RelayEvent::Disconnected { peer, reason } => {
            tracing::debug!(peer, %reason, "peer disconnected");
        }
    }
}

/// Apply one decoded message from `peer`.
pub async fn handle_message<N: Network + ?Sized>(
    guard: &StateGuard,
    network: &N,
    peer: PeerId,
    message: NetworkMessage,
) {
    match message {
        NetworkMessage::Bid(bid) => {
            let result = guard
                .with(|engine| {
                    if !engine.is_synchronized() {
                        return Ok(false);
                    }
                    engine.handle_bid(bid.clone()).map(|()| true)
                })
                .await;
            match result {
                Ok(true) => relay_on(network, &NetworkMessage::Bid(bid), peer),
                Ok(false) => {}
                Err(e) => reject(network, peer, "bid", &e),
            }
        }
        NetworkMessage::Vote(vote) => {
            let result = guard
                .with(|engine| {
                    if !engine.is_synchronized() {
                        return Ok(false);
                    }
                    engine.handle_vote(vote.clone()).map(|()| true)
                })
                .await;
            match result {
                Ok(true) => relay_on(network, &NetworkMessage::Vote(vote), peer),
                Ok(false) => {}
                Err(e) => reject(network, peer, "vote", &e),
            }
        }
        NetworkMessage::ShareTransaction(tx) => {
            let result = guard
                .with(|engine| engine.handle_transaction(tx.clone()))
                .await;
            match result {
                Ok(()) => relay_on(network, &NetworkMessage::ShareTransaction(tx), peer),
                Err(e) => reject(network, peer, "transaction", &e),
            }
        }
        NetworkMessage::ShareBlock { height, block } => {
            let result = guard
                .with(|engine| engine.handle_incoming_block(height, block.clone()))
                .await;
            match result {
                Ok(BlockOutcome::Ignored) => {}
                Ok(BlockOutcome::Committed { height, outbound }) => {
                    tracing::info!(height, hash = %hex::encode(block.hash), "committed shared block");
                    relay_on(network, &NetworkMessage::ShareBlock { height, block }, peer);
                    broadcast_all(network, outbound);
                }
                Err(e) => reject(network, peer, "block", &e),
            }
        }
        NetworkMessage::PeerInfoRequest => {
            let (height, hash) = guard.with(|engine| engine.head()).await;
            reply(network, peer, &NetworkMessage::PeerInfo { height, hash });
        }
        NetworkMessage::PeerInfo { height, hash } => {
            network.update_peer_head(peer, height, hash);
        }
        NetworkMessage::SyncBlockRequest { start, count } => {
            let blocks = guard
                .with(|engine| {
                    let (head, _) = engine.head();
                    (start <= head).then(|| engine.blocks(start, count.min(SYNC_BATCH_SIZE)))
                })
                .await;
            if let Some(blocks) = blocks {
                tracing::info!(peer, start, count = blocks.len(), "serving blocks");
                reply(network, peer, &NetworkMessage::SyncBlockResponse { start, blocks });
            }
        }
        NetworkMessage::SyncBlockResponse { start, blocks } => {
            let batch: Vec<_> = (start..).zip(blocks).collect();
            let result = guard.with(|engine| engine.handle_incoming_blocks(batch)).await;
            match result {
                Ok(outbound) => broadcast_all(network, outbound),
                Err(e) => reject(network, peer, "block batch", &e),
            }
        }
        NetworkMessage::SyncBlockchainRequest => {
            let (height, hash) = guard.with(|engine| engine.head()).await;
            reply(network, peer, &NetworkMessage::SyncBlockchainResponse { height, hash });
        }
        NetworkMessage::SyncBlockchainResponse { height, hash } => {
            let action = guard
                .with(|engine| engine.handle_sync_response(height, hash, peer))
                .await;
            match action {
                SyncAction::Wait => {}
                SyncAction::InSync(outbound) => {
                    tracing::info!("chain synchronized with peers");
                    broadcast_all(network, outbound);
                }
                SyncAction::Backfill(ranges) => request_blocks(network, &ranges),
            }
        }
        NetworkMessage::SyncTransactionPoolRequest(known) => {
            let missing = guard
                .with(|engine| engine.missing_transactions(&known))
                .await;
            if !missing.is_empty() {
                reply(network, peer, &NetworkMessage::SyncTransactionPoolResponse(missing));
            }
        }
        NetworkMessage::SyncTransactionPoolResponse(transactions) => {
            let added = guard
                .with(|engine| engine.merge_transactions(transactions))
                .await;
            if added > 0 {
                tracing::debug!(peer, added, "merged transactions from pool sync");
            }
        }
        NetworkMessage::SyncVotingPoolRequest(digest) => {
            let delta = guard.with(|engine| engine.missing_voting(&digest)).await;
            if !delta.is_empty() {
                reply(network, peer, &NetworkMessage::SyncVotingPoolResponse(delta));
            }
        }
        NetworkMessage::SyncVotingPoolResponse(delta) => {
            let added = guard
                .with(|engine| {
                    if engine.is_synchronized() {
                        engine.merge_voting(delta)
                    } else {
                        0
                    }
                })
                .await;
            if added > 0 {
                tracing::debug!(peer, added, "merged bids and votes from pool sync");
            }
        }
    }
}
