use std::collections::BTreeMap;

use tessera_types::constants::{SYNC_BATCH_SIZE, SYNC_THRESHOLD};
use tessera_types::primitives::{BlockHeight, Hash, PeerId};

use crate::consensus::required_majority;

/// Where the node stands in height negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    AwaitingResponses,
    InSync,
    OutOfSync,
    Backfilling,
}

/// Result of recording one peer's reported head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Not enough responses yet.
    Pending,
    /// The local chain is at (or within the threshold of) the majority head.
    InSync,
    /// The majority head is ahead: `needed` blocks up to `target`.
    OutOfSync { target: BlockHeight, needed: u64 },
}

/// Responses gathered during one negotiation round.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub expected_responses: usize,
    pub responses: BTreeMap<BlockHeight, Vec<(Hash, PeerId)>>,
    pub local_height: BlockHeight,
    pub local_hash: Hash,
}

impl SyncState {
    fn total_responses(&self) -> usize {
        self.responses.values().map(Vec::len).sum()
    }

    fn has_response_from(&self, peer: PeerId) -> bool {
        self.responses
            .values()
            .flatten()
            .any(|(_, responder)| *responder == peer)
    }
}

/// Height negotiation state machine.
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    phase: SyncPhase,
    state: Option<SyncState>,
    threshold: u64,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new(SYNC_THRESHOLD)
    }
}

impl SyncCoordinator {
    pub fn new(threshold: u64) -> Self {
        Self {
            phase: SyncPhase::Idle,
            state: None,
            threshold,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> Option<&SyncState> {
        self.state.as_ref()
    }

    /// Start a round expecting `expected` responses, replacing any open one.
    pub fn initiate(&mut self, expected: usize, local_height: BlockHeight, local_hash: Hash) {
        self.state = Some(SyncState {
            expected_responses: expected,
            responses: BTreeMap::new(),
            local_height,
            local_hash,
        });
        self.phase = SyncPhase::AwaitingResponses;
    }

    /// Record a peer's head. Responses outside a round, or repeated by the
    /// same peer, are ignored.
    pub fn record_response(&mut self, height: BlockHeight, hash: Hash, peer: PeerId) -> SyncDecision {
        let Some(state) = self.state.as_mut() else {
            return SyncDecision::Pending;
        };
        if state.has_response_from(peer) {
            return SyncDecision::Pending;
        }
        state.responses.entry(height).or_default().push((hash, peer));

        if state.total_responses() < required_majority(state.expected_responses) {
            return SyncDecision::Pending;
        }

        let local = state.local_height;
        // Most corroborated height above ours; ties go to the highest height.
        let best = state
            .responses
            .iter()
            .filter(|(height, _)| **height > local)
            .max_by_key(|(height, peers)| (peers.len(), **height))
            .map(|(height, _)| *height);

        let decision = match best {
            None => SyncDecision::InSync,
            Some(target) => {
                let needed = target - local;
                if needed <= self.threshold {
                    SyncDecision::InSync
                } else {
                    SyncDecision::OutOfSync { target, needed }
                }
            }
        };

        self.state = None;
        self.phase = match decision {
            SyncDecision::InSync => SyncPhase::InSync,
            _ => SyncPhase::OutOfSync,
        };
        tracing::debug!(?decision, local, "sync round resolved");
        decision
    }

    pub fn begin_backfill(&mut self) {
        self.phase = SyncPhase::Backfilling;
    }

    /// The block pool drained: the node caught up.
    pub fn mark_in_sync(&mut self) {
        self.state = None;
        self.phase = SyncPhase::InSync;
    }
}

/// A contiguous run of block heights to request from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: BlockHeight,
    pub count: u64,
}

/// Split the `needed` blocks ending at `target` into request batches.
pub fn backfill_plan(target: BlockHeight, needed: u64) -> Vec<BlockRange> {
    let start = (target + 1).saturating_sub(needed);
    let mut ranges = Vec::new();
    let mut next = start;
    let mut remaining = needed;
    while remaining > 0 {
        let count = remaining.min(SYNC_BATCH_SIZE);
        ranges.push(BlockRange { start: next, count });
        next += count;
        remaining -= count;
    }
    ranges
}
