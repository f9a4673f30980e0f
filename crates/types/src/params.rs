use serde::{Deserialize, Serialize};

/// Consensus-critical parameters shared by every replica in a period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    max_participants: usize,
}

impl ConsensusParams {
    pub fn new(max_participants: usize) -> Self {
        Self { max_participants }
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    /// Minimum number of agreeing senders for a decision.
    ///
    /// `floor(2N/3) + 1`: the smallest count strictly above two thirds of
    /// the participant set, so two disjoint quorums cannot both decide.
    pub fn consensus_threshold(&self) -> usize {
        self.max_participants * 2 / 3 + 1
    }
}
