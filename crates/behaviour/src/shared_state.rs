//! Process-wide state threaded through the engine tick.

use conclave_consensus::{InternalError, Period, PeriodState, RoundId, RoundRegistry, TransitionFunction};
use conclave_types::{ConsensusParams, Payload};

/// Outbound submission lane: receives encoded payloads destined for the
/// ordering transport.
pub type BroadcastSink = Box<dyn FnMut(Vec<u8>)>;

/// Owner of the period plus the outbound lane behaviours submit through.
///
/// Constructed once at agent start and threaded by `&mut` through the ABCI
/// callbacks and the behaviour tick; never a global. Everything that can be
/// misconfigured fails in [`SharedState::setup`], before the first block.
pub struct SharedState {
    period: Period,
    broadcast: BroadcastSink,
}

impl SharedState {
    pub fn new(period: Period, broadcast: BroadcastSink) -> Self {
        Self { period, broadcast }
    }

    /// Build the period and the shared state in one step.
    pub fn setup(
        registry: RoundRegistry,
        transitions: TransitionFunction,
        initial_round: RoundId,
        state: PeriodState,
        params: ConsensusParams,
        broadcast: BroadcastSink,
    ) -> Result<Self, InternalError> {
        let period = Period::new(registry, transitions, initial_round, state, params)?;
        Ok(Self::new(period, broadcast))
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn period_mut(&mut self) -> &mut Period {
        &mut self.period
    }

    /// Serialize one payload and hand it to the transport.
    pub fn broadcast_tx(&mut self, payload: &Payload) -> Result<(), InternalError> {
        let bytes = payload.encode().map_err(InternalError::from)?;
        (self.broadcast)(bytes);
        Ok(())
    }
}
