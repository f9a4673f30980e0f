//! Round contract and the admission arithmetic shared by all variants.

use crate::error::{InternalError, Rejection, TransactionNotValid};
use crate::state::PeriodState;
use conclave_types::{ConsensusParams, Payload, TransactionType};

/// Identifier of a round, unique within one transition function.
pub type RoundId = &'static str;

/// Label emitted by a completed round or behaviour to drive transitions.
pub type Event = &'static str;

/// Exit events emitted by the built-in round variants.
pub mod events {
    use super::Event;

    pub const DONE: Event = "done";
    pub const NEGATIVE: Event = "negative";
    pub const NONE: Event = "none";
    pub const NO_MAJORITY: Event = "no_majority";
}

/// One bounded sub-protocol aggregating payloads until a threshold is met,
/// producing a single `(state, event)` outcome.
///
/// `check_payload` runs at transaction admission, before ordering, and must
/// not mutate anything. `process_payload` runs under the chain's
/// deterministic replay and is expected to succeed; a failure there means
/// this replica has diverged. `end_block` is a pure function of the
/// collection, the period state, and the consensus parameters.
pub trait Round {
    fn round_id(&self) -> RoundId;

    fn allowed_tx_type(&self) -> TransactionType;

    /// State snapshot this round was opened with.
    fn period_state(&self) -> &PeriodState;

    /// Side-effect-free admission check.
    fn check_payload(&self, payload: &Payload) -> Result<(), TransactionNotValid>;

    /// Apply one ordered payload.
    fn process_payload(&mut self, payload: Payload) -> Result<(), InternalError>;

    /// `None` while the round is undecided; the completion outcome once its
    /// exit condition holds.
    fn end_block(&self) -> Option<(PeriodState, Event)>;
}

/// Identity block every round variant is configured with.
#[derive(Clone, Copy, Debug)]
pub struct RoundDef {
    pub round_id: RoundId,
    pub allowed_tx_type: TransactionType,
    /// Payload field acting as the vote key; only surfaces in messages.
    pub payload_attribute: &'static str,
}

/// State shared by every round variant.
pub(crate) struct RoundBase {
    pub def: RoundDef,
    pub state: PeriodState,
    pub params: ConsensusParams,
}

impl RoundBase {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self { def, state, params }
    }

    /// Admission rules common to all variants, in check order: payload
    /// discriminator, then participant membership.
    pub fn common_checks(&self, payload: &Payload) -> Result<(), Rejection> {
        let got = payload.transaction_type();
        if got != self.def.allowed_tx_type {
            return Err(Rejection::TypeMismatch {
                expected: self.def.allowed_tx_type,
                got,
            });
        }
        if !self.state.participants().contains(&payload.sender) {
            return Err(Rejection::NotParticipant {
                sender: payload.sender.clone(),
                participants: self.state.participants().iter().cloned().collect(),
            });
        }
        Ok(())
    }

    pub fn threshold(&self) -> usize {
        self.params.consensus_threshold()
    }
}

/// Whether any value could still gather a threshold of attestations, given
/// the per-value counts so far and the senders yet to contribute.
pub(crate) fn majority_possible<I>(counts: I, params: &ConsensusParams) -> bool
where
    I: IntoIterator<Item = usize>,
{
    let mut best = 0;
    let mut contributed = 0;
    for count in counts {
        best = best.max(count);
        contributed += count;
    }
    let remaining = params.max_participants().saturating_sub(contributed);
    best + remaining >= params.consensus_threshold()
}
