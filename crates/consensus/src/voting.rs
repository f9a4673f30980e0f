//! Ternary voting round: yes, no, or abstain, decided by quorum.

use crate::error::{InternalError, Rejection, TransactionNotValid};
use crate::round::{events, majority_possible, Event, Round, RoundBase, RoundDef, RoundId};
use crate::state::PeriodState;
use conclave_types::{AgentId, ConsensusParams, Payload, PayloadValue, TransactionType};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Completes when positive, negative, or abstain votes reach the quorum
/// threshold, or as soon as no outcome can reach it any more.
///
/// Since the threshold is strictly above two thirds, at most one of the
/// three outcomes can ever hold.
pub struct VotingRound {
    base: RoundBase,
    votes: BTreeMap<AgentId, Payload>,
    done_event: Event,
    negative_event: Event,
    none_event: Event,
    no_majority_event: Event,
    state_update: Arc<dyn Fn(&PeriodState) -> PeriodState>,
}

impl VotingRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            votes: BTreeMap::new(),
            done_event: events::DONE,
            negative_event: events::NEGATIVE,
            none_event: events::NONE,
            no_majority_event: events::NO_MAJORITY,
            state_update: Arc::new(PeriodState::clone),
        }
    }

    /// Event and state derivation for the positive outcome; the other
    /// outcomes leave the state untouched.
    pub fn on_done(mut self, event: Event, update: Arc<dyn Fn(&PeriodState) -> PeriodState>) -> Self {
        self.done_event = event;
        self.state_update = update;
        self
    }

    pub fn with_negative_event(mut self, event: Event) -> Self {
        self.negative_event = event;
        self
    }

    pub fn with_none_event(mut self, event: Event) -> Self {
        self.none_event = event;
        self
    }

    pub fn with_no_majority_event(mut self, event: Event) -> Self {
        self.no_majority_event = event;
        self
    }

    pub fn votes(&self) -> &BTreeMap<AgentId, Payload> {
        &self.votes
    }

    fn count(&self, key: &PayloadValue) -> usize {
        self.votes
            .values()
            .filter(|payload| payload.attribute() == *key)
            .count()
    }

    pub fn positive_vote_threshold_reached(&self) -> bool {
        self.count(&PayloadValue::Bool(true)) >= self.base.threshold()
    }

    pub fn negative_vote_threshold_reached(&self) -> bool {
        self.count(&PayloadValue::Bool(false)) >= self.base.threshold()
    }

    pub fn none_vote_threshold_reached(&self) -> bool {
        self.count(&PayloadValue::Null) >= self.base.threshold()
    }

    pub fn is_majority_possible(&self) -> bool {
        let counts = [
            self.count(&PayloadValue::Bool(true)),
            self.count(&PayloadValue::Bool(false)),
            self.count(&PayloadValue::Null),
        ];
        majority_possible(counts, &self.base.params)
    }

    fn validate(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        if self.votes.contains_key(&payload.sender) {
            return Err(Rejection::DuplicateSender {
                sender: payload.sender.clone(),
                round_id: self.base.def.round_id,
            });
        }
        Ok(())
    }
}

impl Round for VotingRound {
    fn round_id(&self) -> RoundId {
        self.base.def.round_id
    }

    fn allowed_tx_type(&self) -> TransactionType {
        self.base.def.allowed_tx_type
    }

    fn period_state(&self) -> &PeriodState {
        &self.base.state
    }

    fn check_payload(&self, payload: &Payload) -> Result<(), TransactionNotValid> {
        self.validate(payload).map_err(TransactionNotValid)
    }

    fn process_payload(&mut self, payload: Payload) -> Result<(), InternalError> {
        self.validate(&payload).map_err(InternalError::Rejected)?;
        self.votes.insert(payload.sender.clone(), payload);
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        if self.positive_vote_threshold_reached() {
            return Some(((self.state_update)(&self.base.state), self.done_event));
        }
        if self.negative_vote_threshold_reached() {
            return Some((self.base.state.clone(), self.negative_event));
        }
        if self.none_vote_threshold_reached() {
            return Some((self.base.state.clone(), self.none_event));
        }
        if !self.is_majority_possible() {
            return Some((self.base.state.clone(), self.no_majority_event));
        }
        None
    }
}
