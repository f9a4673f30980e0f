//! Collection-style rounds: sender-keyed and value-keyed aggregation.
//!
//! Exit behavior is configuration, not subclassing: each variant takes an
//! application-supplied state-update closure (and, for the base variant, a
//! whole end-block policy), so the same structs serve every application
//! round and every test fixture.

use crate::error::{InternalError, Rejection, TransactionNotValid};
use crate::round::{events, majority_possible, Event, Round, RoundBase, RoundDef, RoundId};
use crate::state::PeriodState;
use conclave_types::{AgentId, ConsensusParams, Payload, PayloadValue, TransactionType};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Application hook deriving the successor state from a finished round's
/// collection.
pub type StateUpdate<C> = Arc<dyn Fn(&PeriodState, &C) -> PeriodState>;

/// Fully application-defined exit rule for [`CollectionRound`].
pub type EndBlockPolicy = Arc<
    dyn Fn(&PeriodState, &BTreeMap<AgentId, Payload>, &ConsensusParams) -> Option<(PeriodState, Event)>,
>;

fn unchanged<C>() -> StateUpdate<C> {
    Arc::new(|state: &PeriodState, _: &C| state.clone())
}

// ---------------------------------------------------------------------
// CollectionRound
// ---------------------------------------------------------------------

/// Sender-keyed collection; one acceptance slot per participant.
///
/// The base variant never completes on its own. Applications that use it
/// directly attach an end-block policy.
pub struct CollectionRound {
    base: RoundBase,
    collection: BTreeMap<AgentId, Payload>,
    end_block_policy: Option<EndBlockPolicy>,
}

impl CollectionRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            collection: BTreeMap::new(),
            end_block_policy: None,
        }
    }

    pub fn with_end_block_policy(mut self, policy: EndBlockPolicy) -> Self {
        self.end_block_policy = Some(policy);
        self
    }

    pub fn collection(&self) -> &BTreeMap<AgentId, Payload> {
        &self.collection
    }

    fn validate(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        if self.collection.contains_key(&payload.sender) {
            return Err(Rejection::DuplicateSender {
                sender: payload.sender.clone(),
                round_id: self.base.def.round_id,
            });
        }
        Ok(())
    }
}

impl Round for CollectionRound {
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
        self.collection.insert(payload.sender.clone(), payload);
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        let policy = self.end_block_policy.as_ref()?;
        policy(&self.base.state, &self.collection, &self.base.params)
    }
}

// ---------------------------------------------------------------------
// CollectDifferentUntilAllRound
// ---------------------------------------------------------------------

/// Collects pairwise-distinct attribute values until all `N` participants
/// have contributed one.
pub struct CollectDifferentUntilAllRound {
    base: RoundBase,
    collection: BTreeSet<PayloadValue>,
    done_event: Event,
    state_update: StateUpdate<BTreeSet<PayloadValue>>,
}

impl CollectDifferentUntilAllRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            collection: BTreeSet::new(),
            done_event: events::DONE,
            state_update: unchanged(),
        }
    }

    pub fn on_done(mut self, event: Event, update: StateUpdate<BTreeSet<PayloadValue>>) -> Self {
        self.done_event = event;
        self.state_update = update;
        self
    }

    pub fn collection(&self) -> &BTreeSet<PayloadValue> {
        &self.collection
    }

    /// All `N` distinct values are in.
    pub fn collection_threshold_reached(&self) -> bool {
        self.collection.len() == self.base.params.max_participants()
    }

    fn validate(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        let value = payload.attribute();
        if self.collection.contains(&value) {
            return Err(Rejection::DuplicateValue {
                attribute: self.base.def.payload_attribute,
                value,
                round_id: self.base.def.round_id,
            });
        }
        Ok(())
    }
}

impl Round for CollectDifferentUntilAllRound {
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
        self.collection.insert(payload.attribute());
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        if !self.collection_threshold_reached() {
            return None;
        }
        let next = (self.state_update)(&self.base.state, &self.collection);
        Some((next, self.done_event))
    }
}

// ---------------------------------------------------------------------
// CollectDifferentUntilThresholdRound
// ---------------------------------------------------------------------

/// Sender-keyed collection that completes once a threshold of distinct
/// contributors is reached.
pub struct CollectDifferentUntilThresholdRound {
    base: RoundBase,
    collection: BTreeMap<AgentId, Payload>,
    done_event: Event,
    state_update: StateUpdate<BTreeMap<AgentId, Payload>>,
}

impl CollectDifferentUntilThresholdRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            collection: BTreeMap::new(),
            done_event: events::DONE,
            state_update: unchanged(),
        }
    }

    pub fn on_done(
        mut self,
        event: Event,
        update: StateUpdate<BTreeMap<AgentId, Payload>>,
    ) -> Self {
        self.done_event = event;
        self.state_update = update;
        self
    }

    pub fn collection(&self) -> &BTreeMap<AgentId, Payload> {
        &self.collection
    }

    pub fn collection_threshold_reached(&self) -> bool {
        self.collection.len() >= self.base.threshold()
    }

    fn validate(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        if self.collection.contains_key(&payload.sender) {
            return Err(Rejection::DuplicateSender {
                sender: payload.sender.clone(),
                round_id: self.base.def.round_id,
            });
        }
        Ok(())
    }
}

impl Round for CollectDifferentUntilThresholdRound {
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
        self.collection.insert(payload.sender.clone(), payload);
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        if !self.collection_threshold_reached() {
            return None;
        }
        let next = (self.state_update)(&self.base.state, &self.collection);
        Some((next, self.done_event))
    }
}

// ---------------------------------------------------------------------
// CollectSameUntilThresholdRound
// ---------------------------------------------------------------------

/// Completes once a threshold of senders have submitted the same attribute
/// value.
pub struct CollectSameUntilThresholdRound {
    base: RoundBase,
    collection: BTreeMap<AgentId, Payload>,
    done_event: Event,
    no_majority_event: Event,
    state_update: StateUpdate<PayloadValue>,
}

impl CollectSameUntilThresholdRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            collection: BTreeMap::new(),
            done_event: events::DONE,
            no_majority_event: events::NO_MAJORITY,
            state_update: unchanged(),
        }
    }

    /// Event and state derivation applied to the most-voted value on
    /// completion.
    pub fn on_done(mut self, event: Event, update: StateUpdate<PayloadValue>) -> Self {
        self.done_event = event;
        self.state_update = update;
        self
    }

    pub fn with_no_majority_event(mut self, event: Event) -> Self {
        self.no_majority_event = event;
        self
    }

    pub fn collection(&self) -> &BTreeMap<AgentId, Payload> {
        &self.collection
    }

    /// Attestation counts per distinct vote key, in canonical value order.
    fn vote_counts(&self) -> BTreeMap<PayloadValue, usize> {
        let mut counts = BTreeMap::new();
        for payload in self.collection.values() {
            *counts.entry(payload.attribute()).or_insert(0) += 1;
        }
        counts
    }

    /// Some vote key holds at least a threshold of attestations.
    pub fn threshold_reached(&self) -> bool {
        self.vote_counts()
            .values()
            .any(|&count| count >= self.base.threshold())
    }

    /// The value with a threshold of attestations. Should two values reach
    /// the threshold in the same block, the smaller one in the canonical
    /// value order wins on every replica.
    pub fn most_voted_payload(&self) -> Result<PayloadValue, InternalError> {
        let mut best: Option<(PayloadValue, usize)> = None;
        for (value, count) in self.vote_counts() {
            let leads = best.as_ref().map_or(true, |(_, top)| count > *top);
            if leads {
                best = Some((value, count));
            }
        }
        match best {
            Some((value, count)) if count >= self.base.threshold() => Ok(value),
            _ => Err(InternalError::NotEnoughVotes),
        }
    }

    pub fn is_majority_possible(&self) -> bool {
        majority_possible(self.vote_counts().into_values(), &self.base.params)
    }

    fn validate(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        if self.collection.contains_key(&payload.sender) {
            return Err(Rejection::DuplicateSender {
                sender: payload.sender.clone(),
                round_id: self.base.def.round_id,
            });
        }
        Ok(())
    }
}

impl Round for CollectSameUntilThresholdRound {
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
        self.collection.insert(payload.sender.clone(), payload);
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        if let Ok(most_voted) = self.most_voted_payload() {
            let next = (self.state_update)(&self.base.state, &most_voted);
            return Some((next, self.done_event));
        }
        if !self.is_majority_possible() {
            return Some((self.base.state.clone(), self.no_majority_event));
        }
        None
    }
}
