//! Keeper-only round: a single elected sender fills a single slot.

use crate::error::{InternalError, Rejection, TransactionNotValid};
use crate::round::{events, Event, Round, RoundBase, RoundDef, RoundId};
use crate::state::PeriodState;
use conclave_types::{ConsensusParams, Payload, TransactionType};
use std::sync::Arc;

/// Derives the successor state from the keeper's submission.
pub type KeeperStateUpdate = Arc<dyn Fn(&PeriodState, &Payload) -> PeriodState>;

/// Only the agent elected in a prior round (the period state's most-voted
/// keeper address) may submit; everyone else replays its payload.
pub struct OnlyKeeperSendsRound {
    base: RoundBase,
    keeper_payload: Option<Payload>,
    done_event: Event,
    state_update: KeeperStateUpdate,
}

impl OnlyKeeperSendsRound {
    pub fn new(def: RoundDef, state: PeriodState, params: ConsensusParams) -> Self {
        Self {
            base: RoundBase::new(def, state, params),
            keeper_payload: None,
            done_event: events::DONE,
            state_update: Arc::new(|state, _| state.clone()),
        }
    }

    pub fn on_done(mut self, event: Event, update: KeeperStateUpdate) -> Self {
        self.done_event = event;
        self.state_update = update;
        self
    }

    pub fn has_keeper_sent_payload(&self) -> bool {
        self.keeper_payload.is_some()
    }

    pub fn keeper_payload(&self) -> Option<&Payload> {
        self.keeper_payload.as_ref()
    }

    /// Discriminator, membership, then keeper election; the slot check is
    /// caller-specific because admission and replay report it differently.
    fn validate_sender(&self, payload: &Payload) -> Result<(), Rejection> {
        self.base.common_checks(payload)?;
        let keeper = self.base.state.most_voted_keeper_address();
        if keeper.as_ref() != Some(&payload.sender) {
            return Err(Rejection::NotElectedKeeper {
                sender: payload.sender.clone(),
            });
        }
        Ok(())
    }
}

impl Round for OnlyKeeperSendsRound {
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
        self.validate_sender(payload).map_err(TransactionNotValid)?;
        if self.keeper_payload.is_some() {
            return Err(TransactionNotValid(Rejection::KeeperValueAlreadySet));
        }
        Ok(())
    }

    fn process_payload(&mut self, payload: Payload) -> Result<(), InternalError> {
        self.validate_sender(&payload)
            .map_err(InternalError::Rejected)?;
        if self.keeper_payload.is_some() {
            return Err(InternalError::Rejected(Rejection::KeeperAlreadySent));
        }
        self.keeper_payload = Some(payload);
        Ok(())
    }

    fn end_block(&self) -> Option<(PeriodState, Event)> {
        let payload = self.keeper_payload.as_ref()?;
        Some(((self.state_update)(&self.base.state, payload), self.done_event))
    }
}
