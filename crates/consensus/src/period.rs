//! The round tape: registry, transition function, and the `Period` driver.

use crate::error::{InternalError, PeriodError, Rejection, TransactionNotValid};
use crate::round::{Event, Round, RoundId};
use crate::state::PeriodState;
use conclave_types::{Block, BlockHeader, Blockchain, ConsensusParams, Payload};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Builds a fresh round instance from the state it opens with.
pub type RoundFactory = Box<dyn Fn(PeriodState, ConsensusParams) -> Box<dyn Round>>;

/// Name-to-factory table. Every round an application can enter is
/// registered here up front; there is no runtime class lookup.
#[derive(Default)]
pub struct RoundRegistry {
    factories: BTreeMap<RoundId, RoundFactory>,
}

impl RoundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        round_id: RoundId,
        factory: RoundFactory,
    ) -> Result<(), InternalError> {
        if self.factories.contains_key(round_id) {
            return Err(InternalError::RoundIdAlreadyUsed(round_id));
        }
        self.factories.insert(round_id, factory);
        Ok(())
    }

    pub fn contains(&self, round_id: RoundId) -> bool {
        self.factories.contains_key(round_id)
    }

    fn build(
        &self,
        round_id: RoundId,
        state: PeriodState,
        params: ConsensusParams,
    ) -> Result<Box<dyn Round>, InternalError> {
        let factory = self
            .factories
            .get(round_id)
            .ok_or(InternalError::UnknownRoundId(round_id))?;
        Ok(factory(state, params))
    }
}

/// Static event graph: `(round, event) -> next round`. A completion event
/// with no outgoing edge terminates the period.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionFunction {
    table: BTreeMap<RoundId, BTreeMap<Event, RoundId>>,
}

impl TransitionFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable edge declaration.
    pub fn on(mut self, from: RoundId, event: Event, to: RoundId) -> Self {
        self.table.entry(from).or_default().insert(event, to);
        self
    }

    pub fn next(&self, from: RoundId, event: Event) -> Option<RoundId> {
        self.table.get(from)?.get(event).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every round id appearing as an edge endpoint.
    fn referenced_rounds(&self) -> impl Iterator<Item = RoundId> + '_ {
        self.table
            .iter()
            .flat_map(|(from, edges)| std::iter::once(*from).chain(edges.values().copied()))
    }
}

/// Ordered tape of rounds forming one full execution of the application.
///
/// Exactly one round is current at any time; `current_round_id` changes
/// atomically with the round swap, so the behaviour layer observes either
/// the old round or the new one, never an intermediate.
pub struct Period {
    registry: RoundRegistry,
    transitions: TransitionFunction,
    params: ConsensusParams,
    current_round: Option<Box<dyn Round>>,
    current_round_id: Option<RoundId>,
    blockchain: Blockchain,
    current_block: Option<Block>,
    final_outcome: Option<(PeriodState, Event)>,
}

impl std::fmt::Debug for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Period")
            .field("transitions", &self.transitions)
            .field("params", &self.params)
            .field("current_round_id", &self.current_round_id)
            .field("current_block", &self.current_block)
            .field("final_outcome", &self.final_outcome)
            .finish()
    }
}

impl Period {
    /// Fails loudly when the initial round or any transition endpoint is
    /// not registered; nothing is resolved later.
    pub fn new(
        registry: RoundRegistry,
        transitions: TransitionFunction,
        initial_round: RoundId,
        state: PeriodState,
        params: ConsensusParams,
    ) -> Result<Self, InternalError> {
        for round_id in transitions.referenced_rounds() {
            if !registry.contains(round_id) {
                return Err(InternalError::UnknownRoundId(round_id));
            }
        }
        let round = registry.build(initial_round, state, params)?;
        Ok(Self {
            registry,
            transitions,
            params,
            current_round: Some(round),
            current_round_id: Some(initial_round),
            blockchain: Blockchain::new(),
            current_block: None,
            final_outcome: None,
        })
    }

    /// The single fact the behaviour layer polls. `None` once the period
    /// has reached a terminal state.
    pub fn current_round_id(&self) -> Option<RoundId> {
        self.current_round_id
    }

    pub fn is_finished(&self) -> bool {
        self.current_round.is_none()
    }

    /// Final `(state, event)` of the period, once terminal.
    pub fn final_outcome(&self) -> Option<&(PeriodState, Event)> {
        self.final_outcome.as_ref()
    }

    /// State snapshot the active round was opened with.
    pub fn period_state(&self) -> Option<&PeriodState> {
        self.current_round.as_deref().map(Round::period_state)
    }

    /// Active round, for read-only inspection.
    pub fn current_round(&self) -> Option<&dyn Round> {
        self.current_round.as_deref()
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn open_block_height(&self) -> Option<u64> {
        self.current_block.as_ref().map(|block| block.header.height)
    }

    /// Open a new block context.
    pub fn begin_block(&mut self, header: BlockHeader) {
        debug!("begin block {}", header.height);
        self.current_block = Some(Block::new(header));
    }

    /// Route one ordered payload through the current round's admission and
    /// replay entry points, recording it in the open block.
    pub fn deliver_tx(&mut self, payload: Payload) -> Result<(), PeriodError> {
        let round = self
            .current_round
            .as_deref_mut()
            .ok_or(TransactionNotValid(Rejection::NoActiveRound))?;
        let block = self
            .current_block
            .as_mut()
            .ok_or(InternalError::NoOpenBlock)?;
        round.check_payload(&payload)?;
        round.process_payload(payload.clone())?;
        block.add_payload(payload);
        Ok(())
    }

    /// Seal the open block and advance the round tape if the current round
    /// has decided. Returns the exit event when a round completed.
    pub fn end_block(&mut self) -> Result<Option<Event>, InternalError> {
        let block = self.current_block.take().ok_or(InternalError::NoOpenBlock)?;
        self.blockchain.add_block(block)?;

        let Some(round) = self.current_round.as_deref() else {
            return Ok(None);
        };
        let Some((next_state, event)) = round.end_block() else {
            return Ok(None);
        };
        let round_id = round.round_id();

        match self.transitions.next(round_id, event) {
            Some(next_id) => {
                let next_round = self.registry.build(next_id, next_state, self.params)?;
                info!(
                    "round {} completed with event '{}', entering {}",
                    round_id, event, next_id
                );
                self.current_round = Some(next_round);
                self.current_round_id = Some(next_id);
            }
            None => {
                info!(
                    "round {} completed with event '{}', period reached a terminal state",
                    round_id, event
                );
                self.current_round = None;
                self.current_round_id = None;
                self.final_outcome = Some((next_state, event));
            }
        }
        Ok(Some(event))
    }
}
