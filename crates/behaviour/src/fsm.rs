//! The behaviour FSM: local states slaved to the replicated round tape.

use crate::base::{Behaviour, BehaviourSpec, StateId};
use crate::shared_state::SharedState;
use conclave_consensus::{Event, InternalError, RoundId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Static event graph of the FSM: `(state, event) -> state`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BehaviourTransitions {
    table: BTreeMap<StateId, BTreeMap<Event, StateId>>,
}

impl BehaviourTransitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable edge declaration.
    pub fn on(mut self, from: StateId, event: Event, to: StateId) -> Self {
        self.table.entry(from).or_default().insert(event, to);
        self
    }

    pub fn next(&self, from: StateId, event: Event) -> Option<StateId> {
        self.table.get(from)?.get(event).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn endpoints(&self) -> impl Iterator<Item = StateId> + '_ {
        self.table
            .iter()
            .flat_map(|(from, edges)| std::iter::once(*from).chain(edges.values().copied()))
    }
}

struct StateEntry {
    matching_round: Option<RoundId>,
    behaviour: Box<dyn Behaviour>,
}

/// Scheduler for the agent's per-round behaviours.
///
/// At most one behaviour runs at any time. Whenever the observed
/// `current_round_id` diverges from the running behaviour's view, the
/// behaviour is stopped and the state indexed by the new round takes over;
/// the declared event graph only decides successors while the chain agrees.
pub struct RoundBehaviourFsm {
    states: BTreeMap<StateId, StateEntry>,
    transitions: BehaviourTransitions,
    final_states: BTreeSet<StateId>,
    round_to_state: BTreeMap<RoundId, StateId>,
    current: Option<StateId>,
    /// `None` until the first tick snapshots the chain's round.
    last_round_id: Option<Option<RoundId>>,
    /// Round-driven successor override; set on every observed round change.
    next_state: Option<StateId>,
}

impl std::fmt::Debug for RoundBehaviourFsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundBehaviourFsm")
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("final_states", &self.final_states)
            .field("round_to_state", &self.round_to_state)
            .field("current", &self.current)
            .field("last_round_id", &self.last_round_id)
            .field("next_state", &self.next_state)
            .finish()
    }
}

impl RoundBehaviourFsm {
    /// Validates the whole configuration up front: states are registered
    /// exactly once, no two states share a matching round, and every
    /// transition endpoint, final state, and the initial state resolve.
    pub fn new(
        initial_state: StateId,
        specs: Vec<BehaviourSpec>,
        transitions: BehaviourTransitions,
        final_states: impl IntoIterator<Item = StateId>,
    ) -> Result<Self, InternalError> {
        if specs.is_empty() {
            return Err(InternalError::NoBehaviourStates);
        }
        if transitions.is_empty() {
            return Err(InternalError::EmptyTransitionFunction);
        }

        let mut states = BTreeMap::new();
        let mut round_to_state = BTreeMap::new();
        for spec in specs {
            if states.contains_key(spec.state_id) {
                return Err(InternalError::StateIdAlreadyUsed(spec.state_id));
            }
            if let Some(round_id) = spec.matching_round {
                if round_to_state.contains_key(round_id) {
                    return Err(InternalError::RoundIdAlreadyUsed(round_id));
                }
                round_to_state.insert(round_id, spec.state_id);
            }
            states.insert(
                spec.state_id,
                StateEntry {
                    matching_round: spec.matching_round,
                    behaviour: spec.behaviour,
                },
            );
        }

        if !states.contains_key(initial_state) {
            return Err(InternalError::UnknownStateId(initial_state));
        }
        for state_id in transitions.endpoints() {
            if !states.contains_key(state_id) {
                return Err(InternalError::UnknownStateId(state_id));
            }
        }
        let final_states: BTreeSet<StateId> = final_states.into_iter().collect();
        for state_id in &final_states {
            if !states.contains_key(state_id) {
                return Err(InternalError::UnknownStateId(state_id));
            }
        }

        Ok(Self {
            states,
            transitions,
            final_states,
            round_to_state,
            current: Some(initial_state),
            last_round_id: None,
            next_state: None,
        })
    }

    /// The active state; `None` once a final state completed or a silent
    /// round left the agent without a matching behaviour.
    pub fn current_state_id(&self) -> Option<StateId> {
        self.current
    }

    /// One scheduler tick.
    pub fn act(&mut self, shared: &mut SharedState) {
        if self.last_round_id.is_none() {
            self.last_round_id = Some(shared.period().current_round_id());
        }
        if self.current.is_none() {
            return;
        }
        if self.process_current_round(shared) {
            // Preempted; the newly installed state starts on the next tick.
            return;
        }

        let Some(current_id) = self.current else {
            return;
        };
        let Some(entry) = self.states.get_mut(current_id) else {
            return;
        };

        entry.behaviour.act(shared);
        if !entry.behaviour.is_done() {
            return;
        }

        if self.final_states.contains(current_id) {
            debug!("'{}' is a final state", current_id);
            self.current = None;
            return;
        } else if let Some(next_id) = self.next_state.take() {
            // Round-driven override wins over the declared event graph.
            debug!(
                "overriding transition: current state: '{}', next state: '{}'",
                current_id, next_id
            );
            self.current = Some(next_id);
        } else {
            let event = entry.behaviour.event();
            let next_id =
                event.and_then(|event| self.transitions.next(current_id, event));
            debug!(
                "current state: '{}', event: {:?}, next state: {:?}",
                current_id, event, next_id
            );
            self.current = next_id;
        }

        if let Some(next_id) = self.current {
            if let Some(next_entry) = self.states.get_mut(next_id) {
                next_entry.behaviour.reset();
            }
        }
    }

    /// Reconcile with the chain. Returns true when the running behaviour
    /// was preempted by a round change.
    fn process_current_round(&mut self, shared: &SharedState) -> bool {
        let current_round_id = shared.period().current_round_id();
        if self.last_round_id == Some(current_round_id) {
            // Round has not changed - nothing to reconcile.
            return false;
        }
        self.last_round_id = Some(current_round_id);
        // May resolve to no state at all: a round the local agent does not
        // actively participate in.
        self.next_state =
            current_round_id.and_then(|round_id| self.round_to_state.get(round_id).copied());

        let Some(current_id) = self.current else {
            return false;
        };
        let Some(entry) = self.states.get_mut(current_id) else {
            return false;
        };
        if entry.matching_round.is_some() && Some(current_id) != self.next_state {
            debug!(
                "'{}' preempted: chain moved to round {:?}",
                current_id, current_round_id
            );
            entry.behaviour.stop();
            self.current = self.next_state;
            if let Some(next_id) = self.current {
                if let Some(next_entry) = self.states.get_mut(next_id) {
                    next_entry.behaviour.reset();
                }
            }
            return true;
        }
        false
    }
}
