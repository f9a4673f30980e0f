//! Per-round worker contract.

use crate::shared_state::SharedState;
use conclave_consensus::{Event, RoundId};

/// Identifier of one state inside the behaviour FSM. Equals the matching
/// round's id when the state is the local actor for a round.
pub type StateId = &'static str;

/// A single-round worker.
///
/// The FSM assumes nothing about what `act` does beyond its obligation to
/// eventually set an event and report done, or be preempted by a round
/// change. Long-running work yields cooperatively: `act` is called once per
/// scheduler tick and resumes where it left off. Failures inside `act` are
/// the behaviour's own responsibility; the FSM never catches or retries.
pub trait Behaviour {
    /// One cooperative tick.
    fn act(&mut self, shared: &mut SharedState);

    fn is_done(&self) -> bool;

    /// Event chosen on completion; drives the declared transition graph.
    fn event(&self) -> Option<Event>;

    /// Re-arm for a fresh run; invoked on every entry.
    fn reset(&mut self);

    /// Preemption notice: discard pending work and any chosen event.
    fn stop(&mut self);
}

/// Registration record for one FSM state.
pub struct BehaviourSpec {
    pub state_id: StateId,
    /// Round this state is the local actor for; `None` for states with no
    /// on-chain counterpart.
    pub matching_round: Option<RoundId>,
    pub behaviour: Box<dyn Behaviour>,
}

impl BehaviourSpec {
    pub fn new(
        state_id: StateId,
        matching_round: Option<RoundId>,
        behaviour: Box<dyn Behaviour>,
    ) -> Self {
        Self {
            state_id,
            matching_round,
            behaviour,
        }
    }
}
