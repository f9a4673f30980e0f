//! Local behaviour layer of a conclave agent.
//!
//! Maps the currently active on-chain round to at most one running local
//! behaviour. Two transition sources coexist: the application's declared
//! event graph, and the chain's authoritative round progression. The chain
//! wins; a behaviour whose round has passed is preempted, which is how a
//! late-joining or recovering agent converges without replaying the
//! behaviours it missed.

pub mod base;
pub mod fsm;
pub mod shared_state;

pub use base::{Behaviour, BehaviourSpec, StateId};
pub use fsm::{BehaviourTransitions, RoundBehaviourFsm};
pub use shared_state::{BroadcastSink, SharedState};
