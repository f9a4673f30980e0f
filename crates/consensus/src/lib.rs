//! Conclave round engine.
//!
//! A family of payload-aggregating rounds advancing in lock-step across
//! every replica of a multi-agent application:
//! - Six round variants with precise acceptance rules and threshold
//!   arithmetic over `floor(2N/3) + 1` quorums
//! - A `Period` driving the round tape from ABCI-style block callbacks
//! - Strict separation of admission (`check_payload`) from deterministic
//!   replay (`process_payload`), so replicas stay byte-identical
//! - A round registry and transition function configured up front; every
//!   configuration fault fails at construction

// ---------------------------------------------------------------------
// Submodules
// ---------------------------------------------------------------------

// Inbound transport surface
pub mod abci;

// Round variants
pub mod collection;
pub mod keeper;
pub mod voting;

// Engine core
pub mod error;
pub mod period;
pub mod round;
pub mod state;

// ---------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------

pub use collection::{
    CollectDifferentUntilAllRound, CollectDifferentUntilThresholdRound,
    CollectSameUntilThresholdRound, CollectionRound, EndBlockPolicy, StateUpdate,
};
pub use error::{InternalError, PeriodError, Rejection, TransactionNotValid};
pub use keeper::{KeeperStateUpdate, OnlyKeeperSendsRound};
pub use period::{Period, RoundFactory, RoundRegistry, TransitionFunction};
pub use round::{events, Event, Round, RoundDef, RoundId};
pub use state::{keys, PeriodState};
pub use voting::VotingRound;

#[cfg(test)]
mod tests;
