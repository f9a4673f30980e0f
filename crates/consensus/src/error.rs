//! Error kinds of the round engine.
//!
//! Two textually similar, semantically distinct families. Admission
//! rejections are returned to the transport and the payload is dropped.
//! Internal errors mean a payload that passed admission failed replay, or a
//! configuration invariant does not hold; both indicate replica divergence
//! or a programming fault and must abort the process.

use conclave_types::{AgentId, PayloadCodecError, PayloadValue, TransactionType};
use std::fmt;

/// Why a round refuses a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Payload discriminator does not match the round's allowed type.
    TypeMismatch {
        expected: TransactionType,
        got: TransactionType,
    },
    /// Sender is not part of the frozen participant set.
    NotParticipant {
        sender: AgentId,
        participants: Vec<AgentId>,
    },
    /// Sender already holds its acceptance slot for this round.
    DuplicateSender {
        sender: AgentId,
        round_id: &'static str,
    },
    /// The attribute value was already contributed by another sender.
    DuplicateValue {
        attribute: &'static str,
        value: PayloadValue,
        round_id: &'static str,
    },
    /// Sender is not the keeper elected for this round.
    NotElectedKeeper { sender: AgentId },
    /// Keeper slot already filled, observed during replay.
    KeeperAlreadySent,
    /// Keeper slot already filled, observed at admission.
    KeeperValueAlreadySet,
    /// The period has reached a terminal state; no round accepts payloads.
    NoActiveRound,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TypeMismatch { expected, got } => {
                write!(f, "payload type {got} does not match the allowed type {expected}")
            }
            Rejection::NotParticipant { participants, .. } => {
                let names: Vec<&str> = participants.iter().map(AgentId::as_str).collect();
                write!(f, "sender not in list of participants: {names:?}")
            }
            Rejection::DuplicateSender { sender, round_id } => {
                write!(f, "sender {sender} has already sent value for round: {round_id}")
            }
            Rejection::DuplicateValue {
                attribute,
                value,
                round_id,
            } => write!(
                f,
                "payload attribute {attribute} with value {value} has already been added for round: {round_id}"
            ),
            Rejection::NotElectedKeeper { sender } => {
                write!(f, "{sender} not elected as keeper.")
            }
            Rejection::KeeperAlreadySent => f.write_str("keeper already set the payload."),
            Rejection::KeeperValueAlreadySet => f.write_str("keeper payload value already set."),
            Rejection::NoActiveRound => f.write_str("no round is active"),
        }
    }
}

/// Payload refused at transaction admission. Non-fatal: the transport maps
/// it to a non-zero response code and drops the payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransactionNotValid(pub Rejection);

/// Fatal engine fault. Replicas that disagree here have diverged; the
/// error is not caught anywhere inside the engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error("internal error: {0}")]
    Rejected(Rejection),
    #[error("internal error: not enough votes")]
    NotEnoughVotes,
    #[error("internal error: round id already used: {0}")]
    RoundIdAlreadyUsed(&'static str),
    #[error("internal error: unknown round id: {0}")]
    UnknownRoundId(&'static str),
    #[error("internal error: empty transition function")]
    EmptyTransitionFunction,
    #[error("internal error: empty list of behaviour states")]
    NoBehaviourStates,
    #[error("internal error: behaviour state id already registered: {0}")]
    StateIdAlreadyUsed(&'static str),
    #[error("internal error: unknown behaviour state id: {0}")]
    UnknownStateId(&'static str),
    #[error("internal error: no block is open")]
    NoOpenBlock,
    #[error("internal error: end_block height {got} does not match the open block height {expected}")]
    HeightMismatch { got: u64, expected: u64 },
    #[error("internal error: {0}")]
    OutOfSequenceBlock(#[from] conclave_types::OutOfSequenceBlock),
    #[error("internal error: {0}")]
    Codec(String),
}

impl From<PayloadCodecError> for InternalError {
    fn from(err: PayloadCodecError) -> Self {
        InternalError::Codec(err.to_string())
    }
}

/// Outcome of routing one ordered payload through the current round:
/// either a recoverable admission rejection or a fatal internal fault.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error(transparent)]
    NotValid(#[from] TransactionNotValid),
    #[error(transparent)]
    Internal(#[from] InternalError),
}
