use super::*;
use conclave_types::{
    AgentId, BlockHeader, ConsensusParams, Payload, PayloadKind, PayloadValue, TransactionType,
};
use std::sync::Arc;

const MAX_PARTICIPANTS: usize = 4;

fn participants() -> Vec<AgentId> {
    (0..MAX_PARTICIPANTS)
        .map(|i| AgentId::new(format!("agent_{i}")))
        .collect()
}

fn period_state() -> PeriodState {
    PeriodState::new(participants())
}

fn params() -> ConsensusParams {
    ConsensusParams::new(MAX_PARTICIPANTS)
}

fn observation_def() -> RoundDef {
    RoundDef {
        round_id: "round_id",
        allowed_tx_type: TransactionType::Observation,
        payload_attribute: "value",
    }
}

fn estimate_def() -> RoundDef {
    RoundDef {
        round_id: "estimate_round",
        allowed_tx_type: TransactionType::Estimate,
        payload_attribute: "value",
    }
}

fn observation(sender: &str, value: impl Into<PayloadValue>) -> Payload {
    Payload::new(
        sender,
        PayloadKind::Observation {
            value: value.into(),
        },
    )
}

fn estimate(sender: &str, value: impl Into<PayloadValue>) -> Payload {
    Payload::new(
        sender,
        PayloadKind::Estimate {
            value: value.into(),
        },
    )
}

fn ballot(sender: &str, vote: Option<bool>) -> Payload {
    Payload::new(sender, PayloadKind::Ballot { vote })
}

/// One observation per participant, each carrying its own agent id.
fn distinct_observations() -> Vec<Payload> {
    participants()
        .iter()
        .map(|agent| observation(agent.as_str(), agent.as_str()))
        .collect()
}

// ---------------------------------------------------------------------
// CollectionRound
// ---------------------------------------------------------------------

#[test]
fn collection_round_rejects_duplicate_sender() {
    let mut round = CollectionRound::new(observation_def(), period_state(), params());

    let first = observation("agent_0", "agent_0");
    round.process_payload(first.clone()).unwrap();
    assert_eq!(round.collection().get(&AgentId::new("agent_0")), Some(&first));

    let err = round.process_payload(first.clone()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "internal error: sender agent_0 has already sent value for round: round_id"
    );

    let err = round.check_payload(&first).unwrap_err();
    assert_eq!(
        err.to_string(),
        "sender agent_0 has already sent value for round: round_id"
    );
}

#[test]
fn collection_round_rejects_non_participant() {
    let mut round = CollectionRound::new(observation_def(), period_state(), params());
    let stranger = observation("sender", "value");

    let err = round.process_payload(stranger.clone()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"internal error: sender not in list of participants: ["agent_0", "agent_1", "agent_2", "agent_3"]"#
    );

    let err = round.check_payload(&stranger).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"sender not in list of participants: ["agent_0", "agent_1", "agent_2", "agent_3"]"#
    );
}

#[test]
fn collection_round_rejects_wrong_transaction_type() {
    let round = CollectionRound::new(observation_def(), period_state(), params());
    let err = round.check_payload(&ballot("agent_0", Some(true))).unwrap_err();
    assert_eq!(
        err.to_string(),
        "payload type ballot does not match the allowed type observation"
    );
}

#[test]
fn collection_round_without_policy_never_ends() {
    let mut round = CollectionRound::new(observation_def(), period_state(), params());
    for payload in distinct_observations() {
        round.process_payload(payload).unwrap();
    }
    assert!(round.end_block().is_none());
}

#[test]
fn collection_round_runs_the_supplied_end_block_policy() {
    let policy: EndBlockPolicy = Arc::new(|state, collection, params| {
        (collection.len() >= params.consensus_threshold())
            .then(|| (state.clone(), events::DONE))
    });
    let mut round = CollectionRound::new(observation_def(), period_state(), params())
        .with_end_block_policy(policy);

    let mut payloads = distinct_observations();
    let last = payloads.pop().unwrap();
    for payload in payloads {
        round.process_payload(payload).unwrap();
    }
    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);

    round.process_payload(last).unwrap();
    assert!(round.end_block().is_some());
}

// ---------------------------------------------------------------------
// CollectDifferentUntilAllRound
// ---------------------------------------------------------------------

#[test]
fn collect_different_until_all_rejects_duplicate_value() {
    let mut round = CollectDifferentUntilAllRound::new(observation_def(), period_state(), params());

    let first = observation("agent_0", "agent_0");
    round.process_payload(first.clone()).unwrap();
    assert!(round.collection().contains(&PayloadValue::from("agent_0")));
    assert!(!round.collection_threshold_reached());

    let err = round.process_payload(first.clone()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "internal error: payload attribute value with value agent_0 has already been added for round: round_id"
    );

    let err = round.check_payload(&first).unwrap_err();
    assert_eq!(
        err.to_string(),
        "payload attribute value with value agent_0 has already been added for round: round_id"
    );
}

#[test]
fn collect_different_until_all_completes_with_all_distinct_values() {
    let update: StateUpdate<std::collections::BTreeSet<PayloadValue>> =
        Arc::new(|state, collection| {
            state.with_fact("registered", (collection.len() as u64).into())
        });
    let mut round = CollectDifferentUntilAllRound::new(observation_def(), period_state(), params())
        .on_done(events::DONE, update);

    let mut payloads = distinct_observations();
    let last = payloads.pop().unwrap();
    for payload in payloads {
        round.process_payload(payload).unwrap();
        assert!(round.end_block().is_none());
    }

    round.process_payload(last).unwrap();
    assert!(round.collection_threshold_reached());
    let (state, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
    assert_eq!(state.get("registered"), Some(&PayloadValue::Uint(4)));
}

// ---------------------------------------------------------------------
// CollectDifferentUntilThresholdRound
// ---------------------------------------------------------------------

#[test]
fn collect_different_until_threshold_completes_at_quorum() {
    let mut round =
        CollectDifferentUntilThresholdRound::new(observation_def(), period_state(), params());

    let mut payloads = distinct_observations();
    let _last = payloads.pop().unwrap();
    let last_before_quorum = payloads.pop().unwrap();

    for payload in payloads {
        round.process_payload(payload).unwrap();
    }
    assert!(!round.collection_threshold_reached());
    assert!(round.end_block().is_none());

    round.process_payload(last_before_quorum).unwrap();
    assert!(round.collection_threshold_reached());
    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
}

// ---------------------------------------------------------------------
// CollectSameUntilThresholdRound
// ---------------------------------------------------------------------

#[test]
fn collect_same_reaches_threshold_on_the_common_value() {
    let update: StateUpdate<PayloadValue> =
        Arc::new(|state, most_voted| state.with_fact("most_voted_estimate", most_voted.clone()));
    let mut round = CollectSameUntilThresholdRound::new(estimate_def(), period_state(), params())
        .on_done(events::DONE, update);

    let senders = participants();
    round.process_payload(estimate(senders[0].as_str(), "vote")).unwrap();

    assert!(!round.threshold_reached());
    assert_eq!(
        round.most_voted_payload().unwrap_err().to_string(),
        "internal error: not enough votes"
    );
    assert!(round.end_block().is_none());

    round.process_payload(estimate(senders[1].as_str(), "vote")).unwrap();
    assert!(!round.threshold_reached());

    round.process_payload(estimate(senders[2].as_str(), "vote")).unwrap();
    assert!(round.threshold_reached());
    assert_eq!(round.most_voted_payload().unwrap(), PayloadValue::from("vote"));

    let (state, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
    assert_eq!(
        state.get("most_voted_estimate"),
        Some(&PayloadValue::Text("vote".into()))
    );
}

#[test]
fn collect_same_agrees_on_the_null_sentinel() {
    let mut round = CollectSameUntilThresholdRound::new(estimate_def(), period_state(), params());

    for agent in participants() {
        round
            .process_payload(estimate(agent.as_str(), PayloadValue::Null))
            .unwrap();
    }
    assert!(round.threshold_reached());
    assert_eq!(round.most_voted_payload().unwrap(), PayloadValue::Null);

    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
}

#[test]
fn collect_same_fast_fails_once_no_majority_is_possible() {
    let mut round = CollectSameUntilThresholdRound::new(estimate_def(), period_state(), params());
    let senders = participants();

    round.process_payload(estimate(senders[0].as_str(), "a")).unwrap();
    round.process_payload(estimate(senders[1].as_str(), "b")).unwrap();
    assert!(round.is_majority_possible());
    assert!(round.end_block().is_none());

    round.process_payload(estimate(senders[2].as_str(), "c")).unwrap();
    // Best value holds 1 vote with 1 slot left: the threshold of 3 is out
    // of reach.
    assert!(!round.is_majority_possible());
    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::NO_MAJORITY);
}

// ---------------------------------------------------------------------
// OnlyKeeperSendsRound
// ---------------------------------------------------------------------

fn keeper_def() -> RoundDef {
    RoundDef {
        round_id: "keeper_round",
        allowed_tx_type: TransactionType::Keeper,
        payload_attribute: "value",
    }
}

fn keeper_round() -> OnlyKeeperSendsRound {
    let state = period_state().with_fact(keys::MOST_VOTED_KEEPER, "agent_0".into());
    OnlyKeeperSendsRound::new(keeper_def(), state, params())
}

fn keeper_payload(sender: &str, value: &str) -> Payload {
    Payload::new(
        sender,
        PayloadKind::Keeper {
            value: value.into(),
        },
    )
}

#[test]
fn keeper_round_accepts_only_the_elected_keeper() {
    let mut round = keeper_round();
    assert!(!round.has_keeper_sent_payload());
    assert!(round.end_block().is_none());

    let err = round
        .process_payload(keeper_payload("agent_1", "artifact"))
        .unwrap_err();
    assert_eq!(err.to_string(), "internal error: agent_1 not elected as keeper.");

    let err = round
        .check_payload(&keeper_payload("agent_1", "artifact"))
        .unwrap_err();
    assert_eq!(err.to_string(), "agent_1 not elected as keeper.");

    round.process_payload(keeper_payload("agent_0", "artifact")).unwrap();
    assert!(round.has_keeper_sent_payload());
}

#[test]
fn keeper_round_rejects_a_second_submission() {
    let mut round = keeper_round();
    round.process_payload(keeper_payload("agent_0", "artifact")).unwrap();

    let err = round
        .process_payload(keeper_payload("agent_0", "artifact"))
        .unwrap_err();
    assert_eq!(err.to_string(), "internal error: keeper already set the payload.");

    // Admission reports the same condition with its own wording.
    let err = round
        .check_payload(&keeper_payload("agent_0", "artifact"))
        .unwrap_err();
    assert_eq!(err.to_string(), "keeper payload value already set.");

    // Membership is still checked before the slot.
    let err = round
        .process_payload(keeper_payload("sender", "artifact"))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"internal error: sender not in list of participants: ["agent_0", "agent_1", "agent_2", "agent_3"]"#
    );
}

#[test]
fn keeper_round_completes_with_the_submission() {
    let update: KeeperStateUpdate = Arc::new(|state, payload| {
        state.with_fact("keeper_artifact", payload.attribute())
    });
    let state = period_state().with_fact(keys::MOST_VOTED_KEEPER, "agent_0".into());
    let mut round =
        OnlyKeeperSendsRound::new(keeper_def(), state, params()).on_done(events::DONE, update);

    round.process_payload(keeper_payload("agent_0", "artifact")).unwrap();
    let (state, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
    assert_eq!(
        state.get("keeper_artifact"),
        Some(&PayloadValue::Text("artifact".into()))
    );
}

#[test]
fn keeper_round_without_an_election_rejects_everyone() {
    let mut round = OnlyKeeperSendsRound::new(keeper_def(), period_state(), params());
    let err = round
        .process_payload(keeper_payload("agent_0", "artifact"))
        .unwrap_err();
    assert_eq!(err.to_string(), "internal error: agent_0 not elected as keeper.");
}

// ---------------------------------------------------------------------
// VotingRound
// ---------------------------------------------------------------------

fn voting_def() -> RoundDef {
    RoundDef {
        round_id: "voting_round",
        allowed_tx_type: TransactionType::Ballot,
        payload_attribute: "vote",
    }
}

#[test]
fn voting_round_reaches_the_negative_quorum() {
    let mut round = VotingRound::new(voting_def(), period_state(), params());
    let senders = participants();

    for sender in &senders[..2] {
        round.process_payload(ballot(sender.as_str(), Some(false))).unwrap();
    }
    assert!(!round.negative_vote_threshold_reached());
    assert!(round.end_block().is_none());

    round.process_payload(ballot(senders[2].as_str(), Some(false))).unwrap();
    assert!(round.negative_vote_threshold_reached());
    assert!(!round.positive_vote_threshold_reached());

    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::NEGATIVE);
}

#[test]
fn voting_round_reaches_the_positive_quorum() {
    let update: Arc<dyn Fn(&PeriodState) -> PeriodState> =
        Arc::new(|state| state.with_fact("approved", true.into()));
    let mut round =
        VotingRound::new(voting_def(), period_state(), params()).on_done(events::DONE, update);

    for sender in &participants()[..3] {
        round.process_payload(ballot(sender.as_str(), Some(true))).unwrap();
    }
    assert!(round.positive_vote_threshold_reached());

    let (state, event) = round.end_block().unwrap();
    assert_eq!(event, events::DONE);
    assert_eq!(state.get("approved"), Some(&PayloadValue::Bool(true)));
}

#[test]
fn voting_round_reaches_the_abstain_quorum() {
    let mut round = VotingRound::new(voting_def(), period_state(), params());
    for sender in &participants()[..3] {
        round.process_payload(ballot(sender.as_str(), None)).unwrap();
    }
    assert!(round.none_vote_threshold_reached());

    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::NONE);
}

#[test]
fn voting_round_detects_a_dead_heat() {
    let mut round = VotingRound::new(voting_def(), period_state(), params());
    let senders = participants();

    round.process_payload(ballot(senders[0].as_str(), Some(true))).unwrap();
    round.process_payload(ballot(senders[1].as_str(), Some(true))).unwrap();
    round.process_payload(ballot(senders[2].as_str(), Some(false))).unwrap();
    assert!(round.is_majority_possible());
    assert!(round.end_block().is_none());

    round.process_payload(ballot(senders[3].as_str(), Some(false))).unwrap();
    assert!(!round.is_majority_possible());

    let (_, event) = round.end_block().unwrap();
    assert_eq!(event, events::NO_MAJORITY);
}

#[test]
fn voting_round_rejects_duplicate_voters() {
    let mut round = VotingRound::new(voting_def(), period_state(), params());
    round.process_payload(ballot("agent_0", Some(true))).unwrap();

    let err = round.process_payload(ballot("agent_0", Some(false))).unwrap_err();
    assert_eq!(
        err.to_string(),
        "internal error: sender agent_0 has already sent value for round: voting_round"
    );
}

// ---------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------

fn single_round_registry() -> RoundRegistry {
    let mut registry = RoundRegistry::new();
    registry
        .register(
            "estimate_round",
            Box::new(|state, params| {
                Box::new(CollectSameUntilThresholdRound::new(
                    estimate_def(),
                    state,
                    params,
                ))
            }),
        )
        .unwrap();
    registry
}

fn header(height: u64) -> BlockHeader {
    BlockHeader {
        height,
        time_us: height * 1_000_000,
    }
}

#[test]
fn registry_rejects_duplicate_round_ids() {
    let mut registry = single_round_registry();
    let err = registry
        .register(
            "estimate_round",
            Box::new(|state, params| {
                Box::new(CollectSameUntilThresholdRound::new(
                    estimate_def(),
                    state,
                    params,
                ))
            }),
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "internal error: round id already used: estimate_round"
    );
}

#[test]
fn period_fails_loudly_on_an_unknown_initial_round() {
    let err = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "missing_round",
        period_state(),
        params(),
    )
    .unwrap_err();
    assert_eq!(err, InternalError::UnknownRoundId("missing_round"));
}

#[test]
fn period_fails_loudly_on_unresolvable_transition_targets() {
    let transitions = TransitionFunction::new().on("estimate_round", events::DONE, "missing_round");
    let err = Period::new(
        single_round_registry(),
        transitions,
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap_err();
    assert_eq!(err, InternalError::UnknownRoundId("missing_round"));
}

#[test]
fn period_advances_to_a_terminal_state() {
    let mut period = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap();
    assert_eq!(period.current_round_id(), Some("estimate_round"));

    period.begin_block(header(1));
    for agent in participants() {
        period.deliver_tx(estimate(agent.as_str(), "vote")).unwrap();
    }
    let event = period.end_block().unwrap();
    assert_eq!(event, Some(events::DONE));

    // No outgoing transition for DONE: the period is finished.
    assert!(period.is_finished());
    assert_eq!(period.current_round_id(), None);
    let (_, event) = period.final_outcome().unwrap();
    assert_eq!(*event, events::DONE);

    // Late payloads are refused at admission.
    period.begin_block(header(2));
    let err = period.deliver_tx(estimate("agent_0", "vote")).unwrap_err();
    assert_eq!(
        err,
        PeriodError::NotValid(TransactionNotValid(Rejection::NoActiveRound))
    );
}

#[test]
fn period_records_accepted_payloads_per_block() {
    let mut period = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap();

    period.begin_block(header(1));
    period.deliver_tx(estimate("agent_0", "vote")).unwrap();
    assert!(period.deliver_tx(estimate("agent_0", "vote")).is_err());
    period.end_block().unwrap();

    let blocks = period.blockchain().blocks();
    assert_eq!(blocks.len(), 1);
    // The rejected duplicate was not recorded.
    assert_eq!(blocks[0].payloads.len(), 1);
}

#[test]
fn deliver_tx_requires_an_open_block() {
    let mut period = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap();
    let err = period.deliver_tx(estimate("agent_0", "vote")).unwrap_err();
    assert_eq!(err, PeriodError::Internal(InternalError::NoOpenBlock));
}

// ---------------------------------------------------------------------
// ABCI surface
// ---------------------------------------------------------------------

#[test]
fn abci_maps_rejections_to_error_codes() {
    let mut period = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap();

    abci::begin_block(&mut period, header(1));

    let accepted =
        abci::deliver_tx(&mut period, &estimate("agent_0", "vote").encode().unwrap()).unwrap();
    assert!(accepted.is_ok());

    let rejected =
        abci::deliver_tx(&mut period, &estimate("agent_0", "vote").encode().unwrap()).unwrap();
    assert_eq!(rejected.code, abci::CODE_ERROR);
    assert!(rejected.info.contains("has already sent value"));

    let garbage = abci::deliver_tx(&mut period, b"not a payload").unwrap();
    assert_eq!(garbage.code, abci::CODE_ERROR);

    let response = abci::end_block(&mut period, 1).unwrap();
    assert_eq!(response.round_event, None);
}

#[test]
fn abci_end_block_validates_the_height() {
    let mut period = Period::new(
        single_round_registry(),
        TransitionFunction::new(),
        "estimate_round",
        period_state(),
        params(),
    )
    .unwrap();
    abci::begin_block(&mut period, header(3));

    let err = abci::end_block(&mut period, 7).unwrap_err();
    assert_eq!(err, InternalError::HeightMismatch { got: 7, expected: 3 });
}
