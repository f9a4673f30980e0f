//! Immutable snapshot of every consensus-derived fact in a period.

use conclave_types::{AgentId, PayloadValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Well-known fact keys.
pub mod keys {
    /// Agent elected as sole submitter for keeper-only rounds.
    pub const MOST_VOTED_KEEPER: &str = "most_voted_keeper_address";
}

/// Snapshot of the facts all replicas have agreed on so far.
///
/// Snapshots are immutable and cheap to clone; `update` derives a successor
/// instead of mutating, so a round can keep handing out the state it was
/// opened with while computing the next one. The participant set is frozen
/// for the whole period: no API grows or shrinks it after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodState {
    inner: Arc<Inner>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Inner {
    participants: BTreeSet<AgentId>,
    period_count: u64,
    period_setup_params: BTreeMap<String, PayloadValue>,
    facts: BTreeMap<String, PayloadValue>,
}

impl PeriodState {
    pub fn new<I>(participants: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AgentId>,
    {
        Self::with_setup(participants, 0, BTreeMap::new())
    }

    pub fn with_setup<I>(
        participants: I,
        period_count: u64,
        period_setup_params: BTreeMap<String, PayloadValue>,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AgentId>,
    {
        Self {
            inner: Arc::new(Inner {
                participants: participants.into_iter().map(Into::into).collect(),
                period_count,
                period_setup_params,
                facts: BTreeMap::new(),
            }),
        }
    }

    pub fn participants(&self) -> &BTreeSet<AgentId> {
        &self.inner.participants
    }

    pub fn period_count(&self) -> u64 {
        self.inner.period_count
    }

    pub fn setup_param(&self, key: &str) -> Option<&PayloadValue> {
        self.inner.period_setup_params.get(key)
    }

    /// Look up an agreed fact by name.
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.inner.facts.get(key)
    }

    pub fn facts(&self) -> &BTreeMap<String, PayloadValue> {
        &self.inner.facts
    }

    /// Derive a successor snapshot with the given facts merged in.
    pub fn update<I>(&self, facts: I) -> Self
    where
        I: IntoIterator<Item = (String, PayloadValue)>,
    {
        let mut inner = self.inner.as_ref().clone();
        inner.facts.extend(facts);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Single-fact convenience over [`PeriodState::update`].
    pub fn with_fact(&self, key: impl Into<String>, value: PayloadValue) -> Self {
        self.update([(key.into(), value)])
    }

    /// Address elected to act alone in keeper rounds, if one has been
    /// voted in.
    pub fn most_voted_keeper_address(&self) -> Option<AgentId> {
        match self.get(keys::MOST_VOTED_KEEPER)? {
            PayloadValue::Text(address) => Some(AgentId::new(address.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants() -> Vec<&'static str> {
        vec!["agent_0", "agent_1", "agent_2", "agent_3"]
    }

    #[test]
    fn update_is_functional() {
        let state = PeriodState::new(participants());
        let updated = state.with_fact("most_voted_estimate", 21u64.into());

        assert!(state.get("most_voted_estimate").is_none());
        assert_eq!(
            updated.get("most_voted_estimate"),
            Some(&PayloadValue::Uint(21))
        );
        assert_eq!(updated.participants(), state.participants());
    }

    #[test]
    fn keeper_address_reads_the_well_known_fact() {
        let state = PeriodState::new(participants())
            .with_fact(keys::MOST_VOTED_KEEPER, "agent_0".into());
        assert_eq!(
            state.most_voted_keeper_address(),
            Some(AgentId::new("agent_0"))
        );
        assert_eq!(PeriodState::new(participants()).most_voted_keeper_address(), None);
    }

    #[test]
    fn later_updates_overwrite_earlier_facts() {
        let state = PeriodState::new(participants())
            .with_fact("tx_hash", "0xaa".into())
            .with_fact("tx_hash", "0xbb".into());
        assert_eq!(state.get("tx_hash"), Some(&PayloadValue::Text("0xbb".into())));
    }
}
