use crate::agent::AgentId;
use crate::value::PayloadValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator tag carried by every payload envelope. A round accepts
/// exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Registration,
    Observation,
    Estimate,
    SelectKeeper,
    Keeper,
    Ballot,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Registration => "registration",
            TransactionType::Observation => "observation",
            TransactionType::Estimate => "estimate",
            TransactionType::SelectKeeper => "select_keeper",
            TransactionType::Keeper => "keeper",
            TransactionType::Ballot => "ballot",
        };
        f.write_str(name)
    }
}

/// Body of a payload; each variant carries exactly the fields its round
/// consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadKind {
    /// Agent announces the address it acts under for this period.
    Registration { address: PayloadValue },
    /// Free-form per-agent measurement; rounds usually require these to be
    /// pairwise distinct.
    Observation { value: PayloadValue },
    /// Value the sender proposes the quorum settle on.
    Estimate { value: PayloadValue },
    /// Vote for the agent that should act as keeper.
    SelectKeeper { keeper: PayloadValue },
    /// Artifact produced by the elected keeper.
    Keeper { value: PayloadValue },
    /// Ternary ballot: yes, no, or abstain.
    Ballot { vote: Option<bool> },
}

impl PayloadKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            PayloadKind::Registration { .. } => TransactionType::Registration,
            PayloadKind::Observation { .. } => TransactionType::Observation,
            PayloadKind::Estimate { .. } => TransactionType::Estimate,
            PayloadKind::SelectKeeper { .. } => TransactionType::SelectKeeper,
            PayloadKind::Keeper { .. } => TransactionType::Keeper,
            PayloadKind::Ballot { .. } => TransactionType::Ballot,
        }
    }

    /// The vote key this payload contributes to its round's aggregation.
    pub fn attribute(&self) -> PayloadValue {
        match self {
            PayloadKind::Registration { address } => address.clone(),
            PayloadKind::SelectKeeper { keeper } => keeper.clone(),
            PayloadKind::Observation { value }
            | PayloadKind::Estimate { value }
            | PayloadKind::Keeper { value } => value.clone(),
            PayloadKind::Ballot { vote } => match vote {
                Some(vote) => PayloadValue::Bool(*vote),
                None => PayloadValue::Null,
            },
        }
    }
}

/// Failure to encode or decode a payload envelope.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload envelope: {0}")]
pub struct PayloadCodecError(#[from] serde_json::Error);

/// A sender-stamped, round-scoped message carrying one contribution.
///
/// Equality is by value; one payload fills at most one `(round, sender)`
/// acceptance slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub sender: AgentId,
    #[serde(flatten)]
    pub kind: PayloadKind,
}

impl Payload {
    pub fn new(sender: impl Into<AgentId>, kind: PayloadKind) -> Self {
        Self {
            sender: sender.into(),
            kind,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind.transaction_type()
    }

    pub fn attribute(&self) -> PayloadValue {
        self.kind.attribute()
    }

    /// Wire form submitted through the ordering transport.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadCodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadCodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Content digest identifying this envelope on the wire.
    pub fn digest(&self) -> Result<String, PayloadCodecError> {
        let encoded = self.encode()?;
        Ok(hex::encode(blake3::hash(&encoded).as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(sender: &str, value: &str) -> Payload {
        Payload::new(
            sender,
            PayloadKind::Estimate {
                value: value.into(),
            },
        )
    }

    #[test]
    fn wire_round_trip() {
        let payload = estimate("agent_0", "vote");
        let decoded = Payload::decode(&payload.encode().unwrap()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.transaction_type(), TransactionType::Estimate);
    }

    #[test]
    fn ballot_attribute_maps_abstain_to_null() {
        let abstain = Payload::new("agent_0", PayloadKind::Ballot { vote: None });
        assert_eq!(abstain.attribute(), PayloadValue::Null);

        let yes = Payload::new("agent_0", PayloadKind::Ballot { vote: Some(true) });
        assert_eq!(yes.attribute(), PayloadValue::Bool(true));
    }

    #[test]
    fn digest_is_stable_per_content() {
        let a = estimate("agent_0", "vote");
        let b = estimate("agent_0", "vote");
        let c = estimate("agent_1", "vote");
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn envelope_carries_type_tag_on_the_wire() {
        let bytes = estimate("agent_0", "vote").encode().unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["type"], "estimate");
        assert_eq!(raw["sender"], "agent_0");
    }
}
