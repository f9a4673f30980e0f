use crate::payload::Payload;
use serde::{Deserialize, Serialize};

/// Metadata of one block delivered by the ordering transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Monotonic chain height.
    pub height: u64,
    /// Block time, microseconds since the UNIX epoch.
    pub time_us: u64,
}

/// One block: its header plus the payloads accepted in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payloads: Vec<Payload>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    pub fn add_payload(&mut self, payload: Payload) {
        self.payloads.push(payload);
    }
}

/// Blocks must be appended in strictly increasing height order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("block height {got} is not above the chain tip {tip}")]
pub struct OutOfSequenceBlock {
    pub got: u64,
    pub tip: u64,
}

/// Height-ordered tape of the blocks replayed so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: Block) -> Result<(), OutOfSequenceBlock> {
        let tip = self.height();
        if !self.blocks.is_empty() && block.header.height <= tip {
            return Err(OutOfSequenceBlock {
                got: block.header.height,
                tip,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Height of the chain tip; zero while empty.
    pub fn height(&self) -> u64 {
        self.blocks.last().map_or(0, |block| block.header.height)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
