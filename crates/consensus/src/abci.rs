//! Inbound dispatch mirroring the ABCI callbacks the ordering transport
//! invokes on every replica.
//!
//! Admission failures and undecodable transactions map to a non-zero
//! response code and the payload is dropped. Internal errors propagate to
//! the caller; a replica that hits one must abort rather than keep
//! replaying a diverged state.

use crate::error::{InternalError, PeriodError};
use crate::period::Period;
use crate::round::Event;
use conclave_types::{BlockHeader, Payload};
use tracing::warn;

/// Transaction accepted.
pub const CODE_OK: u32 = 0;
/// Transaction refused; the info field carries the rejection text.
pub const CODE_ERROR: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub info: String,
}

impl ResponseDeliverTx {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    fn ok() -> Self {
        Self {
            code: CODE_OK,
            info: String::new(),
        }
    }

    fn error(info: String) -> Self {
        Self {
            code: CODE_ERROR,
            info,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    /// Exit event of a round that completed in this block, if any.
    pub round_event: Option<Event>,
}

/// Start a new block context.
pub fn begin_block(period: &mut Period, header: BlockHeader) {
    period.begin_block(header);
}

/// Decode and route one ordered transaction.
pub fn deliver_tx(period: &mut Period, tx: &[u8]) -> Result<ResponseDeliverTx, InternalError> {
    let payload = match Payload::decode(tx) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("dropping undecodable transaction: {}", err);
            return Ok(ResponseDeliverTx::error(err.to_string()));
        }
    };
    match period.deliver_tx(payload) {
        Ok(()) => Ok(ResponseDeliverTx::ok()),
        Err(PeriodError::NotValid(err)) => {
            warn!("rejecting transaction: {}", err);
            Ok(ResponseDeliverTx::error(err.to_string()))
        }
        Err(PeriodError::Internal(err)) => Err(err),
    }
}

/// Close the block at `height` and advance the period.
pub fn end_block(period: &mut Period, height: u64) -> Result<ResponseEndBlock, InternalError> {
    if let Some(expected) = period.open_block_height() {
        if expected != height {
            return Err(InternalError::HeightMismatch {
                got: height,
                expected,
            });
        }
    }
    let round_event = period.end_block()?;
    Ok(ResponseEndBlock { round_event })
}
