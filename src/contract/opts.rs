//! Per-operation options for bound contracts.

use alloy::{
    eips::BlockId,
    network::TransactionBuilder,
    primitives::{Address, U256},
    rpc::types::TransactionRequest,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options for a read-only call.
#[derive(Debug, Clone, Default)]
pub struct CallOpts {
    /// Account the call is made from. Some contracts answer differently per
    /// caller.
    pub from: Option<Address>,
    /// Block to read state at. Latest when unset.
    pub block: Option<BlockId>,
    /// Read the pending state instead. Takes precedence over `block`.
    pub pending: bool,
    pub timeout: Option<Duration>,
}

impl CallOpts {
    pub fn at_block(block: impl Into<BlockId>) -> Self {
        Self {
            block: Some(block.into()),
            ..Default::default()
        }
    }

    pub fn pending() -> Self {
        Self {
            pending: true,
            ..Default::default()
        }
    }

    pub fn block_id(&self) -> BlockId {
        if self.pending {
            BlockId::pending()
        } else {
            self.block.unwrap_or_else(BlockId::latest)
        }
    }

    pub(crate) fn apply(&self, mut request: TransactionRequest) -> TransactionRequest {
        if let Some(from) = self.from {
            request = request.from(from);
        }
        request
    }
}

/// Options for a state-changing transaction.
///
/// Set either `gas_price` (legacy) or the EIP-1559 fee caps. Fields left
/// unset are filled by the backend, except the gas limit which is estimated
/// before submission.
#[derive(Debug, Clone, Default)]
pub struct TransactOpts {
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: Option<u64>,
    pub timeout: Option<Duration>,
}

impl TransactOpts {
    pub(crate) fn apply(&self, mut request: TransactionRequest) -> TransactionRequest {
        if let Some(from) = self.from {
            request = request.from(from);
        }
        if let Some(value) = self.value {
            request = request.value(value);
        }
        if let Some(gas) = self.gas_limit {
            request = request.with_gas_limit(gas);
        }
        if let Some(gas_price) = self.gas_price {
            request = request.with_gas_price(gas_price);
        }
        if let Some(max_fee) = self.max_fee_per_gas {
            request = request.with_max_fee_per_gas(max_fee);
        }
        if let Some(priority_fee) = self.max_priority_fee_per_gas {
            request = request.with_max_priority_fee_per_gas(priority_fee);
        }
        if let Some(nonce) = self.nonce {
            request = request.with_nonce(nonce);
        }
        request
    }
}

/// Block range of a log query.
#[derive(Debug, Clone, Default)]
pub struct FilterOpts {
    pub start: u64,
    /// Last block to include. `None` queries up to the latest block and then
    /// keeps following new blocks.
    pub end: Option<u64>,
    /// Deadline for opening the query, not for the iteration that follows.
    pub timeout: Option<Duration>,
}

impl FilterOpts {
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
            timeout: None,
        }
    }

    pub fn from_block(start: u64) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }
}

/// What a watch does when its sink has no room for the next event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkPolicy {
    /// Wait for the consumer to make room.
    #[default]
    Block,
    /// Stop the watch with [`SinkFull`](crate::BindingError::SinkFull).
    Reject,
}

/// Options for a push-style watch.
#[derive(Debug, Clone, Default)]
pub struct WatchOpts {
    /// Replay logs from this block before following new ones.
    pub start: Option<u64>,
    /// Token that stops the watch when cancelled. A fresh one is created
    /// when unset.
    pub cancel: Option<CancellationToken>,
    pub policy: SinkPolicy,
}
