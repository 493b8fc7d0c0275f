//! The two raw log sources behind an event stream.

use alloy::{
    eips::BlockNumberOrTag,
    json_abi::Event,
    primitives::{Address, B256},
    rpc::types::{Filter, Log},
};

use crate::backend::{ContractFilterer, LogSubscription};
use crate::error::{BackendError, BindingError};

/// A log carries at most this many topics.
const MAX_TOPICS: usize = 4;

/// Builds the log filter for `event` emitted by `address`.
///
/// `topics` holds one set per indexed parameter, in declaration order. Empty
/// sets match anything. Fails when the sets do not fit in the topics left
/// after the event selector.
pub fn build_filter(
    address: Address,
    event: &Event,
    topics: &[Vec<B256>],
) -> Result<Filter, BindingError> {
    let mut positions = Vec::with_capacity(topics.len() + 1);
    if !event.anonymous {
        positions.push(vec![event.selector()]);
    }
    let available = MAX_TOPICS - positions.len();
    if topics.len() > available {
        return Err(BindingError::TooManyTopicRules {
            event: event.name.clone(),
            indexed: available,
            rules: topics.len(),
        });
    }
    positions.extend(topics.iter().cloned());

    let mut filter = Filter::new().address(address);
    for (position, set) in positions.into_iter().enumerate() {
        if set.is_empty() {
            continue;
        }
        filter = match position {
            0 => filter.event_signature(set),
            1 => filter.topic1(set),
            2 => filter.topic2(set),
            _ => filter.topic3(set),
        };
    }
    Ok(filter)
}

/// Restricts `filter` to a block range. An open end means "up to latest".
pub fn with_range(filter: Filter, start: u64, end: Option<u64>) -> Filter {
    let filter = filter.from_block(start);
    match end {
        Some(end) => filter.to_block(end),
        None => filter.to_block(BlockNumberOrTag::Latest),
    }
}

/// Runs a historical query. Records come back ordered by block number, then
/// by position within the block.
pub async fn query_historical(
    filterer: &dyn ContractFilterer,
    filter: &Filter,
) -> Result<Vec<Log>, BackendError> {
    let mut logs = filterer.filter_logs(filter).await?;
    logs.sort_by_key(log_position);
    tracing::debug!("Historical query returned {} logs", logs.len());
    Ok(logs)
}

/// Opens a live feed of logs mined from now on.
pub async fn open_live(
    filterer: &dyn ContractFilterer,
    filter: &Filter,
) -> Result<LogSubscription, BackendError> {
    let subscription = filterer.subscribe_logs(filter).await?;
    tracing::debug!("Opened live log subscription");
    Ok(subscription)
}

/// Sort key of a log. Logs not yet mined sort last.
pub(crate) fn log_position(log: &Log) -> (u64, u64) {
    (
        log.block_number.unwrap_or(u64::MAX),
        log.log_index.unwrap_or(u64::MAX),
    )
}
