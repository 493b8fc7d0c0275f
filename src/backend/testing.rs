//! In-memory backend pieces shared by the unit tests.

use alloy::{
    primitives::{address, Address, LogData, B256},
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use std::sync::Mutex;

use super::{ContractFilterer, LogFeed, LogSubscription};
use crate::error::BackendError;

pub(crate) const CONTRACT: Address = address!("0000000000000000000000000000000000001000");

/// Builds a mined log emitted by [`CONTRACT`].
pub(crate) fn log_at(block: u64, index: u64, topics: Vec<B256>, data: Vec<u8>) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: CONTRACT,
            data: LogData::new_unchecked(topics, data.into()),
        },
        block_number: Some(block),
        log_index: Some(index),
        transaction_hash: Some(B256::with_last_byte(index as u8)),
        ..Default::default()
    }
}

/// Serves a fixed historical set and hands out channel-backed subscriptions
/// whose feeds the test drives directly.
#[derive(Debug, Default)]
pub(crate) struct StubFilterer {
    historical: Vec<Log>,
    reject_range: bool,
    reject_subscribe: bool,
    feeds: Mutex<Vec<LogFeed>>,
    pub(crate) filters: Mutex<Vec<Filter>>,
}

impl StubFilterer {
    pub(crate) fn new(historical: Vec<Log>) -> Self {
        Self {
            historical,
            ..Default::default()
        }
    }

    pub(crate) fn rejecting_range() -> Self {
        Self {
            reject_range: true,
            ..Default::default()
        }
    }

    pub(crate) fn rejecting_subscribe(historical: Vec<Log>) -> Self {
        Self {
            historical,
            reject_subscribe: true,
            ..Default::default()
        }
    }

    /// The feed of the most recent subscription.
    pub(crate) fn feed(&self) -> LogFeed {
        self.feeds
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no subscription opened")
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }
}

#[async_trait]
impl ContractFilterer for StubFilterer {
    async fn filter_logs(&self, filter: &Filter) -> Result<Vec<Log>, BackendError> {
        self.filters.lock().unwrap().push(filter.clone());
        if self.reject_range {
            return Err(BackendError::Rejected("block range too wide".into()));
        }
        Ok(self.historical.clone())
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogSubscription, BackendError> {
        self.filters.lock().unwrap().push(filter.clone());
        if self.reject_subscribe {
            return Err(BackendError::Rejected("subscriptions not supported".into()));
        }
        let (feed, subscription) = LogSubscription::channel(16);
        self.feeds.lock().unwrap().push(feed);
        Ok(subscription)
    }
}
