use alloy::{
    json_abi::Event,
    rpc::types::{Filter, Log},
};
use std::collections::VecDeque;

use super::source::{log_position, open_live, query_historical};
use crate::abi::codec::{decode_log, DecodedEvent};
use crate::backend::{ContractFilterer, LogSubscription};
use crate::error::{BindingError, Result};

/// Where an [`EventIterator`] is in its lifecycle.
#[derive(Debug)]
pub enum IteratorState {
    /// Handing out the records of the historical query.
    DrainingHistorical,
    /// Waiting on the live subscription.
    Live,
    /// The subscription failed. Nothing more is delivered.
    Failed(BindingError),
    /// Closed by the caller or exhausted, keeping the failure if there was one.
    Closed(Option<BindingError>),
}

/// A pull-based stream of decoded events: first the historical records, then
/// the live ones, each delivered once and in order.
///
/// A record that fails to decode is yielded as an error in its place and
/// iteration goes on. A failure of the subscription itself ends the stream
/// and is kept for [`EventIterator::error`].
#[derive(Debug)]
pub struct EventIterator {
    event: Event,
    historical: VecDeque<Log>,
    subscription: Option<LogSubscription>,
    /// Position of the last historical record. Live records at or before it
    /// were already delivered.
    historical_tip: Option<(u64, u64)>,
    state: IteratorState,
}

impl EventIterator {
    /// Opens the sources for `event`.
    ///
    /// The live subscription is opened before the historical query runs, so a
    /// record mined in between reaches at least one of them. Records seen by
    /// both are delivered once.
    pub async fn open(
        filterer: &dyn ContractFilterer,
        event: Event,
        historical: Option<Filter>,
        live: Option<Filter>,
    ) -> Result<Self> {
        let subscription = match live {
            Some(live) => Some(open_live(filterer, &live).await?),
            None => None,
        };
        // a failed query drops the subscription, which unsubscribes it
        let logs = match historical {
            Some(historical) => query_historical(filterer, &historical).await?,
            None => Vec::new(),
        };

        tracing::debug!(
            "Opened iterator for {} with {} historical logs, live: {}",
            event.name,
            logs.len(),
            subscription.is_some()
        );
        Ok(Self::new(event, logs, subscription))
    }

    pub(crate) fn new(event: Event, logs: Vec<Log>, subscription: Option<LogSubscription>) -> Self {
        let historical_tip = logs
            .iter()
            .filter(|log| log.block_number.is_some() && log.log_index.is_some())
            .map(log_position)
            .max();

        Self {
            event,
            historical: logs.into(),
            subscription,
            historical_tip,
            state: IteratorState::DrainingHistorical,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn state(&self) -> &IteratorState {
        &self.state
    }

    /// Waits for the next event. `None` means the stream ended, check
    /// [`error`](Self::error) to tell a failure from a normal end.
    pub async fn next(&mut self) -> Option<Result<DecodedEvent>> {
        loop {
            let log = match self.state {
                IteratorState::DrainingHistorical => match self.historical.pop_front() {
                    Some(log) => log,
                    None => {
                        self.state = IteratorState::Live;
                        continue;
                    }
                },
                IteratorState::Live => {
                    let Some(subscription) = self.subscription.as_mut() else {
                        self.state = IteratorState::Closed(None);
                        return None;
                    };
                    match subscription.recv().await {
                        Some(Ok(log)) => {
                            if self.already_delivered(&log) {
                                tracing::debug!(
                                    "Skipping live log at {:?} already seen in history",
                                    log_position(&log)
                                );
                                continue;
                            }
                            log
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Log subscription for {} failed: {}", self.event.name, e);
                            self.state = IteratorState::Failed(e.into());
                            continue;
                        }
                        None => {
                            tracing::debug!("Log subscription for {} ended", self.event.name);
                            self.release();
                            self.state = IteratorState::Closed(None);
                            return None;
                        }
                    }
                }
                IteratorState::Failed(_) => match self.subscription.as_mut()?.try_recv() {
                    Some(Ok(log)) if !self.already_delivered(&log) => log,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => {
                        self.release();
                        return None;
                    }
                },
                IteratorState::Closed(_) => return None,
            };

            let decoded = decode_log(&self.event, &log);
            if let Err(e) = &decoded {
                tracing::warn!("Failed to decode {} log: {}", self.event.name, e);
            }
            return Some(decoded);
        }
    }

    /// The failure that ended the stream, if any.
    pub fn error(&self) -> Option<&BindingError> {
        match &self.state {
            IteratorState::Failed(e) | IteratorState::Closed(Some(e)) => Some(e),
            _ => None,
        }
    }

    /// Stops iteration and releases the subscription. Safe to call more than
    /// once and after a failure, whose error stays available.
    pub fn close(&mut self) {
        self.release();
        self.historical.clear();
        self.state = match std::mem::replace(&mut self.state, IteratorState::Closed(None)) {
            IteratorState::Failed(e) => IteratorState::Closed(Some(e)),
            IteratorState::Closed(e) => IteratorState::Closed(e),
            IteratorState::DrainingHistorical | IteratorState::Live => IteratorState::Closed(None),
        };
    }

    /// Closes the iterator and hands back its terminal error.
    pub(crate) fn finish(mut self) -> Option<BindingError> {
        self.close();
        match std::mem::replace(&mut self.state, IteratorState::Closed(None)) {
            IteratorState::Closed(error) => error,
            _ => None,
        }
    }

    fn release(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn already_delivered(&self, log: &Log) -> bool {
        match (self.historical_tip, log.block_number, log.log_index) {
            (Some(tip), Some(block), Some(index)) => (block, index) <= tip,
            _ => false,
        }
    }
}

impl Drop for EventIterator {
    fn drop(&mut self) {
        self.release();
    }
}
