//! The RPC surface a bound contract talks to.
//!
//! A backend is split by capability so that a contract can be bound
//! read-only, write-only or with log access, mirroring what the node or client
//! behind it actually supports.

pub mod provider;
#[cfg(test)]
pub(crate) mod testing;

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, TxHash},
    rpc::types::{Filter, Log, TransactionRequest},
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Read-only access to contract state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Executes a message call against the state at `block`.
    async fn call(&self, request: &TransactionRequest, block: BlockId)
        -> Result<Bytes, BackendError>;

    /// Returns the code deployed at `address` as of `block`.
    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes, BackendError>;
}

/// Submission of state-changing transactions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContractTransactor: Send + Sync {
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, BackendError>;

    /// Signs (if the backend holds a key) and submits the transaction. Returns
    /// once the node accepted it, without waiting for inclusion.
    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, BackendError>;
}

/// Access to emitted logs.
#[async_trait]
pub trait ContractFilterer: Send + Sync {
    /// Returns the logs already mined that match `filter`.
    async fn filter_logs(&self, filter: &Filter) -> Result<Vec<Log>, BackendError>;

    /// Opens a feed of logs matching `filter` mined from now on.
    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogSubscription, BackendError>;
}

/// A transaction accepted by the node. Inclusion and execution status have
/// to be tracked through the backend's own receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedTransaction {
    pub hash: TxHash,
    pub request: TransactionRequest,
}

/// Consumer side of a live log feed.
///
/// Logs arrive in the order the backend saw them. A backend failure is
/// delivered as the last item. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct LogSubscription {
    items: mpsc::Receiver<Result<Log, BackendError>>,
    token: CancellationToken,
}

/// Producer side of a live log feed, owned by the backend's delivery task.
#[derive(Debug, Clone)]
pub struct LogFeed {
    items: mpsc::Sender<Result<Log, BackendError>>,
    token: CancellationToken,
}

impl LogSubscription {
    /// Creates a connected feed/subscription pair with room for `buffer`
    /// undelivered items.
    pub fn channel(buffer: usize) -> (LogFeed, LogSubscription) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let token = CancellationToken::new();
        (
            LogFeed {
                items: tx,
                token: token.clone(),
            },
            LogSubscription { items: rx, token },
        )
    }

    /// Waits for the next item. `None` means the feed ended without error.
    pub async fn recv(&mut self) -> Option<Result<Log, BackendError>> {
        if self.token.is_cancelled() {
            return None;
        }
        self.items.recv().await
    }

    /// Returns an item that is already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<Result<Log, BackendError>> {
        self.items.try_recv().ok()
    }

    /// Stops the feed. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Unsubscribing from log feed");
            self.token.cancel();
        }
        self.items.close();
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl LogFeed {
    /// Delivers one log. Returns false once the consumer is gone and the
    /// producer should stop.
    pub async fn deliver(&self, log: Log) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.items.send(Ok(log)) => sent.is_ok(),
        }
    }

    /// Reports a terminal backend failure to the consumer.
    pub async fn fail(&self, error: BackendError) {
        if self.token.is_cancelled() {
            return;
        }
        if self.items.send(Err(error)).await.is_err() {
            tracing::debug!("Log feed consumer dropped before the failure was delivered");
        }
    }

    /// Resolves once the consumer unsubscribed or went away.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.items.closed() => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.items.is_closed()
    }
}
