use alloy::{
    eips::BlockId,
    network::EthereumWallet,
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, Log, TransactionRequest},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;

use super::{
    ContractCaller, ContractFilterer, ContractTransactor, LogSubscription, SubmittedTransaction,
};
use crate::config::NetworkConfig;
use crate::error::BackendError;

/// Backend over a JSON-RPC node reached through HTTP.
///
/// Live logs are polled from an `eth_newFilter` filter. Transactions are
/// signed locally with the configured wallet before submission.
#[derive(Debug, Clone)]
pub struct RpcBackend {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    wallet: Option<EthereumWallet>,
    poll_interval: Duration,
    feed_buffer: usize,
}

impl RpcBackend {
    pub fn connect(
        network_config: &NetworkConfig,
        wallet: Option<EthereumWallet>,
        feed_buffer: usize,
    ) -> Result<Self, BackendError> {
        let url = network_config.rpc_url.parse().map_err(|e| {
            BackendError::Rejected(format!(
                "Invalid RPC URL '{}': {}",
                network_config.rpc_url, e
            ))
        })?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            rpc_url: network_config.rpc_url.clone(),
            wallet,
            poll_interval: Duration::from_millis(network_config.poll_interval_ms),
            feed_buffer,
        })
    }

    pub async fn chain_id(&self) -> Result<u64, BackendError> {
        Ok(self.provider.get_chain_id().await?)
    }

    pub async fn block_number(&self) -> Result<u64, BackendError> {
        Ok(self.provider.get_block_number().await?)
    }
}

#[async_trait]
impl ContractCaller for RpcBackend {
    async fn call(
        &self,
        request: &TransactionRequest,
        block: BlockId,
    ) -> Result<Bytes, BackendError> {
        Ok(self.provider.call(request).block(block).await?)
    }

    async fn code_at(&self, address: Address, block: BlockId) -> Result<Bytes, BackendError> {
        Ok(self.provider.get_code_at(address).block_id(block).await?)
    }
}

#[async_trait]
impl ContractTransactor for RpcBackend {
    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, BackendError> {
        Ok(self.provider.estimate_gas(request).await?)
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, BackendError> {
        let wallet = self
            .wallet
            .clone()
            .ok_or_else(|| BackendError::Rejected("No signer configured for transactions".into()))?;

        let url = self.rpc_url.parse().map_err(|e| {
            BackendError::Rejected(format!("Invalid RPC URL '{}': {}", self.rpc_url, e))
        })?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        let pending = provider.send_transaction(request.clone()).await?;
        let hash = *pending.tx_hash();
        tracing::info!("Transaction submitted with hash: {:?}", hash);

        Ok(SubmittedTransaction { hash, request })
    }
}

#[async_trait]
impl ContractFilterer for RpcBackend {
    async fn filter_logs(&self, filter: &Filter) -> Result<Vec<Log>, BackendError> {
        Ok(self.provider.get_logs(filter).await?)
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogSubscription, BackendError> {
        let poller = self
            .provider
            .watch_logs(filter)
            .await?
            .with_poll_interval(self.poll_interval);
        let mut stream = poller.into_stream();

        let (feed, subscription) = LogSubscription::channel(self.feed_buffer);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = feed.closed() => {
                        tracing::debug!("Log subscription closed, stopping poller");
                        break;
                    }

                    batch = stream.next() => match batch {
                        Some(logs) => {
                            for log in logs {
                                if !feed.deliver(log).await {
                                    return;
                                }
                            }
                        }
                        None => {
                            tracing::warn!("Log poller stopped delivering");
                            feed.fail(BackendError::SubscriptionDropped(
                                "log filter poller terminated".into(),
                            ))
                            .await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(subscription)
    }
}
