//! A contract address bound to its ABI and to the backends that reach it.

pub mod opts;
pub mod session;

pub use opts::{CallOpts, FilterOpts, SinkPolicy, TransactOpts, WatchOpts};
pub use session::Session;

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::Event,
    network::TransactionBuilder,
    primitives::{Address, Bytes},
    rpc::types::{Log, TransactionRequest},
};
use std::{fmt, future::Future, sync::Arc, time::Duration};

use crate::abi::{
    codec::{self, CallOutput, DecodedEvent},
    AbiDescriptor,
};
use crate::backend::{ContractCaller, ContractFilterer, ContractTransactor, SubmittedTransaction};
use crate::error::{BindingError, Result};
use crate::events::{
    source::{build_filter, query_historical, with_range},
    EventIterator, EventSink, EventWatch,
};

/// Handle for calling, transacting with and observing one deployed contract.
///
/// Cheap to clone. A handle only needs the backends for the operations it is
/// used for: a missing one fails that operation with
/// [`BindingError::NoBackend`].
#[derive(Clone)]
pub struct BoundContract {
    address: Address,
    abi: Arc<AbiDescriptor>,
    caller: Option<Arc<dyn ContractCaller>>,
    transactor: Option<Arc<dyn ContractTransactor>>,
    filterer: Option<Arc<dyn ContractFilterer>>,
}

impl fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundContract")
            .field("address", &self.address)
            .field("caller", &self.caller.is_some())
            .field("transactor", &self.transactor.is_some())
            .field("filterer", &self.filterer.is_some())
            .finish()
    }
}

impl BoundContract {
    /// Binds `address` without any backend.
    pub fn new(address: Address, abi: Arc<AbiDescriptor>) -> Self {
        Self {
            address,
            abi,
            caller: None,
            transactor: None,
            filterer: None,
        }
    }

    /// Binds `address` to a backend serving every operation.
    pub fn with_backend<B>(address: Address, abi: Arc<AbiDescriptor>, backend: Arc<B>) -> Self
    where
        B: ContractCaller + ContractTransactor + ContractFilterer + 'static,
    {
        Self::new(address, abi)
            .with_caller(backend.clone())
            .with_transactor(backend.clone())
            .with_filterer(backend)
    }

    pub fn with_caller(mut self, caller: Arc<dyn ContractCaller>) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_transactor(mut self, transactor: Arc<dyn ContractTransactor>) -> Self {
        self.transactor = Some(transactor);
        self
    }

    pub fn with_filterer(mut self, filterer: Arc<dyn ContractFilterer>) -> Self {
        self.filterer = Some(filterer);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &AbiDescriptor {
        &self.abi
    }

    /// Invokes a read-only method and decodes its return values.
    ///
    /// `method` is a plain name or, for overloaded names, a full signature.
    pub async fn call(
        &self,
        opts: &CallOpts,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<CallOutput> {
        let function = self.abi.function(method)?;
        let input = codec::encode_call(function, args)?;
        let caller = self.caller.as_ref().ok_or(BindingError::NoBackend("call"))?;

        let request = opts.apply(
            TransactionRequest::default()
                .to(self.address)
                .input(input.into()),
        );
        let block = opts.block_id();
        tracing::debug!(
            "Calling {} on {:?} at block {:?}",
            function.signature(),
            self.address,
            block
        );

        let output = with_deadline(opts.timeout, async {
            let output = caller.call(&request, block).await?;
            if output.is_empty() && !function.outputs.is_empty() {
                let code = caller.code_at(self.address, block).await?;
                if code.is_empty() {
                    return Err(BindingError::NoCode(self.address));
                }
            }
            Ok(output)
        })
        .await?;

        codec::decode_output(function, &output)
    }

    /// Submits a state-changing method call. Returns once the backend accepted
    /// the transaction.
    pub async fn transact(
        &self,
        opts: &TransactOpts,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<SubmittedTransaction> {
        let function = self.abi.function(method)?;
        let input = codec::encode_call(function, args)?;
        self.submit(opts, input, &function.signature()).await
    }

    /// Sends value to the contract with empty calldata, which runs its
    /// receive or fallback function.
    pub async fn transfer(&self, opts: &TransactOpts) -> Result<SubmittedTransaction> {
        self.submit(opts, Bytes::new(), "transfer").await
    }

    async fn submit(
        &self,
        opts: &TransactOpts,
        input: Bytes,
        label: &str,
    ) -> Result<SubmittedTransaction> {
        let transactor = self
            .transactor
            .as_ref()
            .ok_or(BindingError::NoBackend("transact"))?;

        let mut request = opts.apply(
            TransactionRequest::default()
                .to(self.address)
                .input(input.into()),
        );

        with_deadline(opts.timeout, async move {
            if opts.gas_limit.is_none() {
                let gas = transactor.estimate_gas(&request).await?;
                tracing::debug!("Estimated {} gas for {}", gas, label);
                request.set_gas_limit(gas);
            }

            tracing::info!("Sending {} to {:?}", label, self.address);
            Ok(transactor.send_transaction(request).await?)
        })
        .await
    }

    /// Returns the raw logs of `event` in the given range, oldest first.
    ///
    /// `rules` holds the accepted values of each indexed parameter in
    /// declaration order. An empty rule accepts anything.
    pub async fn historical_logs(
        &self,
        opts: &FilterOpts,
        event: &str,
        rules: &[Vec<DynSolValue>],
    ) -> Result<Vec<Log>> {
        let (event, filter) = self.event_filter(event, rules)?;
        let filterer = self.filterer()?;
        let filter = with_range(filter, opts.start, opts.end);

        tracing::debug!("Querying {} logs from block {}", event.name, opts.start);
        with_deadline(opts.timeout, async {
            Ok(query_historical(filterer.as_ref(), &filter).await?)
        })
        .await
    }

    /// Iterates `event` from `opts.start`.
    ///
    /// With an end block the iterator ends after the range. Without one it
    /// continues with live events once the past ones are drained.
    pub async fn filter_logs(
        &self,
        opts: &FilterOpts,
        event: &str,
        rules: &[Vec<DynSolValue>],
    ) -> Result<EventIterator> {
        let (event, filter) = self.event_filter(event, rules)?;
        let filterer = self.filterer()?;

        let historical = with_range(filter.clone(), opts.start, opts.end);
        let live = opts.end.is_none().then_some(filter);

        with_deadline(
            opts.timeout,
            EventIterator::open(filterer.as_ref(), event, Some(historical), live),
        )
        .await
    }

    /// Streams decoded `event` records into `sink` from a background task.
    ///
    /// With `opts.start` set, past records from that block are replayed
    /// before live ones.
    pub async fn watch_logs(
        &self,
        opts: WatchOpts,
        event: &str,
        rules: &[Vec<DynSolValue>],
        sink: EventSink,
    ) -> Result<EventWatch> {
        let (event, filter) = self.event_filter(event, rules)?;
        let filterer = self.filterer()?;

        let historical = opts
            .start
            .map(|start| with_range(filter.clone(), start, None));
        let iterator =
            EventIterator::open(filterer.as_ref(), event, historical, Some(filter)).await?;

        let token = opts.cancel.unwrap_or_default();
        Ok(EventWatch::spawn(iterator, sink, opts.policy, token))
    }

    /// Decodes a single raw log as `event`.
    pub fn parse_log(&self, event: &str, log: &Log) -> Result<DecodedEvent> {
        codec::decode_log(self.abi.event(event)?, log)
    }

    /// Decodes a log emitted by this contract as whichever event its first
    /// topic names.
    pub fn parse_any_log(&self, log: &Log) -> Result<DecodedEvent> {
        let topic = log.topics().first().copied().unwrap_or_default();
        let event = self
            .abi
            .event_by_topic(&topic)
            .ok_or_else(|| BindingError::EventNotFound(format!("{:?}", topic)))?;
        codec::decode_log(event, log)
    }

    fn filterer(&self) -> Result<&Arc<dyn ContractFilterer>> {
        self.filterer.as_ref().ok_or(BindingError::NoBackend("log"))
    }

    fn event_filter(
        &self,
        event: &str,
        rules: &[Vec<DynSolValue>],
    ) -> Result<(Event, alloy::rpc::types::Filter)> {
        let event = self.abi.event(event)?;
        let topics = codec::topic_rules(event, rules)?;
        let filter = build_filter(self.address, event, &topics)?;
        Ok((event.clone(), filter))
    }
}

/// Runs `fut`, failing with [`BindingError::Timeout`] once `timeout` elapses.
async fn with_deadline<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| BindingError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::builtin::SystemContract;
    use crate::backend::{
        testing::{log_at, StubFilterer, CONTRACT},
        MockContractCaller, MockContractTransactor,
    };
    use crate::error::BackendError;
    use crate::events::IteratorState;
    use alloy::{
        eips::{BlockId, BlockNumberOrTag},
        primitives::{b256, fixed_bytes, TxHash, U256},
    };
    use tokio::sync::mpsc;

    const JAILED_TOPIC: alloy::primitives::B256 =
        b256!("f226e7d8f547ff903d9d419cf5f54e0d7d07efa9584135a53a057c5f1f27f49a");

    fn validator_set() -> Arc<AbiDescriptor> {
        Arc::new(SystemContract::ValidatorSet.descriptor().unwrap())
    }

    fn jailed_log(block: u64, index: u64, validator: u8) -> Log {
        log_at(
            block,
            index,
            vec![
                JAILED_TOPIC,
                Address::with_last_byte(validator).into_word(),
            ],
            Vec::new(),
        )
    }

    fn selector_of(request: &TransactionRequest) -> Vec<u8> {
        request
            .input
            .input()
            .map(|input| input[..4.min(input.len())].to_vec())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_call_get_validators_empty() {
        let mut caller = MockContractCaller::new();
        caller
            .expect_call()
            .withf(|request, block| {
                selector_of(request) == fixed_bytes!("b7ab4db5").to_vec()
                    && *block == BlockId::latest()
            })
            .times(1)
            .returning(|_, _| {
                let mut data = vec![0u8; 64];
                data[31] = 0x20;
                Ok(Bytes::from(data))
            });

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(caller));
        let output = contract
            .call(&CallOpts::default(), "getValidators", &[])
            .await
            .unwrap();

        assert_eq!(output.single().and_then(|v| v.as_array()), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_call_pending_state() {
        let mut caller = MockContractCaller::new();
        caller
            .expect_call()
            .withf(|_, block| *block == BlockId::Number(BlockNumberOrTag::Pending))
            .times(1)
            .returning(|_, _| {
                Ok(Bytes::from(
                    DynSolValue::Array(vec![DynSolValue::Address(Address::with_last_byte(1))])
                        .abi_encode_params(),
                ))
            });

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(caller));
        let output = contract
            .call(&CallOpts::pending(), "getValidators()", &[])
            .await
            .unwrap();

        let validators = output.into_single().and_then(|v| v.as_array().map(<[_]>::to_vec));
        assert_eq!(
            validators,
            Some(vec![DynSolValue::Address(Address::with_last_byte(1))])
        );
    }

    #[tokio::test]
    async fn test_call_without_code() {
        let mut caller = MockContractCaller::new();
        caller.expect_call().returning(|_, _| Ok(Bytes::new()));
        caller
            .expect_code_at()
            .withf(|address, _| *address == CONTRACT)
            .times(1)
            .returning(|_, _| Ok(Bytes::new()));

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(caller));
        let err = contract
            .call(&CallOpts::default(), "getValidators", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, BindingError::NoCode(address) if address == CONTRACT));
    }

    #[tokio::test]
    async fn test_call_backend_error_is_returned() {
        let mut caller = MockContractCaller::new();
        caller
            .expect_call()
            .returning(|_, _| Err(BackendError::Rejected("execution reverted".into())));
        caller.expect_code_at().never();

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(caller));
        let err = contract
            .call(&CallOpts::default(), "getValidators", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, BindingError::Backend(BackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_encoding_errors_precede_io() {
        let mut caller = MockContractCaller::new();
        caller.expect_call().never();

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(caller));
        let err = contract
            .call(
                &CallOpts::default(),
                "currentValidatorSet",
                &[DynSolValue::Bool(true), DynSolValue::Bool(false)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::ArgumentCount { .. }));

        let err = contract
            .call(&CallOpts::default(), "slash", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::MethodNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_backend() {
        let contract = BoundContract::new(CONTRACT, validator_set());
        let err = contract
            .call(&CallOpts::default(), "getValidators", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::NoBackend("call")));

        let err = contract.transfer(&TransactOpts::default()).await.unwrap_err();
        assert!(matches!(err, BindingError::NoBackend("transact")));
    }

    #[tokio::test]
    async fn test_transact_estimates_gas() {
        let mut transactor = MockContractTransactor::new();
        transactor
            .expect_estimate_gas()
            .withf(|request| selector_of(request) == fixed_bytes!("f340fa01").to_vec())
            .times(1)
            .returning(|_| Ok(52_000));
        transactor
            .expect_send_transaction()
            .withf(|request| request.gas == Some(52_000))
            .times(1)
            .returning(|request| {
                Ok(SubmittedTransaction {
                    hash: TxHash::with_last_byte(1),
                    request,
                })
            });

        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_transactor(Arc::new(transactor));
        let submitted = contract
            .transact(
                &TransactOpts::default(),
                "deposit",
                &[DynSolValue::Address(Address::with_last_byte(9))],
            )
            .await
            .unwrap();

        assert_eq!(submitted.hash, TxHash::with_last_byte(1));
    }

    #[tokio::test]
    async fn test_transfer_uses_given_gas_and_empty_calldata() {
        let mut transactor = MockContractTransactor::new();
        transactor.expect_estimate_gas().never();
        transactor
            .expect_send_transaction()
            .withf(|request| {
                request.gas == Some(21_000)
                    && request.value == Some(U256::from(5u64))
                    && request.input.input().map_or(true, |input| input.is_empty())
            })
            .returning(|request| {
                Ok(SubmittedTransaction {
                    hash: TxHash::with_last_byte(2),
                    request,
                })
            });

        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_transactor(Arc::new(transactor));
        let opts = TransactOpts {
            value: Some(U256::from(5u64)),
            gas_limit: Some(21_000),
            ..Default::default()
        };
        assert!(contract.transfer(&opts).await.is_ok());
    }

    #[tokio::test]
    async fn test_call_times_out() {
        struct SlowCaller;

        #[async_trait::async_trait]
        impl ContractCaller for SlowCaller {
            async fn call(
                &self,
                _request: &TransactionRequest,
                _block: BlockId,
            ) -> std::result::Result<Bytes, BackendError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Bytes::new())
            }

            async fn code_at(
                &self,
                _address: Address,
                _block: BlockId,
            ) -> std::result::Result<Bytes, BackendError> {
                Ok(Bytes::new())
            }
        }

        let contract = BoundContract::new(CONTRACT, validator_set()).with_caller(Arc::new(SlowCaller));
        let opts = CallOpts {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let err = contract
            .call(&opts, "getValidators", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_historical_logs_filters_range_and_sorts() {
        let filterer = Arc::new(StubFilterer::new(vec![
            jailed_log(8, 0, 0x11),
            jailed_log(3, 2, 0x11),
            jailed_log(3, 1, 0x11),
        ]));
        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_filterer(filterer.clone());
        let validator = Address::with_last_byte(0x11);
        let rules = [vec![DynSolValue::Address(validator)]];

        let logs = contract
            .historical_logs(&FilterOpts::range(3, 9), "validatorJailed", &rules)
            .await
            .unwrap();
        let positions: Vec<_> = logs
            .iter()
            .map(|log| (log.block_number, log.log_index))
            .collect();
        assert_eq!(
            positions,
            vec![(Some(3), Some(1)), (Some(3), Some(2)), (Some(8), Some(0))]
        );

        contract
            .historical_logs(&FilterOpts::from_block(5), "validatorJailed", &[])
            .await
            .unwrap();
        assert_eq!(filterer.subscriptions(), 0);

        let filters = filterer.filters.lock().unwrap();
        let ranges: Vec<_> = filters
            .iter()
            .map(|filter| (filter.get_from_block(), filter.block_option.get_to_block().copied()))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (Some(3), Some(BlockNumberOrTag::Number(9))),
                (Some(5), Some(BlockNumberOrTag::Latest)),
            ]
        );

        assert!(filters[0].topics[0].matches(&JAILED_TOPIC));
        assert!(filters[0].topics[1].matches(&validator.into_word()));
        assert!(!filters[0].topics[1].matches(&Address::ZERO.into_word()));
        assert!(filters[1].topics[1].is_empty());
    }

    #[tokio::test]
    async fn test_filter_logs_with_end_is_historical_only() {
        let filterer = Arc::new(StubFilterer::new(vec![jailed_log(4, 0, 1)]));
        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_filterer(filterer.clone());

        let mut iter = contract
            .filter_logs(&FilterOpts::range(1, 10), "validatorJailed", &[])
            .await
            .unwrap();

        let decoded = iter.next().await.unwrap().unwrap();
        assert_eq!(
            decoded.get("validator"),
            Some(&DynSolValue::Address(Address::with_last_byte(1)))
        );
        assert!(iter.next().await.is_none());
        assert!(matches!(iter.state(), IteratorState::Closed(None)));
        assert_eq!(filterer.subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_filter_logs_applies_topic_rules() {
        let filterer = Arc::new(StubFilterer::new(Vec::new()));
        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_filterer(filterer.clone());
        let validator = Address::with_last_byte(0x11);

        let _iter = contract
            .filter_logs(
                &FilterOpts::from_block(100),
                "validatorJailed",
                &[vec![DynSolValue::Address(validator)]],
            )
            .await
            .unwrap();

        let filters = filterer.filters.lock().unwrap();
        assert_eq!(filters.len(), 2);
        for filter in filters.iter() {
            assert!(filter.topics[0].matches(&JAILED_TOPIC));
            assert!(filter.topics[1].matches(&validator.into_word()));
            assert!(!filter.topics[1].matches(&Address::ZERO.into_word()));
        }
        assert_eq!(filterer.subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_watch_replays_then_follows() {
        let filterer = Arc::new(StubFilterer::new(vec![jailed_log(5, 0, 1)]));
        let contract =
            BoundContract::new(CONTRACT, validator_set()).with_filterer(filterer.clone());
        let (tx, mut rx) = mpsc::channel(8);

        let watch = contract
            .watch_logs(
                WatchOpts {
                    start: Some(1),
                    ..Default::default()
                },
                "validatorJailed",
                &[],
                tx,
            )
            .await
            .unwrap();
        assert!(filterer.feed().deliver(jailed_log(6, 0, 2)).await);

        let first = rx.recv().await.unwrap().unwrap();
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.block_number(), Some(5));
        assert_eq!(second.block_number(), Some(6));

        watch.unsubscribe().await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_fails_when_subscription_refused() {
        let filterer = Arc::new(StubFilterer::rejecting_subscribe(Vec::new()));
        let contract = BoundContract::new(CONTRACT, validator_set()).with_filterer(filterer);
        let (tx, _rx) = mpsc::channel(8);

        let err = contract
            .watch_logs(WatchOpts::default(), "validatorJailed", &[], tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::Backend(BackendError::Rejected(_))));
    }

    #[test]
    fn test_parse_log() {
        let contract = BoundContract::new(CONTRACT, validator_set());
        let log = jailed_log(1, 0, 0x42);

        let decoded = contract.parse_log("validatorJailed", &log).unwrap();
        assert_eq!(
            decoded.get("validator"),
            Some(&DynSolValue::Address(Address::with_last_byte(0x42)))
        );
        assert_eq!(contract.parse_any_log(&log).unwrap().name, "validatorJailed");
        assert!(contract.parse_log("validatorFelony", &log).is_err());
    }
}
