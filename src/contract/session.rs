use alloy::dyn_abi::DynSolValue;

use super::{BoundContract, CallOpts, TransactOpts};
use crate::abi::codec::CallOutput;
use crate::backend::SubmittedTransaction;
use crate::error::Result;

/// A bound contract with call and transact options fixed up front, so that
/// repeated interactions from the same account need no per-call options.
#[derive(Debug, Clone)]
pub struct Session {
    contract: BoundContract,
    pub call_opts: CallOpts,
    pub transact_opts: TransactOpts,
}

impl Session {
    pub fn new(contract: BoundContract, call_opts: CallOpts, transact_opts: TransactOpts) -> Self {
        Self {
            contract,
            call_opts,
            transact_opts,
        }
    }

    pub fn contract(&self) -> &BoundContract {
        &self.contract
    }

    pub async fn call(&self, method: &str, args: &[DynSolValue]) -> Result<CallOutput> {
        self.contract.call(&self.call_opts, method, args).await
    }

    pub async fn transact(
        &self,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<SubmittedTransaction> {
        self.contract
            .transact(&self.transact_opts, method, args)
            .await
    }

    pub async fn transfer(&self) -> Result<SubmittedTransaction> {
        self.contract.transfer(&self.transact_opts).await
    }
}
