//! ABI-driven contract bindings: call and transact with deployed contracts
//! described by a JSON ABI, and follow their events as one ordered stream of
//! historical and live records.

pub mod abi;
pub mod backend;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod utils;

pub use abi::{
    builtin::SystemContract,
    codec::{CallOutput, DecodedEvent},
    AbiDescriptor,
};
pub use backend::{
    ContractCaller, ContractFilterer, ContractTransactor, LogSubscription, SubmittedTransaction,
};
pub use contract::{
    BoundContract, CallOpts, FilterOpts, Session, SinkPolicy, TransactOpts, WatchOpts,
};
pub use error::{BackendError, BindingError};
pub use events::{EventIterator, EventSink, EventWatch, IteratorState};
