//! Error types for the binding layer.

use alloy::{
    dyn_abi,
    primitives::{Address, B256},
    transports::TransportError,
};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a backend (the node or RPC client behind a contract).
#[derive(Error, Debug)]
pub enum BackendError {
    /// The transport failed or the node answered with an RPC error.
    #[error("RPC error: {0}")]
    Transport(#[from] TransportError),

    /// The node refused the request, e.g. a block range that is too wide.
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    /// The live log feed stopped delivering.
    #[error("Log subscription dropped: {0}")]
    SubscriptionDropped(String),
}

/// Errors surfaced by bound contracts, codecs and event streams.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Invalid ABI JSON: {0}")]
    InvalidAbi(#[from] serde_json::Error),

    #[error("Method '{0}' not found in contract ABI")]
    MethodNotFound(String),

    #[error("Event '{0}' not found in contract ABI")]
    EventNotFound(String),

    #[error("Method name '{name}' is overloaded, use a full signature: {candidates}")]
    AmbiguousMethod { name: String, candidates: String },

    #[error("Event name '{name}' is overloaded, use a full signature: {candidates}")]
    AmbiguousEvent { name: String, candidates: String },

    #[error("Argument count mismatch for '{name}': expected {expected}, got {actual}")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to encode arguments for '{name}': {source}")]
    Encode {
        name: String,
        #[source]
        source: dyn_abi::Error,
    },

    #[error("Invalid value for parameter '{param}' of type '{ty}': {reason}")]
    InvalidArgument {
        param: String,
        ty: String,
        reason: String,
    },

    #[error("Event '{event}' declares {indexed} indexed parameters, got {rules} topic rules")]
    TooManyTopicRules {
        event: String,
        indexed: usize,
        rules: usize,
    },

    /// The contract handle was built without the backend this operation needs.
    #[error("No {0} backend bound to this contract")]
    NoBackend(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No contract code at {0}")]
    NoCode(Address),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Output of '{name}' is {actual} bytes, its declared shape needs at least {expected}")]
    ShortOutput {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to decode '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: dyn_abi::Error,
    },

    #[error("Log does not belong to event '{event}': expected topic {expected}, found {found:?}")]
    EventMismatch {
        event: String,
        expected: B256,
        found: Option<B256>,
    },

    #[error("Event sink closed")]
    SinkClosed,

    #[error("Event sink is full")]
    SinkFull,

    #[error("Watch task failed: {0}")]
    WatchTask(#[from] tokio::task::JoinError),
}

impl BindingError {
    /// Whether this error came from decoding a payload rather than from the
    /// backend or the caller's input.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::ShortOutput { .. } | Self::Decode { .. } | Self::EventMismatch { .. }
        )
    }
}

pub type Result<T, E = BindingError> = std::result::Result<T, E>;
