//! Error taxonomy for the launch indexer.
//!
//! Chain and store failures are scoped to a single unit of work (one event,
//! one address). Callers log them and move on; only startup failures are
//! allowed to stop the process.

use std::time::Duration;

use alloy::primitives::Address;
use thiserror::Error;

/// Failure talking to, or decoding data from, the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or node failure.
    #[error("RPC error during {operation}: {message}")]
    Rpc { operation: &'static str, message: String },

    /// The node refused a log query because the block span was too wide.
    #[error("block range {from_block}..={to_block} too large: {message}")]
    RangeTooLarge {
        from_block: u64,
        to_block: u64,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Returned data did not match the expected ABI shape. Never retried.
    #[error("decode error in {operation}: {message}")]
    Decode { operation: &'static str, message: String },
}

impl ChainError {
    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        ChainError::Decode {
            operation,
            message: message.into(),
        }
    }

    /// Transient failures are worth another attempt on the next cycle.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::Decode { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Update against a key that was never created.
    #[error("launch {address} not found")]
    NotFound { address: Address },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored row could not be mapped back into a record.
    #[error("corrupt row for {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// Failed ingestion of one creation event.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("chain read failed for launch {launch:?}: {source}")]
    Chain {
        launch: Option<Address>,
        #[source]
        source: ChainError,
    },

    #[error("store write failed for launch {launch}: {source}")]
    Store {
        launch: Address,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub fn launch(&self) -> Option<Address> {
        match self {
            IngestError::Chain { launch, .. } => *launch,
            IngestError::Store { launch, .. } => Some(*launch),
        }
    }
}

/// Failed refresh of one active launch.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}
