// Copyright (c) 2024 The Botho Foundation

//! Error types for the relay hub.

use thiserror::Error;

use crate::chains::ChainId;

/// Errors that can occur while driving the relay hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// A header was submitted for a chain that was never registered.
    #[error("Unknown chain: {0}")]
    UnknownChain(ChainId),

    /// No parachain record exists for the chain id.
    #[error("Parachain not found: {0}")]
    ParachainNotFound(ChainId),

    /// No header is stored at the given key.
    #[error("Header not found: chain {chain_id} height {height}")]
    HeaderNotFound { chain_id: ChainId, height: u64 },

    /// A root was not exactly 32 bytes.
    #[error("Invalid root length: expected 32 bytes, got {0}")]
    InvalidRootLength(usize),

    /// A new header height is not above the latest stored height for the chain.
    #[error("Stale height {height} for chain {chain_id} (latest is {latest})")]
    StaleHeight {
        chain_id: ChainId,
        height: u64,
        latest: u64,
    },

    /// The ledger executed the transaction but it aborted.
    #[error("Transaction {hash} failed: {vm_status}")]
    TransactionFailed { hash: String, vm_status: String },

    /// The transaction did not complete before the deadline.
    #[error("Timed out waiting for transaction {0}")]
    Timeout(String),

    /// Opaque failure reported by the ledger or its transport.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HubError {
    /// Stable abort code reported when this error crosses the ledger boundary.
    pub fn abort_code(&self) -> &'static str {
        match self {
            HubError::UnknownChain(_) => "E_UNKNOWN_CHAIN",
            HubError::ParachainNotFound(_) => "E_PARACHAIN_NOT_FOUND",
            HubError::HeaderNotFound { .. } => "E_HEADER_NOT_FOUND",
            HubError::InvalidRootLength(_) => "E_INVALID_ROOT_LENGTH",
            HubError::StaleHeight { .. } => "E_STALE_HEIGHT",
            HubError::TransactionFailed { .. } => "E_TRANSACTION_FAILED",
            HubError::Timeout(_) => "E_TIMEOUT",
            HubError::Ledger(_) => "E_LEDGER",
            HubError::Config(_) => "E_CONFIG",
        }
    }

    /// Whether this error means the queried item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HubError::ParachainNotFound(_) | HubError::HeaderNotFound { .. }
        )
    }
}

/// Result type for relay hub operations.
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_codes_are_distinct_for_protocol_errors() {
        let errors = [
            HubError::UnknownChain(1),
            HubError::ParachainNotFound(1),
            HubError::HeaderNotFound {
                chain_id: 1,
                height: 2,
            },
            HubError::InvalidRootLength(3),
            HubError::StaleHeight {
                chain_id: 1,
                height: 2,
                latest: 3,
            },
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.abort_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_not_found_is_distinct_from_unknown_chain() {
        assert!(HubError::ParachainNotFound(1001).is_not_found());
        assert!(HubError::HeaderNotFound {
            chain_id: 1001,
            height: 7
        }
        .is_not_found());
        assert!(!HubError::UnknownChain(1001).is_not_found());
    }
}
