// Copyright (c) 2024 The Botho Foundation

//! The ledger boundary: transaction requests, receipts and views.
//!
//! The hub module runs inside a ledger. Callers submit requests naming an
//! entry function with encoded arguments, poll for the receipt, and read
//! state through side-effect free views.

mod codec;
mod local;

pub use codec::{encode_args, ArgDecoder, TransactionArgument};
pub use local::LocalLedger;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_hub_core::HubEvent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Errors reported by a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Sequence number mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("Request expired at {0}")]
    Expired(u64),

    #[error("Wrong chain id: expected {expected}, got {got}")]
    WrongChainId { expected: u8, got: u8 },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("View aborted with {code}: {message}")]
    ViewAborted { code: String, message: String },
}

impl From<String> for LedgerError {
    fn from(err: String) -> Self {
        LedgerError::Storage(err)
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A 32-byte account address, rendered as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress(String);

impl AccountAddress {
    /// Parse a hex address. Short forms like `0x1` are left-padded.
    pub fn parse(s: &str) -> LedgerResult<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s).to_lowercase();
        if digits.is_empty()
            || digits.len() > 64
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(LedgerError::InvalidAddress(s.to_string()));
        }
        Ok(Self(format!("0x{:0>64}", digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address and name of a published module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleId {
    pub address: AccountAddress,
    pub name: String,
}

impl ModuleId {
    pub fn new(address: AccountAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.address, self.name)
    }
}

/// A call to a module entry function with encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunction {
    pub module: ModuleId,
    pub function: String,
    pub ty_args: Vec<String>,
    pub args: Vec<Vec<u8>>,
}

impl EntryFunction {
    /// Build an entry function from typed arguments.
    pub fn natural(
        module: ModuleId,
        function: impl Into<String>,
        ty_args: Vec<String>,
        args: &[TransactionArgument],
    ) -> LedgerResult<Self> {
        Ok(Self {
            module,
            function: function.into(),
            ty_args,
            args: encode_args(args)?,
        })
    }

    /// Total size of the encoded arguments.
    pub fn args_len(&self) -> usize {
        self.args.iter().map(Vec::len).sum()
    }
}

/// A state-transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub sender: AccountAddress,
    /// Must equal the sender's next sequence number.
    pub sequence_number: u64,
    pub payload: EntryFunction,
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    pub expiration_timestamp_secs: u64,
    pub chain_id: u8,
}

impl RawTransaction {
    /// SHA-256 of the bincode encoding.
    pub fn hash(&self) -> LedgerResult<TxHash> {
        let bytes = bincode::serialize(self).map_err(|e| LedgerError::Codec(e.to_string()))?;
        Ok(TxHash(format!("0x{}", hex::encode(Sha256::digest(&bytes)))))
    }
}

/// Transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub module: ModuleId,
    pub function: String,
    pub ty_args: Vec<String>,
    pub args: Vec<Vec<u8>>,
}

impl ViewRequest {
    pub fn natural(
        module: ModuleId,
        function: impl Into<String>,
        args: &[TransactionArgument],
    ) -> LedgerResult<Self> {
        Ok(Self {
            module,
            function: function.into(),
            ty_args: Vec::new(),
            args: encode_args(args)?,
        })
    }
}

/// A value returned by a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ViewValue {
    Bool(bool),
    U64(u64),
    Bytes(Vec<u8>),
    U64Vector(Vec<u64>),
}

/// Completion record of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub sender: AccountAddress,
    pub sequence_number: u64,
    pub function: String,
    /// Position of the transaction in the ledger's history
    pub version: u64,
    /// Hub block height after the transaction
    pub block_height: u64,
    pub success: bool,
    pub vm_status: String,
    pub gas_used: u64,
    pub events: Vec<HubEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Terminal result of waiting on a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Success(TxReceipt),
    Failure(TxReceipt),
    Timeout,
}

/// A ledger that hosts the hub module.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Chain id requests must carry.
    async fn chain_id(&self) -> LedgerResult<u8>;

    /// Next sequence number the account must use.
    async fn sequence_number(&self, account: &AccountAddress) -> LedgerResult<u64>;

    /// Submit a request. Returns once the ledger has accepted it.
    async fn submit(&self, transaction: RawTransaction) -> LedgerResult<TxHash>;

    /// Receipt of a completed transaction, or `None` while pending.
    async fn transaction(&self, hash: &TxHash) -> LedgerResult<Option<TxReceipt>>;

    /// Evaluate a view without changing state.
    async fn view(&self, request: ViewRequest) -> LedgerResult<Vec<ViewValue>>;
}

/// Poll until the transaction completes or `timeout` elapses.
pub async fn wait_for_transaction<L>(
    ledger: &L,
    hash: &TxHash,
    timeout: Duration,
    poll_interval: Duration,
) -> LedgerResult<TxOutcome>
where
    L: LedgerService + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(receipt) = ledger.transaction(hash).await? {
            debug!(
                "Transaction {} completed: {} (gas {})",
                hash, receipt.vm_status, receipt.gas_used
            );
            return Ok(if receipt.success {
                TxOutcome::Success(receipt)
            } else {
                TxOutcome::Failure(receipt)
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(TxOutcome::Timeout);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ledger whose transactions never complete.
    struct PendingLedger;

    #[async_trait]
    impl LedgerService for PendingLedger {
        async fn chain_id(&self) -> LedgerResult<u8> {
            Ok(1)
        }

        async fn sequence_number(&self, _account: &AccountAddress) -> LedgerResult<u64> {
            Ok(0)
        }

        async fn submit(&self, transaction: RawTransaction) -> LedgerResult<TxHash> {
            transaction.hash()
        }

        async fn transaction(&self, _hash: &TxHash) -> LedgerResult<Option<TxReceipt>> {
            Ok(None)
        }

        async fn view(&self, request: ViewRequest) -> LedgerResult<Vec<ViewValue>> {
            Err(LedgerError::UnknownFunction(request.function))
        }
    }

    #[test]
    fn test_address_normalization() {
        let short = AccountAddress::parse("0x1").unwrap();
        assert_eq!(short.as_str().len(), 66);
        assert!(short.as_str().ends_with("01"));
        assert_eq!(AccountAddress::parse("0xABC").unwrap(), AccountAddress::parse("abc").unwrap());
        assert!(AccountAddress::parse("0xzz").is_err());
        assert!(AccountAddress::parse("").is_err());
    }

    #[test]
    fn test_hash_depends_on_sequence_number() {
        let module = ModuleId::new(AccountAddress::parse("0x1").unwrap(), "RelayHub");
        let mut tx = RawTransaction {
            sender: AccountAddress::parse("0x2").unwrap(),
            sequence_number: 0,
            payload: EntryFunction::natural(
                module,
                "registerParachain",
                vec![],
                &[TransactionArgument::U64(1001)],
            )
            .unwrap(),
            max_gas_amount: 2000,
            gas_unit_price: 100,
            expiration_timestamp_secs: 10,
            chain_id: 4,
        };
        let first = tx.hash().unwrap();
        assert_eq!(first, tx.hash().unwrap());
        assert!(first.as_str().starts_with("0x"));

        tx.sequence_number = 1;
        assert_ne!(first, tx.hash().unwrap());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let outcome = wait_for_transaction(
            &PendingLedger,
            &TxHash::new("0xabc"),
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(outcome, TxOutcome::Timeout);
    }
}
