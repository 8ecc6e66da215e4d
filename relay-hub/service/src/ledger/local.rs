// Copyright (c) 2024 The Botho Foundation

//! An in-process ledger hosting the relay hub module.
//!
//! Transactions execute one at a time under a single lock. Each execution
//! runs against a scratch copy of the hub and is only swapped in after the
//! receipt and new state are durably recorded, so a transaction either fully
//! applies or leaves no trace beyond its failed receipt.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use relay_hub_core::{
    hub::{
        COLLECT_HEADER, GET_HEADER, GET_PARACHAIN, GET_PARACHAIN_COUNT, GET_RELAY_HEADER_VOTES,
        REGISTER_PARACHAIN,
    },
    HeaderSubmission, HubCall, HubError, HubEvent, HubSettings, HubState, LedgerConfig, RelayHub,
};
use tracing::{debug, info, warn};

use super::{
    AccountAddress, ArgDecoder, EntryFunction, LedgerError, LedgerResult, LedgerService, ModuleId,
    RawTransaction, TxHash, TxReceipt, ViewRequest, ViewValue,
};
use crate::db::{Database, StoredState};

/// Gas charged for every transaction.
const INTRINSIC_GAS: u64 = 5;
/// Gas charged per byte of encoded arguments.
const GAS_PER_ARG_BYTE: u64 = 1;
/// Gas charged per emitted event.
const GAS_PER_EVENT: u64 = 4;

const VM_SUCCESS: &str = "Executed successfully";

struct LedgerState {
    hub: RelayHub,
    block_height: u64,
    version: u64,
}

/// Ledger that runs the hub in process and records history in SQLite.
pub struct LocalLedger {
    chain_id: u8,
    module: ModuleId,
    db: Database,
    inner: Mutex<LedgerState>,
}

impl LocalLedger {
    /// Open the ledger, resuming from the last committed hub state.
    pub fn open(config: &LedgerConfig, settings: HubSettings, db: Database) -> LedgerResult<Self> {
        let module = ModuleId::new(
            AccountAddress::parse(&config.module_address)?,
            config.module_name.clone(),
        );

        let (hub, block_height) = match db.load_state()? {
            Some(stored) => {
                let state: HubState = serde_json::from_str(&stored.state_json)
                    .map_err(|e| LedgerError::Codec(format!("Failed to decode hub state: {}", e)))?;
                info!(
                    "Resuming hub at block {} with {} parachains",
                    stored.block_height,
                    state.registry.count()
                );
                (RelayHub::from_state(settings, state), stored.block_height)
            }
            None => (RelayHub::new(settings), 0),
        };
        let version = db.transaction_count()?;

        Ok(Self {
            chain_id: config.chain_id,
            module,
            db,
            inner: Mutex::new(LedgerState {
                hub,
                block_height,
                version,
            }),
        })
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    /// Current hub block height.
    pub fn block_height(&self) -> LedgerResult<u64> {
        Ok(self.lock()?.block_height)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.inner
            .lock()
            .map_err(|e| LedgerError::Storage(format!("Lock error: {}", e)))
    }

    fn check_module(&self, module: &ModuleId) -> LedgerResult<()> {
        if module != &self.module {
            return Err(LedgerError::UnknownModule(module.to_string()));
        }
        Ok(())
    }

    /// Checks that reject a request before it gets a sequence number.
    fn prevalidate(&self, transaction: &RawTransaction) -> LedgerResult<()> {
        if transaction.chain_id != self.chain_id {
            return Err(LedgerError::WrongChainId {
                expected: self.chain_id,
                got: transaction.chain_id,
            });
        }
        let now = Utc::now().timestamp().max(0) as u64;
        if transaction.expiration_timestamp_secs <= now {
            return Err(LedgerError::Expired(transaction.expiration_timestamp_secs));
        }
        self.check_module(&transaction.payload.module)
    }

    fn execute(
        &self,
        inner: &mut LedgerState,
        transaction: &RawTransaction,
        hash: TxHash,
    ) -> LedgerResult<TxReceipt> {
        let payload = &transaction.payload;
        let max_gas = transaction.max_gas_amount;
        let base_gas = INTRINSIC_GAS + payload.args_len() as u64 * GAS_PER_ARG_BYTE;

        let mut committed: Option<RelayHub> = None;
        let mut events: Vec<HubEvent> = Vec::new();
        let mut block_height = inner.block_height;

        let (success, vm_status, gas_used) = match decode_call(payload) {
            Err(LedgerError::UnknownFunction(name)) => (
                false,
                format!("FUNCTION_RESOLUTION_FAILURE: {}", name),
                base_gas.min(max_gas),
            ),
            Err(e) => (
                false,
                format!("FAILED_TO_DESERIALIZE_ARGUMENT: {}", e),
                base_gas.min(max_gas),
            ),
            Ok(call) => {
                let mut scratch = inner.hub.clone();
                let next_block = inner.block_height + 1;
                match scratch.execute(&call, next_block) {
                    Err(e) => (
                        false,
                        format!("ABORTED: {}: {}", e.abort_code(), e),
                        base_gas.min(max_gas),
                    ),
                    Ok(emitted) => {
                        let gas = base_gas + emitted.len() as u64 * GAS_PER_EVENT;
                        if gas > max_gas {
                            (false, "OUT_OF_GAS".to_string(), max_gas)
                        } else {
                            committed = Some(scratch);
                            events = emitted;
                            block_height = next_block;
                            (true, VM_SUCCESS.to_string(), gas)
                        }
                    }
                }
            }
        };

        let receipt = TxReceipt {
            hash,
            sender: transaction.sender.clone(),
            sequence_number: transaction.sequence_number,
            function: payload.function.clone(),
            version: inner.version + 1,
            block_height,
            success,
            vm_status,
            gas_used,
            events,
            timestamp: Utc::now(),
        };

        let stored = match &committed {
            Some(hub) => Some(StoredState {
                state_json: serde_json::to_string(hub.state())
                    .map_err(|e| LedgerError::Codec(format!("Failed to encode hub state: {}", e)))?,
                block_height,
            }),
            None => None,
        };
        self.db.commit_transaction(&receipt, stored.as_ref())?;

        if let Some(hub) = committed {
            inner.hub = hub;
            inner.block_height = block_height;
        }
        inner.version = receipt.version;

        if receipt.success {
            info!(
                "Executed {} (seq {}) at block {}: gas {}",
                receipt.function, receipt.sequence_number, receipt.block_height, receipt.gas_used
            );
        } else {
            warn!(
                "Transaction {} ({}) failed: {}",
                receipt.hash, receipt.function, receipt.vm_status
            );
        }
        Ok(receipt)
    }
}

/// Decode an entry function into a hub call.
fn decode_call(payload: &EntryFunction) -> LedgerResult<HubCall> {
    let mut args = ArgDecoder::new(&payload.args);
    let call = match payload.function.as_str() {
        REGISTER_PARACHAIN => HubCall::RegisterParachain {
            chain_id: args.u64()?,
        },
        COLLECT_HEADER => {
            let chain_id = args.u64()?;
            let height = args.u64()?;
            let state_root = args.bytes()?;
            let header_commitment_root = args.bytes()?;
            let relay_heights = args.u64_vector()?;
            let submission = HeaderSubmission::from_raw(
                chain_id,
                height,
                &state_root,
                &header_commitment_root,
                relay_heights,
            )
            .map_err(|e| LedgerError::Codec(e.to_string()))?;
            HubCall::CollectHeader(submission)
        }
        other => return Err(LedgerError::UnknownFunction(other.to_string())),
    };
    args.finish()?;
    Ok(call)
}

fn view_abort(err: HubError) -> LedgerError {
    LedgerError::ViewAborted {
        code: err.abort_code().to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl LedgerService for LocalLedger {
    async fn chain_id(&self) -> LedgerResult<u8> {
        Ok(self.chain_id)
    }

    async fn sequence_number(&self, account: &AccountAddress) -> LedgerResult<u64> {
        Ok(self.db.sequence_number(account)?)
    }

    async fn submit(&self, transaction: RawTransaction) -> LedgerResult<TxHash> {
        self.prevalidate(&transaction)?;
        let hash = transaction.hash()?;

        let mut inner = self.lock()?;
        let expected = self.db.sequence_number(&transaction.sender)?;
        if transaction.sequence_number != expected {
            return Err(LedgerError::SequenceMismatch {
                expected,
                got: transaction.sequence_number,
            });
        }

        debug!("Accepted transaction {} from {}", hash, transaction.sender);
        let receipt = self.execute(&mut inner, &transaction, hash)?;
        Ok(receipt.hash)
    }

    async fn transaction(&self, hash: &TxHash) -> LedgerResult<Option<TxReceipt>> {
        Ok(self.db.get_receipt(hash)?)
    }

    async fn view(&self, request: ViewRequest) -> LedgerResult<Vec<ViewValue>> {
        self.check_module(&request.module)?;
        let inner = self.lock()?;
        let hub = &inner.hub;
        let mut args = ArgDecoder::new(&request.args);

        let values = match request.function.as_str() {
            GET_PARACHAIN => {
                let chain_id = args.u64()?;
                args.finish()?;
                let record = hub.get_parachain(chain_id).map_err(view_abort)?;
                vec![ViewValue::Bool(record.registered)]
            }
            GET_PARACHAIN_COUNT => {
                args.finish()?;
                vec![ViewValue::U64(hub.get_parachain_count())]
            }
            GET_HEADER => {
                let chain_id = args.u64()?;
                let height = args.u64()?;
                args.finish()?;
                let entry = hub.get_header(chain_id, height).map_err(view_abort)?;
                vec![
                    ViewValue::U64(entry.included_at),
                    ViewValue::Bytes(entry.state_root.to_vec()),
                    ViewValue::Bytes(entry.header_commitment_root.to_vec()),
                    ViewValue::U64Vector(entry.relay_heights),
                ]
            }
            GET_RELAY_HEADER_VOTES => {
                let relay_height = args.u64()?;
                args.finish()?;
                let votes = hub.get_relay_header_votes(relay_height);
                vec![ViewValue::U64(votes.votes), ViewValue::U64(votes.max_votes)]
            }
            other => return Err(LedgerError::UnknownFunction(other.to_string())),
        };
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionArgument;

    fn ledger() -> LocalLedger {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        LocalLedger::open(&LedgerConfig::default(), HubSettings::default(), db).unwrap()
    }

    fn sender() -> AccountAddress {
        AccountAddress::parse("0xa11ce").unwrap()
    }

    fn view_request(module: ModuleId, function: &str, args: &[TransactionArgument]) -> ViewRequest {
        ViewRequest::natural(module, function, args).unwrap()
    }

    fn request(
        ledger: &LocalLedger,
        sequence_number: u64,
        function: &str,
        args: &[TransactionArgument],
    ) -> RawTransaction {
        RawTransaction {
            sender: sender(),
            sequence_number,
            payload: EntryFunction::natural(ledger.module().clone(), function, vec![], args)
                .unwrap(),
            max_gas_amount: 2000,
            gas_unit_price: 100,
            expiration_timestamp_secs: Utc::now().timestamp() as u64 + 600,
            chain_id: LedgerConfig::default().chain_id,
        }
    }

    fn collect_args(
        chain_id: u64,
        height: u64,
        relay_heights: Vec<u64>,
    ) -> Vec<TransactionArgument> {
        vec![
            TransactionArgument::U64(chain_id),
            TransactionArgument::U64(height),
            TransactionArgument::Bytes(vec![1; 32]),
            TransactionArgument::Bytes(vec![2; 32]),
            TransactionArgument::U64Vector(relay_heights),
        ]
    }

    #[tokio::test]
    async fn test_register_and_view() {
        let ledger = ledger();
        let tx = request(&ledger, 0, REGISTER_PARACHAIN, &[TransactionArgument::U64(1001)]);
        let hash = ledger.submit(tx).await.unwrap();

        let receipt = ledger.transaction(&hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_height, 1);
        assert_eq!(receipt.events, vec![HubEvent::ParachainRegistered { chain_id: 1001 }]);
        assert_eq!(receipt.gas_used, INTRINSIC_GAS + 8 + GAS_PER_EVENT);

        let count = ledger
            .view(view_request(ledger.module().clone(), GET_PARACHAIN_COUNT, &[]))
            .await
            .unwrap();
        assert_eq!(count, vec![ViewValue::U64(1)]);
        assert_eq!(ledger.sequence_number(&sender()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sequence_number_enforced() {
        let ledger = ledger();
        let tx = request(&ledger, 3, REGISTER_PARACHAIN, &[TransactionArgument::U64(1001)]);
        assert!(matches!(
            ledger.submit(tx).await,
            Err(LedgerError::SequenceMismatch {
                expected: 0,
                got: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_expired_and_wrong_chain_rejected() {
        let ledger = ledger();
        let mut tx = request(&ledger, 0, REGISTER_PARACHAIN, &[TransactionArgument::U64(1)]);
        tx.expiration_timestamp_secs = 1;
        assert!(matches!(ledger.submit(tx).await, Err(LedgerError::Expired(1))));

        let mut tx = request(&ledger, 0, REGISTER_PARACHAIN, &[TransactionArgument::U64(1)]);
        tx.chain_id = 99;
        assert!(matches!(
            ledger.submit(tx).await,
            Err(LedgerError::WrongChainId { got: 99, .. })
        ));
        assert_eq!(ledger.sequence_number(&sender()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_abort_consumes_sequence_but_not_state() {
        let ledger = ledger();
        let tx = request(&ledger, 0, COLLECT_HEADER, &collect_args(1001, 1, vec![5]));
        let hash = ledger.submit(tx).await.unwrap();

        let receipt = ledger.transaction(&hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert!(receipt.vm_status.contains("E_UNKNOWN_CHAIN"));
        assert!(receipt.events.is_empty());
        assert_eq!(receipt.block_height, 0);
        assert_eq!(ledger.sequence_number(&sender()).await.unwrap(), 1);
        assert_eq!(ledger.block_height().unwrap(), 0);

        let votes = ledger
            .view(view_request(
                ledger.module().clone(),
                GET_RELAY_HEADER_VOTES,
                &[TransactionArgument::U64(5)],
            ))
            .await
            .unwrap();
        assert_eq!(votes, vec![ViewValue::U64(0), ViewValue::U64(0)]);
    }

    #[tokio::test]
    async fn test_out_of_gas_discards_execution() {
        let ledger = ledger();
        let mut tx = request(&ledger, 0, REGISTER_PARACHAIN, &[TransactionArgument::U64(1001)]);
        tx.max_gas_amount = INTRINSIC_GAS + 8;
        let hash = ledger.submit(tx).await.unwrap();

        let receipt = ledger.transaction(&hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.vm_status, "OUT_OF_GAS");
        assert_eq!(receipt.gas_used, INTRINSIC_GAS + 8);

        let err = ledger
            .view(view_request(
                ledger.module().clone(),
                GET_PARACHAIN,
                &[TransactionArgument::U64(1001)],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ViewAborted { ref code, .. } if code == "E_PARACHAIN_NOT_FOUND"
        ));
    }

    #[tokio::test]
    async fn test_bad_arguments_fail_execution() {
        let ledger = ledger();
        let mut args = collect_args(1001, 1, vec![]);
        args[2] = TransactionArgument::Bytes(vec![1; 31]);
        let hash = ledger
            .submit(request(&ledger, 0, COLLECT_HEADER, &args))
            .await
            .unwrap();
        let receipt = ledger.transaction(&hash).await.unwrap().unwrap();
        assert!(receipt.vm_status.starts_with("FAILED_TO_DESERIALIZE_ARGUMENT"));

        let hash = ledger
            .submit(request(&ledger, 1, "burn", &[]))
            .await
            .unwrap();
        let receipt = ledger.transaction(&hash).await.unwrap().unwrap();
        assert!(receipt.vm_status.starts_with("FUNCTION_RESOLUTION_FAILURE"));
    }

    #[tokio::test]
    async fn test_header_view_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap().to_string();

        {
            let db = Database::open(&path).unwrap();
            db.migrate().unwrap();
            let ledger =
                LocalLedger::open(&LedgerConfig::default(), HubSettings::default(), db).unwrap();
            ledger
                .submit(request(&ledger, 0, REGISTER_PARACHAIN, &[TransactionArgument::U64(1001)]))
                .await
                .unwrap();
            ledger
                .submit(request(&ledger, 1, COLLECT_HEADER, &collect_args(1001, 77, vec![])))
                .await
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        let ledger =
            LocalLedger::open(&LedgerConfig::default(), HubSettings::default(), db).unwrap();
        assert_eq!(ledger.block_height().unwrap(), 2);
        assert_eq!(ledger.sequence_number(&sender()).await.unwrap(), 2);

        let header = ledger
            .view(view_request(
                ledger.module().clone(),
                GET_HEADER,
                &[TransactionArgument::U64(1001), TransactionArgument::U64(77)],
            ))
            .await
            .unwrap();
        assert_eq!(
            header,
            vec![
                ViewValue::U64(2),
                ViewValue::Bytes(vec![1; 32]),
                ViewValue::Bytes(vec![2; 32]),
                ViewValue::U64Vector(vec![]),
            ]
        );
    }
}
