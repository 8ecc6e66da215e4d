// Copyright (c) 2024 The Botho Foundation

//! Hub client - the hub's entry points and views over a ledger.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use relay_hub_core::{
    hub::{
        COLLECT_HEADER, GET_HEADER, GET_PARACHAIN, GET_PARACHAIN_COUNT, GET_RELAY_HEADER_VOTES,
        REGISTER_PARACHAIN,
    },
    ChainId, HeaderEntry, HeaderRoot, HeaderSubmission, HubApi, HubError, HubEvent, HubResult,
    LedgerConfig, ParachainRecord, RegistrationResult, VoteCount,
};
use tracing::debug;

use crate::ledger::{
    wait_for_transaction, AccountAddress, EntryFunction, LedgerError, LedgerService, ModuleId,
    RawTransaction, TransactionArgument, TxOutcome, TxReceipt, ViewRequest, ViewValue,
};

impl From<LedgerError> for HubError {
    fn from(err: LedgerError) -> Self {
        HubError::Ledger(err.to_string())
    }
}

/// Gas and timing settings applied to every transaction.
#[derive(Debug, Clone)]
pub struct TransactionSettings {
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    pub expiration: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&LedgerConfig> for TransactionSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_gas_amount: config.max_gas_amount,
            gas_unit_price: config.gas_unit_price,
            expiration: Duration::from_secs(config.expiration_secs),
            timeout: Duration::from_secs(config.tx_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Calls the hub module through a [`LedgerService`] as one operator account.
pub struct LedgerHubClient<L> {
    ledger: Arc<L>,
    module: ModuleId,
    sender: AccountAddress,
    settings: TransactionSettings,
}

impl<L: LedgerService> LedgerHubClient<L> {
    pub fn new(
        ledger: Arc<L>,
        module: ModuleId,
        sender: AccountAddress,
        settings: TransactionSettings,
    ) -> Self {
        Self {
            ledger,
            module,
            sender,
            settings,
        }
    }

    /// Build a client from ledger configuration.
    pub fn from_config(ledger: Arc<L>, config: &LedgerConfig) -> Result<Self, LedgerError> {
        let module = ModuleId::new(
            AccountAddress::parse(&config.module_address)?,
            config.module_name.clone(),
        );
        let sender = AccountAddress::parse(&config.sender_address)?;
        Ok(Self::new(ledger, module, sender, TransactionSettings::from(config)))
    }

    pub fn sender(&self) -> &AccountAddress {
        &self.sender
    }

    /// Submit an entry function call and wait for it to complete.
    pub async fn transact(
        &self,
        function: &str,
        args: &[TransactionArgument],
    ) -> HubResult<TxReceipt> {
        let chain_id = self.ledger.chain_id().await?;
        let sequence_number = self.ledger.sequence_number(&self.sender).await?;
        let expiration = Utc::now().timestamp().max(0) as u64 + self.settings.expiration.as_secs();

        let transaction = RawTransaction {
            sender: self.sender.clone(),
            sequence_number,
            payload: EntryFunction::natural(self.module.clone(), function, vec![], args)?,
            max_gas_amount: self.settings.max_gas_amount,
            gas_unit_price: self.settings.gas_unit_price,
            expiration_timestamp_secs: expiration,
            chain_id,
        };

        let hash = self.ledger.submit(transaction).await?;
        debug!("Submitted {} as {}", function, hash);

        match wait_for_transaction(
            self.ledger.as_ref(),
            &hash,
            self.settings.timeout,
            self.settings.poll_interval,
        )
        .await?
        {
            TxOutcome::Success(receipt) => Ok(receipt),
            TxOutcome::Failure(receipt) => Err(HubError::TransactionFailed {
                hash: receipt.hash.to_string(),
                vm_status: receipt.vm_status,
            }),
            TxOutcome::Timeout => Err(HubError::Timeout(hash.to_string())),
        }
    }

    async fn view(
        &self,
        function: &str,
        args: &[TransactionArgument],
    ) -> Result<Vec<ViewValue>, LedgerError> {
        let request = ViewRequest::natural(self.module.clone(), function, args)?;
        self.ledger.view(request).await
    }
}

/// Map a view abort for a missing item back to the typed error.
fn not_found_or(err: LedgerError, not_found: HubError) -> HubError {
    let missing = matches!(
        &err,
        LedgerError::ViewAborted { code, .. } if code == not_found.abort_code()
    );
    if missing {
        not_found
    } else {
        err.into()
    }
}

fn unexpected(function: &str, values: &[ViewValue]) -> HubError {
    HubError::Ledger(format!("unexpected result from {}: {:?}", function, values))
}

fn root(function: &str, values: &[ViewValue], bytes: &[u8]) -> HubResult<HeaderRoot> {
    HeaderRoot::try_from(bytes).map_err(|_| unexpected(function, values))
}

#[async_trait]
impl<L: LedgerService> HubApi for LedgerHubClient<L> {
    async fn register_parachain(&self, chain_id: ChainId) -> HubResult<RegistrationResult> {
        let receipt = self
            .transact(REGISTER_PARACHAIN, &[TransactionArgument::U64(chain_id)])
            .await?;

        let registered = receipt.events.iter().any(|event| {
            matches!(event, HubEvent::ParachainRegistered { chain_id: id } if *id == chain_id)
        });
        Ok(if registered {
            RegistrationResult::Registered
        } else {
            RegistrationResult::AlreadyRegistered
        })
    }

    async fn collect_header(&self, submission: &HeaderSubmission) -> HubResult<()> {
        self.transact(
            COLLECT_HEADER,
            &[
                TransactionArgument::U64(submission.chain_id),
                TransactionArgument::U64(submission.height),
                TransactionArgument::Bytes(submission.state_root.to_vec()),
                TransactionArgument::Bytes(submission.header_commitment_root.to_vec()),
                TransactionArgument::U64Vector(submission.relay_heights.clone()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_parachain(&self, chain_id: ChainId) -> HubResult<ParachainRecord> {
        let values = self
            .view(GET_PARACHAIN, &[TransactionArgument::U64(chain_id)])
            .await
            .map_err(|e| not_found_or(e, HubError::ParachainNotFound(chain_id)))?;

        match values.as_slice() {
            [ViewValue::Bool(registered)] => Ok(ParachainRecord {
                chain_id,
                registered: *registered,
            }),
            _ => Err(unexpected(GET_PARACHAIN, &values)),
        }
    }

    async fn get_parachain_count(&self) -> HubResult<u64> {
        let values = self.view(GET_PARACHAIN_COUNT, &[]).await?;
        match values.as_slice() {
            [ViewValue::U64(count)] => Ok(*count),
            _ => Err(unexpected(GET_PARACHAIN_COUNT, &values)),
        }
    }

    async fn get_header(&self, chain_id: ChainId, height: u64) -> HubResult<HeaderEntry> {
        let values = self
            .view(
                GET_HEADER,
                &[
                    TransactionArgument::U64(chain_id),
                    TransactionArgument::U64(height),
                ],
            )
            .await
            .map_err(|e| not_found_or(e, HubError::HeaderNotFound { chain_id, height }))?;

        match values.as_slice() {
            [
                ViewValue::U64(included_at),
                ViewValue::Bytes(state_root),
                ViewValue::Bytes(hcr),
                ViewValue::U64Vector(relay_heights),
            ] => Ok(HeaderEntry {
                chain_id,
                height,
                included_at: *included_at,
                state_root: root(GET_HEADER, &values, state_root)?,
                header_commitment_root: root(GET_HEADER, &values, hcr)?,
                relay_heights: relay_heights.clone(),
            }),
            _ => Err(unexpected(GET_HEADER, &values)),
        }
    }

    async fn get_relay_header_votes(&self, relay_height: u64) -> HubResult<VoteCount> {
        let values = self
            .view(GET_RELAY_HEADER_VOTES, &[TransactionArgument::U64(relay_height)])
            .await?;
        match values.as_slice() {
            [ViewValue::U64(votes), ViewValue::U64(max_votes)] => Ok(VoteCount {
                votes: *votes,
                max_votes: *max_votes,
            }),
            _ => Err(unexpected(GET_RELAY_HEADER_VOTES, &values)),
        }
    }
}
