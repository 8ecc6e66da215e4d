// Copyright (c) 2024 The Botho Foundation

//! The hub's callable surface.
//!
//! [`HubApi`] mirrors the entry points and views of the hub module. The
//! service crate implements it over a ledger; [`InMemoryHub`] implements it
//! directly for tests and local runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    chains::{ChainId, ParachainRecord, RegistrationResult},
    config::HubSettings,
    error::{HubError, HubResult},
    header::{HeaderEntry, HeaderSubmission},
    hub::RelayHub,
    votes::VoteCount,
};

/// Entry points and views of the relay hub.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// Register a parachain. Duplicates are reported, not rejected.
    async fn register_parachain(&self, chain_id: ChainId) -> HubResult<RegistrationResult>;

    /// Submit a header. Completes once the submission has been applied.
    async fn collect_header(&self, submission: &HeaderSubmission) -> HubResult<()>;

    async fn get_parachain(&self, chain_id: ChainId) -> HubResult<ParachainRecord>;

    async fn get_parachain_count(&self) -> HubResult<u64>;

    async fn get_header(&self, chain_id: ChainId, height: u64) -> HubResult<HeaderEntry>;

    async fn get_relay_header_votes(&self, relay_height: u64) -> HubResult<VoteCount>;
}

struct Inner {
    hub: RelayHub,
    block_height: u64,
}

/// A hub held in process memory. Each state-changing call is one block.
pub struct InMemoryHub {
    inner: Mutex<Inner>,
}

impl InMemoryHub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                hub: RelayHub::new(settings),
                block_height: 0,
            }),
        }
    }

    /// Current hub block height.
    pub fn block_height(&self) -> HubResult<u64> {
        Ok(self.lock()?.block_height)
    }

    fn lock(&self) -> HubResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| HubError::Ledger(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl HubApi for InMemoryHub {
    async fn register_parachain(&self, chain_id: ChainId) -> HubResult<RegistrationResult> {
        let mut inner = self.lock()?;
        inner.block_height += 1;
        Ok(inner.hub.register_parachain(chain_id))
    }

    async fn collect_header(&self, submission: &HeaderSubmission) -> HubResult<()> {
        let mut inner = self.lock()?;
        let block_height = inner.block_height + 1;
        inner.hub.collect_header(submission, block_height)?;
        inner.block_height = block_height;
        Ok(())
    }

    async fn get_parachain(&self, chain_id: ChainId) -> HubResult<ParachainRecord> {
        self.lock()?.hub.get_parachain(chain_id)
    }

    async fn get_parachain_count(&self) -> HubResult<u64> {
        Ok(self.lock()?.hub.get_parachain_count())
    }

    async fn get_header(&self, chain_id: ChainId, height: u64) -> HubResult<HeaderEntry> {
        self.lock()?.hub.get_header(chain_id, height)
    }

    async fn get_relay_header_votes(&self, relay_height: u64) -> HubResult<VoteCount> {
        Ok(self.lock()?.hub.get_relay_header_votes(relay_height))
    }
}
