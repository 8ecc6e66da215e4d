// Copyright (c) 2024 The Botho Foundation

//! Parachain identifiers and the parachain registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HubError, HubResult};

/// Identifier of a parachain, as assigned by its operator.
pub type ChainId = u64;

/// Registration record for a parachain. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParachainRecord {
    pub chain_id: ChainId,
    pub registered: bool,
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationResult {
    /// The chain was not known and is now registered.
    Registered,
    /// The chain was already registered; nothing changed.
    AlreadyRegistered,
}

impl RegistrationResult {
    pub fn is_new(&self) -> bool {
        matches!(self, RegistrationResult::Registered)
    }
}

impl std::fmt::Display for RegistrationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationResult::Registered => write!(f, "registered"),
            RegistrationResult::AlreadyRegistered => write!(f, "already_registered"),
        }
    }
}

/// Mapping of chain ids to their registration records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParachainRegistry {
    chains: BTreeMap<ChainId, ParachainRecord>,
}

impl ParachainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain. Replaying a registration never overwrites the
    /// existing record or changes the count.
    pub fn register(&mut self, chain_id: ChainId) -> RegistrationResult {
        if self.chains.contains_key(&chain_id) {
            debug!(chain_id, "parachain already registered");
            return RegistrationResult::AlreadyRegistered;
        }

        self.chains.insert(
            chain_id,
            ParachainRecord {
                chain_id,
                registered: true,
            },
        );
        RegistrationResult::Registered
    }

    /// Look up the record for a chain.
    pub fn get(&self, chain_id: ChainId) -> HubResult<ParachainRecord> {
        self.chains
            .get(&chain_id)
            .copied()
            .ok_or(HubError::ParachainNotFound(chain_id))
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Number of distinct registered chains.
    pub fn count(&self) -> u64 {
        self.chains.len() as u64
    }

    /// Registered chain ids in ascending order.
    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }
}
