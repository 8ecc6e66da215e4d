// Copyright (c) 2024 The Botho Foundation

//! The relay hub module: registry, header store and vote tally behind the
//! entry points and views exposed to the ledger.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    chains::{ChainId, ParachainRecord, ParachainRegistry, RegistrationResult},
    config::HubSettings,
    error::{HubError, HubResult},
    header::{HeaderEntry, HeaderStore, HeaderSubmission},
    votes::{VoteChange, VoteCount, VoteTally},
};

/// Entry point: register a parachain.
pub const REGISTER_PARACHAIN: &str = "registerParachain";
/// Entry point: collect a parachain header.
pub const COLLECT_HEADER: &str = "collectHeader";
/// View: parachain record.
pub const GET_PARACHAIN: &str = "getParachain";
/// View: number of registered parachains.
pub const GET_PARACHAIN_COUNT: &str = "getParachainCount";
/// View: stored header.
pub const GET_HEADER: &str = "getHeader";
/// View: vote count at a relay height.
pub const GET_RELAY_HEADER_VOTES: &str = "getRelayHeaderVotes";

/// A state-changing call into the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubCall {
    RegisterParachain { chain_id: ChainId },
    CollectHeader(HeaderSubmission),
}

impl HubCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            HubCall::RegisterParachain { .. } => REGISTER_PARACHAIN,
            HubCall::CollectHeader(_) => COLLECT_HEADER,
        }
    }
}

/// Events emitted by a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    ParachainRegistered {
        chain_id: ChainId,
    },
    HeaderStored {
        chain_id: ChainId,
        height: u64,
        included_at: u64,
    },
    RelayReferenceAdded {
        chain_id: ChainId,
        height: u64,
        relay_height: u64,
    },
    VoteRecorded {
        relay_height: u64,
        chain_id: ChainId,
        votes: u64,
        max_votes: u64,
    },
}

/// Outcome of a header collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOutcome {
    pub entry: HeaderEntry,
    pub created: bool,
    pub added_references: Vec<u64>,
    pub votes: Vec<VoteChange>,
}

impl CollectOutcome {
    pub fn events(&self) -> Vec<HubEvent> {
        let mut events = Vec::new();
        if self.created {
            events.push(HubEvent::HeaderStored {
                chain_id: self.entry.chain_id,
                height: self.entry.height,
                included_at: self.entry.included_at,
            });
        }
        events.extend(
            self.added_references
                .iter()
                .map(|&relay_height| HubEvent::RelayReferenceAdded {
                    chain_id: self.entry.chain_id,
                    height: self.entry.height,
                    relay_height,
                }),
        );
        events.extend(self.votes.iter().filter(|v| v.counted).map(|v| {
            HubEvent::VoteRecorded {
                relay_height: v.relay_height,
                chain_id: v.chain_id,
                votes: v.tally.votes,
                max_votes: v.tally.max_votes,
            }
        }));
        events
    }
}

/// Persistent state of the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubState {
    pub registry: ParachainRegistry,
    pub headers: HeaderStore,
    pub tally: VoteTally,
}

/// The relay hub.
///
/// All mutation goes through `&mut self`, so a caller that serialises access
/// (a lock, or a ledger executing one transaction at a time) gets atomic
/// transitions. Every check runs before the first write.
#[derive(Debug, Clone)]
pub struct RelayHub {
    settings: HubSettings,
    state: HubState,
}

impl RelayHub {
    pub fn new(settings: HubSettings) -> Self {
        Self::from_state(settings, HubState::default())
    }

    /// Resume from persisted state. The configured vote policy wins over the
    /// one stored in the state.
    pub fn from_state(settings: HubSettings, mut state: HubState) -> Self {
        state.tally.set_policy(settings.max_votes_policy);
        Self { settings, state }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn state(&self) -> &HubState {
        &self.state
    }

    pub fn into_state(self) -> HubState {
        self.state
    }

    /// Execute a call included at hub block `block_height`.
    pub fn execute(&mut self, call: &HubCall, block_height: u64) -> HubResult<Vec<HubEvent>> {
        match call {
            HubCall::RegisterParachain { chain_id } => {
                Ok(match self.register_parachain(*chain_id) {
                    RegistrationResult::Registered => vec![HubEvent::ParachainRegistered {
                        chain_id: *chain_id,
                    }],
                    RegistrationResult::AlreadyRegistered => Vec::new(),
                })
            }
            HubCall::CollectHeader(submission) => {
                Ok(self.collect_header(submission, block_height)?.events())
            }
        }
    }

    pub fn register_parachain(&mut self, chain_id: ChainId) -> RegistrationResult {
        let result = self.state.registry.register(chain_id);
        if result.is_new() {
            info!(
                chain_id,
                count = self.state.registry.count(),
                "registered parachain"
            );
        }
        result
    }

    /// Store a header and count one vote from its chain for every relay
    /// height it references.
    pub fn collect_header(
        &mut self,
        submission: &HeaderSubmission,
        block_height: u64,
    ) -> HubResult<CollectOutcome> {
        if !self.state.registry.contains(submission.chain_id) {
            return Err(HubError::UnknownChain(submission.chain_id));
        }
        self.state
            .headers
            .check(submission, self.settings.require_increasing_heights)?;

        let stored = self.state.headers.upsert(
            submission,
            block_height,
            self.settings.dedup_relay_heights,
        );

        let registry_count = self.state.registry.count();
        let votes: Vec<VoteChange> = submission
            .relay_heights
            .iter()
            .map(|&relay_height| {
                self.state
                    .tally
                    .record_vote(relay_height, submission.chain_id, registry_count)
            })
            .collect();

        debug!(
            chain_id = submission.chain_id,
            height = submission.height,
            created = stored.created,
            counted = votes.iter().filter(|v| v.counted).count(),
            "collected header"
        );

        Ok(CollectOutcome {
            entry: stored.entry,
            created: stored.created,
            added_references: stored.added_references,
            votes,
        })
    }

    pub fn get_parachain(&self, chain_id: ChainId) -> HubResult<ParachainRecord> {
        self.state.registry.get(chain_id)
    }

    pub fn get_parachain_count(&self) -> u64 {
        self.state.registry.count()
    }

    pub fn get_header(&self, chain_id: ChainId, height: u64) -> HubResult<HeaderEntry> {
        self.state.headers.get(chain_id, height).cloned()
    }

    pub fn get_relay_header_votes(&self, relay_height: u64) -> VoteCount {
        self.state
            .tally
            .get_votes(relay_height, self.state.registry.count())
    }

    /// Whether the relay height has crossed the configured threshold.
    pub fn is_final(&self, relay_height: u64) -> bool {
        self.get_relay_header_votes(relay_height)
            .is_final(self.settings.finality_threshold)
    }
}
