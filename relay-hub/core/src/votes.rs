// Copyright (c) 2024 The Botho Foundation

//! Vote tallies per relay height.
//!
//! Every header submission that references a relay height counts as one vote
//! from the submitting chain for that height. A chain votes at most once per
//! relay height, so retried submissions are harmless.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::chains::ChainId;

/// How the vote denominator is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxVotesPolicy {
    /// Registry size at the first vote for the relay height.
    #[default]
    Snapshot,
    /// Registry size at read time.
    Live,
}

/// Fraction of `max_votes` that `votes` must strictly exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityThreshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl FinalityThreshold {
    /// More than half.
    pub const SIMPLE_MAJORITY: Self = Self {
        numerator: 1,
        denominator: 2,
    };

    /// More than two thirds.
    pub const SUPERMAJORITY: Self = Self {
        numerator: 2,
        denominator: 3,
    };
}

impl Default for FinalityThreshold {
    fn default() -> Self {
        Self::SIMPLE_MAJORITY
    }
}

/// A `(votes, max_votes)` pair as returned by the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub votes: u64,
    pub max_votes: u64,
}

impl VoteCount {
    /// Whether `votes` strictly exceeds the threshold fraction of `max_votes`.
    pub fn is_final(&self, threshold: FinalityThreshold) -> bool {
        if self.max_votes == 0 || threshold.denominator == 0 {
            return false;
        }
        (self.votes as u128) * (threshold.denominator as u128)
            > (self.max_votes as u128) * (threshold.numerator as u128)
    }
}

impl std::fmt::Display for VoteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.votes, self.max_votes)
    }
}

/// Tally for a single relay height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub relay_height: u64,
    pub votes: u64,
    /// Registry size when the first vote arrived.
    pub max_votes: u64,
    voters: BTreeSet<ChainId>,
}

impl VoteRecord {
    pub fn has_voted(&self, chain_id: ChainId) -> bool {
        self.voters.contains(&chain_id)
    }

    pub fn voters(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.voters.iter().copied()
    }
}

/// Result of recording a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub relay_height: u64,
    pub chain_id: ChainId,
    /// False when the chain had already voted at this height.
    pub counted: bool,
    pub tally: VoteCount,
}

/// Vote counters keyed by relay height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(default)]
    policy: MaxVotesPolicy,
    records: BTreeMap<u64, VoteRecord>,
}

impl VoteTally {
    pub fn new(policy: MaxVotesPolicy) -> Self {
        Self {
            policy,
            records: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> MaxVotesPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: MaxVotesPolicy) {
        self.policy = policy;
    }

    /// Record a vote from `chain_id` for `relay_height`.
    ///
    /// A second vote from the same chain at the same height is a silent
    /// no-op. `registry_count` is the current number of registered chains.
    pub fn record_vote(
        &mut self,
        relay_height: u64,
        chain_id: ChainId,
        registry_count: u64,
    ) -> VoteChange {
        let record = self.records.entry(relay_height).or_insert_with(|| VoteRecord {
            relay_height,
            votes: 0,
            max_votes: registry_count,
            voters: BTreeSet::new(),
        });

        let counted = record.voters.insert(chain_id);
        if counted {
            record.votes += 1;
        }

        let tally = VoteCount {
            votes: record.votes,
            max_votes: record.max_votes,
        };
        VoteChange {
            relay_height,
            chain_id,
            counted,
            tally: self.apply_policy(tally, registry_count),
        }
    }

    /// Current count for a relay height. Heights with no votes report
    /// `(0, registry_count)`.
    pub fn get_votes(&self, relay_height: u64, registry_count: u64) -> VoteCount {
        let tally = match self.records.get(&relay_height) {
            Some(record) => VoteCount {
                votes: record.votes,
                max_votes: record.max_votes,
            },
            None => VoteCount {
                votes: 0,
                max_votes: registry_count,
            },
        };
        self.apply_policy(tally, registry_count)
    }

    pub fn record(&self, relay_height: u64) -> Option<&VoteRecord> {
        self.records.get(&relay_height)
    }

    fn apply_policy(&self, tally: VoteCount, registry_count: u64) -> VoteCount {
        match self.policy {
            MaxVotesPolicy::Snapshot => tally,
            MaxVotesPolicy::Live => VoteCount {
                max_votes: registry_count,
                ..tally
            },
        }
    }
}
