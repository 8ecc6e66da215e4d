// Copyright (c) 2024 The Botho Foundation

//! Parachain header entries and the append-only header store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chains::ChainId,
    error::{HubError, HubResult},
};

/// Size in bytes of a state root or header commitment root.
pub const ROOT_LEN: usize = 32;

/// A 32-byte root (state root or header commitment root).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderRoot([u8; ROOT_LEN]);

impl HeaderRoot {
    pub const fn new(bytes: [u8; ROOT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROOT_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Parse a root from a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> HubResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(s).map_err(|e| HubError::Config(format!("invalid root hex: {}", e)))?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for HeaderRoot {
    type Error = HubError;

    fn try_from(bytes: &[u8]) -> HubResult<Self> {
        let arr: [u8; ROOT_LEN] = bytes
            .try_into()
            .map_err(|_| HubError::InvalidRootLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for HeaderRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// Roots are carried as hex strings in config files and state snapshots.
impl Serialize for HeaderRoot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for HeaderRoot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HeaderRoot::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of a `(chain_id, height)` header slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    /// Nothing stored yet.
    Unsubmitted,
    /// Roots are fixed, no relay references yet.
    Submitted,
    /// Roots are fixed and at least one relay height is referenced.
    Referenced,
}

/// A header submission as received from a parachain operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSubmission {
    pub chain_id: ChainId,
    pub height: u64,
    pub state_root: HeaderRoot,
    pub header_commitment_root: HeaderRoot,
    /// Relay-chain heights this header cross-references.
    pub relay_heights: Vec<u64>,
}

impl HeaderSubmission {
    /// Build a submission from raw root bytes, checking their length.
    pub fn from_raw(
        chain_id: ChainId,
        height: u64,
        state_root: &[u8],
        header_commitment_root: &[u8],
        relay_heights: Vec<u64>,
    ) -> HubResult<Self> {
        Ok(Self {
            chain_id,
            height,
            state_root: HeaderRoot::try_from(state_root)?,
            header_commitment_root: HeaderRoot::try_from(header_commitment_root)?,
            relay_heights,
        })
    }
}

/// A stored parachain header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub chain_id: ChainId,
    pub height: u64,
    /// Hub block height of the transaction that first stored this header.
    pub included_at: u64,
    pub state_root: HeaderRoot,
    pub header_commitment_root: HeaderRoot,
    /// Relay heights this header has been cross-referenced at, in arrival order.
    pub relay_heights: Vec<u64>,
}

impl HeaderEntry {
    pub fn state(&self) -> HeaderState {
        if self.relay_heights.is_empty() {
            HeaderState::Submitted
        } else {
            HeaderState::Referenced
        }
    }
}

/// Result of writing a submission into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHeader {
    pub entry: HeaderEntry,
    /// True when this submission created the entry.
    pub created: bool,
    /// Relay heights appended by this submission.
    pub added_references: Vec<u64>,
}

/// Append-only store of headers keyed by `(chain_id, height)`.
///
/// Roots are written once. Later submissions for the same key only grow the
/// entry's relay references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderStore {
    headers: BTreeMap<ChainId, BTreeMap<u64, HeaderEntry>>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest stored height for a chain.
    pub fn latest_height(&self, chain_id: ChainId) -> Option<u64> {
        self.headers
            .get(&chain_id)
            .and_then(|by_height| by_height.keys().next_back().copied())
    }

    pub fn contains(&self, chain_id: ChainId, height: u64) -> bool {
        self.headers
            .get(&chain_id)
            .is_some_and(|by_height| by_height.contains_key(&height))
    }

    /// Check that a submission may be written, without touching the store.
    ///
    /// With `require_increasing`, a submission that would create a new entry
    /// must be above the chain's latest stored height. Re-submissions at an
    /// existing height are always accepted.
    pub fn check(&self, submission: &HeaderSubmission, require_increasing: bool) -> HubResult<()> {
        if !require_increasing || self.contains(submission.chain_id, submission.height) {
            return Ok(());
        }

        match self.latest_height(submission.chain_id) {
            Some(latest) if submission.height <= latest => Err(HubError::StaleHeight {
                chain_id: submission.chain_id,
                height: submission.height,
                latest,
            }),
            _ => Ok(()),
        }
    }

    /// Write a submission. Callers must have run [`HeaderStore::check`].
    pub fn upsert(
        &mut self,
        submission: &HeaderSubmission,
        included_at: u64,
        dedup_references: bool,
    ) -> StoredHeader {
        let by_height = self.headers.entry(submission.chain_id).or_default();
        let mut created = false;
        let entry = by_height.entry(submission.height).or_insert_with(|| {
            created = true;
            HeaderEntry {
                chain_id: submission.chain_id,
                height: submission.height,
                included_at,
                state_root: submission.state_root,
                header_commitment_root: submission.header_commitment_root,
                relay_heights: Vec::new(),
            }
        });

        let mut added_references = Vec::new();
        for &relay_height in &submission.relay_heights {
            if dedup_references && entry.relay_heights.contains(&relay_height) {
                continue;
            }
            entry.relay_heights.push(relay_height);
            added_references.push(relay_height);
        }

        StoredHeader {
            entry: entry.clone(),
            created,
            added_references,
        }
    }

    pub fn get(&self, chain_id: ChainId, height: u64) -> HubResult<&HeaderEntry> {
        self.headers
            .get(&chain_id)
            .and_then(|by_height| by_height.get(&height))
            .ok_or(HubError::HeaderNotFound { chain_id, height })
    }

    pub fn state(&self, chain_id: ChainId, height: u64) -> HeaderState {
        self.get(chain_id, height)
            .map(HeaderEntry::state)
            .unwrap_or(HeaderState::Unsubmitted)
    }

    /// Total number of stored headers across all chains.
    pub fn len(&self) -> usize {
        self.headers.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(byte: u8) -> HeaderRoot {
        HeaderRoot::new([byte; ROOT_LEN])
    }

    fn submission(
        chain_id: ChainId,
        height: u64,
        byte: u8,
        relay_heights: Vec<u64>,
    ) -> HeaderSubmission {
        HeaderSubmission {
            chain_id,
            height,
            state_root: root(byte),
            header_commitment_root: root(byte.wrapping_add(1)),
            relay_heights,
        }
    }

    #[test]
    fn test_root_length_is_checked() {
        assert_eq!(
            HeaderRoot::try_from(&[0u8; 31][..]),
            Err(HubError::InvalidRootLength(31))
        );
        assert!(HeaderRoot::try_from(&[0u8; 32][..]).is_ok());
    }

    #[test]
    fn test_root_hex_roundtrip_accepts_prefix() {
        let r = root(0xab);
        let parsed = HeaderRoot::from_hex(&r.to_string()).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn test_first_submission_fixes_roots() {
        let mut store = HeaderStore::new();
        let stored = store.upsert(&submission(1001, 10, 1, vec![]), 5, true);
        assert!(stored.created);
        assert_eq!(stored.entry.included_at, 5);
        assert_eq!(stored.entry.state(), HeaderState::Submitted);

        // Different roots on a later submission are ignored
        let stored = store.upsert(&submission(1001, 10, 9, vec![7]), 6, true);
        assert!(!stored.created);
        assert_eq!(stored.added_references, vec![7]);

        let entry = store.get(1001, 10).unwrap();
        assert_eq!(entry.state_root, root(1));
        assert_eq!(entry.header_commitment_root, root(2));
        assert_eq!(entry.included_at, 5);
        assert_eq!(entry.relay_heights, vec![7]);
        assert_eq!(entry.state(), HeaderState::Referenced);
    }

    #[test]
    fn test_reference_dedup_is_optional() {
        let mut store = HeaderStore::new();
        store.upsert(&submission(1001, 10, 1, vec![7, 7]), 1, true);
        store.upsert(&submission(1001, 10, 1, vec![7, 8]), 2, true);
        assert_eq!(store.get(1001, 10).unwrap().relay_heights, vec![7, 8]);

        let mut store = HeaderStore::new();
        store.upsert(&submission(1001, 10, 1, vec![7, 7]), 1, false);
        assert_eq!(store.get(1001, 10).unwrap().relay_heights, vec![7, 7]);
    }

    #[test]
    fn test_stale_height_rejected_only_for_new_entries() {
        let mut store = HeaderStore::new();
        store.upsert(&submission(1001, 10, 1, vec![]), 1, true);
        store.upsert(&submission(1001, 12, 1, vec![]), 2, true);

        assert_eq!(
            store.check(&submission(1001, 11, 1, vec![]), true),
            Err(HubError::StaleHeight {
                chain_id: 1001,
                height: 11,
                latest: 12
            })
        );
        assert!(store.check(&submission(1001, 10, 1, vec![3]), true).is_ok());
        assert!(store.check(&submission(1001, 11, 1, vec![]), false).is_ok());
        assert!(store.check(&submission(1002, 1, 1, vec![]), true).is_ok());
    }

    #[test]
    fn test_missing_header_is_not_found() {
        let store = HeaderStore::new();
        assert_eq!(
            store.get(1001, 1),
            Err(HubError::HeaderNotFound {
                chain_id: 1001,
                height: 1
            })
        );
        assert_eq!(store.state(1001, 1), HeaderState::Unsubmitted);
        assert!(store.is_empty());
    }
}
