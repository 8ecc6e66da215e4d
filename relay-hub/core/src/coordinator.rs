// Copyright (c) 2024 The Botho Foundation

//! Relay coordinator - sequences header submissions across parachains.
//!
//! The coordinator holds no height counters. Every call is told which
//! parachain height and relay height to use, and returns what the next call
//! needs.

use tracing::{info, warn};

use crate::{
    api::HubApi,
    chains::{ChainId, RegistrationResult},
    error::{HubError, HubResult},
    header::{HeaderEntry, HeaderRoot, HeaderSubmission},
    votes::{FinalityThreshold, VoteCount},
};

/// A header collected from one chain, with the tally read right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedHeader {
    pub entry: HeaderEntry,
    pub votes: VoteCount,
}

/// Drives the hub through a [`HubApi`].
pub struct RelayCoordinator<A> {
    api: A,
    threshold: FinalityThreshold,
}

impl<A: HubApi> RelayCoordinator<A> {
    pub fn new(api: A, threshold: FinalityThreshold) -> Self {
        Self { api, threshold }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Register every chain in order, returning each outcome.
    pub async fn register_all(&self, chain_ids: &[ChainId]) -> HubResult<Vec<RegistrationResult>> {
        let mut results = Vec::with_capacity(chain_ids.len());
        for &chain_id in chain_ids {
            let result = self.api.register_parachain(chain_id).await?;
            // Confirm the record is readable before moving on
            self.api.get_parachain(chain_id).await?;
            let count = self.api.get_parachain_count().await?;
            match result {
                RegistrationResult::Registered => {
                    info!("Registered parachain {}; {} parachains known", chain_id, count)
                }
                RegistrationResult::AlreadyRegistered => {
                    warn!(
                        "Parachain {} was already registered; {} parachains known",
                        chain_id, count
                    )
                }
            }
            results.push(result);
        }
        Ok(results)
    }

    /// Submit a header from a source chain and return the stored entry.
    pub async fn submit_from_source(
        &self,
        chain_id: ChainId,
        height: u64,
        state_root: HeaderRoot,
        header_commitment_root: HeaderRoot,
        relay_heights: Vec<u64>,
    ) -> HubResult<HeaderEntry> {
        self.api.get_parachain(chain_id).await.map_err(|e| match e {
            HubError::ParachainNotFound(id) => HubError::UnknownChain(id),
            other => other,
        })?;

        let submission = HeaderSubmission {
            chain_id,
            height,
            state_root,
            header_commitment_root,
            relay_heights,
        };
        self.api.collect_header(&submission).await?;

        let entry = self.api.get_header(chain_id, height).await?;
        info!(
            "Stored parachain {} header {} on the hub at block {}",
            chain_id, height, entry.included_at
        );
        Ok(entry)
    }

    /// Have each chain, in order, submit a header at `height` referencing
    /// `relay_height`. Each submission and its tally read complete before the
    /// next chain submits.
    pub async fn collect_from_all(
        &self,
        relay_height: u64,
        chain_ids: &[ChainId],
        height: u64,
        state_root: HeaderRoot,
        header_commitment_root: HeaderRoot,
    ) -> HubResult<Vec<CollectedHeader>> {
        let initial = self.votes(relay_height).await?;
        info!("Votes at relay height {} before collection: {}", relay_height, initial);

        let mut collected = Vec::with_capacity(chain_ids.len());
        for &chain_id in chain_ids {
            let entry = self
                .submit_from_source(
                    chain_id,
                    height,
                    state_root,
                    header_commitment_root,
                    vec![relay_height],
                )
                .await?;
            let votes = self.votes(relay_height).await?;
            collected.push(CollectedHeader { entry, votes });
        }
        Ok(collected)
    }

    /// Read the tally for a relay height and log its finality.
    pub async fn votes(&self, relay_height: u64) -> HubResult<VoteCount> {
        let votes = self.api.get_relay_header_votes(relay_height).await?;
        info!(
            "Votes at relay height {}: {} (final: {})",
            relay_height,
            votes,
            votes.is_final(self.threshold)
        );
        Ok(votes)
    }

    /// Whether the relay height has crossed the finality threshold.
    pub async fn is_final(&self, relay_height: u64) -> HubResult<bool> {
        let votes = self.api.get_relay_header_votes(relay_height).await?;
        Ok(votes.is_final(self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::InMemoryHub, config::HubSettings, header::ROOT_LEN};

    const CHAINS: [ChainId; 6] = [1001, 1002, 1003, 1004, 1005, 1006];

    fn coordinator() -> RelayCoordinator<InMemoryHub> {
        RelayCoordinator::new(
            InMemoryHub::new(HubSettings::default()),
            FinalityThreshold::SIMPLE_MAJORITY,
        )
    }

    fn root() -> HeaderRoot {
        HeaderRoot::new([1; ROOT_LEN])
    }

    #[tokio::test]
    async fn test_register_all_reports_duplicates() {
        let coordinator = coordinator();
        let results = coordinator.register_all(&[1001, 1002, 1001]).await.unwrap();
        assert_eq!(
            results,
            vec![
                RegistrationResult::Registered,
                RegistrationResult::Registered,
                RegistrationResult::AlreadyRegistered
            ]
        );
        assert_eq!(coordinator.api().get_parachain_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_submit_requires_registration() {
        let coordinator = coordinator();
        let err = coordinator
            .submit_from_source(1001, 1, root(), root(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err, HubError::UnknownChain(1001));
    }

    #[tokio::test]
    async fn test_collect_from_all_scenario() {
        let coordinator = coordinator();
        coordinator.register_all(&CHAINS).await.unwrap();
        assert_eq!(coordinator.api().get_parachain_count().await.unwrap(), 6);

        let height = 1_000;
        let source = coordinator
            .submit_from_source(1001, height, root(), root(), vec![])
            .await
            .unwrap();
        assert_eq!(source.state_root, root());
        assert!(source.relay_heights.is_empty());

        let relay_height = source.included_at;
        let collected = coordinator
            .collect_from_all(relay_height, &CHAINS, height + 1, root(), root())
            .await
            .unwrap();

        assert_eq!(collected.len(), 6);
        for (k, step) in collected.iter().enumerate() {
            assert_eq!(step.entry.chain_id, CHAINS[k]);
            assert_eq!(step.entry.relay_heights, vec![relay_height]);
            assert_eq!(
                step.votes,
                VoteCount {
                    votes: k as u64 + 1,
                    max_votes: 6
                }
            );
        }
        assert!(coordinator.is_final(relay_height).await.unwrap());

        // A retried vote from 1001 does not move the tally
        coordinator
            .submit_from_source(1001, height + 1, root(), root(), vec![relay_height])
            .await
            .unwrap();
        assert_eq!(coordinator.votes(relay_height).await.unwrap().votes, 6);
    }
}
