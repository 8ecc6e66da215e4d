// Copyright (c) 2024 The Botho Foundation

//! Demonstration scenario: register parachains, store a header from the
//! source chain, then have every chain vote on the hub block that included it.

use anyhow::Context;
use chrono::Utc;
use relay_hub_core::{CollectedHeader, DemoSettings, HeaderEntry, HubApi, RelayCoordinator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// What the scenario produced.
#[derive(Debug, Clone)]
pub struct DemoReport {
    /// Header stored by the source chain
    pub source: HeaderEntry,
    /// Hub block height the other chains voted on
    pub relay_height: u64,
    /// One step per voting chain, in order
    pub collected: Vec<CollectedHeader>,
    pub finalized: bool,
}

/// Run the scenario against any hub.
pub async fn run<A: HubApi>(
    coordinator: &RelayCoordinator<A>,
    demo: &DemoSettings,
    pause: bool,
) -> anyhow::Result<DemoReport> {
    info!("Registering {} parachains on the hub", demo.chain_ids.len());
    coordinator
        .register_all(&demo.chain_ids)
        .await
        .context("registering parachains")?;

    let height = demo.start_height.unwrap_or_else(current_millis);
    let next_height = height
        .checked_add(1)
        .with_context(|| format!("start height {} leaves no room for a next header", height))?;
    let source = coordinator
        .submit_from_source(
            demo.source_chain_id,
            height,
            demo.state_root,
            demo.header_commitment_root,
            Vec::new(),
        )
        .await
        .with_context(|| format!("submitting header {} from {}", height, demo.source_chain_id))?;
    let relay_height = source.included_at;

    if pause {
        wait_for_enter().await?;
    }

    info!(
        "Collecting headers from {} parachains referencing hub block {}",
        demo.chain_ids.len(),
        relay_height
    );
    let collected = coordinator
        .collect_from_all(
            relay_height,
            &demo.chain_ids,
            next_height,
            demo.state_root,
            demo.header_commitment_root,
        )
        .await
        .context("collecting headers")?;

    for step in &collected {
        info!(
            ">>> votes on parachain {} header {} after chain {}: {}",
            demo.source_chain_id, source.height, step.entry.chain_id, step.votes
        );
    }

    let finalized = coordinator.is_final(relay_height).await?;
    info!(
        "Parachain {} header {} finalized: {}",
        demo.source_chain_id, source.height, finalized
    );

    Ok(DemoReport {
        source,
        relay_height,
        collected,
        finalized,
    })
}

fn current_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

async fn wait_for_enter() -> anyhow::Result<()> {
    info!("Press Enter to continue...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading from stdin")?;
    Ok(())
}
