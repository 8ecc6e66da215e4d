// Copyright (c) 2024 The Botho Foundation

//! Core types and logic for the parachain relay hub.
//!
//! The hub tracks registered parachains, stores the headers they submit and
//! counts one vote per chain per relay height. This crate provides:
//!
//! - The parachain registry, header store and vote tally
//! - The hub module with its entry points and views
//! - The `HubApi` seam and the relay coordinator built on it
//! - Configuration structures

pub mod api;
pub mod chains;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod header;
pub mod hub;
pub mod votes;

pub use api::{HubApi, InMemoryHub};
pub use chains::{ChainId, ParachainRecord, ParachainRegistry, RegistrationResult};
pub use config::{DemoSettings, HubSettings, LedgerConfig, RelayConfig};
pub use coordinator::{CollectedHeader, RelayCoordinator};
pub use error::{HubError, HubResult};
pub use header::{HeaderEntry, HeaderRoot, HeaderState, HeaderStore, HeaderSubmission, ROOT_LEN};
pub use hub::{CollectOutcome, HubCall, HubEvent, HubState, RelayHub};
pub use votes::{FinalityThreshold, MaxVotesPolicy, VoteChange, VoteCount, VoteRecord, VoteTally};
