// Copyright (c) 2024 The Botho Foundation

//! Relay hub configuration types.

use serde::{Deserialize, Serialize};

use crate::{
    chains::ChainId,
    header::{HeaderRoot, ROOT_LEN},
    votes::{FinalityThreshold, MaxVotesPolicy},
};

/// Main relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Ledger connection and transaction settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Hub protocol policies
    #[serde(default)]
    pub hub: HubSettings,

    /// Demonstration scenario
    #[serde(default)]
    pub demo: DemoSettings,
}

/// Ledger and transaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path to SQLite database holding receipts and hub state
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Ledger chain id, checked on every request
    #[serde(default = "default_chain_id")]
    pub chain_id: u8,

    /// Address of the account that publishes the hub module
    #[serde(default = "default_module_address")]
    pub module_address: String,

    /// Name of the hub module
    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Address of the operator account submitting transactions
    #[serde(default = "default_sender_address")]
    pub sender_address: String,

    /// Maximum gas units per transaction
    #[serde(default = "default_max_gas_amount")]
    pub max_gas_amount: u64,

    /// Price per gas unit
    #[serde(default = "default_gas_unit_price")]
    pub gas_unit_price: u64,

    /// Seconds until a submitted request expires
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,

    /// Seconds to wait for a transaction to complete
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,

    /// Milliseconds between completion polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_db_path() -> String {
    "relay-hub.db".to_string()
}

fn default_chain_id() -> u8 {
    4
}

fn default_module_address() -> String {
    "0x9351b6102cc8a05e5b05fedd1f3f3e44f2f760518aa4d1334914e014d165210a".to_string()
}

fn default_module_name() -> String {
    "RelayHub".to_string()
}

fn default_sender_address() -> String {
    "0xa11ce".to_string()
}

fn default_max_gas_amount() -> u64 {
    2000
}

fn default_gas_unit_price() -> u64 {
    100
}

fn default_expiration_secs() -> u64 {
    600 // 10 minutes
}

fn default_tx_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            chain_id: default_chain_id(),
            module_address: default_module_address(),
            module_name: default_module_name(),
            sender_address: default_sender_address(),
            max_gas_amount: default_max_gas_amount(),
            gas_unit_price: default_gas_unit_price(),
            expiration_secs: default_expiration_secs(),
            tx_timeout_secs: default_tx_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Hub protocol policies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HubSettings {
    /// Whether max votes is snapshotted at the first vote or read live
    #[serde(default)]
    pub max_votes_policy: MaxVotesPolicy,

    /// Threshold used when reporting finality
    #[serde(default)]
    pub finality_threshold: FinalityThreshold,

    /// Skip relay references a header already carries
    #[serde(default = "default_true")]
    pub dedup_relay_heights: bool,

    /// Reject new headers at or below the chain's latest height
    #[serde(default = "default_true")]
    pub require_increasing_heights: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_votes_policy: MaxVotesPolicy::default(),
            finality_threshold: FinalityThreshold::default(),
            dedup_relay_heights: true,
            require_increasing_heights: true,
        }
    }
}

/// Settings for the demonstration scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Chains to register and collect headers from
    #[serde(default = "default_chain_ids")]
    pub chain_ids: Vec<ChainId>,

    /// Chain whose header the others vote on
    #[serde(default = "default_source_chain")]
    pub source_chain_id: ChainId,

    /// First parachain height; the current time in milliseconds when unset
    #[serde(default)]
    pub start_height: Option<u64>,

    /// State root submitted with every header
    #[serde(default = "default_root")]
    pub state_root: HeaderRoot,

    /// Header commitment root submitted with every header
    #[serde(default = "default_root")]
    pub header_commitment_root: HeaderRoot,
}

fn default_chain_ids() -> Vec<ChainId> {
    (1001..=1006).collect()
}

fn default_source_chain() -> ChainId {
    1001
}

fn default_root() -> HeaderRoot {
    let mut bytes = [0u8; ROOT_LEN];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (i % 8) as u8 + 1;
    }
    HeaderRoot::new(bytes)
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            chain_ids: default_chain_ids(),
            source_chain_id: default_source_chain(),
            start_height: None,
            state_root: default_root(),
            header_commitment_root: default_root(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Self =
            toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), String> {
        let threshold = self.hub.finality_threshold;
        if threshold.denominator == 0 || threshold.numerator >= threshold.denominator {
            return Err(format!(
                "finality threshold {}/{} must be a fraction below 1",
                threshold.numerator, threshold.denominator
            ));
        }
        if !self.demo.chain_ids.contains(&self.demo.source_chain_id) {
            return Err(format!(
                "source chain {} is not among the demo chains",
                self.demo.source_chain_id
            ));
        }
        if self.ledger.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}
