use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::Address;
use arena_contracts::{LotteryDeployment, SEPOLIA_CHAIN_ID};
use arena_core::{canonicalize, NumberSpace};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No lottery contract configured and no known deployment for chain {0}")]
    MissingContract(u64),

    #[error("RPC URL must not be empty")]
    MissingRpcUrl,

    #[error("Poll interval must be shorter than the finality timeout")]
    PollIntervalTooLong,
}

/// Number-space bound per round, with a fallback for rounds not listed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NumberSpacePolicy {
    pub default: NumberSpace,
    pub overrides: HashMap<u64, NumberSpace>,
}

impl NumberSpacePolicy {
    pub fn uniform(space: NumberSpace) -> Self {
        Self {
            default: space,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, round_id: u64, space: NumberSpace) -> Self {
        self.overrides.insert(round_id, space);
        self
    }

    pub fn for_round(&self, round_id: u64) -> NumberSpace {
        self.overrides
            .get(&round_id)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Arena engine configuration
#[derive(Clone, Debug)]
pub struct ArenaConfig {
    /// Ledger RPC endpoint
    pub rpc_url: String,

    /// Chain ID
    pub chain_id: u64,

    /// Lottery contract; falls back to the known deployment for `chain_id`
    pub contract: Option<Address>,

    /// How long to wait for inclusion before reporting a finality timeout
    pub finality_timeout: Duration,

    /// Delay between finality polls
    pub poll_interval: Duration,

    /// Accepted ticket numbers
    pub number_spaces: NumberSpacePolicy,

    /// Capacity of the status event channel
    pub event_capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".into(),
            chain_id: SEPOLIA_CHAIN_ID,
            contract: None,
            finality_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            number_spaces: NumberSpacePolicy::default(),
            event_capacity: 64,
        }
    }
}

impl ArenaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("ARENA_RPC_URL") {
            config.rpc_url = val;
        }

        if let Some(val) = lookup("ARENA_CHAIN_ID") {
            match val.parse() {
                Ok(id) => config.chain_id = id,
                Err(_) => tracing::warn!("Ignoring invalid ARENA_CHAIN_ID: {}", val),
            }
        }

        if let Some(val) = lookup("ARENA_CONTRACT_ADDRESS") {
            match canonicalize(&val) {
                Ok(addr) => config.contract = Some(addr),
                Err(e) => tracing::warn!("Ignoring ARENA_CONTRACT_ADDRESS: {}", e),
            }
        }

        if let Some(val) = lookup("ARENA_FINALITY_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => config.finality_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring invalid ARENA_FINALITY_TIMEOUT_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("ARENA_POLL_INTERVAL_MS") {
            match val.parse() {
                Ok(ms) => config.poll_interval = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid ARENA_POLL_INTERVAL_MS: {}", val),
            }
        }

        let min = lookup("ARENA_NUMBER_MIN").and_then(|v| v.parse().ok());
        let max = lookup("ARENA_NUMBER_MAX").and_then(|v| v.parse().ok());
        if min.is_some() || max.is_some() {
            let default = NumberSpace::default();
            match NumberSpace::new(min.unwrap_or(default.min), max.unwrap_or(default.max)) {
                Ok(space) => config.number_spaces = NumberSpacePolicy::uniform(space),
                Err(e) => tracing::warn!("Ignoring number space override: {}", e),
            }
        }

        config
    }

    /// Configured contract, or the known deployment for the chain
    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        self.contract
            .or_else(|| LotteryDeployment::for_chain(self.chain_id).map(|d| d.lottery))
            .ok_or(ConfigError::MissingContract(self.chain_id))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingRpcUrl);
        }
        if self.poll_interval >= self.finality_timeout {
            return Err(ConfigError::PollIntervalTooLong);
        }
        self.contract_address().map(|_| ())
    }
}
