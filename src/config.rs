//! Engine configuration: cache lifetimes, fixed service prices and the relay
//! fee pair used when no cross-chain contract is reachable.
//!
//! Defaults match the production dashboard. A JSON file can replace them and
//! `OSF_*` environment variables override individual fields.

use crate::error::{FeeError, Result};
use crate::units::{num_string, Wei};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_PARAMS_TTL_MS: u64 = 30 * 1000;
const DEFAULT_GAS_TABLE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_GAS_PRICE_TTL_MS: u64 = 30 * 1000;
const DEFAULT_RELAY_TTL_MS: u64 = 10 * 60 * 1000;
const DEFAULT_STREAM_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_BALANCE_TTL_MS: u64 = 10 * 60 * 1000;

/// Lifetimes of cached remote reads, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Storage prices, tax rate, redundancy and minimum charge size.
    pub params_ms: u64,
    /// Fixed gas per storage message type.
    pub gas_table_ms: u64,
    /// EVM gas price.
    pub gas_price_ms: u64,
    /// Cross-chain relay fee pair.
    pub relay_ms: u64,
    /// Payment stream checkpoints.
    pub stream_ms: u64,
    /// Storage account balances.
    pub balance_ms: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            params_ms: DEFAULT_PARAMS_TTL_MS,
            gas_table_ms: DEFAULT_GAS_TABLE_TTL_MS,
            gas_price_ms: DEFAULT_GAS_PRICE_TTL_MS,
            relay_ms: DEFAULT_RELAY_TTL_MS,
            stream_ms: DEFAULT_STREAM_TTL_MS,
            balance_ms: DEFAULT_BALANCE_TTL_MS,
        }
    }
}

impl CacheTtls {
    /// Pricing parameter lifetime.
    pub fn params(&self) -> Duration {
        Duration::from_millis(self.params_ms)
    }

    /// Message gas table lifetime.
    pub fn gas_table(&self) -> Duration {
        Duration::from_millis(self.gas_table_ms)
    }

    /// Gas price lifetime.
    pub fn gas_price(&self) -> Duration {
        Duration::from_millis(self.gas_price_ms)
    }

    /// Relay fee lifetime.
    pub fn relay(&self) -> Duration {
        Duration::from_millis(self.relay_ms)
    }

    /// Stream record lifetime.
    pub fn stream(&self) -> Duration {
        Duration::from_millis(self.stream_ms)
    }

    /// Storage account balance lifetime.
    pub fn balance(&self) -> Duration {
        Duration::from_millis(self.balance_ms)
    }
}

/// Relay fee pair charged per cross-chain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayFees {
    /// Fee for executing the message on the destination chain.
    #[serde(with = "num_string")]
    pub relay_fee: Wei,
    /// Minimum fee for relaying the acknowledgement back.
    #[serde(with = "num_string")]
    pub min_ack_relay_fee: Wei,
}

impl RelayFees {
    /// Cost of one call including its acknowledgement.
    pub fn per_call(&self) -> Wei {
        self.relay_fee.saturating_add(self.min_ack_relay_fee)
    }
}

/// Fixed prices of store services paid from the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePrices {
    /// Oracle verification of an asset-link ownership proof.
    #[serde(with = "num_string")]
    pub oracle_asset_link: Wei,
    /// Validator check of an uploaded build.
    #[serde(with = "num_string")]
    pub validator_build: Wei,
}

impl Default for ServicePrices {
    fn default() -> Self {
        Self {
            oracle_asset_link: 1_000_000_000_000_000,
            validator_build: 10_000_000_000_000_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache lifetimes.
    pub ttl: CacheTtls,
    /// Fixed service prices.
    pub prices: ServicePrices,
    /// Relay fees to use instead of reading the cross-chain contract.
    pub local_relay_fees: Option<RelayFees>,
}

impl EngineConfig {
    /// Loads a JSON configuration file; fields left out keep their defaults.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| FeeError::Config(format!("{}: {err}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|err| FeeError::Config(format!("{}: {err}", path.display())))
    }

    /// Defaults overridden by `OSF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Applies `OSF_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let ttl = &mut self.ttl;
        for (name, slot) in [
            ("OSF_PARAMS_TTL_MS", &mut ttl.params_ms),
            ("OSF_GAS_TABLE_TTL_MS", &mut ttl.gas_table_ms),
            ("OSF_GAS_PRICE_TTL_MS", &mut ttl.gas_price_ms),
            ("OSF_RELAY_TTL_MS", &mut ttl.relay_ms),
            ("OSF_STREAM_TTL_MS", &mut ttl.stream_ms),
            ("OSF_BALANCE_TTL_MS", &mut ttl.balance_ms),
        ] {
            if let Some(value) = lookup(name) {
                *slot = parse_env(name, &value)?;
            }
        }
        if let Some(value) = lookup("OSF_ORACLE_FEE_WEI") {
            self.prices.oracle_asset_link = parse_env("OSF_ORACLE_FEE_WEI", &value)?;
        }
        if let Some(value) = lookup("OSF_VALIDATOR_FEE_WEI") {
            self.prices.validator_build = parse_env("OSF_VALIDATOR_FEE_WEI", &value)?;
        }
        let relay = lookup("OSF_LOCAL_RELAY_FEE_WEI");
        let ack = lookup("OSF_LOCAL_ACK_RELAY_FEE_WEI");
        if relay.is_some() || ack.is_some() {
            let mut fees = self.local_relay_fees.unwrap_or_default();
            if let Some(value) = relay {
                fees.relay_fee = parse_env("OSF_LOCAL_RELAY_FEE_WEI", &value)?;
            }
            if let Some(value) = ack {
                fees.min_ack_relay_fee = parse_env("OSF_LOCAL_ACK_RELAY_FEE_WEI", &value)?;
            }
            self.local_relay_fees = Some(fees);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| FeeError::Config(format!("{name}={value}: {err}")))
}
