//! Globally quoted, slowly changing pricing inputs.
//!
//! [`PricingSource`] reads storage prices, module parameters, the message gas
//! table, the EVM gas price and the relay fee pair through the injected
//! readers and memoizes each of them in the shared [`TtlCache`]. Remote
//! errors propagate unchanged; retrying is the orchestrator's business.

use crate::accessors::{ChainStateReader, EvmReader};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::{CacheTtls, RelayFees};
use crate::dec::Dec;
use crate::error::{FeeError, Result};
use crate::units::Wei;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cache key of the pricing parameter snapshot.
pub const PARAMS_KEY: &str = "GF_FEE_PARAMS";
/// Cache key of the message gas table.
pub const GAS_TABLE_KEY: &str = "GF_FEE_GAS_FEES";
/// Cache key of the EVM gas price.
pub const GAS_PRICE_KEY: &str = "EVM_GAS_PRICE";
/// Cache key of the relay fee pair.
pub const RELAY_KEY: &str = "RELAY_FEE";

/// Storage chain messages whose fixed gas is paid from the storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Registers a new object in a bucket.
    CreateObject,
    /// Removes an object from a bucket.
    DeleteObject,
}

impl MessageKind {
    /// Every priced message kind.
    pub const ALL: [MessageKind; 2] = [MessageKind::CreateObject, MessageKind::DeleteObject];

    /// Protobuf type URL the gas table is keyed by.
    pub const fn type_url(self) -> &'static str {
        match self {
            MessageKind::CreateObject => "/greenfield.storage.MsgCreateObject",
            MessageKind::DeleteObject => "/greenfield.storage.MsgDeleteObject",
        }
    }
}

/// Snapshot of every parameter the netflow formulas need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParameters {
    /// Read price per byte per second.
    pub read_price_per_byte: Dec,
    /// Primary provider store price per byte per second.
    pub primary_store_price_per_byte: Dec,
    /// Secondary provider store price per byte per second.
    pub secondary_store_price_per_byte: Dec,
    /// Validator tax applied on top of provider fees.
    pub validator_tax_rate: Dec,
    /// Minimum billable object size in bytes.
    pub min_charge_size: u64,
    /// Erasure-coding data chunks stored by secondary providers.
    pub redundant_data_chunks: u32,
    /// Erasure-coding parity chunks stored by secondary providers.
    pub redundant_parity_chunks: u32,
    /// Buffer reserve period in seconds.
    pub reserve_time_seconds: u64,
}

impl PricingParameters {
    /// Number of secondary providers holding a chunk of each object.
    pub fn secondary_providers(&self) -> u32 {
        self.redundant_data_chunks
            .saturating_add(self.redundant_parity_chunks)
    }
}

/// Fixed gas per message type URL.
pub type GasTable = HashMap<String, u64>;

/// Cached accessor for pricing inputs.
pub struct PricingSource {
    chain: Arc<dyn ChainStateReader>,
    evm: Arc<dyn EvmReader>,
    cache: Arc<TtlCache>,
    clock: Arc<dyn Clock>,
    ttl: CacheTtls,
    local_relay_fees: Option<RelayFees>,
}

impl PricingSource {
    /// Builds a source over the given readers and shared cache.
    pub fn new(
        chain: Arc<dyn ChainStateReader>,
        evm: Arc<dyn EvmReader>,
        cache: Arc<TtlCache>,
        clock: Arc<dyn Clock>,
        ttl: CacheTtls,
    ) -> Self {
        Self {
            chain,
            evm,
            cache,
            clock,
            ttl,
            local_relay_fees: None,
        }
    }

    /// Serves relay fees from configuration instead of the EVM reader.
    pub fn with_local_relay_fees(mut self, fees: Option<RelayFees>) -> Self {
        self.local_relay_fees = fees;
        self
    }

    /// Current pricing parameters, fetched at most once per TTL.
    pub async fn pricing_parameters(&self) -> Result<PricingParameters> {
        let chain = self.chain.clone();
        let now = self.clock.now_secs();
        self.cache
            .get_or_load(PARAMS_KEY, self.ttl.params(), move || async move {
                let (price, storage, payment) = tokio::try_join!(
                    chain.global_store_price(now),
                    chain.storage_params(),
                    chain.payment_params(),
                )?;
                debug!(
                    read_price = %price.read_price,
                    primary = %price.primary_store_price,
                    secondary = %price.secondary_store_price,
                    tax = %payment.validator_tax_rate,
                    "pricing parameters loaded"
                );
                Ok(PricingParameters {
                    read_price_per_byte: price.read_price,
                    primary_store_price_per_byte: price.primary_store_price,
                    secondary_store_price_per_byte: price.secondary_store_price,
                    validator_tax_rate: payment.validator_tax_rate,
                    min_charge_size: storage.min_charge_size,
                    redundant_data_chunks: storage.redundant_data_chunks,
                    redundant_parity_chunks: storage.redundant_parity_chunks,
                    reserve_time_seconds: payment.reserve_time_secs,
                })
            })
            .await
    }

    /// Fixed gas table for every priced message kind.
    pub async fn gas_table(&self) -> Result<GasTable> {
        let chain = self.chain.clone();
        self.cache
            .get_or_load(GAS_TABLE_KEY, self.ttl.gas_table(), move || async move {
                let params = chain.msg_gas_params(&MessageKind::ALL).await?;
                Ok(params
                    .into_iter()
                    .map(|p| (p.msg_type_url, p.fixed_gas))
                    .collect::<GasTable>())
            })
            .await
    }

    /// Total fixed gas units of `messages`, each kind sent `count` times;
    /// kinds missing from the table cost nothing.
    pub async fn gas_cost(&self, messages: &[(MessageKind, u32)]) -> Result<u128> {
        let table = self.gas_table().await?;
        let total = messages
            .iter()
            .map(|(kind, count)| {
                u128::from(table.get(kind.type_url()).copied().unwrap_or(0)) * u128::from(*count)
            })
            .try_fold(0u128, |acc, gas| acc.checked_add(gas))
            .ok_or(FeeError::Overflow("gas cost"))?;
        Ok(total)
    }

    /// Current EVM gas price.
    pub async fn gas_price(&self) -> Result<Wei> {
        let evm = self.evm.clone();
        self.cache
            .get_or_load(GAS_PRICE_KEY, self.ttl.gas_price(), move || async move {
                evm.gas_price().await
            })
            .await
    }

    /// Relay fee pair for cross-chain calls.
    pub async fn relay_fees(&self) -> Result<RelayFees> {
        if let Some(fees) = self.local_relay_fees {
            return Ok(fees);
        }
        let evm = self.evm.clone();
        self.cache
            .get_or_load(RELAY_KEY, self.ttl.relay(), move || async move {
                evm.relay_fees().await
            })
            .await
    }

    /// Shared cache backing this source.
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub(crate) fn chain(&self) -> &Arc<dyn ChainStateReader> {
        &self.chain
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn ttl(&self) -> &CacheTtls {
        &self.ttl
    }
}
