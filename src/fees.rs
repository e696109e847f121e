//! Fee client: the formulas fed with live pricing and stream data.

use crate::accessors::{ChainStateReader, EvmReader};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::{EngineConfig, RelayFees};
use crate::error::Result;
use crate::formulas;
use crate::pricing::{MessageKind, PricingParameters, PricingSource};
use crate::stream::{StreamAccounting, StreamRecord};
use crate::units::Wei;
use alloy_primitives::Address;
use std::sync::Arc;
use tracing::debug;

/// Prices storage operations for one chain.
pub struct FeeClient {
    pricing: PricingSource,
    streams: StreamAccounting,
}

impl FeeClient {
    /// Wires a pricing source and a stream reader over one shared cache.
    pub fn new(
        chain: Arc<dyn ChainStateReader>,
        evm: Arc<dyn EvmReader>,
        cache: Arc<TtlCache>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let pricing = PricingSource::new(chain, evm, cache, clock, config.ttl.clone())
            .with_local_relay_fees(config.local_relay_fees);
        Self::from_pricing(pricing)
    }

    /// Builds a client around an existing pricing source, sharing its
    /// readers, cache and clock.
    pub fn from_pricing(pricing: PricingSource) -> Self {
        let streams = StreamAccounting::new(
            pricing.chain().clone(),
            pricing.cache().clone(),
            pricing.clock().clone(),
            pricing.ttl().stream(),
        );
        Self { pricing, streams }
    }

    /// Underlying pricing source.
    pub fn pricing(&self) -> &PricingSource {
        &self.pricing
    }

    /// Underlying stream reader.
    pub fn streams(&self) -> &StreamAccounting {
        &self.streams
    }

    /// Shared cache; call `clean()` on it after a mutating transaction.
    pub fn cache(&self) -> &Arc<TtlCache> {
        self.pricing.cache()
    }

    /// Current pricing snapshot.
    pub async fn pricing_parameters(&self) -> Result<PricingParameters> {
        self.pricing.pricing_parameters().await
    }

    /// Latest stream record of `account`.
    pub async fn stream_record(&self, account: Address) -> StreamRecord {
        self.streams.stream_record(account).await
    }

    /// Fee that brings `account`'s stream current with the clock.
    pub async fn settlement_fee(&self, account: Address) -> Result<Wei> {
        let record = self.streams.stream_record(account).await;
        let fee = formulas::settlement_fee(&record, self.streams.now())?;
        debug!(%account, fee, "settlement fee");
        Ok(fee)
    }

    /// Gas paid from the storage account for `messages`.
    pub async fn storage_gas_fee(&self, messages: &[(MessageKind, u32)]) -> Result<Wei> {
        if messages.iter().all(|(_, count)| *count == 0) {
            return Ok(0);
        }
        let (gas, price) =
            tokio::try_join!(self.pricing.gas_cost(messages), self.pricing.gas_price())?;
        let fee = formulas::storage_gas_fee(gas, price)?;
        debug!(kinds = messages.len(), gas, price, fee, "storage gas fee");
        Ok(fee)
    }

    /// Relay fees for `calls` cross-chain calls.
    pub async fn relay_fee(&self, calls: u32) -> Result<Wei> {
        if calls == 0 {
            return Ok(0);
        }
        let fees: RelayFees = self.pricing.relay_fees().await?;
        formulas::relay_fee(&fees, calls)
    }

    /// Read quota cost of `size_bytes` over `duration_secs`.
    pub async fn quota_netflow_rate(&self, size_bytes: u64, duration_secs: u64) -> Result<Wei> {
        let params = self.pricing.pricing_parameters().await?;
        formulas::quota_netflow_rate(&params, size_bytes, duration_secs)
    }

    /// Storage cost of an object of `size_bytes` over `duration_secs`.
    pub async fn storage_netflow_rate(
        &self,
        size_bytes: u64,
        duration_secs: u64,
        charge_as_is: bool,
    ) -> Result<Wei> {
        let params = self.pricing.pricing_parameters().await?;
        formulas::storage_netflow_rate(&params, size_bytes, duration_secs, charge_as_is)
    }
}
