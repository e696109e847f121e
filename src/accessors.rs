//! External collaborators consumed by the fee engine.
//!
//! Every remote read goes through one of these traits, so the engine never
//! talks to an RPC endpoint directly. Implementations are expected to report
//! transport failures as [`FeeError::Remote`](crate::FeeError::Remote).

use crate::config::RelayFees;
use crate::dec::Dec;
use crate::error::Result;
use crate::pricing::MessageKind;
use crate::stream::StreamRecord;
use crate::units::{num_string, Wei};
use alloy_primitives::Address;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Global storage provider prices in effect at a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStorePrice {
    /// Read price, in wei per charged byte per second.
    pub read_price: Dec,
    /// Primary provider store price, in wei per charged byte per second.
    pub primary_store_price: Dec,
    /// Secondary provider store price, in wei per charged byte per second.
    pub secondary_store_price: Dec,
}

/// Versioned parameters of the storage module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Objects smaller than this many bytes are charged as this size.
    pub min_charge_size: u64,
    /// Erasure-coding data chunks.
    pub redundant_data_chunks: u32,
    /// Erasure-coding parity chunks.
    pub redundant_parity_chunks: u32,
}

/// Versioned parameters of the payment module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentParams {
    /// Share of storage fees paid to validators.
    pub validator_tax_rate: Dec,
    /// How long the buffer balance must cover the outflow, in seconds.
    pub reserve_time_secs: u64,
}

/// Fixed gas cost of one message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgGasParam {
    /// Message type URL.
    pub msg_type_url: String,
    /// Gas charged for each message of this type.
    pub fixed_gas: u64,
}

/// Read-only access to the storage chain's modules.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Global prices effective at `at_unix_secs`.
    async fn global_store_price(&self, at_unix_secs: u64) -> Result<GlobalStorePrice>;

    /// Storage module parameters.
    async fn storage_params(&self) -> Result<StorageParams>;

    /// Payment module parameters.
    async fn payment_params(&self) -> Result<PaymentParams>;

    /// Fixed gas costs for the requested message types.
    async fn msg_gas_params(&self, kinds: &[MessageKind]) -> Result<Vec<MsgGasParam>>;

    /// Latest checkpoint of an account's payment stream.
    async fn stream_record(&self, account: Address) -> Result<StreamRecord>;
}

/// Read-only access to the EVM chain the wallet lives on.
#[async_trait]
pub trait EvmReader: Send + Sync {
    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<Wei>;

    /// Relay fees from the cross-chain contract.
    async fn relay_fees(&self) -> Result<RelayFees>;
}

/// Native token balances of wallets.
#[async_trait]
pub trait WalletAccessor: Send + Sync {
    /// Spendable balance of `address` in wei.
    async fn balance(&self, address: Address) -> Result<Wei>;
}

/// Balance of a storage payment account as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageAccountBalance {
    /// Bank balance plus static balance.
    #[serde(with = "num_string")]
    pub available_balance: Wei,
    /// Buffer plus locked balance.
    #[serde(with = "num_string")]
    pub locked_fee: Wei,
    /// Current netflow rate in wei per second; negative while draining.
    #[serde(with = "num_string")]
    pub change_rate: i128,
}

/// Storage payment account balances.
#[async_trait]
pub trait StorageAccountAccessor: Send + Sync {
    /// Dynamic balance of the payment account owned by `address`.
    async fn account_balance(&self, address: Address) -> Result<StorageAccountBalance>;
}

/// Credentials used to sign storage provider requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAuth {
    /// Account the credentials belong to.
    pub account: Address,
    /// Off-chain auth seed issued by the storage provider.
    pub seed: String,
}

/// Read quota counters of a bucket, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Purchased monthly read quota.
    pub read_quota: u64,
    /// One-time free quota left.
    pub free_quota: u64,
    /// Purchased quota consumed this month.
    pub consumed_quota: u64,
    /// One-time free quota already consumed.
    pub free_consumed_size: u64,
    /// Monthly free quota granted by the provider.
    pub monthly_free_quota: u64,
    /// Monthly free quota consumed this month.
    pub monthly_quota_consumed_size: u64,
}

impl QuotaInfo {
    /// Quota still available for downloads this month.
    pub fn remaining(&self) -> u64 {
        self.free_quota
            .saturating_add(self.read_quota)
            .saturating_add(self.monthly_free_quota)
            .saturating_sub(self.consumed_quota)
            .saturating_sub(self.monthly_quota_consumed_size)
    }

    /// Purchased monthly quota rounded down to whole GiB.
    pub fn read_quota_gb(&self) -> u64 {
        crate::units::bytes_to_gb(self.read_quota)
    }

    /// True when `requirement` bytes fit in the remaining quota.
    pub fn covers(&self, requirement: u64) -> bool {
        requirement <= self.remaining()
    }
}

/// Bucket read quota reads.
#[async_trait]
pub trait QuotaAccessor: Send + Sync {
    /// Quota counters of `bucket`, authorised with `auth`.
    async fn bucket_read_quota(&self, auth: &StorageAuth, bucket: &str) -> Result<QuotaInfo>;
}

/// Why a gas estimate produced no amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationError {
    /// The simulated call ran out of funds.
    OutOfFunds,
}

/// Outcome of a caller-supplied network gas estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EstimationResult {
    /// Estimated gas units times gas price, when the call simulated cleanly.
    pub result: Option<Wei>,
    /// Recognised failure, reported as data rather than as an error.
    pub error: Option<EstimationError>,
}

impl EstimationResult {
    /// Successful estimate of `fee` wei.
    pub fn fee(fee: Wei) -> Self {
        Self {
            result: Some(fee),
            error: None,
        }
    }

    /// The simulated call could not be paid for.
    pub fn out_of_funds() -> Self {
        Self {
            result: None,
            error: Some(EstimationError::OutOfFunds),
        }
    }

    /// True when the estimator reported missing funds.
    pub fn is_out_of_funds(&self) -> bool {
        self.error == Some(EstimationError::OutOfFunds)
    }
}

/// Network gas estimator for the transaction the user is about to send.
#[async_trait]
pub trait GasEstimator: Send + Sync {
    /// Estimates the network fee; unrecognised failures are errors.
    async fn estimate(&self) -> Result<EstimationResult>;
}

#[async_trait]
impl<F> GasEstimator for F
where
    F: Fn() -> BoxFuture<'static, Result<EstimationResult>> + Send + Sync,
{
    async fn estimate(&self) -> Result<EstimationResult> {
        (self)().await
    }
}
