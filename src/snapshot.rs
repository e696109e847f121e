//! Chain state captured in a JSON file and served through the accessor
//! traits, for offline quoting.

use crate::accessors::{
    ChainStateReader, EvmReader, GlobalStorePrice, MsgGasParam, PaymentParams, QuotaAccessor,
    QuotaInfo, StorageAccountAccessor, StorageAccountBalance, StorageAuth, StorageParams,
    WalletAccessor,
};
use crate::config::RelayFees;
use crate::error::{FeeError, Result};
use crate::pricing::MessageKind;
use crate::stream::StreamRecord;
use crate::units::{num_string, Wei};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Native balance of one wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Wallet address.
    pub address: Address,
    /// Balance in wei.
    #[serde(with = "num_string")]
    pub balance: Wei,
}

/// Storage payment account of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Owner address.
    pub address: Address,
    /// Balances at capture time.
    pub balance: StorageAccountBalance,
}

/// Read quota of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketQuota {
    /// Bucket name.
    pub bucket: String,
    /// Quota counters.
    pub quota: QuotaInfo,
}

/// Everything the engine reads remotely, frozen at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Global storage prices.
    pub price: GlobalStorePrice,
    /// Storage module parameters.
    pub storage: StorageParams,
    /// Payment module parameters.
    pub payment: PaymentParams,
    /// Fixed gas per message type.
    #[serde(default)]
    pub gas: Vec<MsgGasParam>,
    /// EVM gas price.
    #[serde(with = "num_string")]
    pub gas_price: Wei,
    /// Cross-chain relay fee pair.
    pub relay: RelayFees,
    /// Known payment streams.
    #[serde(default)]
    pub streams: Vec<StreamRecord>,
    /// Known wallets; others hold nothing.
    #[serde(default)]
    pub wallets: Vec<WalletBalance>,
    /// Known storage accounts; others hold nothing.
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
    /// Known bucket quotas; others are empty.
    #[serde(default)]
    pub quotas: Vec<BucketQuota>,
}

impl ChainSnapshot {
    /// Loads a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).map_err(|err| FeeError::Config(format!("{}: {err}", path.display())))?;
        Self::from_slice(&bytes)
    }

    /// Decodes a snapshot from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| FeeError::Parse(err.to_string()))
    }
}

#[async_trait]
impl ChainStateReader for ChainSnapshot {
    async fn global_store_price(&self, _at_unix_secs: u64) -> Result<GlobalStorePrice> {
        Ok(self.price.clone())
    }

    async fn storage_params(&self) -> Result<StorageParams> {
        Ok(self.storage.clone())
    }

    async fn payment_params(&self) -> Result<PaymentParams> {
        Ok(self.payment.clone())
    }

    async fn msg_gas_params(&self, kinds: &[MessageKind]) -> Result<Vec<MsgGasParam>> {
        Ok(self
            .gas
            .iter()
            .filter(|param| kinds.iter().any(|kind| kind.type_url() == param.msg_type_url))
            .cloned()
            .collect())
    }

    async fn stream_record(&self, account: Address) -> Result<StreamRecord> {
        self.streams
            .iter()
            .find(|record| record.account == account)
            .cloned()
            .ok_or_else(|| FeeError::Remote(format!("no stream record for {account}")))
    }
}

#[async_trait]
impl EvmReader for ChainSnapshot {
    async fn gas_price(&self) -> Result<Wei> {
        Ok(self.gas_price)
    }

    async fn relay_fees(&self) -> Result<RelayFees> {
        Ok(self.relay)
    }
}

#[async_trait]
impl WalletAccessor for ChainSnapshot {
    async fn balance(&self, address: Address) -> Result<Wei> {
        Ok(self
            .wallets
            .iter()
            .find(|wallet| wallet.address == address)
            .map(|wallet| wallet.balance)
            .unwrap_or(0))
    }
}

#[async_trait]
impl StorageAccountAccessor for ChainSnapshot {
    async fn account_balance(&self, address: Address) -> Result<StorageAccountBalance> {
        Ok(self
            .accounts
            .iter()
            .find(|account| account.address == address)
            .map(|account| account.balance)
            .unwrap_or_default())
    }
}

#[async_trait]
impl QuotaAccessor for ChainSnapshot {
    async fn bucket_read_quota(&self, _auth: &StorageAuth, bucket: &str) -> Result<QuotaInfo> {
        Ok(self
            .quotas
            .iter()
            .find(|entry| entry.bucket == bucket)
            .map(|entry| entry.quota)
            .unwrap_or_default())
    }
}
