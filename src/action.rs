//! User actions that can be priced.

use crate::pricing::MessageKind;
use crate::units::{num_string, Wei};
use serde::{Deserialize, Serialize};

/// One action the publisher is about to pay for; each variant carries only
/// the inputs its fees depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserAction {
    /// Upload of one object into the publisher's bucket.
    Upload {
        /// Object size in bytes; zero skips every storage line.
        file_size: u64,
        /// Read quota the upload will consume, in bytes.
        quota_requirement: u64,
        /// Whether the build is sent for validator checks.
        with_validation: bool,
    },
    /// Change of the bucket's monthly read quota, optionally topping up.
    QuotaChange {
        /// Requested quota in whole GiB.
        new_quota_gb: u64,
        /// Deposit into the storage account sent with the change; zero for
        /// none.
        #[serde(default, with = "num_string")]
        top_up: Wei,
    },
    /// Deposit into the storage account.
    TopUp {
        /// Amount moved from the wallet.
        #[serde(with = "num_string")]
        amount: Wei,
    },
    /// Removal of objects from the bucket.
    Delete {
        /// Number of objects deleted.
        objects: u32,
    },
    /// Domain ownership verification.
    OwnershipChange {
        /// Whether the oracle verifies an asset-link proof.
        with_oracle: bool,
    },
    /// Publisher or app account creation.
    AccountCreation {
        /// Cross-chain calls triggered by the creation.
        relay_calls: u32,
    },
    /// Plain contract call paying network gas only.
    ContractCall,
}

impl UserAction {
    /// Storage messages paid from the storage account, with their counts.
    pub fn storage_messages(&self) -> Vec<(MessageKind, u32)> {
        match self {
            UserAction::Upload { file_size, .. } if *file_size > 0 => {
                vec![(MessageKind::CreateObject, 1)]
            }
            UserAction::Delete { objects } if *objects > 0 => {
                vec![(MessageKind::DeleteObject, *objects)]
            }
            _ => Vec::new(),
        }
    }

    /// Size of the object being stored, if any.
    pub fn file_size(&self) -> Option<u64> {
        match self {
            UserAction::Upload { file_size, .. } if *file_size > 0 => Some(*file_size),
            _ => None,
        }
    }

    /// Amount deposited into the storage account.
    pub fn top_up(&self) -> Option<Wei> {
        match self {
            UserAction::TopUp { amount } if *amount > 0 => Some(*amount),
            UserAction::QuotaChange { top_up, .. } if *top_up > 0 => Some(*top_up),
            _ => None,
        }
    }

    /// Requested read quota, for quota changes.
    pub fn new_quota_gb(&self) -> Option<u64> {
        match self {
            UserAction::QuotaChange { new_quota_gb, .. } => Some(*new_quota_gb),
            _ => None,
        }
    }

    /// Read quota the action consumes, in bytes.
    pub fn quota_requirement(&self) -> Option<u64> {
        match self {
            UserAction::Upload {
                quota_requirement, ..
            } => Some(*quota_requirement),
            _ => None,
        }
    }

    /// Cross-chain calls requested explicitly, beyond top-up and quota.
    pub fn explicit_relay_calls(&self) -> u32 {
        match self {
            UserAction::AccountCreation { relay_calls } => *relay_calls,
            _ => 0,
        }
    }

    /// True when the action changes the payment stream and therefore has
    /// to settle it first.
    pub fn touches_stream(&self) -> bool {
        self.top_up().is_some() || self.file_size().is_some() || self.new_quota_gb().is_some()
    }

    /// True when the bucket and provider credentials are needed to price
    /// the action.
    pub fn needs_storage_auth(&self) -> bool {
        match self {
            UserAction::Upload {
                file_size,
                quota_requirement,
                ..
            } => *file_size > 0 || *quota_requirement > 0,
            UserAction::QuotaChange { .. } => true,
            _ => false,
        }
    }

    /// Whether the oracle fee applies.
    pub fn with_oracle(&self) -> bool {
        matches!(self, UserAction::OwnershipChange { with_oracle: true })
    }

    /// Whether the validator fee applies.
    pub fn with_validation(&self) -> bool {
        matches!(
            self,
            UserAction::Upload {
                with_validation: true,
                ..
            }
        )
    }
}
