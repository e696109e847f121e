//! Fee breakdown handed to the caller, and the readiness state around it.

use crate::units::Wei;
use serde::{Deserialize, Serialize};

/// Component of a fee breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeKind {
    /// Gas of the transaction sent from the wallet.
    NetworkGas,
    /// Oracle verification fee.
    OracleFee,
    /// Validator build check fee.
    ValidatorFee,
    /// Cross-chain relay fees.
    RelayFee,
    /// Fixed gas of storage messages.
    StorageGasFee,
    /// Stream settlement plus prepaid quota and object reserve.
    StorageSettlementFee,
}

impl FeeKind {
    /// Display order of the breakdown.
    pub const ORDER: [FeeKind; 6] = [
        FeeKind::NetworkGas,
        FeeKind::OracleFee,
        FeeKind::ValidatorFee,
        FeeKind::RelayFee,
        FeeKind::StorageGasFee,
        FeeKind::StorageSettlementFee,
    ];
}

/// One named line of a breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLineItem {
    /// What the line pays for.
    pub kind: FeeKind,
    /// Amount, once known.
    pub amount_wei: Option<Wei>,
    /// True while the amount is being computed.
    pub is_loading: bool,
}

impl FeeLineItem {
    /// Line with a known amount.
    pub fn ready(kind: FeeKind, amount: Wei) -> Self {
        Self {
            kind,
            amount_wei: Some(amount),
            is_loading: false,
        }
    }

    fn cleared(kind: FeeKind, is_loading: bool) -> Self {
        Self {
            kind,
            amount_wei: None,
            is_loading,
        }
    }
}

/// Full fee breakdown of one action with its balance verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSummary {
    /// Lines in [`FeeKind::ORDER`].
    pub items: Vec<FeeLineItem>,
    /// Wallet cannot pay its share, or gas estimation ran out of funds.
    pub insufficient_wallet_balance: bool,
    /// Storage account cannot cover settlement, storage and relay fees.
    pub insufficient_storage_balance: bool,
    /// Bucket quota cannot serve the upload.
    pub insufficient_quota: bool,
    /// Total the wallet has to pay.
    pub required_wallet_balance: Wei,
    /// Total the storage account has to hold.
    pub required_storage_balance: Wei,
    /// Deposit sent with the action.
    pub top_up: Wei,
    /// Storage account outflow over a month before the action.
    pub current_netflow_per_month: Option<Wei>,
    /// Storage account outflow over a month after the action.
    pub next_netflow_per_month: Option<Wei>,
}

impl FeeSummary {
    fn blank(is_loading: bool) -> Self {
        Self {
            items: FeeKind::ORDER
                .iter()
                .map(|kind| FeeLineItem::cleared(*kind, is_loading))
                .collect(),
            insufficient_wallet_balance: false,
            insufficient_storage_balance: false,
            insufficient_quota: false,
            required_wallet_balance: 0,
            required_storage_balance: 0,
            top_up: 0,
            current_netflow_per_month: None,
            next_netflow_per_month: None,
        }
    }

    /// Summary with no amounts and nothing loading.
    pub fn cleared() -> Self {
        Self::blank(false)
    }

    /// Summary with every line marked as loading.
    pub fn loading() -> Self {
        Self::blank(true)
    }

    /// Line of `kind`.
    pub fn item(&self, kind: FeeKind) -> Option<&FeeLineItem> {
        self.items.iter().find(|item| item.kind == kind)
    }

    /// Amount of `kind`, if computed.
    pub fn amount(&self, kind: FeeKind) -> Option<Wei> {
        self.item(kind).and_then(|item| item.amount_wei)
    }

    /// Records the amount of `kind`.
    pub fn set(&mut self, kind: FeeKind, amount: Wei) {
        if let Some(item) = self.items.iter_mut().find(|item| item.kind == kind) {
            *item = FeeLineItem::ready(kind, amount);
        }
    }

    /// True when any balance or quota check failed.
    pub fn has_shortfall(&self) -> bool {
        self.insufficient_wallet_balance
            || self.insufficient_storage_balance
            || self.insufficient_quota
    }

    /// True while any line is still loading.
    pub fn is_loading(&self) -> bool {
        self.items.iter().any(|item| item.is_loading)
    }
}

/// Readiness of a summary computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryState {
    /// Identity or authorisation inputs are missing.
    Pending,
    /// Fees are being computed.
    Loading,
    /// Fees are known but a balance or quota check failed.
    Warning,
    /// A fee could not be computed; retry from `Pending`.
    Error,
    /// Fees are known and every balance suffices.
    Ready,
}

impl SummaryState {
    /// The user may proceed with the transaction.
    pub fn is_ready(self) -> bool {
        matches!(self, SummaryState::Ready | SummaryState::Warning)
    }

    /// A computation is outstanding.
    pub fn is_processing(self) -> bool {
        matches!(self, SummaryState::Pending | SummaryState::Loading)
    }
}
