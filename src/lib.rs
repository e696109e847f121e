#![deny(missing_docs)]

//! # openstore_fees
//!
//! Fee and balance accounting for publishers of a decentralized application
//! store whose builds live on a blockchain-backed object store.
//!
//! Every paid action (uploading a build, changing the read quota, topping up
//! the storage account, deleting objects, verifying ownership, creating
//! accounts) combines four independently priced costs:
//!
//! * **Network gas** of the wallet transaction, estimated by the caller.
//! * **Storage rent** ("netflow"): per-second price of stored bytes and read
//!   quota, with validator tax on top.
//! * **Settlement**: catching the payment stream up to the current instant.
//! * **Relay fees** for every cross-chain call.
//!
//! The crate is layered leaves first:
//!
//! * [`cache`]: a TTL cache with single-flight loading shared by all readers.
//! * [`pricing`]: cached storage prices, module parameters, message gas, gas
//!   price and relay fees.
//! * [`stream`]: payment stream checkpoints and their projection in time.
//! * [`formulas`]: pure fee formulas; every result is rounded up.
//! * [`orchestrator`]: prices one [`UserAction`] into a [`FeeSummary`] and
//!   drives the `Pending → Loading → Ready | Warning | Error` state machine.
//!
//! All remote reads go through the traits in [`accessors`]; the crate never
//! opens a connection itself. [`snapshot::ChainSnapshot`] implements them
//! over a JSON file.
//!
//! ## Usage
//!
//! ```rust
//! use openstore_fees::{formulas, Dec, PricingParameters, GB, MONTH_SECS};
//!
//! let params = PricingParameters {
//!     read_price_per_byte: "0.01".parse::<Dec>().unwrap(),
//!     primary_store_price_per_byte: "0.01".parse().unwrap(),
//!     secondary_store_price_per_byte: "0.001".parse().unwrap(),
//!     validator_tax_rate: "0.01".parse().unwrap(),
//!     min_charge_size: 131_072,
//!     redundant_data_chunks: 4,
//!     redundant_parity_chunks: 2,
//!     reserve_time_seconds: 604_800,
//! };
//! let monthly = formulas::storage_netflow_rate(&params, GB, MONTH_SECS, false).unwrap();
//! assert_eq!(monthly, 44_975_523_134_178);
//! ```

pub mod accessors;
pub mod action;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dec;
mod error;
pub mod fees;
pub mod formulas;
pub mod orchestrator;
pub mod pricing;
pub mod snapshot;
pub mod stream;
pub mod summary;
mod units;

pub use accessors::{
    ChainStateReader, EstimationError, EstimationResult, EvmReader, GasEstimator, QuotaAccessor,
    QuotaInfo, StorageAccountAccessor, StorageAccountBalance, StorageAuth, WalletAccessor,
};
pub use action::UserAction;
pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheTtls, EngineConfig, RelayFees, ServicePrices};
pub use dec::Dec;
pub use error::{FeeError, Result};
pub use fees::FeeClient;
pub use orchestrator::{
    compute_summary, FeeEngine, FeeSummaryOrchestrator, SummaryRequest, SummarySnapshot,
    DEFAULT_ERROR_MESSAGE,
};
pub use pricing::{MessageKind, PricingParameters, PricingSource};
pub use stream::{project_balance, ProjectedBalance, StreamAccounting, StreamRecord};
pub use summary::{FeeKind, FeeLineItem, FeeSummary, SummaryState};
pub use units::{bytes_to_gb, gb_to_bytes, Wei, GB, MONTH_SECS, WEEK_SECS, WEI_PER_TOKEN};
