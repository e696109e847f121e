//! Fee summary orchestration.
//!
//! [`compute_summary`] prices one [`UserAction`] end to end and checks the
//! live balances against it. [`FeeSummaryOrchestrator`] wraps it in the
//! readiness state machine: every call to
//! [`refresh`](FeeSummaryOrchestrator::refresh) takes a new generation, and
//! only the latest generation may commit its state and summary. A slow,
//! superseded computation therefore never overwrites a newer result.

use crate::accessors::{
    GasEstimator, QuotaAccessor, QuotaInfo, StorageAccountAccessor, StorageAccountBalance,
    StorageAuth, WalletAccessor,
};
use crate::action::UserAction;
use crate::config::ServicePrices;
use crate::error::{FeeError, Result};
use crate::fees::FeeClient;
use crate::formulas;
use crate::summary::{FeeKind, FeeSummary, SummaryState};
use crate::units::{Wei, MONTH_SECS, WEEK_SECS};
use alloy_primitives::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message handed to the error callback; internal details stay in the log.
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong, please try again";

/// Prefix of cached storage account balances used for netflow projection.
pub const BALANCE_KEY_PREFIX: &str = "GF_ACCOUNT_BALANCE";

/// Receives every state transition.
pub type StateCallback = Box<dyn Fn(SummaryState) + Send + Sync>;
/// Receives one message per failed computation.
pub type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Everything a summary depends on besides the action itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Wallet paying network fees; also owns the storage payment account.
    pub account: Option<Address>,
    /// Publisher account whose storage outflow is projected.
    pub publisher: Option<Address>,
    /// Publisher bucket name.
    pub bucket: Option<String>,
    /// Storage provider credentials of `account`.
    pub auth: Option<StorageAuth>,
    /// Action being priced.
    pub action: UserAction,
}

impl SummaryRequest {
    /// Request for `action` paid by `account`, without storage identity.
    pub fn new(account: Address, action: UserAction) -> Self {
        Self {
            account: Some(account),
            publisher: None,
            bucket: None,
            auth: None,
            action,
        }
    }

    /// Adds the publisher's storage identity.
    pub fn with_storage(
        mut self,
        publisher: Address,
        bucket: impl Into<String>,
        auth: StorageAuth,
    ) -> Self {
        self.publisher = Some(publisher);
        self.bucket = Some(bucket.into());
        self.auth = Some(auth);
        self
    }

    /// First required input that is still missing.
    pub fn missing_input(&self) -> Option<&'static str> {
        if self.account.is_none() {
            return Some("account");
        }
        if self.action.needs_storage_auth() {
            if self.auth.is_none() {
                return Some("storage auth");
            }
            if self.bucket.is_none() {
                return Some("bucket");
            }
        }
        if self.action.new_quota_gb().is_some() && self.publisher.is_none() {
            return Some("publisher");
        }
        None
    }
}

/// Collaborators needed to price actions and check balances.
pub struct FeeEngine {
    /// Pricing, stream and formula access.
    pub fees: FeeClient,
    /// Wallet balances.
    pub wallet: Arc<dyn WalletAccessor>,
    /// Storage payment account balances.
    pub storage: Arc<dyn StorageAccountAccessor>,
    /// Bucket read quota.
    pub quota: Arc<dyn QuotaAccessor>,
    /// Fixed service prices.
    pub prices: ServicePrices,
}

impl FeeEngine {
    /// Storage account balance of `publisher`, cached for netflow
    /// projection only.
    async fn projected_account(&self, publisher: Address) -> Result<StorageAccountBalance> {
        let storage = self.storage.clone();
        let ttl: Duration = self.fees.pricing().ttl().balance();
        self.fees
            .cache()
            .get_or_load(
                &format!("{BALANCE_KEY_PREFIX}-{publisher}"),
                ttl,
                move || async move { storage.account_balance(publisher).await },
            )
            .await
    }

    async fn bucket_quota(&self, request: &SummaryRequest) -> Result<QuotaInfo> {
        let auth = request
            .auth
            .as_ref()
            .ok_or(FeeError::MissingInput("storage auth"))?;
        let bucket = request
            .bucket
            .as_deref()
            .ok_or(FeeError::MissingInput("bucket"))?;
        self.quota.bucket_read_quota(auth, bucket).await
    }
}

/// Prices `request` and checks wallet, storage and quota against it.
///
/// Steps run in order: network gas, settlement, storage gas and relay fees,
/// quota netflow change, new object storage, then the balance checks. The
/// first failing read aborts the whole computation.
pub async fn compute_summary(
    engine: &FeeEngine,
    request: &SummaryRequest,
    estimator: &dyn GasEstimator,
) -> Result<FeeSummary> {
    if let Some(missing) = request.missing_input() {
        return Err(FeeError::MissingInput(missing));
    }
    let account = request.account.ok_or(FeeError::MissingInput("account"))?;
    let action = &request.action;
    let mut summary = FeeSummary::cleared();

    let estimate = estimator.estimate().await?;
    let network = estimate.result.unwrap_or(0);
    if let Some(fee) = estimate.result {
        summary.set(FeeKind::NetworkGas, fee);
    }
    let mut oracle = 0;
    if action.with_oracle() {
        oracle = engine.prices.oracle_asset_link;
        summary.set(FeeKind::OracleFee, oracle);
    }
    let mut validator = 0;
    if action.with_validation() {
        validator = engine.prices.validator_build;
        summary.set(FeeKind::ValidatorFee, validator);
    }

    let mut settlement = if action.touches_stream() {
        Some(engine.fees.settlement_fee(account).await?)
    } else {
        None
    };

    let file_size = action.file_size();
    let quota_requirement = action.quota_requirement().unwrap_or(0);
    let new_quota_gb = action.new_quota_gb();
    let quota = if new_quota_gb.is_some() || (file_size.is_some() && quota_requirement > 0) {
        Some(engine.bucket_quota(request).await?)
    } else {
        None
    };
    let current_quota_gb = quota.map(|q| q.read_quota_gb()).unwrap_or(0);
    let quota_changed = new_quota_gb.is_some_and(|gb| gb != current_quota_gb);

    let messages = action.storage_messages();
    let top_up = action.top_up();
    let calls =
        formulas::relay_call_count(action.explicit_relay_calls(), top_up.is_some(), quota_changed);
    let storage_gas = engine.fees.storage_gas_fee(&messages).await?;
    if !messages.is_empty() {
        summary.set(FeeKind::StorageGasFee, storage_gas);
    }
    let relay = engine.fees.relay_fee(calls).await?;
    if calls > 0 {
        summary.set(FeeKind::RelayFee, relay);
    }

    let params = if quota_changed || file_size.is_some() {
        Some(engine.fees.pricing_parameters().await?)
    } else {
        None
    };

    if let Some(publisher) = request.publisher {
        let balance = engine.projected_account(publisher).await?;
        let current = balance
            .change_rate
            .unsigned_abs()
            .saturating_mul(u128::from(MONTH_SECS));
        let mut next = None;
        if let (Some(params), Some(new_gb), true) = (&params, new_quota_gb, quota_changed) {
            let monthly =
                formulas::quota_netflow_delta(params, current_quota_gb, new_gb, MONTH_SECS)?;
            next = Some(formulas::shift_outflow(current, monthly));
            if let Some(fee) = settlement.as_mut() {
                let prepaid =
                    formulas::quota_netflow_delta(params, current_quota_gb, new_gb, WEEK_SECS)?;
                *fee = formulas::adjust_fee(*fee, prepaid);
            }
        }
        if let (Some(params), Some(size)) = (&params, file_size) {
            let additional = formulas::storage_netflow_rate(params, size, MONTH_SECS, true)?;
            next = Some(next.unwrap_or(current).saturating_add(additional));
        }
        summary.current_netflow_per_month = Some(current);
        summary.next_netflow_per_month = next;
    }

    let reserve = match (&params, file_size) {
        (Some(params), Some(size)) => {
            formulas::storage_netflow_rate(params, size, params.reserve_time_seconds, false)?
        }
        _ => 0,
    };
    if let Some(fee) = settlement {
        summary.set(FeeKind::StorageSettlementFee, fee.saturating_add(reserve));
    }

    let required_storage = sum(&[settlement.unwrap_or(0), reserve, storage_gas, relay])?;
    let top_up = top_up.unwrap_or(0);
    let required_wallet = sum(&[network, oracle, validator, relay, top_up])?;
    summary.required_storage_balance = required_storage;
    summary.required_wallet_balance = required_wallet;
    summary.top_up = top_up;

    if required_storage > 0 {
        let available = engine.storage.account_balance(account).await?.available_balance;
        summary.insufficient_storage_balance = available < required_storage;
    }
    if let (Some(quota), Some(_)) = (quota, file_size) {
        summary.insufficient_quota = quota_requirement > 0 && !quota.covers(quota_requirement);
    }
    let wallet = engine.wallet.balance(account).await?;
    summary.insufficient_wallet_balance = estimate.is_out_of_funds() || wallet < required_wallet;

    debug!(
        %account,
        required_wallet,
        required_storage,
        wallet_short = summary.insufficient_wallet_balance,
        storage_short = summary.insufficient_storage_balance,
        quota_short = summary.insufficient_quota,
        "summary computed"
    );
    Ok(summary)
}

fn sum(amounts: &[Wei]) -> Result<Wei> {
    amounts
        .iter()
        .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
        .ok_or(FeeError::Overflow("required balance"))
}

/// Last committed state of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySnapshot {
    /// Generation that produced this snapshot.
    pub generation: u64,
    /// Readiness.
    pub state: SummaryState,
    /// Fee breakdown.
    pub summary: FeeSummary,
}

/// Drives [`compute_summary`] through the readiness state machine.
pub struct FeeSummaryOrchestrator {
    engine: Arc<FeeEngine>,
    generation: AtomicU64,
    current: Mutex<SummarySnapshot>,
    on_state: Option<StateCallback>,
    on_error: Option<ErrorCallback>,
}

impl FeeSummaryOrchestrator {
    /// Starts in `Pending` with an empty summary.
    pub fn new(engine: Arc<FeeEngine>) -> Self {
        Self {
            engine,
            generation: AtomicU64::new(0),
            current: Mutex::new(SummarySnapshot {
                generation: 0,
                state: SummaryState::Pending,
                summary: FeeSummary::cleared(),
            }),
            on_state: None,
            on_error: None,
        }
    }

    /// Registers the state callback.
    pub fn on_state(mut self, callback: impl Fn(SummaryState) + Send + Sync + 'static) -> Self {
        self.on_state = Some(Box::new(callback));
        self
    }

    /// Registers the error callback.
    pub fn on_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Engine the orchestrator prices with.
    pub fn engine(&self) -> &Arc<FeeEngine> {
        &self.engine
    }

    /// Recomputes the summary for `request`.
    ///
    /// Returns the final state of this invocation, or `None` when a newer
    /// invocation superseded it before it could commit.
    pub async fn refresh(
        &self,
        request: &SummaryRequest,
        estimator: &dyn GasEstimator,
    ) -> Option<SummaryState> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(missing) = request.missing_input() {
            debug!(generation, missing, "summary inputs incomplete");
            return self
                .commit(generation, SummaryState::Pending, FeeSummary::cleared(), false)
                .then_some(SummaryState::Pending);
        }
        if !self.commit(generation, SummaryState::Loading, FeeSummary::loading(), false) {
            return None;
        }
        let outcome = compute_summary(&self.engine, request, estimator).await;
        let (state, summary, failed) = match outcome {
            Ok(summary) if summary.has_shortfall() => (SummaryState::Warning, summary, false),
            Ok(summary) => (SummaryState::Ready, summary, false),
            Err(err) => {
                warn!(generation, error = %err, "fee summary failed");
                (SummaryState::Error, FeeSummary::cleared(), true)
            }
        };
        self.commit(generation, state, summary, failed)
            .then_some(state)
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> SummarySnapshot {
        self.lock().clone()
    }

    /// Drops every cached read; call after a transaction went through or
    /// failed so the next refresh sees fresh prices and balances.
    pub fn invalidate(&self) {
        self.engine.fees.cache().clean();
    }

    fn commit(
        &self,
        generation: u64,
        state: SummaryState,
        summary: FeeSummary,
        failed: bool,
    ) -> bool {
        {
            let mut current = self.lock();
            let latest = self.generation.load(Ordering::SeqCst);
            if generation != latest || generation < current.generation {
                debug!(generation, ?state, "dropping superseded summary");
                return false;
            }
            *current = SummarySnapshot {
                generation,
                state,
                summary,
            };
        }
        info!(generation, ?state, "summary state");
        if let Some(callback) = &self.on_state {
            callback(state);
        }
        if failed {
            if let Some(callback) = &self.on_error {
                callback(DEFAULT_ERROR_MESSAGE);
            }
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, SummarySnapshot> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors::EstimationResult;
    use crate::cache::TtlCache;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::pricing::tests::{FakeChain, FakeEvm};
    use crate::stream::StreamRecord;
    use crate::units::GB;
    use async_trait::async_trait;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    const NOW: u64 = 1_700_000_000;
    const GAS_FEE: Wei = 105_000_000_000_000;
    const TOKEN: Wei = 1_000_000_000_000_000_000;

    struct FakeWallet(Wei);

    #[async_trait]
    impl WalletAccessor for FakeWallet {
        async fn balance(&self, _address: Address) -> Result<Wei> {
            Ok(self.0)
        }
    }

    struct FakeStorage {
        balance: StorageAccountBalance,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl StorageAccountAccessor for FakeStorage {
        async fn account_balance(&self, _address: Address) -> Result<StorageAccountBalance> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.balance)
        }
    }

    struct FakeQuota(QuotaInfo);

    #[async_trait]
    impl QuotaAccessor for FakeQuota {
        async fn bucket_read_quota(&self, _auth: &StorageAuth, _bucket: &str) -> Result<QuotaInfo> {
            Ok(self.0)
        }
    }

    struct Fixture {
        chain: Arc<FakeChain>,
        wallet: Wei,
        storage: StorageAccountBalance,
        quota: QuotaInfo,
    }

    impl Fixture {
        fn new() -> Self {
            let mut chain = FakeChain::standard();
            chain.streams.insert(
                account(),
                StreamRecord {
                    netflow_rate_per_second: -1_000,
                    ..StreamRecord::empty(account(), NOW - 100)
                },
            );
            Self {
                chain: Arc::new(chain),
                wallet: TOKEN,
                storage: StorageAccountBalance {
                    available_balance: TOKEN,
                    locked_fee: 0,
                    change_rate: -2_000,
                },
                quota: QuotaInfo {
                    read_quota: 10 * GB,
                    ..QuotaInfo::default()
                },
            }
        }

        fn engine(&self) -> Arc<FeeEngine> {
            self.engine_with_storage(Arc::new(FakeStorage {
                balance: self.storage,
                reads: AtomicUsize::new(0),
            }))
        }

        fn engine_with_storage(&self, storage: Arc<FakeStorage>) -> Arc<FeeEngine> {
            let fees = FeeClient::new(
                self.chain.clone(),
                Arc::new(FakeEvm::standard()),
                Arc::new(TtlCache::new()),
                Arc::new(ManualClock::new(NOW)),
                &EngineConfig::default(),
            );
            Arc::new(FeeEngine {
                fees,
                wallet: Arc::new(FakeWallet(self.wallet)),
                storage,
                quota: Arc::new(FakeQuota(self.quota)),
                prices: ServicePrices::default(),
            })
        }
    }

    fn account() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn publisher() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn auth() -> StorageAuth {
        StorageAuth {
            account: account(),
            seed: "seed".into(),
        }
    }

    fn storage_request(action: UserAction) -> SummaryRequest {
        SummaryRequest::new(account(), action).with_storage(publisher(), "app-bucket", auth())
    }

    fn gas(fee: Wei) -> impl Fn() -> BoxFuture<'static, Result<EstimationResult>> + Send + Sync {
        move || async move { Ok::<_, FeeError>(EstimationResult::fee(fee)) }.boxed()
    }

    struct Recorder {
        states: Arc<Mutex<Vec<SummaryState>>>,
        errors: Arc<AtomicUsize>,
    }

    fn orchestrator(engine: Arc<FeeEngine>) -> (FeeSummaryOrchestrator, Recorder) {
        let states = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let (s, e) = (states.clone(), errors.clone());
        let orchestrator = FeeSummaryOrchestrator::new(engine)
            .on_state(move |state| s.lock().unwrap().push(state))
            .on_error(move |message| {
                assert_eq!(message, DEFAULT_ERROR_MESSAGE);
                e.fetch_add(1, Ordering::SeqCst);
            });
        (orchestrator, Recorder { states, errors })
    }

    #[tokio::test]
    async fn upload_with_enough_funds_is_ready() {
        let fixture = Fixture::new();
        let (orchestrator, recorder) = orchestrator(fixture.engine());
        let request = storage_request(UserAction::Upload {
            file_size: GB,
            quota_requirement: GB,
            with_validation: true,
        });
        let state = orchestrator.refresh(&request, &gas(GAS_FEE)).await;
        assert_eq!(state, Some(SummaryState::Ready));
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![SummaryState::Loading, SummaryState::Ready]
        );

        let summary = orchestrator.snapshot().summary;
        let settlement = 100_000;
        let reserve = 10_494_288_731_309;
        let storage_gas = 12_000 * 5_000_000_000;
        assert_eq!(summary.amount(FeeKind::NetworkGas), Some(GAS_FEE));
        assert_eq!(summary.amount(FeeKind::ValidatorFee), Some(10_000_000_000_000_000));
        assert_eq!(summary.amount(FeeKind::OracleFee), None);
        assert_eq!(summary.amount(FeeKind::RelayFee), None);
        assert_eq!(summary.amount(FeeKind::StorageGasFee), Some(storage_gas));
        assert_eq!(
            summary.amount(FeeKind::StorageSettlementFee),
            Some(settlement + reserve)
        );
        assert_eq!(
            summary.required_storage_balance,
            settlement + reserve + storage_gas
        );
        assert_eq!(
            summary.required_wallet_balance,
            GAS_FEE + 10_000_000_000_000_000
        );
        let current = 2_000 * u128::from(MONTH_SECS);
        assert_eq!(summary.current_netflow_per_month, Some(current));
        // 1 GiB charged as-is for a month.
        assert_eq!(
            summary.next_netflow_per_month,
            Some(current + 44_975_523_134_178)
        );
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wallet_below_gas_is_a_warning() {
        let mut fixture = Fixture::new();
        fixture.wallet = GAS_FEE - 1;
        let (orchestrator, recorder) = orchestrator(fixture.engine());
        let request = SummaryRequest::new(account(), UserAction::ContractCall);
        let state = orchestrator.refresh(&request, &gas(GAS_FEE)).await;
        assert_eq!(state, Some(SummaryState::Warning));
        let snapshot = orchestrator.snapshot();
        assert!(snapshot.summary.insufficient_wallet_balance);
        assert!(!snapshot.summary.insufficient_storage_balance);
        assert_eq!(snapshot.summary.amount(FeeKind::NetworkGas), Some(GAS_FEE));
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_funds_estimate_is_a_warning() {
        let (orchestrator, _) = orchestrator(Fixture::new().engine());
        let action = UserAction::OwnershipChange { with_oracle: true };
        let request = SummaryRequest::new(account(), action);
        let estimator = || async { Ok::<_, FeeError>(EstimationResult::out_of_funds()) }.boxed();
        assert_eq!(
            orchestrator.refresh(&request, &estimator).await,
            Some(SummaryState::Warning)
        );
        let summary = orchestrator.snapshot().summary;
        assert_eq!(summary.amount(FeeKind::NetworkGas), None);
        assert_eq!(summary.amount(FeeKind::OracleFee), Some(1_000_000_000_000_000));
        assert!(summary.insufficient_wallet_balance);
    }

    #[tokio::test]
    async fn pricing_failure_clears_summary_and_reports_once() {
        let fixture = Fixture::new();
        let (orchestrator, recorder) = orchestrator(fixture.engine());
        let request = storage_request(UserAction::Upload {
            file_size: GB,
            quota_requirement: 0,
            with_validation: false,
        });
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );

        orchestrator.invalidate();
        fixture.chain.fail.store(true, Ordering::SeqCst);
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Error)
        );
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.state, SummaryState::Error);
        assert_eq!(snapshot.summary, FeeSummary::cleared());

        fixture.chain.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_auth_keeps_upload_pending() {
        let (orchestrator, recorder) = orchestrator(Fixture::new().engine());
        let request = SummaryRequest::new(
            account(),
            UserAction::Upload {
                file_size: 10,
                quota_requirement: 10,
                with_validation: false,
            },
        );
        assert_eq!(request.missing_input(), Some("storage auth"));
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Pending)
        );
        assert_eq!(*recorder.states.lock().unwrap(), vec![SummaryState::Pending]);
    }

    #[tokio::test]
    async fn quota_increase_adds_prepaid_week_and_relay_call() {
        let fixture = Fixture::new();
        let (orchestrator, _) = orchestrator(fixture.engine());
        let request = storage_request(UserAction::QuotaChange {
            new_quota_gb: 20,
            top_up: TOKEN / 10,
        });
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );
        let summary = orchestrator.snapshot().summary;
        let prepaid = 131_178_609_141_351 - 65_589_304_570_676;
        let relay = 2 * 406_000_000_000_000;
        assert_eq!(summary.amount(FeeKind::StorageSettlementFee), Some(100_000 + prepaid));
        assert_eq!(summary.amount(FeeKind::RelayFee), Some(relay));
        assert_eq!(summary.top_up, TOKEN / 10);
        assert_eq!(summary.required_wallet_balance, GAS_FEE + relay + TOKEN / 10);
        let current = 2_000 * u128::from(MONTH_SECS);
        assert_eq!(
            summary.next_netflow_per_month,
            Some(current + 562_194_039_177_216 - 281_097_019_588_608)
        );
    }

    #[tokio::test]
    async fn unchanged_quota_charges_no_delta_or_relay() {
        let fixture = Fixture::new();
        let (orchestrator, _) = orchestrator(fixture.engine());
        let request = storage_request(UserAction::QuotaChange {
            new_quota_gb: 10,
            top_up: 0,
        });
        orchestrator.refresh(&request, &gas(GAS_FEE)).await;
        let summary = orchestrator.snapshot().summary;
        assert_eq!(summary.amount(FeeKind::StorageSettlementFee), Some(100_000));
        assert_eq!(summary.amount(FeeKind::RelayFee), None);
        assert_eq!(summary.next_netflow_per_month, None);
    }

    #[tokio::test]
    async fn account_creation_pays_requested_relay_calls() {
        let (orchestrator, _) = orchestrator(Fixture::new().engine());
        let action = UserAction::AccountCreation { relay_calls: 2 };
        let request = SummaryRequest::new(account(), action);
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );
        let summary = orchestrator.snapshot().summary;
        let relay = 2 * 406_000_000_000_000;
        assert_eq!(summary.amount(FeeKind::RelayFee), Some(relay));
        assert_eq!(summary.amount(FeeKind::StorageSettlementFee), None);
        assert_eq!(summary.amount(FeeKind::StorageGasFee), None);
        assert_eq!(summary.required_storage_balance, relay);
        assert_eq!(summary.required_wallet_balance, GAS_FEE + relay);
    }

    #[tokio::test]
    async fn top_up_settles_and_pays_one_relay_call() {
        let (orchestrator, _) = orchestrator(Fixture::new().engine());
        let request = SummaryRequest::new(account(), UserAction::TopUp { amount: TOKEN / 10 });
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );
        let summary = orchestrator.snapshot().summary;
        let relay = 406_000_000_000_000;
        assert_eq!(summary.amount(FeeKind::RelayFee), Some(relay));
        assert_eq!(summary.amount(FeeKind::StorageSettlementFee), Some(100_000));
        assert_eq!(summary.top_up, TOKEN / 10);
        assert_eq!(summary.required_wallet_balance, GAS_FEE + relay + TOKEN / 10);
        assert_eq!(summary.required_storage_balance, 100_000 + relay);
    }

    #[tokio::test]
    async fn delete_pays_gas_per_object_without_settling() {
        let (orchestrator, _) = orchestrator(Fixture::new().engine());
        let request = SummaryRequest::new(account(), UserAction::Delete { objects: 3 });
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Ready)
        );
        let summary = orchestrator.snapshot().summary;
        let storage_gas = 3 * 1_200 * 5_000_000_000;
        assert_eq!(summary.amount(FeeKind::StorageGasFee), Some(storage_gas));
        assert_eq!(summary.amount(FeeKind::StorageSettlementFee), None);
        assert_eq!(summary.amount(FeeKind::RelayFee), None);
        assert_eq!(summary.required_storage_balance, storage_gas);
        assert_eq!(summary.required_wallet_balance, GAS_FEE);
    }

    #[tokio::test]
    async fn short_storage_and_quota_are_warnings() {
        let mut fixture = Fixture::new();
        fixture.storage.available_balance = 1;
        fixture.quota = QuotaInfo {
            read_quota: GB,
            consumed_quota: GB,
            ..QuotaInfo::default()
        };
        let (orchestrator, recorder) = orchestrator(fixture.engine());
        let request = storage_request(UserAction::Upload {
            file_size: 1_000,
            quota_requirement: 1_000,
            with_validation: false,
        });
        assert_eq!(
            orchestrator.refresh(&request, &gas(GAS_FEE)).await,
            Some(SummaryState::Warning)
        );
        let summary = orchestrator.snapshot().summary;
        assert!(summary.insufficient_storage_balance);
        assert!(summary.insufficient_quota);
        assert!(!summary.insufficient_wallet_balance);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
    }

    struct GatedEstimator {
        gate: Notify,
        entered: AtomicBool,
        fee: Wei,
    }

    #[async_trait]
    impl GasEstimator for GatedEstimator {
        async fn estimate(&self) -> Result<EstimationResult> {
            self.entered.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(EstimationResult::fee(self.fee))
        }
    }

    #[tokio::test]
    async fn superseded_computation_never_commits() {
        let (orchestrator, recorder) = orchestrator(Fixture::new().engine());
        let request = SummaryRequest::new(account(), UserAction::ContractCall);
        let slow = GatedEstimator {
            gate: Notify::new(),
            entered: AtomicBool::new(false),
            fee: 1,
        };
        let fast = gas(2);

        let first = orchestrator.refresh(&request, &slow);
        let second = async {
            assert!(slow.entered.load(Ordering::SeqCst));
            let state = orchestrator.refresh(&request, &fast).await;
            slow.gate.notify_one();
            state
        };
        let (stale, latest) = tokio::join!(first, second);

        assert_eq!(stale, None);
        assert_eq!(latest, Some(SummaryState::Ready));
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.summary.amount(FeeKind::NetworkGas), Some(2));
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![SummaryState::Loading, SummaryState::Loading, SummaryState::Ready]
        );
    }

    #[tokio::test]
    async fn projection_balance_is_cached_until_invalidated() {
        let fixture = Fixture::new();
        let storage = Arc::new(FakeStorage {
            balance: fixture.storage,
            reads: AtomicUsize::new(0),
        });
        let engine = fixture.engine_with_storage(storage.clone());
        let balance = engine.projected_account(publisher()).await.unwrap();
        assert_eq!(balance.change_rate, -2_000);
        engine.projected_account(publisher()).await.unwrap();
        assert_eq!(storage.reads.load(Ordering::SeqCst), 1);

        let (orchestrator, _) = orchestrator(engine.clone());
        orchestrator.invalidate();
        engine.projected_account(publisher()).await.unwrap();
        assert_eq!(storage.reads.load(Ordering::SeqCst), 2);
    }
}
