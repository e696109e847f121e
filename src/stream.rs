//! Payment stream checkpoints and their time-based projection.

use crate::accessors::ChainStateReader;
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::units::num_string;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix of per-account stream record cache keys.
pub const STREAM_KEY_PREFIX: &str = "GF_FEE_STREAM_RECORD";

/// Last on-chain checkpoint of an account's payment stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Account owning the stream.
    pub account: Address,
    /// Per-second balance change; negative while paying for storage.
    #[serde(with = "num_string")]
    pub netflow_rate_per_second: i128,
    /// Balance at the checkpoint.
    #[serde(with = "num_string")]
    pub static_balance: i128,
    /// Reserve held against future outflow.
    #[serde(with = "num_string")]
    pub buffer_balance: i128,
    /// Balance locked for objects not sealed yet.
    #[serde(with = "num_string")]
    pub lock_balance: i128,
    /// Unix time of the checkpoint, in seconds.
    pub crud_timestamp: u64,
}

impl StreamRecord {
    /// Record of an account that has no stream yet, checkpointed at `now`.
    pub fn empty(account: Address, now: u64) -> Self {
        Self {
            account,
            netflow_rate_per_second: 0,
            static_balance: 0,
            buffer_balance: 0,
            lock_balance: 0,
            crud_timestamp: now,
        }
    }

    /// Seconds elapsed from the checkpoint to `at`; zero for earlier instants.
    pub fn elapsed_at(&self, at: u64) -> u64 {
        at.saturating_sub(self.crud_timestamp)
    }
}

/// Balance of a stream projected to a later instant. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectedBalance {
    /// `static + netflow * elapsed`.
    pub dynamic_balance: i128,
    /// `buffer + lock + min(0, dynamic)`.
    pub locked_fee: i128,
}

/// Projects `record` to unix time `at`.
pub fn project_balance(record: &StreamRecord, at: u64) -> ProjectedBalance {
    let elapsed = i128::from(record.elapsed_at(at));
    let dynamic_balance = record
        .static_balance
        .saturating_add(record.netflow_rate_per_second.saturating_mul(elapsed));
    let locked_fee = record
        .buffer_balance
        .saturating_add(record.lock_balance)
        .saturating_add(dynamic_balance.min(0));
    ProjectedBalance {
        dynamic_balance,
        locked_fee,
    }
}

/// Cached reader of stream records.
pub struct StreamAccounting {
    chain: Arc<dyn ChainStateReader>,
    cache: Arc<TtlCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl StreamAccounting {
    /// Builds a reader over the shared cache.
    pub fn new(
        chain: Arc<dyn ChainStateReader>,
        cache: Arc<TtlCache>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            clock,
            ttl,
        }
    }

    /// Cache key of `account`'s record.
    pub fn cache_key(account: Address) -> String {
        format!("{STREAM_KEY_PREFIX}-{account}")
    }

    /// Latest stream record of `account`.
    ///
    /// Accounts without a stream (or an unreachable chain) yield an empty
    /// record checkpointed now, so fee computation keeps working for new
    /// publishers. The fallback is not cached.
    pub async fn stream_record(&self, account: Address) -> StreamRecord {
        let chain = self.chain.clone();
        let loaded = self
            .cache
            .get_or_load(&Self::cache_key(account), self.ttl, move || async move {
                chain.stream_record(account).await
            })
            .await;
        match loaded {
            Ok(record) => {
                debug!(%account, rate = record.netflow_rate_per_second, "stream record");
                record
            }
            Err(err) => {
                warn!(%account, error = %err, "stream record unavailable, using empty record");
                StreamRecord::empty(account, self.clock.now_secs())
            }
        }
    }

    /// Current time according to the engine clock.
    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pricing::tests::FakeChain;
    use std::sync::atomic::Ordering;

    fn record(rate: i128, static_balance: i128, crud: u64) -> StreamRecord {
        StreamRecord {
            account: Address::repeat_byte(0x11),
            netflow_rate_per_second: rate,
            static_balance,
            buffer_balance: 500,
            lock_balance: 20,
            crud_timestamp: crud,
        }
    }

    #[test]
    fn draining_stream_projects_down() {
        let projected = project_balance(&record(-3, 1_000, 100), 200);
        assert_eq!(projected.dynamic_balance, 700);
        assert_eq!(projected.locked_fee, 520);
    }

    #[test]
    fn overdrawn_stream_reduces_locked_fee() {
        let projected = project_balance(&record(-10, 100, 0), 50);
        assert_eq!(projected.dynamic_balance, -400);
        assert_eq!(projected.locked_fee, 120);
    }

    #[test]
    fn projection_before_checkpoint_is_the_checkpoint() {
        let projected = project_balance(&record(7, 10, 1_000), 900);
        assert_eq!(projected.dynamic_balance, 10);
    }

    #[test]
    fn serde_round_trips_chain_strings() {
        let json = r#"{
            "account": "0x7eeE0E672244f9f199C4d5B644D4351d14ee7D41",
            "netflow_rate_per_second": "-1252935057",
            "static_balance": "0",
            "buffer_balance": "757775122473600",
            "lock_balance": 0,
            "crud_timestamp": 1742314208
        }"#;
        let parsed: StreamRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.netflow_rate_per_second, -1_252_935_057);
        assert_eq!(parsed.buffer_balance, 757_775_122_473_600);
    }

    #[tokio::test]
    async fn missing_stream_falls_back_to_empty_record_without_caching() {
        let chain = Arc::new(FakeChain::standard());
        let cache = Arc::new(TtlCache::new());
        let accounting = StreamAccounting::new(
            chain.clone(),
            cache.clone(),
            Arc::new(ManualClock::new(5_000)),
            Duration::from_secs(60),
        );
        let account = Address::repeat_byte(0x22);
        let first = accounting.stream_record(account).await;
        assert_eq!(first, StreamRecord::empty(account, 5_000));
        assert!(cache.is_empty());

        accounting.stream_record(account).await;
        assert_eq!(chain.stream_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn known_stream_is_cached_per_account() {
        let mut chain = FakeChain::standard();
        let account = Address::repeat_byte(0x33);
        chain.streams.insert(account, StreamRecord::empty(account, 10));
        let chain = Arc::new(chain);
        let accounting = StreamAccounting::new(
            chain.clone(),
            Arc::new(TtlCache::new()),
            Arc::new(ManualClock::new(20)),
            Duration::from_secs(60),
        );
        assert_eq!(accounting.stream_record(account).await.crud_timestamp, 10);
        accounting.stream_record(account).await;
        assert_eq!(chain.stream_reads.load(Ordering::SeqCst), 1);
    }
}
