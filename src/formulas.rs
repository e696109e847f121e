//! Pure fee formulas.
//!
//! Every formula keeps the whole product exact in 256-bit fixed point and
//! rounds up once at the end: a quoted fee never under-charges. Formulas do
//! not catch errors; they either compute or report overflow.

use crate::config::RelayFees;
use crate::dec::{ceil_div, scale, to_wei};
use crate::error::{FeeError, Result};
use crate::pricing::PricingParameters;
use crate::stream::StreamRecord;
use crate::units::{gb_to_bytes, Wei};
use alloy_primitives::U256;

fn mul(a: U256, b: U256, context: &'static str) -> Result<U256> {
    a.checked_mul(b).ok_or(FeeError::Overflow(context))
}

fn add(a: U256, b: U256, context: &'static str) -> Result<U256> {
    a.checked_add(b).ok_or(FeeError::Overflow(context))
}

/// Applies validator tax and duration to a per-second rate expressed at
/// `10^18` scale, then rounds up to wei.
fn taxed_total(
    rate_raw: U256,
    tax_rate_raw: U256,
    duration_secs: u64,
    context: &'static str,
) -> Result<Wei> {
    let taxed = mul(rate_raw, add(scale(), tax_rate_raw, context)?, context)?;
    let total = mul(taxed, U256::from(duration_secs), context)?;
    let rounded = ceil_div(total, scale() * scale())?;
    to_wei(rounded, context)
}

/// Read quota cost of `size_bytes` over `duration_secs`:
/// `ceil((read * size) * (1 + tax) * duration)`.
pub fn quota_netflow_rate(
    params: &PricingParameters,
    size_bytes: u64,
    duration_secs: u64,
) -> Result<Wei> {
    let rate = mul(
        params.read_price_per_byte.raw(),
        U256::from(size_bytes),
        "quota netflow",
    )?;
    taxed_total(rate, params.validator_tax_rate.raw(), duration_secs, "quota netflow")
}

/// Storage cost of an object of `size_bytes` over `duration_secs`.
///
/// Unless `charge_as_is` is set, objects below the minimum charge size are
/// billed as that size. Secondary providers are paid once per data and
/// parity chunk.
pub fn storage_netflow_rate(
    params: &PricingParameters,
    size_bytes: u64,
    duration_secs: u64,
    charge_as_is: bool,
) -> Result<Wei> {
    let charge_size = if charge_as_is {
        size_bytes
    } else {
        size_bytes.max(params.min_charge_size)
    };
    let secondary = mul(
        params.secondary_store_price_per_byte.raw(),
        U256::from(params.secondary_providers()),
        "storage netflow",
    )?;
    let per_byte = add(params.primary_store_price_per_byte.raw(), secondary, "storage netflow")?;
    let rate = mul(per_byte, U256::from(charge_size), "storage netflow")?;
    taxed_total(rate, params.validator_tax_rate.raw(), duration_secs, "storage netflow")
}

/// Amount needed to bring a stream's checkpoint up to `now`:
/// `|netflow * (now - crud)|`, whatever the direction of the flow.
pub fn settlement_fee(record: &StreamRecord, now: u64) -> Result<Wei> {
    let elapsed = i128::from(record.elapsed_at(now));
    let accrued = record
        .netflow_rate_per_second
        .checked_mul(elapsed)
        .ok_or(FeeError::Overflow("settlement fee"))?;
    Ok(accrued.unsigned_abs())
}

/// Fixed message gas priced at the current gas price.
pub fn storage_gas_fee(gas_units: u128, gas_price: Wei) -> Result<Wei> {
    gas_units
        .checked_mul(gas_price)
        .ok_or(FeeError::Overflow("storage gas fee"))
}

/// Number of cross-chain calls an action triggers.
///
/// A top-up and a quota change each add one call on top of the explicitly
/// requested ones. A quota "change" to the current value adds nothing.
pub fn relay_call_count(explicit_calls: u32, top_up: bool, quota_changed: bool) -> u32 {
    explicit_calls
        .saturating_add(u32::from(top_up))
        .saturating_add(u32::from(quota_changed))
}

/// `(relayFee + minAckRelayFee) * calls`.
pub fn relay_fee(fees: &RelayFees, calls: u32) -> Result<Wei> {
    fees.relay_fee
        .checked_add(fees.min_ack_relay_fee)
        .and_then(|per_call| per_call.checked_mul(u128::from(calls)))
        .ok_or(FeeError::Overflow("relay fee"))
}

/// Signed change of the quota cost over `duration_secs` when moving from
/// `current_gb` to `new_gb`. Zero when the quota does not change.
pub fn quota_netflow_delta(
    params: &PricingParameters,
    current_gb: u64,
    new_gb: u64,
    duration_secs: u64,
) -> Result<i128> {
    if current_gb == new_gb {
        return Ok(0);
    }
    let new_rate = quota_netflow_rate(params, gb_to_bytes(new_gb), duration_secs)?;
    let current_rate = quota_netflow_rate(params, gb_to_bytes(current_gb), duration_secs)?;
    signed_difference(new_rate, current_rate)
}

/// `a - b` as a signed amount, computed from the absolute difference so that
/// a shrinking quota never wraps.
pub fn signed_difference(a: Wei, b: Wei) -> Result<i128> {
    let magnitude = i128::try_from(a.abs_diff(b)).map_err(|_| FeeError::Overflow("difference"))?;
    Ok(if a >= b { magnitude } else { -magnitude })
}

/// Outflow magnitude after applying a signed change; a change larger than
/// the current outflow flips into its absolute remainder.
pub fn shift_outflow(current_outflow: Wei, delta: i128) -> Wei {
    if delta >= 0 {
        current_outflow.saturating_add(delta.unsigned_abs())
    } else {
        current_outflow.abs_diff(delta.unsigned_abs())
    }
}

/// Adds a signed adjustment to a fee, flooring at zero.
pub fn adjust_fee(fee: Wei, delta: i128) -> Wei {
    if delta >= 0 {
        fee.saturating_add(delta.unsigned_abs())
    } else {
        fee.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{GB, MONTH_SECS, WEEK_SECS};
    use alloy_primitives::Address;
    use proptest::prelude::*;

    fn params() -> PricingParameters {
        PricingParameters {
            read_price_per_byte: "0.01".parse().unwrap(),
            primary_store_price_per_byte: "0.01".parse().unwrap(),
            secondary_store_price_per_byte: "0.001".parse().unwrap(),
            validator_tax_rate: "0.01".parse().unwrap(),
            min_charge_size: 131_072,
            redundant_data_chunks: 4,
            redundant_parity_chunks: 2,
            reserve_time_seconds: WEEK_SECS,
        }
    }

    fn stream(rate: i128, crud: u64) -> StreamRecord {
        StreamRecord {
            netflow_rate_per_second: rate,
            ..StreamRecord::empty(Address::ZERO, crud)
        }
    }

    #[test]
    fn one_gib_for_thirty_days() {
        // ceil((0.01 * 1GiB + 0.001 * 1GiB * 6) * 1.01 * 2_592_000)
        let fee = storage_netflow_rate(&params(), GB, MONTH_SECS, false).unwrap();
        assert_eq!(fee, 44_975_523_134_178);
    }

    #[test]
    fn small_objects_pay_the_minimum_charge_size() {
        let p = params();
        let tiny = storage_netflow_rate(&p, 1, 1, false).unwrap();
        let minimum = storage_netflow_rate(&p, p.min_charge_size, 1, false).unwrap();
        assert_eq!(tiny, minimum);
        assert!(storage_netflow_rate(&p, 1, 1, true).unwrap() < minimum);
        assert_eq!(storage_netflow_rate(&p, 0, MONTH_SECS, true).unwrap(), 0);
    }

    #[test]
    fn quota_rate_matches_closed_form() {
        // 0.01 * 1.01 * 10GiB * month
        assert_eq!(
            quota_netflow_rate(&params(), 10 * GB, MONTH_SECS).unwrap(),
            281_097_019_588_608
        );
        assert_eq!(quota_netflow_rate(&params(), 0, MONTH_SECS).unwrap(), 0);
    }

    #[test]
    fn fractional_results_round_up() {
        let mut p = params();
        p.read_price_per_byte = "0.000000000000000001".parse().unwrap();
        p.validator_tax_rate = "0".parse().unwrap();
        assert_eq!(quota_netflow_rate(&p, 1, 1).unwrap(), 1);
    }

    #[test]
    fn settlement_is_charged_in_both_directions() {
        assert_eq!(settlement_fee(&stream(-1_252_935_057, 100), 110).unwrap(), 12_529_350_570);
        assert_eq!(settlement_fee(&stream(40, 100), 110).unwrap(), 400);
        assert_eq!(settlement_fee(&stream(40, 100), 90).unwrap(), 0);
    }

    #[test]
    fn relay_calls_and_fees() {
        let fees = RelayFees {
            relay_fee: 6_000_000_000_000,
            min_ack_relay_fee: 400_000_000_000_000,
        };
        assert_eq!(relay_call_count(1, true, true), 3);
        assert_eq!(relay_call_count(0, false, false), 0);
        assert_eq!(relay_fee(&fees, 2).unwrap(), 812_000_000_000_000);
        assert_eq!(relay_fee(&fees, 0).unwrap(), 0);
    }

    #[test]
    fn unchanged_quota_costs_nothing_extra() {
        assert_eq!(quota_netflow_delta(&params(), 10, 10, MONTH_SECS).unwrap(), 0);
        assert_eq!(relay_call_count(0, false, 10 != 10), 0);
    }

    #[test]
    fn shrinking_quota_yields_negative_delta() {
        let up = quota_netflow_delta(&params(), 10, 20, WEEK_SECS).unwrap();
        let down = quota_netflow_delta(&params(), 20, 10, WEEK_SECS).unwrap();
        assert_eq!(up, 131_178_609_141_351 - 65_589_304_570_676);
        assert_eq!(down, -up);
        assert_eq!(adjust_fee(10, down), 0);
        assert_eq!(adjust_fee(10, 5), 15);
    }

    #[test]
    fn outflow_shift_never_goes_negative() {
        assert_eq!(shift_outflow(100, 50), 150);
        assert_eq!(shift_outflow(100, -30), 70);
        assert_eq!(shift_outflow(100, -130), 30);
    }

    #[test]
    fn gas_fee_overflow_is_reported() {
        assert_eq!(storage_gas_fee(12_000, 5).unwrap(), 60_000);
        assert!(storage_gas_fee(u128::MAX, 2).is_err());
    }

    proptest! {
        #[test]
        fn storage_rate_is_monotonic(
            size in 0u64..(64 * GB),
            extra_size in 0u64..GB,
            secs in 0u64..(10 * MONTH_SECS),
            extra_secs in 0u64..MONTH_SECS,
            as_is in any::<bool>(),
        ) {
            let p = params();
            let base = storage_netflow_rate(&p, size, secs, as_is).unwrap();
            let bigger = storage_netflow_rate(&p, size + extra_size, secs, as_is).unwrap();
            let longer = storage_netflow_rate(&p, size, secs + extra_secs, as_is).unwrap();
            prop_assert!(bigger >= base);
            prop_assert!(longer >= base);
        }

        #[test]
        fn quota_rate_is_monotonic(
            size in 0u64..(64 * GB),
            extra in 0u64..GB,
            secs in 0u64..MONTH_SECS,
        ) {
            let p = params();
            let base = quota_netflow_rate(&p, size, secs).unwrap();
            prop_assert!(quota_netflow_rate(&p, size + extra, secs).unwrap() >= base);
        }

        #[test]
        fn settlement_is_continuous(
            rate in -10_000_000_000i128..10_000_000_000i128,
            crud in 0u64..1_000_000,
            t in 0u64..1_000_000,
            eps in 0u64..1_000,
        ) {
            let record = stream(rate, crud);
            let now = crud + t;
            let before = settlement_fee(&record, now).unwrap();
            let after = settlement_fee(&record, now + eps).unwrap();
            prop_assert!(after.abs_diff(before) <= rate.unsigned_abs() * u128::from(eps));
        }
    }
}
