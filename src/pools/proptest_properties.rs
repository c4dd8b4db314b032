//! Property-based checks on the curve families.
//!
//! 1. **Monotonicity**: more in gives more out, and the spot price never
//!    falls as the swap grows.
//! 2. **Derivative agreement**: the analytic derivative matches a central
//!    finite difference of the spot price.
//! 3. **Round trip**: a zero-fee weighted swap inverts exactly.
//! 4. **Invariant preservation**: a stable swap keeps `D` fixed.
//! 5. **Limit boundary**: pricing at the swap limit stays finite.

use approx::relative_eq;
use proptest::prelude::*;

use super::stable_math::calculate_invariant;
use super::{PoolModel, PoolPairData, PoolPricing, PricingContext};
use crate::snapshot::fixtures;
use crate::types::SwapType;

const EXPIRY: u64 = 2_000_000_000;
const UNIT: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Pool factories
// ---------------------------------------------------------------------------

fn make_weighted(ba: f64, bb: f64, wa: f64, fee: f64) -> PoolModel {
    let snapshot = fixtures::weighted(
        "pw",
        vec![
            fixtures::token("0xa", ba, Some(wa)),
            fixtures::token("0xb", bb, Some(1.0 - wa)),
        ],
        fee,
    );
    let Ok(Some(pool)) = PoolModel::from_snapshot(&snapshot) else {
        panic!("valid weighted pool");
    };
    pool
}

fn make_stable(ba: f64, bb: f64, amp: f64, fee: f64) -> PoolModel {
    let snapshot = fixtures::stable(
        "ps",
        vec![fixtures::token("0xa", ba, None), fixtures::token("0xb", bb, None)],
        amp,
        fee,
    );
    let Ok(Some(pool)) = PoolModel::from_snapshot(&snapshot) else {
        panic!("valid stable pool");
    };
    pool
}

fn make_element(base: f64, principal: f64, fee: f64) -> PoolModel {
    let snapshot = fixtures::element(
        "pe",
        fixtures::token("0xa", base, None),
        fixtures::token("0xb", principal, None),
        principal,
        EXPIRY,
        UNIT,
        fee,
    );
    let Ok(Some(pool)) = PoolModel::from_snapshot(&snapshot) else {
        panic!("valid element pool");
    };
    pool
}

fn pair_of(pool: &PoolModel) -> PoolPairData {
    let ctx = PricingContext::at(EXPIRY - UNIT / 3);
    let Ok(pair) = pool.derive_pair_data("0xa", "0xb", &ctx) else {
        panic!("pair data for 0xa -> 0xb");
    };
    pair
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn balance_strategy() -> impl Strategy<Value = f64> {
    (1_000u32..=5_000_000u32).prop_map(f64::from)
}

fn weight_strategy() -> impl Strategy<Value = f64> {
    (10u32..=90u32).prop_map(|w| f64::from(w) / 100.0)
}

fn fee_strategy() -> impl Strategy<Value = f64> {
    (0u32..=100u32).prop_map(|bp| f64::from(bp) / 10_000.0)
}

fn amp_strategy() -> impl Strategy<Value = f64> {
    (1u32..=2_000u32).prop_map(f64::from)
}

/// Fraction of the swap limit, kept away from zero.
fn fraction_strategy() -> impl Strategy<Value = f64> {
    (1u32..=99u32).prop_map(|f| f64::from(f) / 100.0)
}

fn all_pools() -> impl Strategy<Value = PoolModel> {
    prop_oneof![
        (balance_strategy(), balance_strategy(), weight_strategy(), fee_strategy())
            .prop_map(|(ba, bb, wa, fee)| make_weighted(ba, bb, wa, fee)),
        (balance_strategy(), amp_strategy(), fee_strategy())
            .prop_map(|(b, amp, fee)| make_stable(b, b * 1.3, amp, fee)),
        (balance_strategy(), balance_strategy(), fee_strategy())
            .prop_map(|(base, pt, fee)| make_element(base, pt, fee)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_output_and_price_are_monotone(pool in all_pools(), f in fraction_strategy()) {
        let pair = pair_of(&pool);
        for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
            let limit = pool.swap_limit(&pair, swap_type);
            let (small, large) = (limit * f * 0.5, limit * f);
            let Ok(sp_small) = pool.spot_price_after_swap(&pair, small, swap_type) else {
                return Err(TestCaseError::fail("spot price at small amount"));
            };
            let Ok(sp_large) = pool.spot_price_after_swap(&pair, large, swap_type) else {
                return Err(TestCaseError::fail("spot price at large amount"));
            };
            prop_assert!(sp_large >= sp_small * (1.0 - 1e-12), "{sp_small} > {sp_large}");
            let Ok(derivative) = pool.spot_price_derivative(&pair, large, swap_type) else {
                return Err(TestCaseError::fail("derivative"));
            };
            prop_assert!(derivative >= 0.0);
        }
        let limit = pool.swap_limit(&pair, SwapType::ExactIn);
        let (Ok(out_small), Ok(out_large)) = (
            pool.exact_output_for_input(&pair, limit * f * 0.5),
            pool.exact_output_for_input(&pair, limit * f),
        ) else {
            return Err(TestCaseError::fail("exact output"));
        };
        prop_assert!(out_large > out_small && out_small > 0.0);
    }

    #[test]
    fn prop_derivative_matches_finite_difference(
        ba in balance_strategy(),
        bb in balance_strategy(),
        wa in weight_strategy(),
        fee in fee_strategy(),
        f in fraction_strategy(),
    ) {
        for pool in [make_weighted(ba, bb, wa, fee), make_element(ba, bb, fee)] {
            let pair = pair_of(&pool);
            for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
                let amount = pool.swap_limit(&pair, swap_type) * f;
                let h = amount * 1e-5;
                let (Ok(up), Ok(down), Ok(analytic)) = (
                    pool.spot_price_after_swap(&pair, amount + h, swap_type),
                    pool.spot_price_after_swap(&pair, amount - h, swap_type),
                    pool.spot_price_derivative(&pair, amount, swap_type),
                ) else {
                    return Err(TestCaseError::fail("pricing failed"));
                };
                let numeric = (up - down) / (2.0 * h);
                prop_assert!(
                    relative_eq!(analytic, numeric, epsilon = 1e-12, max_relative = 1e-4),
                    "{swap_type:?}: analytic {analytic} vs numeric {numeric}"
                );
            }
        }
    }

    #[test]
    fn prop_zero_fee_weighted_round_trip(
        ba in balance_strategy(),
        bb in balance_strategy(),
        wa in weight_strategy(),
        f in fraction_strategy(),
    ) {
        let pool = make_weighted(ba, bb, wa, 0.0);
        let pair = pair_of(&pool);
        let amount_in = pool.swap_limit(&pair, SwapType::ExactIn) * f;
        let Ok(out) = pool.exact_output_for_input(&pair, amount_in) else {
            return Err(TestCaseError::fail("exact output"));
        };
        let Ok(back) = pool.exact_input_for_output(&pair, out) else {
            return Err(TestCaseError::fail("exact input"));
        };
        prop_assert!(relative_eq!(back, amount_in, max_relative = 1e-9));
    }

    #[test]
    fn prop_stable_swap_preserves_invariant(
        ba in balance_strategy(),
        amp in amp_strategy(),
        f in fraction_strategy(),
    ) {
        let bb = ba * 0.7;
        let pool = make_stable(ba, bb, amp, 0.0);
        let pair = pair_of(&pool);
        let amount_in = pool.swap_limit(&pair, SwapType::ExactIn) * f;
        let Ok(out) = pool.exact_output_for_input(&pair, amount_in) else {
            return Err(TestCaseError::fail("exact output"));
        };
        let (Ok(before), Ok(after)) = (
            calculate_invariant(amp, &[ba, bb]),
            calculate_invariant(amp, &[ba + amount_in, bb - out]),
        ) else {
            return Err(TestCaseError::fail("invariant"));
        };
        prop_assert!(relative_eq!(before, after, max_relative = 1e-9));
    }

    #[test]
    fn prop_pricing_at_limit_is_finite(pool in all_pools()) {
        let pair = pair_of(&pool);
        for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
            let limit = pool.swap_limit(&pair, swap_type);
            let Ok(price) = pool.spot_price_after_swap(&pair, limit, swap_type) else {
                return Err(TestCaseError::fail("spot price at limit"));
            };
            prop_assert!(price.is_finite() && price > 0.0);
        }
    }
}
