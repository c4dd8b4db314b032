// amm_sor_rs/src/pools/mod.rs
//! Pricing models, one per curve family.
//!
//! Every curve implements [`PoolPricing`]. The registry stores pools as the
//! [`PoolModel`] enum so a heterogeneous snapshot lives in one `Vec` without
//! trait objects; `PoolModel` forwards every call to the concrete curve.
//!
//! Conventions shared by all curves:
//!
//! * amounts and balances are human units (`f64`);
//! * the swap fee is taken from the input amount before the curve formula;
//! * "spot price" is always token-in paid per token-out received at the
//!   margin, fee included, for either swap direction;
//! * the derivative methods return the exact analytic derivative of the spot
//!   price with respect to the swap amount (input amount for exact-in, output
//!   amount for exact-out). The optimizer relies on them being consistent.

pub mod element;
pub mod stable;
pub mod stable_math;
pub mod weighted;

#[cfg(test)]
mod proptest_properties;

pub use element::ElementPool;
pub use stable::StablePool;
pub use weighted::WeightedPool;

use crate::snapshot::{PoolSnapshot, SnapshotToken};
use crate::types::{
    normalize_token, Amount, Fee, PoolFilter, PoolType, Price, Result, SorError, SwapType, Token,
};

/// Per-request inputs some curves need in addition to their balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PricingContext {
    /// Reference unix timestamp in seconds.
    pub timestamp: Option<u64>,
}

impl PricingContext {
    pub fn at(timestamp: u64) -> Self {
        Self {
            timestamp: Some(timestamp),
        }
    }
}

/// Curve specific part of [`PoolPairData`].
#[derive(Debug, Clone, PartialEq)]
pub enum CurveParams {
    Weighted {
        /// Normalized weights (fractions of the pool's total weight).
        weight_in: f64,
        weight_out: f64,
    },
    Stable {
        amp: f64,
        /// All pool balances, multiplied by their price rates.
        balances: Vec<Amount>,
        index_in: usize,
        index_out: usize,
        rate_in: f64,
        rate_out: f64,
        /// Invariant of `balances`.
        invariant: f64,
    },
    Element {
        total_shares: Amount,
        /// Remaining time to expiry as a fraction of the pool's unit seconds.
        time_fraction: f64,
        in_is_principal: bool,
    },
}

/// Direction-specific view of a pool for one (token in, token out) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPairData {
    pub pool_id: String,
    pub pool_type: PoolType,
    pub token_in: Token,
    pub token_out: Token,
    pub decimals_in: u32,
    pub decimals_out: u32,
    pub balance_in: Amount,
    pub balance_out: Amount,
    pub swap_fee: Fee,
    pub curve: CurveParams,
}

/// Capability set every curve family provides.
pub trait PoolPricing {
    fn id(&self) -> &str;

    fn address(&self) -> &str;

    fn pool_type(&self) -> PoolType;

    /// Member tokens in pool order.
    fn tokens(&self) -> Vec<Token>;

    fn balance_of(&self, token: &str) -> Option<Amount>;

    /// Builds the pair view for `token_in -> token_out`.
    ///
    /// # Errors
    /// `UnknownToken` if either token is not in the pool, `InvalidInput` for
    /// identical tokens, and curve specific failures (missing timestamp,
    /// invariant divergence).
    fn derive_pair_data(
        &self,
        token_in: &str,
        token_out: &str,
        ctx: &PricingContext,
    ) -> Result<PoolPairData>;

    /// Cheap depth proxy used to rank paths. Not used for exact pricing.
    fn normalized_liquidity(&self, pair: &PoolPairData) -> Result<Amount>;

    /// Largest amount (input for exact-in, output for exact-out) a single swap
    /// may use.
    fn swap_limit(&self, pair: &PoolPairData, swap_type: SwapType) -> Amount;

    fn exact_output_for_input(&self, pair: &PoolPairData, amount_in: Amount) -> Result<Amount>;

    fn exact_input_for_output(&self, pair: &PoolPairData, amount_out: Amount) -> Result<Amount>;

    /// Marginal price after swapping `amount` in the given direction.
    fn spot_price_after_swap(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price>;

    /// d(spot price)/d(amount) at `amount`.
    fn spot_price_derivative(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price>;

    /// Copy of the pool with one balance replaced.
    fn with_updated_balance(&self, token: &str, new_balance: Amount) -> Result<Self>
    where
        Self: Sized;
}

/// A parsed pool of any supported curve family.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolModel {
    Weighted(WeightedPool),
    Stable(StablePool),
    Element(ElementPool),
}

impl PoolModel {
    /// Parses a snapshot record.
    ///
    /// Returns `Ok(None)` for curve tags this crate does not price and for
    /// pools with swaps disabled, and `Err(InvalidInput)` for malformed
    /// curve parameters.
    pub fn from_snapshot(snapshot: &PoolSnapshot) -> Result<Option<Self>> {
        if snapshot.swap_enabled == Some(false) {
            return Ok(None);
        }
        let model = match snapshot.pool_type.as_str() {
            "Weighted" | "Investment" => {
                PoolModel::Weighted(WeightedPool::from_snapshot(snapshot, false)?)
            }
            "LiquidityBootstrapping" => {
                PoolModel::Weighted(WeightedPool::from_snapshot(snapshot, true)?)
            }
            "Stable" => PoolModel::Stable(StablePool::from_snapshot(snapshot, false)?),
            "MetaStable" => PoolModel::Stable(StablePool::from_snapshot(snapshot, true)?),
            "Element" => PoolModel::Element(ElementPool::from_snapshot(snapshot)?),
            _ => return Ok(None),
        };
        Ok(Some(model))
    }

    pub fn matches_filter(&self, filter: PoolFilter) -> bool {
        match (filter, self) {
            (PoolFilter::All, _) => true,
            (PoolFilter::Weighted, PoolModel::Weighted(pool)) => !pool.is_liquidity_bootstrapping(),
            (PoolFilter::LiquidityBootstrapping, PoolModel::Weighted(pool)) => {
                pool.is_liquidity_bootstrapping()
            }
            (PoolFilter::Stable, PoolModel::Stable(pool)) => !pool.is_meta(),
            (PoolFilter::MetaStable, PoolModel::Stable(pool)) => pool.is_meta(),
            (PoolFilter::Element, PoolModel::Element(_)) => true,
            _ => false,
        }
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.balance_of(token).is_some()
    }
}

macro_rules! dispatch {
    ($self:ident, $pool:ident => $body:expr) => {
        match $self {
            PoolModel::Weighted($pool) => $body,
            PoolModel::Stable($pool) => $body,
            PoolModel::Element($pool) => $body,
        }
    };
}

impl PoolPricing for PoolModel {
    fn id(&self) -> &str {
        dispatch!(self, pool => pool.id())
    }

    fn address(&self) -> &str {
        dispatch!(self, pool => pool.address())
    }

    fn pool_type(&self) -> PoolType {
        dispatch!(self, pool => pool.pool_type())
    }

    fn tokens(&self) -> Vec<Token> {
        dispatch!(self, pool => pool.tokens())
    }

    fn balance_of(&self, token: &str) -> Option<Amount> {
        dispatch!(self, pool => pool.balance_of(token))
    }

    fn derive_pair_data(
        &self,
        token_in: &str,
        token_out: &str,
        ctx: &PricingContext,
    ) -> Result<PoolPairData> {
        dispatch!(self, pool => pool.derive_pair_data(token_in, token_out, ctx))
    }

    fn normalized_liquidity(&self, pair: &PoolPairData) -> Result<Amount> {
        dispatch!(self, pool => pool.normalized_liquidity(pair))
    }

    fn swap_limit(&self, pair: &PoolPairData, swap_type: SwapType) -> Amount {
        dispatch!(self, pool => pool.swap_limit(pair, swap_type))
    }

    fn exact_output_for_input(&self, pair: &PoolPairData, amount_in: Amount) -> Result<Amount> {
        dispatch!(self, pool => pool.exact_output_for_input(pair, amount_in))
    }

    fn exact_input_for_output(&self, pair: &PoolPairData, amount_out: Amount) -> Result<Amount> {
        dispatch!(self, pool => pool.exact_input_for_output(pair, amount_out))
    }

    fn spot_price_after_swap(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        dispatch!(self, pool => pool.spot_price_after_swap(pair, amount, swap_type))
    }

    fn spot_price_derivative(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        dispatch!(self, pool => pool.spot_price_derivative(pair, amount, swap_type))
    }

    fn with_updated_balance(&self, token: &str, new_balance: Amount) -> Result<Self> {
        Ok(match self {
            PoolModel::Weighted(pool) => {
                PoolModel::Weighted(pool.with_updated_balance(token, new_balance)?)
            }
            PoolModel::Stable(pool) => PoolModel::Stable(pool.with_updated_balance(token, new_balance)?),
            PoolModel::Element(pool) => {
                PoolModel::Element(pool.with_updated_balance(token, new_balance)?)
            }
        })
    }
}

/// Counter amount of a swap through one pool: the output for exact-in, the
/// required input for exact-out. Zero amounts short-circuit to zero.
pub fn output_amount_swap(
    pool: &impl PoolPricing,
    pair: &PoolPairData,
    swap_type: SwapType,
    amount: Amount,
) -> Result<Amount> {
    if amount == 0.0 {
        return Ok(0.0);
    }
    match swap_type {
        SwapType::ExactIn => pool.exact_output_for_input(pair, amount),
        SwapType::ExactOut => pool.exact_input_for_output(pair, amount),
    }
}

/// Token held by a pool, as every curve stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolToken {
    pub address: Token,
    pub balance: Amount,
    pub decimals: u32,
}

impl PoolToken {
    pub(crate) fn from_snapshot(pool_id: &str, token: &SnapshotToken) -> Result<Self> {
        let address = normalize_token(&token.address);
        let balance = validate_balance(pool_id, &address, token.balance)?;
        Ok(Self {
            address,
            balance,
            decimals: token.decimals,
        })
    }
}

/// Position of `token` (already normalized) in `tokens`.
pub(crate) fn token_position(tokens: &[PoolToken], token: &str) -> Option<usize> {
    tokens.iter().position(|t| t.address == token)
}

/// Looks up both sides of a pair, rejecting identical or foreign tokens.
pub(crate) fn pair_positions(
    pool_id: &str,
    tokens: &[PoolToken],
    token_in: &str,
    token_out: &str,
) -> Result<(usize, usize)> {
    let token_in = normalize_token(token_in);
    let token_out = normalize_token(token_out);
    if token_in == token_out {
        return Err(SorError::InvalidInput(format!(
            "pool {pool_id}: token in and token out are both {token_in}"
        )));
    }
    let find = |token: Token| {
        token_position(tokens, &token).ok_or_else(|| SorError::UnknownToken {
            pool_id: pool_id.to_string(),
            token,
        })
    };
    Ok((find(token_in)?, find(token_out)?))
}

/// Copy of `tokens` with the balance of `token` replaced.
pub(crate) fn replace_balance(
    pool_id: &str,
    tokens: &[PoolToken],
    token: &str,
    new_balance: Amount,
) -> Result<Vec<PoolToken>> {
    let token = normalize_token(token);
    let new_balance = validate_balance(pool_id, &token, new_balance)?;
    let index = token_position(tokens, &token).ok_or_else(|| SorError::UnknownToken {
        pool_id: pool_id.to_string(),
        token,
    })?;
    let mut updated = tokens.to_vec();
    updated[index].balance = new_balance;
    Ok(updated)
}

/// Shared swap limit rule: a fixed fraction of the relevant balance.
pub(crate) fn ratio_limit(pair: &PoolPairData, swap_type: SwapType) -> Amount {
    match swap_type {
        SwapType::ExactIn => pair.balance_in * crate::constants::MAX_IN_RATIO,
        SwapType::ExactOut => pair.balance_out * crate::constants::MAX_OUT_RATIO,
    }
}

/// Rejects fees outside `[0, 1)`.
pub(crate) fn validate_fee(pool_id: &str, fee: Fee) -> Result<Fee> {
    if fee.is_finite() && (0.0..1.0).contains(&fee) {
        Ok(fee)
    } else {
        Err(SorError::InvalidInput(format!(
            "pool {pool_id}: swap fee must be in [0, 1), got {fee}"
        )))
    }
}

/// Rejects negative or non-finite balances.
pub(crate) fn validate_balance(pool_id: &str, token: &str, balance: Amount) -> Result<Amount> {
    if balance.is_finite() && balance >= 0.0 {
        Ok(balance)
    } else {
        Err(SorError::InvalidInput(format!(
            "pool {pool_id}: balance of {token} must be non-negative, got {balance}"
        )))
    }
}
