// amm_sor_rs/src/pools/element.rs
use super::{
    pair_positions, ratio_limit, replace_balance, validate_fee, CurveParams, PoolPairData,
    PoolPricing, PoolToken, PricingContext,
};
use crate::snapshot::PoolSnapshot;
use crate::types::{
    ensure_amount, ensure_finite, normalize_token, Amount, Fee, PoolType, Price, Result, SorError,
    SwapType, Token,
};

/// Convergent curve pool pairing a base asset with the principal token that
/// redeems for it at expiry.
///
/// Trading function, with `t` the remaining time as a fraction of
/// `unit_seconds` and `a = 1 - t`:
///
/// ```text
/// x^a + y^a = k
/// ```
///
/// The principal token's reserve counts the pool's total shares on top of its
/// balance. At expiry `t = 0` and the curve becomes constant sum.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementPool {
    id: String,
    address: String,
    tokens: Vec<PoolToken>,
    swap_fee: Fee,
    total_shares: Amount,
    expiry_time: u64,
    unit_seconds: u64,
    principal_token: Token,
    base_token: Token,
}

// Curve state for one pair after the principal reserve adjustment.
struct Reserves {
    x: f64,
    y: f64,
    t: f64,
    gamma: f64,
}

impl Reserves {
    fn from_pair(pair: &PoolPairData) -> Result<Self> {
        match pair.curve {
            CurveParams::Element {
                total_shares,
                time_fraction,
                in_is_principal,
            } => {
                let (x, y) = if in_is_principal {
                    (pair.balance_in + total_shares, pair.balance_out)
                } else {
                    (pair.balance_in, pair.balance_out + total_shares)
                };
                Ok(Self {
                    x,
                    y,
                    t: time_fraction,
                    gamma: 1.0 - pair.swap_fee,
                })
            }
            _ => Err(SorError::InvalidInput(format!(
                "pool {}: pair data is not for an element curve",
                pair.pool_id
            ))),
        }
    }

    fn exponent(&self) -> f64 {
        1.0 - self.t
    }

    fn k(&self) -> f64 {
        let a = self.exponent();
        self.x.powf(a) + self.y.powf(a)
    }

    // Solves the other coordinate on the curve. A coordinate past the curve's
    // reach has no counterpart.
    fn counterpart(&self, coordinate: f64) -> Result<f64> {
        let a = self.exponent();
        let remainder = self.k() - coordinate.powf(a);
        if !(remainder > 0.0) {
            return Err(SorError::NumericDivergence {
                solver: "element curve",
                iterations: 0,
            });
        }
        ensure_finite(remainder.powf(1.0 / a), "element curve")
    }

    /// Post-swap reserves (input side, output side).
    fn after(&self, amount: Amount, swap_type: SwapType) -> Result<(f64, f64)> {
        match swap_type {
            SwapType::ExactIn => {
                let s = self.x + amount * self.gamma;
                Ok((s, self.counterpart(s)?))
            }
            SwapType::ExactOut => {
                let y = self.y - amount;
                if !(y > 0.0) {
                    return Err(SorError::NumericDivergence {
                        solver: "element curve",
                        iterations: 0,
                    });
                }
                Ok((self.counterpart(y)?, y))
            }
        }
    }
}

impl ElementPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        tokens: Vec<PoolToken>,
        swap_fee: Fee,
        total_shares: Amount,
        expiry_time: u64,
        unit_seconds: u64,
        principal_token: &str,
        base_token: &str,
    ) -> Result<Self> {
        let id: String = id.into();
        let address: String = address.into();
        let principal_token = normalize_token(principal_token);
        let base_token = normalize_token(base_token);
        if tokens.len() != 2 || unit_seconds == 0 {
            return Err(SorError::InvalidInput(format!(
                "element pool {id}: needs exactly two tokens and positive unit seconds"
            )));
        }
        let holds = |token: &str| tokens.iter().any(|t| t.address == token);
        if principal_token == base_token || !holds(&principal_token) || !holds(&base_token) {
            return Err(SorError::InvalidInput(format!(
                "element pool {id}: principal and base token must be the two pool tokens"
            )));
        }
        if !(total_shares.is_finite() && total_shares >= 0.0) {
            return Err(SorError::InvalidInput(format!(
                "element pool {id}: total shares must be non-negative"
            )));
        }
        let swap_fee = validate_fee(&id, swap_fee)?;
        Ok(Self {
            address: normalize_token(&address),
            id,
            tokens,
            swap_fee,
            total_shares,
            expiry_time,
            unit_seconds,
            principal_token,
            base_token,
        })
    }

    pub(crate) fn from_snapshot(snapshot: &PoolSnapshot) -> Result<Self> {
        let missing = |field: &str| {
            SorError::InvalidInput(format!("element pool {}: missing {field}", snapshot.id))
        };
        let tokens = snapshot
            .tokens
            .iter()
            .map(|t| PoolToken::from_snapshot(&snapshot.id, t))
            .collect::<Result<Vec<_>>>()?;
        Self::new(
            snapshot.id.clone(),
            snapshot.address.clone(),
            tokens,
            snapshot.swap_fee,
            snapshot.total_shares,
            snapshot.expiry_time.ok_or_else(|| missing("expiryTime"))?,
            snapshot.unit_seconds.ok_or_else(|| missing("unitSeconds"))?,
            snapshot
                .principal_token
                .as_deref()
                .ok_or_else(|| missing("principalToken"))?,
            snapshot
                .base_token
                .as_deref()
                .ok_or_else(|| missing("baseToken"))?,
        )
    }

    pub fn principal_token(&self) -> &str {
        &self.principal_token
    }

    pub fn base_token(&self) -> &str {
        &self.base_token
    }

    /// Remaining time to expiry in units of `unit_seconds`, zero once expired.
    pub fn time_fraction(&self, timestamp: u64) -> f64 {
        self.expiry_time.saturating_sub(timestamp) as f64 / self.unit_seconds as f64
    }
}

impl PoolPricing for ElementPool {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn pool_type(&self) -> PoolType {
        PoolType::Element
    }

    fn tokens(&self) -> Vec<Token> {
        self.tokens.iter().map(|t| t.address.clone()).collect()
    }

    fn balance_of(&self, token: &str) -> Option<Amount> {
        let token = normalize_token(token);
        self.tokens
            .iter()
            .find(|t| t.address == token)
            .map(|t| t.balance)
    }

    fn derive_pair_data(
        &self,
        token_in: &str,
        token_out: &str,
        ctx: &PricingContext,
    ) -> Result<PoolPairData> {
        let (i, o) = pair_positions(&self.id, &self.tokens, token_in, token_out)?;
        let timestamp = ctx.timestamp.ok_or_else(|| SorError::MissingTimestamp {
            pool_id: self.id.clone(),
        })?;
        let time_fraction = self.time_fraction(timestamp);
        if time_fraction >= 1.0 {
            return Err(SorError::InvalidInput(format!(
                "element pool {}: {time_fraction} unit periods to expiry, must be below one",
                self.id
            )));
        }
        let (tin, tout) = (&self.tokens[i], &self.tokens[o]);
        Ok(PoolPairData {
            pool_id: self.id.clone(),
            pool_type: PoolType::Element,
            token_in: tin.address.clone(),
            token_out: tout.address.clone(),
            decimals_in: tin.decimals,
            decimals_out: tout.decimals,
            balance_in: tin.balance,
            balance_out: tout.balance,
            swap_fee: self.swap_fee,
            curve: CurveParams::Element {
                total_shares: self.total_shares,
                time_fraction,
                in_is_principal: tin.address == self.principal_token,
            },
        })
    }

    fn normalized_liquidity(&self, pair: &PoolPairData) -> Result<Amount> {
        let derivative = self.spot_price_derivative(pair, 0.0, SwapType::ExactIn)?;
        if derivative <= 0.0 {
            // Constant sum after expiry: depth is the whole output balance.
            return Ok(pair.balance_out);
        }
        ensure_finite(1.0 / derivative, "element liquidity")
    }

    // Exact-in is also capped by the input that buys the exact-out cap, so the
    // output never runs past what the ratio allows.
    fn swap_limit(&self, pair: &PoolPairData, swap_type: SwapType) -> Amount {
        let ratio = ratio_limit(pair, swap_type);
        match swap_type {
            SwapType::ExactOut => ratio,
            SwapType::ExactIn => {
                let out_cap = ratio_limit(pair, SwapType::ExactOut);
                match self.exact_input_for_output(pair, out_cap) {
                    Ok(needed) => ratio.min(needed),
                    Err(e) => {
                        tracing::debug!(pool_id = %pair.pool_id, error = %e, "element pool has no exact-in capacity");
                        0.0
                    }
                }
            }
        }
    }

    fn exact_output_for_input(&self, pair: &PoolPairData, amount_in: Amount) -> Result<Amount> {
        let amount_in = ensure_amount(amount_in)?;
        if amount_in == 0.0 {
            return Ok(0.0);
        }
        let reserves = Reserves::from_pair(pair)?;
        let (_, y) = reserves.after(amount_in, SwapType::ExactIn)?;
        let amount_out = ensure_finite((reserves.y - y).max(0.0), "element out given in")?;
        if amount_out >= pair.balance_out {
            return Err(SorError::InvalidInput(format!(
                "pool {}: {amount_in} in would pay out {amount_out} of {}, more than it holds",
                pair.pool_id, pair.token_out
            )));
        }
        Ok(amount_out)
    }

    fn exact_input_for_output(&self, pair: &PoolPairData, amount_out: Amount) -> Result<Amount> {
        let amount_out = ensure_amount(amount_out)?;
        if amount_out == 0.0 {
            return Ok(0.0);
        }
        let reserves = Reserves::from_pair(pair)?;
        if amount_out >= pair.balance_out {
            return Err(SorError::InvalidInput(format!(
                "pool {}: requested {amount_out} of {} exceeds its reserve",
                pair.pool_id, pair.token_out
            )));
        }
        let (x, _) = reserves.after(amount_out, SwapType::ExactOut)?;
        ensure_finite((x - reserves.x).max(0.0) / reserves.gamma, "element in given out")
    }

    // (s / y')^t / (1-f) with s, y' the post-swap reserves.
    fn spot_price_after_swap(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let reserves = Reserves::from_pair(pair)?;
        let (s, y) = reserves.after(amount, swap_type)?;
        ensure_finite((s / y).powf(reserves.t) / reserves.gamma, "element spot price")
    }

    fn spot_price_derivative(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let reserves = Reserves::from_pair(pair)?;
        let t = reserves.t;
        let (s, y) = reserves.after(amount, swap_type)?;
        let u = s / y;
        let derivative = match swap_type {
            // t u^(t-1) [1/y' + s^(1-t) y'^(t-2)]
            SwapType::ExactIn => t * u.powf(t - 1.0) * (1.0 / y + s.powf(1.0 - t) * y.powf(t - 2.0)),
            // t u^(t-1) (u^t y' + s) / y'^2 / (1-f)
            SwapType::ExactOut => {
                t * u.powf(t - 1.0) * (u.powf(t) * y + s) / (y * y) / reserves.gamma
            }
        };
        ensure_finite(derivative, "element spot price derivative")
    }

    fn with_updated_balance(&self, token: &str, new_balance: Amount) -> Result<Self> {
        Ok(Self {
            tokens: replace_balance(&self.id, &self.tokens, token, new_balance)?,
            ..self.clone()
        })
    }
}
