// amm_sor_rs/src/pools/weighted.rs
use super::{
    pair_positions, ratio_limit, replace_balance, validate_fee, CurveParams, PoolPairData,
    PoolPricing, PoolToken, PricingContext,
};
use crate::snapshot::PoolSnapshot;
use crate::types::{
    ensure_amount, ensure_finite, normalize_token, Amount, Fee, PoolType, Price, Result, SorError,
    SwapType, Token,
};

/// Constant weighted product pool: Π B_i^{w_i} = k.
///
/// Covers the plain weighted pools as well as liquidity bootstrapping pools,
/// which price identically and only differ in how the pool filter treats them.
///
/// For a pair with balances `Bi`, `Bo`, normalized weights `wi`, `wo` and fee
/// `f`, write `r = wi / wo`. Then
///
/// ```text
/// out(A)  = Bo * (1 - (Bi / (Bi + A(1-f)))^r)
/// in(Ao)  = Bi * ((Bo / (Bo - Ao))^(1/r) - 1) / (1-f)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPool {
    id: String,
    address: String,
    tokens: Vec<PoolToken>,
    /// Weights normalized to sum to one, same order as `tokens`.
    weights: Vec<f64>,
    swap_fee: Fee,
    total_shares: Amount,
    liquidity_bootstrapping: bool,
}

impl WeightedPool {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        tokens: Vec<PoolToken>,
        weights: Vec<f64>,
        swap_fee: Fee,
        total_shares: Amount,
    ) -> Result<Self> {
        let id: String = id.into();
        let address: String = address.into();
        if tokens.len() < 2 || tokens.len() != weights.len() {
            return Err(SorError::InvalidInput(format!(
                "weighted pool {id}: needs at least two tokens with one weight each"
            )));
        }
        let total_weight: f64 = weights.iter().sum();
        if !(total_weight.is_finite() && total_weight > 0.0) || weights.iter().any(|w| *w <= 0.0) {
            return Err(SorError::InvalidInput(format!(
                "weighted pool {id}: weights must be positive"
            )));
        }
        let swap_fee = validate_fee(&id, swap_fee)?;
        Ok(Self {
            address: normalize_token(&address),
            weights: weights.iter().map(|w| w / total_weight).collect(),
            id,
            tokens,
            swap_fee,
            total_shares,
            liquidity_bootstrapping: false,
        })
    }

    pub(crate) fn from_snapshot(snapshot: &PoolSnapshot, liquidity_bootstrapping: bool) -> Result<Self> {
        let tokens = snapshot
            .tokens
            .iter()
            .map(|t| PoolToken::from_snapshot(&snapshot.id, t))
            .collect::<Result<Vec<_>>>()?;
        let weights = snapshot
            .tokens
            .iter()
            .map(|t| {
                t.weight.ok_or_else(|| {
                    SorError::InvalidInput(format!(
                        "weighted pool {}: token {} has no weight",
                        snapshot.id, t.address
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut pool = Self::new(
            snapshot.id.clone(),
            snapshot.address.clone(),
            tokens,
            weights,
            snapshot.swap_fee,
            snapshot.total_shares,
        )?;
        pool.liquidity_bootstrapping = liquidity_bootstrapping;
        Ok(pool)
    }

    pub fn is_liquidity_bootstrapping(&self) -> bool {
        self.liquidity_bootstrapping
    }

    pub fn swap_fee(&self) -> Fee {
        self.swap_fee
    }

    /// Pool shares minted for a proportional-free join at zero price impact:
    /// `Σ amount_i / balance_i * w_i * totalShares`.
    ///
    /// `amounts` follow the pool's token order.
    pub fn bpt_for_tokens_zero_price_impact(&self, amounts: &[Amount]) -> Result<Amount> {
        if amounts.len() != self.tokens.len() {
            return Err(SorError::InvalidInput(format!(
                "weighted pool {}: expected {} amounts, got {}",
                self.id,
                self.tokens.len(),
                amounts.len()
            )));
        }
        let mut shares = 0.0;
        for ((token, weight), amount) in self.tokens.iter().zip(&self.weights).zip(amounts) {
            let amount = ensure_amount(*amount)?;
            if amount == 0.0 {
                continue;
            }
            if token.balance <= 0.0 {
                return Err(SorError::InvalidInput(format!(
                    "weighted pool {}: {} has no balance",
                    self.id, token.address
                )));
            }
            shares += amount / token.balance * weight * self.total_shares;
        }
        ensure_finite(shares, "weighted bpt")
    }
}

// (wi / wo, 1 - f) for a pair.
fn ratio_and_gamma(pair: &PoolPairData) -> (f64, f64) {
    let ratio = match pair.curve {
        CurveParams::Weighted {
            weight_in,
            weight_out,
        } => weight_in / weight_out,
        _ => 1.0,
    };
    (ratio, 1.0 - pair.swap_fee)
}

fn has_liquidity(pair: &PoolPairData) -> bool {
    pair.balance_in > 0.0 && pair.balance_out > 0.0
}

impl PoolPricing for WeightedPool {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn pool_type(&self) -> PoolType {
        PoolType::Weighted
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
        _ctx: &PricingContext,
    ) -> Result<PoolPairData> {
        let (i, o) = pair_positions(&self.id, &self.tokens, token_in, token_out)?;
        let (tin, tout) = (&self.tokens[i], &self.tokens[o]);
        Ok(PoolPairData {
            pool_id: self.id.clone(),
            pool_type: PoolType::Weighted,
            token_in: tin.address.clone(),
            token_out: tout.address.clone(),
            decimals_in: tin.decimals,
            decimals_out: tout.decimals,
            balance_in: tin.balance,
            balance_out: tout.balance,
            swap_fee: self.swap_fee,
            curve: CurveParams::Weighted {
                weight_in: self.weights[i],
                weight_out: self.weights[o],
            },
        })
    }

    /// `Bo * wi / (wi + wo)`, the inverse of the spot price slope at zero.
    fn normalized_liquidity(&self, pair: &PoolPairData) -> Result<Amount> {
        match pair.curve {
            CurveParams::Weighted {
                weight_in,
                weight_out,
            } => Ok(pair.balance_out * weight_in / (weight_in + weight_out)),
            _ => Ok(0.0),
        }
    }

    fn swap_limit(&self, pair: &PoolPairData, swap_type: SwapType) -> Amount {
        ratio_limit(pair, swap_type)
    }

    fn exact_output_for_input(&self, pair: &PoolPairData, amount_in: Amount) -> Result<Amount> {
        let amount_in = ensure_amount(amount_in)?;
        if amount_in == 0.0 || !has_liquidity(pair) {
            return Ok(0.0);
        }
        let (ratio, gamma) = ratio_and_gamma(pair);
        let base = pair.balance_in / (pair.balance_in + amount_in * gamma);
        // 1 - base^r loses precision for tiny trades; exp_m1 keeps it.
        let out = -pair.balance_out * (ratio * base.ln()).exp_m1();
        ensure_finite(out, "weighted out given in")
    }

    fn exact_input_for_output(&self, pair: &PoolPairData, amount_out: Amount) -> Result<Amount> {
        let amount_out = ensure_amount(amount_out)?;
        if amount_out == 0.0 {
            return Ok(0.0);
        }
        if amount_out >= pair.balance_out {
            return Err(SorError::InvalidInput(format!(
                "pool {}: requested {amount_out} of {} but only {} is held",
                pair.pool_id, pair.token_out, pair.balance_out
            )));
        }
        let (ratio, gamma) = ratio_and_gamma(pair);
        let quotient = pair.balance_out / (pair.balance_out - amount_out);
        let amount_in = pair.balance_in * (quotient.ln() / ratio).exp_m1() / gamma;
        ensure_finite(amount_in, "weighted in given out")
    }

    fn spot_price_after_swap(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let (ratio, gamma) = ratio_and_gamma(pair);
        let (bi, bo) = (pair.balance_in, pair.balance_out);
        let price = match swap_type {
            // (Bi + A(1-f))^(r+1) / (Bo * r * (1-f) * Bi^r)
            SwapType::ExactIn => {
                let shifted = bi + amount * gamma;
                shifted / (bo * ratio * gamma) * (shifted / bi).powf(ratio)
            }
            // Bi * Bo^(1/r) / ((1-f) * r) * (Bo - Ao)^(-1/r - 1)
            SwapType::ExactOut => {
                let remaining = bo - amount;
                bi / (gamma * ratio) * (bo / remaining).powf(1.0 / ratio) / remaining
            }
        };
        ensure_finite(price, "weighted spot price")
    }

    fn spot_price_derivative(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let (ratio, gamma) = ratio_and_gamma(pair);
        let (bi, bo) = (pair.balance_in, pair.balance_out);
        let derivative = match swap_type {
            // (r+1) * (Bi + A(1-f))^r / (Bo * r * Bi^r)
            SwapType::ExactIn => {
                let shifted = bi + amount * gamma;
                (ratio + 1.0) / (bo * ratio) * (shifted / bi).powf(ratio)
            }
            // Bi * Bo^(1/r) / ((1-f) * r) * (1/r + 1) * (Bo - Ao)^(-1/r - 2)
            SwapType::ExactOut => {
                let remaining = bo - amount;
                bi / (gamma * ratio) * (bo / remaining).powf(1.0 / ratio) * (1.0 / ratio + 1.0)
                    / (remaining * remaining)
            }
        };
        ensure_finite(derivative, "weighted spot price derivative")
    }

    fn with_updated_balance(&self, token: &str, new_balance: Amount) -> Result<Self> {
        Ok(Self {
            tokens: replace_balance(&self.id, &self.tokens, token, new_balance)?,
            ..self.clone()
        })
    }
}
