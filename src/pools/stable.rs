// amm_sor_rs/src/pools/stable.rs
use super::stable_math::{
    balance_given_invariant, calculate_invariant, invariant_partial, marginal_price,
};
use super::{
    pair_positions, ratio_limit, replace_balance, validate_fee, CurveParams, PoolPairData,
    PoolPricing, PoolToken, PricingContext,
};
use crate::snapshot::PoolSnapshot;
use crate::types::{
    ensure_amount, ensure_finite, normalize_token, Amount, Fee, PoolType, Price, Result, SorError,
    SwapType, Token,
};

/// StableSwap pool. With `meta` set, every balance and amount is multiplied by
/// the token's price rate before it meets the invariant, which lets a pool of
/// rate-bearing tokens (wrapped staking assets and the like) trade at par in
/// rate-adjusted terms.
#[derive(Debug, Clone, PartialEq)]
pub struct StablePool {
    id: String,
    address: String,
    tokens: Vec<PoolToken>,
    rates: Vec<f64>,
    amp: f64,
    swap_fee: Fee,
    total_shares: Amount,
    meta: bool,
}

// Rate-scaled view of one pair, unpacked from `CurveParams::Stable`.
struct ScaledPair<'a> {
    amp: f64,
    balances: &'a [f64],
    index_in: usize,
    index_out: usize,
    rate_in: f64,
    rate_out: f64,
    invariant: f64,
    gamma: f64,
}

impl<'a> ScaledPair<'a> {
    fn from_pair(pair: &'a PoolPairData) -> Result<Self> {
        match &pair.curve {
            CurveParams::Stable {
                amp,
                balances,
                index_in,
                index_out,
                rate_in,
                rate_out,
                invariant,
            } => Ok(Self {
                amp: *amp,
                balances,
                index_in: *index_in,
                index_out: *index_out,
                rate_in: *rate_in,
                rate_out: *rate_out,
                invariant: *invariant,
                gamma: 1.0 - pair.swap_fee,
            }),
            _ => Err(SorError::InvalidInput(format!(
                "pool {}: pair data is not for a stable curve",
                pair.pool_id
            ))),
        }
    }

    /// Scaled output for a scaled, fee-free input.
    fn out_given_in(&self, amount_in: f64) -> Result<f64> {
        let mut balances = self.balances.to_vec();
        balances[self.index_in] += amount_in;
        let y = balance_given_invariant(self.amp, &balances, self.index_out, self.invariant)?;
        Ok((self.balances[self.index_out] - y).max(0.0))
    }

    /// Scaled, fee-free input for a scaled output.
    fn in_given_out(&self, amount_out: f64) -> Result<f64> {
        let mut balances = self.balances.to_vec();
        balances[self.index_out] -= amount_out;
        let x = balance_given_invariant(self.amp, &balances, self.index_in, self.invariant)?;
        Ok((x - self.balances[self.index_in]).max(0.0))
    }

    /// Scaled balances after a swap of real `amount` in the given direction.
    fn balances_after(&self, amount: Amount, swap_type: SwapType) -> Result<Vec<f64>> {
        let mut balances = self.balances.to_vec();
        match swap_type {
            SwapType::ExactIn => {
                let amount_in = amount * self.rate_in * self.gamma;
                let out = self.out_given_in(amount_in)?;
                balances[self.index_in] += amount_in;
                balances[self.index_out] -= out;
            }
            SwapType::ExactOut => {
                let amount_out = amount * self.rate_out;
                let amount_in = self.in_given_out(amount_out)?;
                balances[self.index_in] += amount_in;
                balances[self.index_out] -= amount_out;
            }
        }
        Ok(balances)
    }

    fn price_and_derivative(&self, amount: Amount, swap_type: SwapType) -> Result<(f64, f64)> {
        let balances = self.balances_after(amount, swap_type)?;
        let (price, derivative) = marginal_price(
            self.amp,
            &balances,
            self.invariant,
            self.index_in,
            self.index_out,
            self.gamma,
            swap_type,
        )?;
        let price = price * self.rate_out / self.rate_in;
        // Chain rule back to real units of the swap amount.
        let derivative = match swap_type {
            SwapType::ExactIn => derivative * self.rate_out,
            SwapType::ExactOut => derivative * self.rate_out * self.rate_out / self.rate_in,
        };
        Ok((price, derivative))
    }
}

impl StablePool {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        tokens: Vec<PoolToken>,
        rates: Vec<f64>,
        amp: f64,
        swap_fee: Fee,
        total_shares: Amount,
    ) -> Result<Self> {
        let id: String = id.into();
        let address: String = address.into();
        if tokens.len() < 2 || tokens.len() != rates.len() {
            return Err(SorError::InvalidInput(format!(
                "stable pool {id}: needs at least two tokens with one rate each"
            )));
        }
        if !(amp.is_finite() && amp >= 1.0) {
            return Err(SorError::InvalidInput(format!(
                "stable pool {id}: amplification must be at least 1, got {amp}"
            )));
        }
        if rates.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(SorError::InvalidInput(format!(
                "stable pool {id}: price rates must be positive"
            )));
        }
        let swap_fee = validate_fee(&id, swap_fee)?;
        Ok(Self {
            address: normalize_token(&address),
            id,
            tokens,
            rates,
            amp,
            swap_fee,
            total_shares,
            meta: false,
        })
    }

    pub(crate) fn from_snapshot(snapshot: &PoolSnapshot, meta: bool) -> Result<Self> {
        let amp = snapshot.amp.ok_or_else(|| {
            SorError::InvalidInput(format!("stable pool {}: missing amp", snapshot.id))
        })?;
        let tokens = snapshot
            .tokens
            .iter()
            .map(|t| PoolToken::from_snapshot(&snapshot.id, t))
            .collect::<Result<Vec<_>>>()?;
        // Plain stable pools trade at par whatever rate the cache reports.
        let rates = snapshot
            .tokens
            .iter()
            .map(|t| if meta { t.price_rate.unwrap_or(1.0) } else { 1.0 })
            .collect();
        let mut pool = Self::new(
            snapshot.id.clone(),
            snapshot.address.clone(),
            tokens,
            rates,
            amp,
            snapshot.swap_fee,
            snapshot.total_shares,
        )?;
        pool.meta = meta;
        Ok(pool)
    }

    pub fn is_meta(&self) -> bool {
        self.meta
    }

    pub fn amp(&self) -> f64 {
        self.amp
    }

    fn scaled_balances(&self) -> Vec<f64> {
        self.tokens
            .iter()
            .zip(&self.rates)
            .map(|(t, rate)| t.balance * rate)
            .collect()
    }

    /// Pool shares minted for a deposit valued at the current marginal
    /// prices: `Σ amount_i * totalShares * (∂D/∂x_i) / D`, amounts in pool
    /// token order.
    pub fn bpt_for_tokens_zero_price_impact(&self, amounts: &[Amount]) -> Result<Amount> {
        if amounts.len() != self.tokens.len() {
            return Err(SorError::InvalidInput(format!(
                "stable pool {}: expected {} amounts, got {}",
                self.id,
                self.tokens.len(),
                amounts.len()
            )));
        }
        let balances = self.scaled_balances();
        let invariant = calculate_invariant(self.amp, &balances)?;
        if invariant == 0.0 {
            return Err(SorError::InvalidInput(format!(
                "stable pool {}: empty pool has no share price",
                self.id
            )));
        }
        let mut shares = 0.0;
        for (index, (amount, rate)) in amounts.iter().zip(&self.rates).enumerate() {
            let amount = ensure_amount(*amount)? * rate;
            if amount == 0.0 {
                continue;
            }
            let partial = invariant_partial(self.amp, &balances, invariant, index);
            shares += amount * self.total_shares * partial / invariant;
        }
        ensure_finite(shares, "stable bpt")
    }
}

impl PoolPricing for StablePool {
    fn id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn pool_type(&self) -> PoolType {
        if self.meta {
            PoolType::MetaStable
        } else {
            PoolType::Stable
        }
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
        let balances = self.scaled_balances();
        let invariant = calculate_invariant(self.amp, &balances)?;
        let (tin, tout) = (&self.tokens[i], &self.tokens[o]);
        Ok(PoolPairData {
            pool_id: self.id.clone(),
            pool_type: self.pool_type(),
            token_in: tin.address.clone(),
            token_out: tout.address.clone(),
            decimals_in: tin.decimals,
            decimals_out: tout.decimals,
            balance_in: tin.balance,
            balance_out: tout.balance,
            swap_fee: self.swap_fee,
            curve: CurveParams::Stable {
                amp: self.amp,
                balances,
                index_in: i,
                index_out: o,
                rate_in: self.rates[i],
                rate_out: self.rates[o],
                invariant,
            },
        })
    }

    fn normalized_liquidity(&self, pair: &PoolPairData) -> Result<Amount> {
        let derivative = self.spot_price_derivative(pair, 0.0, SwapType::ExactIn)?;
        if derivative <= 0.0 {
            return Ok(0.0);
        }
        ensure_finite(1.0 / derivative, "stable liquidity")
    }

    fn swap_limit(&self, pair: &PoolPairData, swap_type: SwapType) -> Amount {
        ratio_limit(pair, swap_type)
    }

    fn exact_output_for_input(&self, pair: &PoolPairData, amount_in: Amount) -> Result<Amount> {
        let amount_in = ensure_amount(amount_in)?;
        if amount_in == 0.0 {
            return Ok(0.0);
        }
        let scaled = ScaledPair::from_pair(pair)?;
        let out = scaled.out_given_in(amount_in * scaled.rate_in * scaled.gamma)?;
        ensure_finite(out / scaled.rate_out, "stable out given in")
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
        let scaled = ScaledPair::from_pair(pair)?;
        let amount_in = scaled.in_given_out(amount_out * scaled.rate_out)? / scaled.gamma;
        ensure_finite(amount_in / scaled.rate_in, "stable in given out")
    }

    fn spot_price_after_swap(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let (price, _) = ScaledPair::from_pair(pair)?.price_and_derivative(amount, swap_type)?;
        Ok(price)
    }

    fn spot_price_derivative(
        &self,
        pair: &PoolPairData,
        amount: Amount,
        swap_type: SwapType,
    ) -> Result<Price> {
        let amount = ensure_amount(amount)?;
        let (_, derivative) =
            ScaledPair::from_pair(pair)?.price_and_derivative(amount, swap_type)?;
        Ok(derivative)
    }

    fn with_updated_balance(&self, token: &str, new_balance: Amount) -> Result<Self> {
        Ok(Self {
            tokens: replace_balance(&self.id, &self.tokens, token, new_balance)?,
            ..self.clone()
        })
    }
}
