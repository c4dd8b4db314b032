// amm_sor_rs/src/paths.rs
use crate::pools::{PoolModel, PoolPairData, PoolPricing, PricingContext};
use crate::registry::PoolRegistry;
use crate::solvers::MarginalPriceCurve;
use crate::types::{
    ensure_finite, normalize_token, Amount, PoolFilter, Price, Result, SorError, SwapPairType,
    SwapType, Token,
};
use std::collections::HashSet;
use std::sync::Arc;

/// One pool traversal inside a path.
#[derive(Debug, Clone)]
pub struct Hop {
    pub pool: Arc<PoolModel>,
    pub pair: PoolPairData,
    pub pair_type: SwapPairType,
}

/// A direct swap or a two-hop route through one intermediate token.
///
/// The path is priced as a single curve in the request's direction: `amount`
/// is the path input for exact-in and the path output for exact-out, and the
/// spot price is always path-input per path-output.
#[derive(Debug, Clone)]
pub struct Path {
    pub id: String,
    pub hops: Vec<Hop>,
    pub swap_type: SwapType,
    pub ctx: PricingContext,
    /// Largest amount the path accepts in its swap direction.
    pub limit: Amount,
}

impl Path {
    /// Builds a path from hops that already chain, computing its ceiling.
    pub fn new(hops: Vec<Hop>, swap_type: SwapType, ctx: PricingContext) -> Result<Self> {
        if hops.is_empty() || hops.len() > 2 {
            return Err(SorError::InvalidInput(format!(
                "a path has one or two hops, got {}",
                hops.len()
            )));
        }
        if hops.len() == 2 && hops[0].pair.token_out != hops[1].pair.token_in {
            return Err(SorError::InvalidInput(format!(
                "hops do not chain: {} then {}",
                hops[0].pair.token_out, hops[1].pair.token_in
            )));
        }
        let id = hops.iter().map(|h| h.pool.id()).collect::<Vec<_>>().join("-");
        let mut path = Self {
            id,
            hops,
            swap_type,
            ctx,
            limit: 0.0,
        };
        path.limit = path.compute_limit()?;
        Ok(path)
    }

    pub fn token_in(&self) -> &str {
        &self.hops[0].pair.token_in
    }

    pub fn token_out(&self) -> &str {
        &self.hops[self.hops.len() - 1].pair.token_out
    }

    pub fn is_direct(&self) -> bool {
        self.hops.len() == 1
    }

    // exact-in: min(L1_in, in1(L2_in)); exact-out: min(L2_out, out2(L1_out)).
    fn compute_limit(&self) -> Result<Amount> {
        let first = &self.hops[0];
        let first_limit = first.pool.swap_limit(&first.pair, self.swap_type);
        if self.is_direct() {
            return Ok(first_limit);
        }
        let second = &self.hops[1];
        let second_limit = second.pool.swap_limit(&second.pair, self.swap_type);
        let limit = match self.swap_type {
            SwapType::ExactIn => {
                if second_limit >= first.pair.balance_out {
                    first_limit
                } else {
                    let needed = first.pool.exact_input_for_output(&first.pair, second_limit)?;
                    first_limit.min(needed)
                }
            }
            SwapType::ExactOut => {
                let reachable = second.pool.exact_output_for_input(&second.pair, first_limit)?;
                second_limit.min(reachable)
            }
        };
        ensure_finite(limit, "path limit")
    }

    /// Counter amount for `amount`: total output for exact-in, total input
    /// for exact-out.
    pub fn counter_amount(&self, amount: Amount) -> Result<Amount> {
        match self.swap_type {
            SwapType::ExactIn => self.hops.iter().try_fold(amount, |carried, hop| {
                hop.pool.exact_output_for_input(&hop.pair, carried)
            }),
            SwapType::ExactOut => self.hops.iter().rev().try_fold(amount, |carried, hop| {
                hop.pool.exact_input_for_output(&hop.pair, carried)
            }),
        }
    }

    /// Amount each hop carries for a path amount, in hop order. For exact-in
    /// that is each hop's input, for exact-out each hop's output.
    pub fn hop_amounts(&self, amount: Amount) -> Result<Vec<Amount>> {
        if self.is_direct() {
            return Ok(vec![amount]);
        }
        let (first, second) = (&self.hops[0], &self.hops[1]);
        Ok(match self.swap_type {
            SwapType::ExactIn => {
                vec![amount, first.pool.exact_output_for_input(&first.pair, amount)?]
            }
            SwapType::ExactOut => {
                vec![second.pool.exact_input_for_output(&second.pair, amount)?, amount]
            }
        })
    }

    /// Spot price and its derivative at `amount` for a given direction.
    fn price_and_derivative(&self, amount: Amount, swap_type: SwapType) -> Result<(Price, Price)> {
        let first = &self.hops[0];
        if self.is_direct() {
            return Ok((
                first.pool.spot_price_after_swap(&first.pair, amount, swap_type)?,
                first.pool.spot_price_derivative(&first.pair, amount, swap_type)?,
            ));
        }
        let second = &self.hops[1];
        match swap_type {
            SwapType::ExactIn => {
                let x = amount;
                let y = first.pool.exact_output_for_input(&first.pair, x)?;
                let sp1 = first.pool.spot_price_after_swap(&first.pair, x, swap_type)?;
                let dsp1 = first.pool.spot_price_derivative(&first.pair, x, swap_type)?;
                let sp2 = second.pool.spot_price_after_swap(&second.pair, y, swap_type)?;
                let dsp2 = second.pool.spot_price_derivative(&second.pair, y, swap_type)?;
                // dy/dx = 1 / SP1, so d(SP1 * SP2)/dx = SP1' SP2 + SP2'.
                Ok((sp1 * sp2, dsp1 * sp2 + dsp2))
            }
            SwapType::ExactOut => {
                let z = amount;
                let y = second.pool.exact_input_for_output(&second.pair, z)?;
                let sp1 = first.pool.spot_price_after_swap(&first.pair, y, swap_type)?;
                let dsp1 = first.pool.spot_price_derivative(&first.pair, y, swap_type)?;
                let sp2 = second.pool.spot_price_after_swap(&second.pair, z, swap_type)?;
                let dsp2 = second.pool.spot_price_derivative(&second.pair, z, swap_type)?;
                // dy/dz = SP2.
                Ok((sp1 * sp2, dsp1 * sp2 * sp2 + sp1 * dsp2))
            }
        }
    }

    pub fn spot_price(&self, amount: Amount) -> Result<Price> {
        Ok(self.price_and_derivative(amount, self.swap_type)?.0)
    }

    pub fn spot_price_derivative(&self, amount: Amount) -> Result<Price> {
        Ok(self.price_and_derivative(amount, self.swap_type)?.1)
    }

    /// Depth proxy used for ranking: inverse slope of the exact-in spot price
    /// at zero.
    pub fn normalized_liquidity(&self) -> Result<Amount> {
        if self.is_direct() {
            let hop = &self.hops[0];
            return hop.pool.normalized_liquidity(&hop.pair);
        }
        let (_, derivative) = self.price_and_derivative(0.0, SwapType::ExactIn)?;
        if derivative <= 0.0 {
            return Ok(0.0);
        }
        ensure_finite(1.0 / derivative, "path liquidity")
    }

    /// Prices the path at both ends of its range. A path that fails here
    /// cannot take part in a split.
    pub fn check_pricing(&self) -> Result<()> {
        for amount in [0.0, self.limit] {
            let (price, derivative) = self.price_and_derivative(amount, self.swap_type)?;
            ensure_finite(price, "path spot price")?;
            ensure_finite(derivative, "path spot price derivative")?;
        }
        ensure_finite(self.counter_amount(self.limit)?, "path counter amount")?;
        Ok(())
    }

    /// The same path re-derived against other pool states, keeping the
    /// ceiling computed on the original state.
    pub fn rebind<F>(&self, mut pool_for: F) -> Result<Self>
    where
        F: FnMut(&Arc<PoolModel>) -> Arc<PoolModel>,
    {
        let hops = self
            .hops
            .iter()
            .map(|hop| {
                let pool = pool_for(&hop.pool);
                let pair = pool.derive_pair_data(&hop.pair.token_in, &hop.pair.token_out, &self.ctx)?;
                Ok(Hop {
                    pool,
                    pair,
                    pair_type: hop.pair_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            hops,
            ..self.clone()
        })
    }
}

impl MarginalPriceCurve for Path {
    fn price_at(&self, amount: Amount) -> Result<Price> {
        self.spot_price(amount)
    }

    fn slope_at(&self, amount: Amount) -> Result<Price> {
        self.spot_price_derivative(amount)
    }

    fn ceiling(&self) -> Amount {
        self.limit
    }
}

/// Enumerates and ranks candidate paths between two tokens.
pub struct PathBuilder<'a> {
    registry: &'a PoolRegistry,
    filter: PoolFilter,
    max_paths: usize,
    ctx: PricingContext,
}

impl<'a> PathBuilder<'a> {
    pub fn new(
        registry: &'a PoolRegistry,
        filter: PoolFilter,
        max_paths: usize,
        ctx: PricingContext,
    ) -> Self {
        Self {
            registry,
            filter,
            max_paths,
            ctx,
        }
    }

    /// Direct paths first, then every `in -> T -> out` combination through two
    /// distinct pools. Returns at most `max_paths` paths, deepest first.
    pub fn build(&self, token_in: &str, token_out: &str, swap_type: SwapType) -> Vec<Path> {
        let token_in = normalize_token(token_in);
        let token_out = normalize_token(token_out);
        let mut candidates: Vec<(Path, Amount)> = Vec::new();

        let first_pools: Vec<&Arc<PoolModel>> = self
            .registry
            .pools_with_token(&token_in)
            .filter(|pool| pool.matches_filter(self.filter))
            .collect();

        for pool in &first_pools {
            if pool.has_token(&token_out) {
                let hops = vec![(Arc::clone(pool), token_in.clone(), token_out.clone(), SwapPairType::Direct)];
                self.push_candidate(&mut candidates, hops, swap_type);
            }
        }

        for first in &first_pools {
            for middle in first.tokens() {
                if middle == token_in || middle == token_out {
                    continue;
                }
                for second in self.registry.pools_with_token(&middle) {
                    if Arc::ptr_eq(first, second)
                        || !second.has_token(&token_out)
                        || !second.matches_filter(self.filter)
                    {
                        continue;
                    }
                    let hops = vec![
                        (Arc::clone(first), token_in.clone(), middle.clone(), SwapPairType::HopIn),
                        (Arc::clone(second), middle.clone(), token_out.clone(), SwapPairType::HopOut),
                    ];
                    self.push_candidate(&mut candidates, hops, swap_type);
                }
            }
        }

        candidates.sort_by(|(a, la), (b, lb)| lb.total_cmp(la).then_with(|| a.id.cmp(&b.id)));
        let mut seen = HashSet::new();
        let paths: Vec<Path> = candidates
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| seen.insert(path.id.clone()))
            .take(self.max_paths)
            .collect();
        tracing::debug!(
            token_in = %token_in,
            token_out = %token_out,
            paths = paths.len(),
            "candidate paths ranked"
        );
        paths
    }

    fn push_candidate(
        &self,
        candidates: &mut Vec<(Path, Amount)>,
        hops: Vec<(Arc<PoolModel>, Token, Token, SwapPairType)>,
        swap_type: SwapType,
    ) {
        match self.candidate(hops, swap_type) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, pool_local = e.is_pool_local(), "dropping candidate path"),
        }
    }

    fn candidate(
        &self,
        hops: Vec<(Arc<PoolModel>, Token, Token, SwapPairType)>,
        swap_type: SwapType,
    ) -> Result<Option<(Path, Amount)>> {
        let hops = hops
            .into_iter()
            .map(|(pool, token_in, token_out, pair_type)| {
                let pair = pool.derive_pair_data(&token_in, &token_out, &self.ctx)?;
                Ok(Hop {
                    pool,
                    pair,
                    pair_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let path = Path::new(hops, swap_type, self.ctx)?;
        if !(path.limit > 0.0) {
            tracing::debug!(path = %path.id, "dropping path without capacity");
            return Ok(None);
        }
        path.check_pricing()?;
        let liquidity = path.normalized_liquidity()?;
        Ok(Some((path, liquidity)))
    }
}
