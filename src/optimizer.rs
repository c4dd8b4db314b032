// amm_sor_rs/src/optimizer.rs
use crate::config::RouterConfig;
use crate::constants::{ALLOCATION_TOLERANCE, MAX_IN_RATIO, MAX_OUT_RATIO};
use crate::paths::Path;
use crate::pools::{PoolModel, PoolPricing};
use crate::solvers::{equalize_marginal_prices, PriceSplit};
use crate::types::{Amount, Price, Result, SorError, SwapType, Token};
use ndarray::Array1;
use std::collections::HashMap;
use std::sync::Arc;

/// Amount routed through one path, with its simulated result.
#[derive(Debug, Clone)]
pub struct PathAllocation {
    pub path: Path,
    /// Path input for exact-in, path output for exact-out.
    pub amount: Amount,
    /// Path output for exact-in, path input for exact-out.
    pub counter_amount: Amount,
    /// Per-hop amounts as carried by the swap steps (see [`Path::hop_amounts`]).
    pub hop_amounts: Vec<Amount>,
    /// Marginal price of the path after `amount`.
    pub marginal_price: Price,
}

/// The chosen split of a request across paths.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub swap_type: SwapType,
    /// Used paths only, in ranking order.
    pub paths: Vec<PathAllocation>,
    pub amount: Amount,
    pub counter_amount: Amount,
    /// Counter amount net of gas cost, in the counter token.
    pub net_result: Amount,
}

impl Allocation {
    pub fn total_amount(&self) -> Amount {
        self.paths.iter().map(|p| p.amount).sum()
    }
}

/// Picks how many of the ranked paths to use and how to split across them.
pub struct RouteSelector<'a> {
    config: &'a RouterConfig,
}

impl<'a> RouteSelector<'a> {
    pub fn new(config: &'a RouterConfig) -> Self {
        Self { config }
    }

    /// Tries the top-k paths for every k and keeps the best net result. A
    /// larger k must be strictly better to replace a smaller one.
    ///
    /// A path that cannot be priced over its own range is excluded and the
    /// search restarts without it, so one broken pool never sinks the request.
    ///
    /// `cost_per_path` is expressed in the counter token (output for
    /// exact-in, input for exact-out).
    pub fn select(&self, paths: &[Path], amount: Amount, cost_per_path: Amount) -> Result<Allocation> {
        let mut working: Vec<Path> = paths.to_vec();
        'search: loop {
            let mut best: Option<Allocation> = None;
            for k in 1..=working.len() {
                let candidate = &working[..k];
                let capacity: Amount = candidate.iter().map(|p| p.limit).sum();
                if capacity < amount {
                    tracing::debug!(k, capacity, amount, "not enough capacity");
                    continue;
                }
                let allocation = match self.allocate(candidate, amount, cost_per_path) {
                    Ok(allocation) => allocation,
                    Err(e) => {
                        let failing = candidate
                            .iter()
                            .position(|path| path.check_pricing().is_err());
                        if let Some(index) = failing {
                            let dropped = working.remove(index);
                            tracing::debug!(path = %dropped.id, error = %e, "excluding path that fails to price");
                            continue 'search;
                        }
                        tracing::debug!(k, error = %e, "split rejected");
                        continue;
                    }
                };
                tracing::debug!(k, net = allocation.net_result, "split evaluated");
                let better = match &best {
                    None => true,
                    Some(current) => match allocation.swap_type {
                        SwapType::ExactIn => allocation.net_result > current.net_result,
                        SwapType::ExactOut => allocation.net_result < current.net_result,
                    },
                };
                if better {
                    best = Some(allocation);
                }
            }
            return best.ok_or_else(|| SorError::InsufficientLiquidity {
                requested: amount,
                available: working.iter().map(|p| p.limit).sum(),
            });
        }
    }

    fn allocate(&self, paths: &[Path], amount: Amount, cost_per_path: Amount) -> Result<Allocation> {
        let swap_type = paths[0].swap_type;
        let PriceSplit { amounts, .. } = equalize_marginal_prices(paths, amount, self.config)?;
        let allocations = simulate_fills(paths, &amounts)?;
        let counter_amount: Amount = allocations.iter().map(|a| a.counter_amount).sum();
        let cost = cost_per_path * allocations.len() as f64;
        let net_result = match swap_type {
            SwapType::ExactIn => counter_amount - cost,
            SwapType::ExactOut => counter_amount + cost,
        };
        Ok(Allocation {
            swap_type,
            paths: allocations,
            amount,
            counter_amount,
            net_result,
        })
    }
}

/// Executes the split path by path against private pool copies, so a pool
/// shared by two paths prices the second fill on the balances left by the
/// first.
///
/// Swap limits bound the amount side of every hop: the input for exact-in,
/// the output for exact-out. The combined flow of all fills through a shared
/// pool must stay within the same ratio of its original balance.
pub fn simulate_fills(paths: &[Path], amounts: &Array1<f64>) -> Result<Vec<PathAllocation>> {
    let mut touched: HashMap<String, Arc<PoolModel>> = HashMap::new();
    let mut limited_flow: HashMap<(String, Token), Amount> = HashMap::new();
    let mut allocations = Vec::new();
    for (original, &amount) in paths.iter().zip(amounts.iter()) {
        if amount <= 0.0 {
            continue;
        }
        let path = original.rebind(|pool| {
            touched
                .get(pool.id())
                .cloned()
                .unwrap_or_else(|| Arc::clone(pool))
        })?;
        let hop_amounts = path.hop_amounts(amount)?;
        let counter_amount = path.counter_amount(amount)?;
        let marginal_price = path.spot_price(amount)?;

        for (index, hop) in path.hops.iter().enumerate() {
            let (amount_in, amount_out) = hop_flows(&path, index, &hop_amounts, amount, counter_amount);
            let before = &original.hops[index].pair;
            let pool_id = hop.pool.id().to_string();
            let (token, flow, cap) = match path.swap_type {
                SwapType::ExactIn => (&hop.pair.token_in, amount_in, before.balance_in * MAX_IN_RATIO),
                SwapType::ExactOut => (&hop.pair.token_out, amount_out, before.balance_out * MAX_OUT_RATIO),
            };
            let total = limited_flow.entry((pool_id.clone(), token.clone())).or_default();
            *total += flow;
            check_ratio(&pool_id, *total, cap)?;

            let balance_in = hop.pair.balance_in + amount_in;
            let balance_out = hop.pair.balance_out - amount_out;
            let updated = hop
                .pool
                .with_updated_balance(&hop.pair.token_in, balance_in)?
                .with_updated_balance(&hop.pair.token_out, balance_out)?;
            touched.insert(pool_id, Arc::new(updated));
        }
        allocations.push(PathAllocation {
            path,
            amount,
            counter_amount,
            hop_amounts,
            marginal_price,
        });
    }
    Ok(allocations)
}

fn check_ratio(pool_id: &str, flow: Amount, cap: Amount) -> Result<()> {
    if flow > cap * (1.0 + ALLOCATION_TOLERANCE) {
        tracing::debug!(pool_id, flow, cap, "fills exceed the pool's swap ratio");
        return Err(SorError::InsufficientLiquidity {
            requested: flow,
            available: cap,
        });
    }
    Ok(())
}

// (input, output) of hop `index` for a fill of `amount` with result `counter`.
fn hop_flows(
    path: &Path,
    index: usize,
    hop_amounts: &[Amount],
    amount: Amount,
    counter: Amount,
) -> (Amount, Amount) {
    let last = path.hops.len() - 1;
    match path.swap_type {
        // hop_amounts are inputs; the last output is the path output.
        SwapType::ExactIn => {
            let out = if index == last { counter } else { hop_amounts[index + 1] };
            (hop_amounts[index], out)
        }
        // hop_amounts are outputs; the first input is the path input.
        SwapType::ExactOut => {
            let amount_in = if index == 0 { counter } else { hop_amounts[index - 1] };
            let amount_out = if index == last { amount } else { hop_amounts[index] };
            (amount_in, amount_out)
        }
    }
}
