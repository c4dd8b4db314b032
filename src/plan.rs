// amm_sor_rs/src/plan.rs
use crate::constants::{CHAINED_STEP_AMOUNT, EMPTY_USER_DATA};
use crate::optimizer::Allocation;
use crate::pools::PoolPricing;
use crate::types::{Amount, Price, Result, SorError, SwapType, Token};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// One pool swap of a batch, in the shape the vault's batch entry point takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
    pub pool_id: String,
    /// Index into [`SwapPlan::token_addresses`].
    pub asset_in_index: usize,
    pub asset_out_index: usize,
    /// Raw base units, or `"0"` to consume the previous step's result.
    pub amount: String,
    pub user_data: String,
}

/// Executable description of a route.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlan {
    pub token_addresses: Vec<Token>,
    pub swaps: Vec<SwapStep>,
    /// Requested amount, human units.
    pub swap_amount: Amount,
    /// Requested amount in raw base units; step amounts sum to it.
    #[serde_as(as = "DisplayFromStr")]
    pub swap_amount_for_swaps: u128,
    /// Counter amount (output for exact-in, input for exact-out), human units.
    pub return_amount: Amount,
    #[serde_as(as = "DisplayFromStr")]
    pub return_amount_from_swaps: u128,
    /// `return_amount` net of gas cost for the paths used.
    pub return_amount_considering_fees: Amount,
    pub token_in: Token,
    pub token_out: Token,
    /// Amount-weighted marginal price of the paths used.
    pub market_sp: Price,
}

impl SwapPlan {
    /// The "no route" result.
    pub fn empty(token_in: &str, token_out: &str) -> Self {
        Self {
            token_addresses: Vec::new(),
            swaps: Vec::new(),
            swap_amount: 0.0,
            swap_amount_for_swaps: 0,
            return_amount: 0.0,
            return_amount_from_swaps: 0,
            return_amount_considering_fees: 0.0,
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            market_sp: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }
}

fn scale(decimals: u32) -> f64 {
    10f64.powi(decimals as i32)
}

/// Human amount to raw base units, rounded down.
pub fn to_raw_floor(amount: Amount, decimals: u32) -> u128 {
    (amount * scale(decimals)).floor().max(0.0) as u128
}

/// Human amount to raw base units, rounded up.
pub fn to_raw_ceil(amount: Amount, decimals: u32) -> u128 {
    (amount * scale(decimals)).ceil().max(0.0) as u128
}

/// Flattens an [`Allocation`] into swap steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapPlanAssembler;

impl SwapPlanAssembler {
    pub fn assemble(&self, allocation: &Allocation, cost_per_path: Amount) -> Result<SwapPlan> {
        let first = allocation
            .paths
            .first()
            .ok_or_else(|| SorError::InvalidInput("allocation uses no path".to_string()))?;
        let first_hop = &first.path.hops[0].pair;
        let last_hop = &first.path.hops[first.path.hops.len() - 1].pair;
        let (token_in, token_out) = (first_hop.token_in.clone(), last_hop.token_out.clone());
        let (decimals_in, decimals_out) = (first_hop.decimals_in, last_hop.decimals_out);
        let swap_type = allocation.swap_type;
        let (amount_decimals, return_decimals) = match swap_type {
            SwapType::ExactIn => (decimals_in, decimals_out),
            SwapType::ExactOut => (decimals_out, decimals_in),
        };

        // (pool id, token in, token out, raw amount or None when chained)
        let mut legs: Vec<(String, Token, Token, Option<u128>)> = Vec::new();
        for used in &allocation.paths {
            let raw = to_raw_floor(used.amount, amount_decimals);
            let hops: Vec<_> = match swap_type {
                SwapType::ExactIn => used.path.hops.iter().collect(),
                SwapType::ExactOut => used.path.hops.iter().rev().collect(),
            };
            for (position, hop) in hops.into_iter().enumerate() {
                legs.push((
                    hop.pool.id().to_string(),
                    hop.pair.token_in.clone(),
                    hop.pair.token_out.clone(),
                    (position == 0).then_some(raw),
                ));
            }
        }

        let swap_amount_for_swaps = (allocation.amount * scale(amount_decimals)).round().max(0.0) as u128;
        assign_rounding_remainder(&mut legs, swap_amount_for_swaps);

        let mut token_addresses: Vec<Token> = Vec::new();
        let mut index_of = |token: &Token| match token_addresses.iter().position(|t| t == token) {
            Some(index) => index,
            None => {
                token_addresses.push(token.clone());
                token_addresses.len() - 1
            }
        };
        let swaps: Vec<SwapStep> = legs
            .into_iter()
            .map(|(pool_id, tin, tout, raw)| SwapStep {
                pool_id,
                asset_in_index: index_of(&tin),
                asset_out_index: index_of(&tout),
                amount: raw.map_or_else(|| CHAINED_STEP_AMOUNT.to_string(), |r| r.to_string()),
                user_data: EMPTY_USER_DATA.to_string(),
            })
            .collect();

        let return_amount = allocation.counter_amount;
        let return_amount_from_swaps = match swap_type {
            SwapType::ExactIn => to_raw_floor(return_amount, return_decimals),
            SwapType::ExactOut => to_raw_ceil(return_amount, return_decimals),
        };
        let cost = cost_per_path * allocation.paths.len() as f64;
        let return_amount_considering_fees = match swap_type {
            SwapType::ExactIn => return_amount - cost,
            SwapType::ExactOut => return_amount + cost,
        };
        let total: Amount = allocation.paths.iter().map(|p| p.amount).sum();
        let market_sp = allocation
            .paths
            .iter()
            .map(|p| p.amount * p.marginal_price)
            .sum::<f64>()
            / total;

        Ok(SwapPlan {
            token_addresses,
            swaps,
            swap_amount: allocation.amount,
            swap_amount_for_swaps,
            return_amount,
            return_amount_from_swaps,
            return_amount_considering_fees,
            token_in,
            token_out,
            market_sp,
        })
    }
}

// Moves the difference between the rounded total and the floored leading
// steps onto the largest leading step.
fn assign_rounding_remainder(legs: &mut [(String, Token, Token, Option<u128>)], total: u128) {
    let floored: u128 = legs.iter().filter_map(|leg| leg.3).sum();
    let largest = legs
        .iter_mut()
        .filter_map(|leg| leg.3.as_mut())
        .reduce(|best, raw| if *raw > *best { raw } else { best });
    if let Some(largest) = largest {
        if total >= floored {
            *largest += total - floored;
        } else {
            *largest = largest.saturating_sub(floored - total);
        }
    }
}
