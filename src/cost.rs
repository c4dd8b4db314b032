// amm_sor_rs/src/cost.rs
use crate::constants::NATIVE_ASSET_SCALE;
use crate::types::{normalize_token, Amount, Price, Result, SorError, Token};
use std::collections::HashMap;

/// Converts gas spent on a swap into an amount of some token.
///
/// Native asset prices come from the caller (an oracle, a price feed, the
/// previous quote); the calculator only caches them.
#[derive(Debug, Clone, Default)]
pub struct SwapCostCalculator {
    native_prices: HashMap<Token, Price>,
}

impl SwapCostCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how many units of `token` one unit of the native asset buys.
    pub fn set_native_asset_price(&mut self, token: &str, price: Price) -> Result<()> {
        if !(price.is_finite() && price >= 0.0) {
            return Err(SorError::InvalidInput(format!(
                "native asset price for {token} must be non-negative, got {price}"
            )));
        }
        self.native_prices.insert(normalize_token(token), price);
        Ok(())
    }

    pub fn native_asset_price(&self, token: &str) -> Option<Price> {
        self.native_prices.get(&normalize_token(token)).copied()
    }

    /// `gas_price_wei * swap_gas` expressed in `token`. Tokens without a
    /// known native price cost nothing.
    pub fn convert_gas_cost_to_token(&self, token: &str, gas_price_wei: f64, swap_gas: f64) -> Amount {
        let Some(price) = self.native_asset_price(token) else {
            tracing::debug!(token, "no native asset price, gas cost ignored");
            return 0.0;
        };
        let cost = gas_price_wei * swap_gas / NATIVE_ASSET_SCALE * price;
        if cost.is_finite() && cost > 0.0 {
            cost
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn converts_wei_to_token_units() {
        let mut calculator = SwapCostCalculator::new();
        calculator.set_native_asset_price("0xDAI", 2000.0).unwrap();
        // 30 gwei * 100k gas = 0.003 native = 6 DAI.
        let cost = calculator.convert_gas_cost_to_token("0xdai", 30e9, 100_000.0);
        assert_relative_eq!(cost, 6.0, max_relative = 1e-12);
    }

    #[test]
    fn unknown_token_costs_nothing() {
        let calculator = SwapCostCalculator::new();
        assert_eq!(calculator.convert_gas_cost_to_token("0xabc", 30e9, 100_000.0), 0.0);
    }

    #[test]
    fn rejects_negative_price() {
        let mut calculator = SwapCostCalculator::new();
        assert!(calculator.set_native_asset_price("0xabc", -1.0).is_err());
    }
}
