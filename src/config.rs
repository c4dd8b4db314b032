// amm_sor_rs/src/config.rs
use crate::constants::{
    DEFAULT_MAX_POOLS, DEFAULT_SWAP_GAS, PATH_INVERSION_MAX_ITERATIONS, PRICE_ERROR_TOLERANCE,
    SPLIT_MAX_ITERATIONS,
};
use crate::types::{PoolFilter, Result, SorError};
use serde::{Deserialize, Serialize};

/// Per-request knobs, mirroring what trading front ends send along with a
/// quote request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwapOptions {
    /// Gas price in wei.
    pub gas_price: f64,
    /// Gas units charged for every extra path in the route.
    pub swap_gas: f64,
    /// Reference unix timestamp (seconds) used by time-decaying pools.
    pub timestamp: Option<u64>,
    /// Maximum number of candidate paths kept after ranking.
    pub max_pools: usize,
    pub pool_type_filter: PoolFilter,
    /// Consumed by the external pool cache, ignored by the router itself.
    pub force_refresh: bool,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self {
            gas_price: 0.0,
            swap_gas: DEFAULT_SWAP_GAS,
            timestamp: None,
            max_pools: DEFAULT_MAX_POOLS,
            pool_type_filter: PoolFilter::All,
            force_refresh: false,
        }
    }
}

/// Router-wide numeric settings.
///
/// Curve constants (swap ratios, stable solver caps) are fixed in
/// [`crate::constants`]; only the optimizer's knobs are configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RouterConfig {
    /// Largest relative spread of marginal prices accepted in a split.
    pub price_error_tolerance: f64,
    /// Iteration cap for the search on the common marginal price.
    pub split_max_iterations: u64,
    /// Iteration cap for inverting a single path's price curve.
    pub path_inversion_max_iterations: usize,
    /// Options applied when a request leaves them unspecified.
    pub default_options: SwapOptions,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            price_error_tolerance: PRICE_ERROR_TOLERANCE,
            split_max_iterations: SPLIT_MAX_ITERATIONS,
            path_inversion_max_iterations: PATH_INVERSION_MAX_ITERATIONS,
            default_options: SwapOptions::default(),
        }
    }
}

impl RouterConfig {
    /// Parses a TOML document; missing keys fall back to the defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: RouterConfig = toml::from_str(input)
            .map_err(|e| SorError::InvalidInput(format!("router config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.price_error_tolerance.is_finite() && self.price_error_tolerance > 0.0) {
            return Err(SorError::InvalidInput(
                "price_error_tolerance must be positive".to_string(),
            ));
        }
        if self.split_max_iterations == 0 || self.path_inversion_max_iterations == 0 {
            return Err(SorError::InvalidInput(
                "solver iteration caps must be at least 1".to_string(),
            ));
        }
        if self.default_options.max_pools == 0 {
            return Err(SorError::InvalidInput(
                "default max_pools must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RouterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_options.max_pools, DEFAULT_MAX_POOLS);
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let config = RouterConfig::from_toml_str(
            r#"
            price_error_tolerance = 1e-7
            split_max_iterations = 50

            [default_options]
            maxPools = 2
            poolTypeFilter = "Weighted"
            "#,
        )
        .unwrap();
        assert_eq!(config.price_error_tolerance, 1e-7);
        assert_eq!(config.split_max_iterations, 50);
        assert_eq!(config.path_inversion_max_iterations, PATH_INVERSION_MAX_ITERATIONS);
        assert_eq!(config.default_options.max_pools, 2);
        assert_eq!(config.default_options.pool_type_filter, PoolFilter::Weighted);
        assert_eq!(config.default_options.swap_gas, DEFAULT_SWAP_GAS);
    }

    #[test]
    fn toml_rejects_zero_iterations() {
        let result = RouterConfig::from_toml_str("split_max_iterations = 0");
        assert!(matches!(result, Err(SorError::InvalidInput(_))));
    }

    #[test]
    fn swap_options_deserialize_camel_case() {
        let options: SwapOptions =
            serde_json::from_str(r#"{"gasPrice": 30e9, "timestamp": 1700000000}"#).unwrap();
        assert_eq!(options.gas_price, 30e9);
        assert_eq!(options.timestamp, Some(1_700_000_000));
        assert_eq!(options.max_pools, DEFAULT_MAX_POOLS);
    }
}
