// amm_sor_rs/src/types.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Token identifiers are lowercase hex addresses. Everything that enters the
// crate goes through `normalize_token` so lookups are case-insensitive.
pub type Token = String;

// Amounts, balances and prices are human-unit f64 values (already divided by
// 10^decimals). Conversion to raw base units only happens in the swap plan.
pub type Amount = f64;
pub type Price = f64;
pub type Fee = f64; // Fraction of the input, 0.0 <= fee < 1.0

/// Direction of a route request.
///
/// `ExactIn` fixes the amount sold and maximizes the amount received,
/// `ExactOut` fixes the amount bought and minimizes the amount paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapType {
    ExactIn,
    ExactOut,
}

/// Curve family a pool prices with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    Weighted,
    Stable,
    Element,
    MetaStable,
}

/// Restricts which pools may appear in candidate paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PoolFilter {
    #[default]
    All,
    Weighted,
    Stable,
    MetaStable,
    #[serde(rename = "LiquidityBootstrapping")]
    LiquidityBootstrapping,
    Element,
}

/// Role a pool plays inside a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapPairType {
    Direct,
    HopIn,
    HopOut,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("token {token} is not held by pool {pool_id}")]
    UnknownToken { pool_id: String, token: Token },
    #[error("{solver} did not converge within {iterations} iterations")]
    NumericDivergence {
        solver: &'static str,
        iterations: usize,
    },
    #[error("insufficient liquidity: requested {requested}, routable at most {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },
    #[error("no candidate path from {token_in} to {token_out}")]
    EmptyCandidateSet { token_in: Token, token_out: Token },
    #[error("pool {pool_id} needs a reference timestamp before it can be priced")]
    MissingTimestamp { pool_id: String },
}

impl SorError {
    /// Errors that only disqualify one pool or path and are absorbed by the
    /// caller instead of failing the whole route request.
    pub fn is_pool_local(&self) -> bool {
        matches!(
            self,
            SorError::UnknownToken { .. }
                | SorError::NumericDivergence { .. }
                | SorError::MissingTimestamp { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SorError>;

/// Lowercases an address so every map in the crate is keyed the same way.
pub fn normalize_token(token: &str) -> Token {
    token.trim().to_ascii_lowercase()
}

/// Rejects NaN/inf results coming out of the curve formulas.
pub(crate) fn ensure_finite(value: f64, solver: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SorError::NumericDivergence {
            solver,
            iterations: 0,
        })
    }
}

/// Rejects negative or non-finite amounts handed to the pricing functions.
pub(crate) fn ensure_amount(amount: Amount) -> Result<Amount> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(SorError::InvalidInput(format!(
            "amount must be a finite, non-negative number, got {amount}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_token_lowercases_and_trims() {
        assert_eq!(normalize_token("  0xABCdef "), "0xabcdef");
    }

    #[test]
    fn pool_local_errors_are_absorbable() {
        assert!(SorError::MissingTimestamp { pool_id: "p".into() }.is_pool_local());
        assert!(SorError::NumericDivergence { solver: "x", iterations: 3 }.is_pool_local());
        assert!(!SorError::InvalidInput("bad".into()).is_pool_local());
        assert!(!SorError::InsufficientLiquidity { requested: 1.0, available: 0.5 }.is_pool_local());
    }

    #[test]
    fn ensure_amount_rejects_negative_and_nan() {
        assert!(ensure_amount(-1.0).is_err());
        assert!(ensure_amount(f64::NAN).is_err());
        assert_eq!(ensure_amount(0.0).unwrap(), 0.0);
    }

    #[test]
    fn pool_filter_serializes_lbp_tag() {
        let json = serde_json::to_string(&PoolFilter::LiquidityBootstrapping).unwrap();
        assert_eq!(json, "\"LiquidityBootstrapping\"");
        let back: PoolFilter = serde_json::from_str("\"Stable\"").unwrap();
        assert_eq!(back, PoolFilter::Stable);
    }
}
