// amm_sor_rs/src/snapshot.rs
use crate::types::{normalize_token, Amount, Fee, Result, SorError, Token};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// One pool as delivered by the external pool cache.
///
/// Numeric fields travel as decimal strings, the same way the subgraph
/// publishes them. A snapshot is never edited in place: a refresh replaces the
/// whole list, and [`PoolSnapshot::with_token_balance`] returns a copy.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub id: String,
    pub address: String,
    pub pool_type: String,
    #[serde_as(as = "DisplayFromStr")]
    pub swap_fee: Fee,
    #[serde_as(as = "DisplayFromStr")]
    pub total_shares: Amount,
    pub tokens: Vec<SnapshotToken>,
    #[serde(default)]
    pub tokens_list: Vec<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub total_weight: Option<f64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub amp: Option<f64>,
    #[serde(default)]
    pub expiry_time: Option<u64>,
    #[serde(default)]
    pub unit_seconds: Option<u64>,
    #[serde(default)]
    pub principal_token: Option<String>,
    #[serde(default)]
    pub base_token: Option<String>,
    #[serde(default)]
    pub swap_enabled: Option<bool>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotToken {
    pub address: String,
    #[serde_as(as = "DisplayFromStr")]
    pub balance: Amount,
    pub decimals: u32,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub price_rate: Option<f64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Wrapper used by the pool cache's JSON dumps.
#[derive(Debug, Clone, Deserialize)]
struct SnapshotList {
    pools: Vec<PoolSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SnapshotDocument {
    Wrapped(SnapshotList),
    Bare(Vec<PoolSnapshot>),
}

/// Parses either `[...]` or `{ "pools": [...] }`.
pub fn parse_pools_json(input: &str) -> Result<Vec<PoolSnapshot>> {
    let document: SnapshotDocument = serde_json::from_str(input)
        .map_err(|e| SorError::InvalidInput(format!("pool snapshot json: {e}")))?;
    Ok(match document {
        SnapshotDocument::Wrapped(list) => list.pools,
        SnapshotDocument::Bare(pools) => pools,
    })
}

impl PoolSnapshot {
    /// Index of `token` in `tokens`, compared case-insensitively.
    pub fn token_index(&self, token: &str) -> Option<usize> {
        let token = normalize_token(token);
        self.tokens
            .iter()
            .position(|t| normalize_token(&t.address) == token)
    }

    /// Returns a copy of the snapshot with one token balance replaced.
    pub fn with_token_balance(&self, token: &str, new_balance: Amount) -> Result<Self> {
        if !(new_balance.is_finite() && new_balance >= 0.0) {
            return Err(SorError::InvalidInput(format!(
                "balance for {token} must be non-negative, got {new_balance}"
            )));
        }
        let index = self.token_index(token).ok_or_else(|| SorError::UnknownToken {
            pool_id: self.id.clone(),
            token: normalize_token(token),
        })?;
        let mut updated = self.clone();
        updated.tokens[index].balance = new_balance;
        Ok(updated)
    }

    /// Token addresses of the pool, normalized.
    pub fn token_addresses(&self) -> Vec<Token> {
        self.tokens.iter().map(|t| normalize_token(&t.address)).collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn token(address: &str, balance: f64, weight: Option<f64>) -> SnapshotToken {
        SnapshotToken {
            address: address.to_string(),
            balance,
            decimals: 18,
            price_rate: None,
            weight,
        }
    }

    pub fn weighted(id: &str, tokens: Vec<SnapshotToken>, swap_fee: f64) -> PoolSnapshot {
        let total_weight: f64 = tokens.iter().filter_map(|t| t.weight).sum();
        PoolSnapshot {
            id: id.to_string(),
            address: format!("0x{id}"),
            pool_type: "Weighted".to_string(),
            swap_fee,
            total_shares: 1000.0,
            tokens_list: tokens.iter().map(|t| t.address.clone()).collect(),
            tokens,
            total_weight: Some(total_weight),
            amp: None,
            expiry_time: None,
            unit_seconds: None,
            principal_token: None,
            base_token: None,
            swap_enabled: None,
        }
    }

    pub fn stable(id: &str, tokens: Vec<SnapshotToken>, amp: f64, swap_fee: f64) -> PoolSnapshot {
        PoolSnapshot {
            pool_type: "Stable".to_string(),
            total_weight: None,
            amp: Some(amp),
            ..weighted(id, tokens, swap_fee)
        }
    }

    pub fn element(
        id: &str,
        base: SnapshotToken,
        principal: SnapshotToken,
        total_shares: f64,
        expiry_time: u64,
        unit_seconds: u64,
        swap_fee: f64,
    ) -> PoolSnapshot {
        let base_token = base.address.clone();
        let principal_token = principal.address.clone();
        PoolSnapshot {
            pool_type: "Element".to_string(),
            total_shares,
            total_weight: None,
            expiry_time: Some(expiry_time),
            unit_seconds: Some(unit_seconds),
            principal_token: Some(principal_token),
            base_token: Some(base_token),
            ..weighted(id, vec![base, principal], swap_fee)
        }
    }
}
