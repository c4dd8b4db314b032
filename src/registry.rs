// amm_sor_rs/src/registry.rs
use crate::pools::{PoolModel, PoolPricing};
use crate::snapshot::PoolSnapshot;
use crate::types::{normalize_token, Token};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Parsed pools of one snapshot generation, indexed by id and by token.
///
/// A registry is immutable once built. Route computations hold an `Arc` to
/// it for their whole duration, so a refresh never changes the pools a
/// running computation sees.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    generation: u64,
    pools: Vec<Arc<PoolModel>>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<Token, Vec<usize>>,
}

impl PoolRegistry {
    /// Parses every snapshot. Malformed pools are skipped with a warning,
    /// unsupported curve types silently.
    pub fn from_snapshots(snapshots: &[PoolSnapshot], generation: u64) -> Self {
        let mut registry = PoolRegistry {
            generation,
            ..Default::default()
        };
        for snapshot in snapshots {
            let pool = match PoolModel::from_snapshot(snapshot) {
                Ok(Some(pool)) => pool,
                Ok(None) => {
                    tracing::debug!(pool_id = %snapshot.id, pool_type = %snapshot.pool_type, "skipping unsupported pool");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(pool_id = %snapshot.id, error = %e, "skipping malformed pool");
                    continue;
                }
            };
            if registry.by_id.contains_key(pool.id()) {
                tracing::warn!(pool_id = %pool.id(), "duplicate pool id, keeping the first");
                continue;
            }
            let index = registry.pools.len();
            registry.by_id.insert(pool.id().to_string(), index);
            for token in pool.tokens() {
                registry.by_token.entry(token).or_default().push(index);
            }
            registry.pools.push(Arc::new(pool));
        }
        registry
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn pool(&self, id: &str) -> Option<&Arc<PoolModel>> {
        self.by_id.get(id).map(|&index| &self.pools[index])
    }

    /// Pools holding `token`, in snapshot order.
    pub fn pools_with_token(&self, token: &str) -> impl Iterator<Item = &Arc<PoolModel>> + '_ {
        self.by_token
            .get(&normalize_token(token))
            .into_iter()
            .flatten()
            .map(move |&index| &self.pools[index])
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<PoolModel>> + '_ {
        self.pools.iter()
    }
}

/// Shared, atomically replaceable pointer to the current [`PoolRegistry`].
///
/// Readers call [`RegistryHandle::load`] and never block; a refresh builds the
/// next registry off to the side and swaps it in with one store.
#[derive(Debug)]
pub struct RegistryHandle {
    current: ArcSwap<PoolRegistry>,
    next_generation: AtomicU64,
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(PoolRegistry::default()),
            next_generation: AtomicU64::new(1),
        }
    }
}

impl RegistryHandle {
    pub fn new(snapshots: &[PoolSnapshot]) -> Self {
        let handle = Self::default();
        handle.replace(snapshots);
        handle
    }

    /// Snapshot of the current registry; stays valid across later refreshes.
    pub fn load(&self) -> Arc<PoolRegistry> {
        self.current.load_full()
    }

    /// Builds a registry from `snapshots` under the next generation number and
    /// publishes it. Returns the new generation.
    pub fn replace(&self, snapshots: &[PoolSnapshot]) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry = PoolRegistry::from_snapshots(snapshots, generation);
        tracing::info!(generation, pools = registry.len(), "publishing pool registry");
        self.current.store(Arc::new(registry));
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures;

    fn snapshots() -> Vec<PoolSnapshot> {
        let mut broken = fixtures::weighted(
            "broken",
            vec![fixtures::token("0xa", 1.0, None), fixtures::token("0xb", 1.0, None)],
            0.0,
        );
        broken.total_weight = None;
        let mut unsupported = broken.clone();
        unsupported.id = "gyro".to_string();
        unsupported.pool_type = "Gyro3".to_string();
        vec![
            fixtures::weighted(
                "w1",
                vec![
                    fixtures::token("0xA", 100.0, Some(0.5)),
                    fixtures::token("0xB", 100.0, Some(0.5)),
                ],
                0.0,
            ),
            fixtures::stable(
                "s1",
                vec![fixtures::token("0xb", 100.0, None), fixtures::token("0xc", 100.0, None)],
                100.0,
                0.0,
            ),
            broken,
            unsupported,
        ]
    }

    #[test]
    fn indexes_pools_by_id_and_token() {
        let registry = PoolRegistry::from_snapshots(&snapshots(), 7);
        assert_eq!(registry.generation(), 7);
        assert_eq!(registry.len(), 2);
        assert!(registry.pool("w1").is_some());
        assert!(registry.pool("broken").is_none());
        let with_b: Vec<_> = registry.pools_with_token("0xB").map(|p| p.id().to_string()).collect();
        assert_eq!(with_b, vec!["w1", "s1"]);
        assert_eq!(registry.pools_with_token("0xd").count(), 0);
    }

    #[test]
    fn replace_does_not_disturb_loaded_snapshot() {
        let handle = RegistryHandle::new(&snapshots());
        let before = handle.load();
        let generation = handle.replace(&[]);
        let after = handle.load();
        assert_eq!(before.len(), 2);
        assert!(after.is_empty());
        assert!(generation > before.generation());
        assert_eq!(after.generation(), generation);
    }
}
