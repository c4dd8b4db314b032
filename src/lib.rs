// amm_sor_rs/src/lib.rs

// Declare modules
pub mod config;
pub mod constants;
pub mod cost;
pub mod optimizer;
pub mod paths;
pub mod plan;
pub mod pools;
pub mod registry;
pub mod router;
pub mod snapshot;
pub mod solvers; // Common marginal price search
pub mod types;

// Re-export key types, traits, and functions for easier use by library consumers.
pub use config::{RouterConfig, SwapOptions};
pub use cost::SwapCostCalculator;
pub use optimizer::{Allocation, PathAllocation, RouteSelector};
pub use paths::{Path, PathBuilder};
pub use plan::{SwapPlan, SwapPlanAssembler, SwapStep};
pub use pools::{PoolModel, PoolPairData, PoolPricing, PricingContext};
pub use registry::{PoolRegistry, RegistryHandle};
pub use router::{RouteRequest, Router};
pub use snapshot::{parse_pools_json, PoolSnapshot, SnapshotToken};
pub use types::{
    Token, Amount, Price, Fee, // Basic types
    SwapType, PoolType, PoolFilter, SwapPairType, // Enums
    SorError, Result, // Error handling
};
