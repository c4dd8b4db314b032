// amm_sor_rs/src/router.rs
use crate::config::{RouterConfig, SwapOptions};
use crate::cost::SwapCostCalculator;
use crate::optimizer::RouteSelector;
use crate::paths::PathBuilder;
use crate::plan::{SwapPlan, SwapPlanAssembler};
use crate::pools::PricingContext;
use crate::registry::{PoolRegistry, RegistryHandle};
use crate::types::{normalize_token, Amount, Result, SorError, SwapType, Token};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the caller wants to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub token_in: Token,
    pub token_out: Token,
    pub swap_type: SwapType,
    /// Amount sold (exact-in) or bought (exact-out), human units.
    pub amount: Amount,
    #[serde(default)]
    pub options: SwapOptions,
}

impl RouteRequest {
    pub fn new(token_in: &str, token_out: &str, swap_type: SwapType, amount: Amount) -> Self {
        Self {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            swap_type,
            amount,
            options: SwapOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SwapOptions) -> Self {
        self.options = options;
        self
    }

    /// Token the route optimizes and the gas cost is charged in: the output
    /// token for exact-in, the input token for exact-out.
    pub fn cost_token(&self) -> &str {
        match self.swap_type {
            SwapType::ExactIn => &self.token_out,
            SwapType::ExactOut => &self.token_in,
        }
    }

    /// Gas cost of one extra path, in [`RouteRequest::cost_token`].
    pub fn cost_per_path(&self, calculator: &SwapCostCalculator) -> Amount {
        calculator.convert_gas_cost_to_token(
            self.cost_token(),
            self.options.gas_price,
            self.options.swap_gas,
        )
    }

    fn validate(&self, cost_per_path: Amount) -> Result<()> {
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(SorError::InvalidInput(format!(
                "swap amount must be positive, got {}",
                self.amount
            )));
        }
        let (token_in, token_out) = (normalize_token(&self.token_in), normalize_token(&self.token_out));
        if token_in.is_empty() || token_out.is_empty() {
            return Err(SorError::InvalidInput("token address is empty".to_string()));
        }
        if token_in == token_out {
            return Err(SorError::InvalidInput(format!(
                "cannot route {token_in} to itself"
            )));
        }
        if self.options.max_pools == 0 {
            return Err(SorError::InvalidInput("max_pools must be at least 1".to_string()));
        }
        if !(cost_per_path.is_finite() && cost_per_path >= 0.0) {
            return Err(SorError::InvalidInput(format!(
                "cost per path must be non-negative, got {cost_per_path}"
            )));
        }
        Ok(())
    }
}

/// Finds the best split of a trade across the pools of the current registry.
///
/// The router owns no pool state of its own: every call loads one registry
/// snapshot from the shared [`RegistryHandle`] and works on it until the plan
/// is built, so a concurrent refresh never mixes two generations.
pub struct Router {
    registry: Arc<RegistryHandle>,
    config: RouterConfig,
    assembler: SwapPlanAssembler,
}

impl Router {
    pub fn new(registry: Arc<RegistryHandle>, config: RouterConfig) -> Self {
        Self {
            registry,
            config,
            assembler: SwapPlanAssembler,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RegistryHandle> {
        &self.registry
    }

    /// A request pre-filled with the configured default options.
    pub fn request(&self, token_in: &str, token_out: &str, swap_type: SwapType, amount: Amount) -> RouteRequest {
        RouteRequest::new(token_in, token_out, swap_type, amount)
            .with_options(self.config.default_options.clone())
    }

    /// Routes `request` on the current registry.
    ///
    /// `cost_per_path` is the gas cost of one path expressed in the optimized
    /// token (see [`RouteRequest::cost_per_path`]). Returns
    /// [`SwapPlan::empty`] when no path connects the two tokens.
    pub fn get_swaps(&self, request: &RouteRequest, cost_per_path: Amount) -> Result<SwapPlan> {
        let registry = self.registry.load();
        self.route_on(&registry, request, cost_per_path)
    }

    /// Same as [`Router::get_swaps`] on a registry the caller already holds.
    pub fn route_on(
        &self,
        registry: &PoolRegistry,
        request: &RouteRequest,
        cost_per_path: Amount,
    ) -> Result<SwapPlan> {
        request.validate(cost_per_path)?;
        let token_in = normalize_token(&request.token_in);
        let token_out = normalize_token(&request.token_out);
        let options = &request.options;
        let ctx = options.timestamp.map(PricingContext::at).unwrap_or_default();

        let paths = PathBuilder::new(registry, options.pool_type_filter, options.max_pools, ctx)
            .build(&token_in, &token_out, request.swap_type);
        if paths.is_empty() {
            let reason = SorError::EmptyCandidateSet {
                token_in: token_in.clone(),
                token_out: token_out.clone(),
            };
            tracing::info!(generation = registry.generation(), %reason, "returning empty plan");
            return Ok(SwapPlan::empty(&token_in, &token_out));
        }

        let allocation = RouteSelector::new(&self.config).select(&paths, request.amount, cost_per_path)?;
        let plan = self.assembler.assemble(&allocation, cost_per_path)?;
        tracing::info!(
            generation = registry.generation(),
            token_in = %token_in,
            token_out = %token_out,
            swap_type = ?request.swap_type,
            amount = request.amount,
            paths = allocation.paths.len(),
            return_amount = plan.return_amount,
            "route found"
        );
        Ok(plan)
    }
}
