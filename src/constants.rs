// amm_sor_rs/src/constants.rs

/// Largest fraction of the input-side balance a single swap may add.
pub const MAX_IN_RATIO: f64 = 0.3;

/// Largest fraction of the output-side balance a single swap may remove.
pub const MAX_OUT_RATIO: f64 = 0.3;

/// Iteration cap for the stable invariant and balance solvers.
pub const STABLE_MAX_ITERATIONS: usize = 255;

/// Relative change between two Newton steps at which the stable solvers stop.
pub const STABLE_CONVERGENCE_TOLERANCE: f64 = 1e-12;

/// Largest relative spread of marginal prices accepted across the paths of
/// one split.
pub const PRICE_ERROR_TOLERANCE: f64 = 1e-9;

/// Iteration cap for the Brent search on the common marginal price.
pub const SPLIT_MAX_ITERATIONS: u64 = 200;

/// Iteration cap when inverting one path's spot price curve.
pub const PATH_INVERSION_MAX_ITERATIONS: usize = 100;

/// Relative tolerance when inverting one path's spot price curve.
pub const PATH_INVERSION_TOLERANCE: f64 = 1e-13;

/// Relative tolerance for "allocated amounts sum to the requested amount".
pub const ALLOCATION_TOLERANCE: f64 = 1e-12;

/// Paths considered per request when the caller does not say otherwise.
pub const DEFAULT_MAX_POOLS: usize = 4;

/// Gas units charged per swap step when the caller does not say otherwise.
pub const DEFAULT_SWAP_GAS: f64 = 85_000.0;

/// Wei per native unit, used to turn `gas_price * gas` into native units.
pub const NATIVE_ASSET_SCALE: f64 = 1e18;

/// Amount carried by chained swap steps: "use the previous step's result".
pub const CHAINED_STEP_AMOUNT: &str = "0";

/// Opaque per-step payload; the plain swap kind needs none.
pub const EMPTY_USER_DATA: &str = "0x";
