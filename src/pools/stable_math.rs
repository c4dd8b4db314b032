// amm_sor_rs/src/pools/stable_math.rs
//! Float rendition of the StableSwap invariant
//!
//! ```text
//! Ann * S + D = Ann * D + D^(n+1) / (n^n * Π x_i)      Ann = amp * n
//! ```
//!
//! Both solvers are plain Newton iterations that stop once the relative step
//! drops below [`STABLE_CONVERGENCE_TOLERANCE`].

use crate::constants::{STABLE_CONVERGENCE_TOLERANCE, STABLE_MAX_ITERATIONS};
use crate::types::{ensure_finite, Result, SorError, SwapType};

fn divergence(solver: &'static str) -> SorError {
    SorError::NumericDivergence {
        solver,
        iterations: STABLE_MAX_ITERATIONS,
    }
}

// D^(n+1) / (n^n * Π x_i), built up one balance at a time so it never
// overflows for large pools.
fn product_term(invariant: f64, balances: &[f64]) -> f64 {
    let n = balances.len() as f64;
    balances
        .iter()
        .fold(invariant, |d_p, balance| d_p * invariant / (balance * n))
}

/// Solves the invariant `D` for the given balances.
pub fn calculate_invariant(amp: f64, balances: &[f64]) -> Result<f64> {
    let sum: f64 = balances.iter().sum();
    if sum == 0.0 {
        return Ok(0.0);
    }
    if balances.iter().any(|b| *b <= 0.0) {
        return Err(divergence("stable invariant"));
    }
    let n = balances.len() as f64;
    let amp_times_total = amp * n;

    let mut invariant = sum;
    for _ in 0..STABLE_MAX_ITERATIONS {
        let d_p = product_term(invariant, balances);
        let previous = invariant;
        invariant = (amp_times_total * sum + d_p * n) * invariant
            / ((amp_times_total - 1.0) * invariant + (n + 1.0) * d_p);
        let invariant = ensure_finite(invariant, "stable invariant")?;
        if (invariant - previous).abs() <= STABLE_CONVERGENCE_TOLERANCE * invariant {
            return Ok(invariant);
        }
    }
    Err(divergence("stable invariant"))
}

/// Solves the balance of token `index` that keeps `invariant` fixed, holding
/// every other entry of `balances` (the value at `index` is ignored).
pub fn balance_given_invariant(
    amp: f64,
    balances: &[f64],
    index: usize,
    invariant: f64,
) -> Result<f64> {
    let n = balances.len() as f64;
    let amp_times_total = amp * n;

    // y^2 + (b - D) y = c with
    //   b = S' + D / Ann
    //   c = D^(n+1) / (Ann * n^n * Π' x_j)
    let mut sum = 0.0;
    let mut c = invariant;
    for (j, balance) in balances.iter().enumerate() {
        if j == index {
            continue;
        }
        if *balance <= 0.0 {
            return Err(divergence("stable balance"));
        }
        sum += balance;
        c = c * invariant / (balance * n);
    }
    c = c * invariant / (amp_times_total * n);
    let b = sum + invariant / amp_times_total;

    let mut balance = (invariant * invariant + c) / (invariant + b);
    for _ in 0..STABLE_MAX_ITERATIONS {
        let previous = balance;
        balance = (balance * balance + c) / (2.0 * balance + b - invariant);
        let balance = ensure_finite(balance, "stable balance")?;
        if (balance - previous).abs() <= STABLE_CONVERGENCE_TOLERANCE * balance {
            return Ok(balance);
        }
    }
    Err(divergence("stable balance"))
}

/// `∂D/∂x_index` at the given balances.
pub fn invariant_partial(amp: f64, balances: &[f64], invariant: f64, index: usize) -> f64 {
    let n = balances.len() as f64;
    let amp_times_total = amp * n;
    let d_p = product_term(invariant, balances);
    (amp_times_total + d_p / balances[index])
        / (amp_times_total - 1.0 + (n + 1.0) * d_p / invariant)
}

/// Marginal price (token in per token out, fee included) and its derivative
/// with respect to the swap amount, evaluated at post-swap `balances`.
///
/// Moving along the invariant curve, `dy/dx = -g/h` with
/// `g = Ann + d_p/x` and `h = Ann + d_p/y`, so the price is `h / ((1-f) g)`.
/// The derivative holds `D` fixed and differentiates `d_p`, `g` and `h`
/// along the direction the swap moves the balances.
pub fn marginal_price(
    amp: f64,
    balances: &[f64],
    invariant: f64,
    index_in: usize,
    index_out: usize,
    gamma: f64,
    swap_type: SwapType,
) -> Result<(f64, f64)> {
    let n = balances.len() as f64;
    let amp_times_total = amp * n;
    let (x, y) = (balances[index_in], balances[index_out]);
    let d_p = product_term(invariant, balances);
    let g = amp_times_total + d_p / x;
    let h = amp_times_total + d_p / y;
    let price = h / (gamma * g);

    let (dx, dy) = match swap_type {
        SwapType::ExactIn => (gamma, -gamma * g / h),
        SwapType::ExactOut => (h / g, -1.0),
    };
    let dd_p = -d_p * (dx / x + dy / y);
    let dg = dd_p / x - d_p * dx / (x * x);
    let dh = dd_p / y - d_p * dy / (y * y);
    let derivative = (dh * g - h * dg) / (gamma * g * g);

    Ok((
        ensure_finite(price, "stable spot price")?,
        ensure_finite(derivative, "stable spot price derivative")?,
    ))
}
