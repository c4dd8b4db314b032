// amm_sor_rs/src/solvers.rs

use crate::config::RouterConfig;
use crate::constants::{ALLOCATION_TOLERANCE, PATH_INVERSION_TOLERANCE};
use crate::types::{Amount, Price, Result, SorError};

// argmin related imports
use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::brent::BrentRoot;

// ndarray for the allocation vectors
use ndarray::Array1;

/// A route priced as one increasing curve of marginal price over amount.
pub trait MarginalPriceCurve {
    /// Marginal price after `amount` has been routed.
    fn price_at(&self, amount: Amount) -> Result<Price>;

    /// d(price)/d(amount) at `amount`.
    fn slope_at(&self, amount: Amount) -> Result<Price>;

    /// Largest amount the curve accepts.
    fn ceiling(&self) -> Amount;
}

/// Result of splitting an amount over several curves.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSplit {
    /// Common marginal price reached by every curve that is neither empty nor
    /// full.
    pub price: Price,
    pub amounts: Array1<f64>,
}

/// Amount at which `curve` reaches marginal price `target`, clamped to
/// `[0, ceiling]`.
///
/// Newton steps on `price_at(x) - target` using the analytic slope, guarded by
/// a shrinking bracket: any step that leaves the bracket (or a non-positive
/// slope) falls back to bisection.
pub fn amount_at_price<C: MarginalPriceCurve + ?Sized>(
    curve: &C,
    target: Price,
    max_iterations: usize,
) -> Result<Amount> {
    let ceiling = curve.ceiling();
    let price_at_zero = curve.price_at(0.0)?;
    if price_at_zero >= target {
        return Ok(0.0);
    }
    let price_at_ceiling = curve.price_at(ceiling)?;
    if price_at_ceiling <= target {
        return Ok(ceiling);
    }

    let (mut lo, mut hi) = (0.0, ceiling);
    // Secant guess between the bracket ends.
    let mut x = ceiling * (target - price_at_zero) / (price_at_ceiling - price_at_zero);
    for _ in 0..max_iterations {
        let price = curve.price_at(x)?;
        let error = price - target;
        if error.abs() <= PATH_INVERSION_TOLERANCE * target {
            return Ok(x);
        }
        if error > 0.0 {
            hi = x;
        } else {
            lo = x;
        }
        if hi - lo <= f64::EPSILON * hi {
            return Ok(x);
        }
        let slope = curve.slope_at(x)?;
        let newton = x - error / slope;
        x = if slope > 0.0 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    Err(SorError::NumericDivergence {
        solver: "path price inversion",
        iterations: max_iterations,
    })
}

// Wrapper adapting a set of curves to argmin's root finder: the root of
// Σ x_i(P) - amount in P is the common marginal price.
struct CommonPriceProblem<'a, C> {
    curves: &'a [C],
    amount: Amount,
    max_inversion_iterations: usize,
}

impl<'a, C: MarginalPriceCurve> CommonPriceProblem<'a, C> {
    fn allocate(&self, price: Price) -> Result<Array1<f64>> {
        self.curves
            .iter()
            .map(|curve| amount_at_price(curve, price, self.max_inversion_iterations))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }
}

impl<'a, C: MarginalPriceCurve> CostFunction for CommonPriceProblem<'a, C> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, price: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let amounts = self.allocate(*price).map_err(Error::from)?;
        Ok(amounts.sum() - self.amount)
    }
}

/// Splits `amount` over `curves` so that every partially used curve ends at
/// the same marginal price.
///
/// # Errors
/// `InsufficientLiquidity` if the ceilings cannot absorb `amount`,
/// `NumericDivergence` if the common price cannot be found or the resulting
/// prices spread wider than `config.price_error_tolerance`.
pub fn equalize_marginal_prices<C: MarginalPriceCurve>(
    curves: &[C],
    amount: Amount,
    config: &RouterConfig,
) -> Result<PriceSplit> {
    if curves.is_empty() {
        return Err(SorError::InvalidInput("no curves to split over".to_string()));
    }
    let ceilings: Array1<f64> = curves.iter().map(|c| c.ceiling()).collect();
    let total = ceilings.sum();
    if amount > total {
        return Err(SorError::InsufficientLiquidity {
            requested: amount,
            available: total,
        });
    }
    if curves.len() == 1 {
        return Ok(PriceSplit {
            price: curves[0].price_at(amount)?,
            amounts: Array1::from_elem(1, amount),
        });
    }
    if amount == total {
        let price = max_price(curves, &ceilings)?;
        return Ok(PriceSplit {
            price,
            amounts: ceilings,
        });
    }

    let mut p_lo = f64::INFINITY;
    for curve in curves {
        p_lo = p_lo.min(curve.price_at(0.0)?);
    }
    let p_hi = max_price(curves, &ceilings)?;
    if p_hi - p_lo <= PATH_INVERSION_TOLERANCE * p_lo {
        // Flat curves: any split is optimal, fill in proportion to capacity.
        return Ok(PriceSplit {
            price: p_lo,
            amounts: ceilings * (amount / total),
        });
    }

    let problem = CommonPriceProblem {
        curves,
        amount,
        max_inversion_iterations: config.path_inversion_max_iterations,
    };
    let solver = BrentRoot::new(p_lo, p_hi, p_lo * PATH_INVERSION_TOLERANCE);
    let res = Executor::new(problem, solver)
        .configure(|state| state.param(p_hi).max_iters(config.split_max_iterations))
        .run()
        .map_err(|e| match e.downcast::<SorError>() {
            Ok(sor) => sor,
            Err(other) => {
                tracing::debug!(error = %other, "common price search failed");
                SorError::NumericDivergence {
                    solver: "common marginal price",
                    iterations: config.split_max_iterations as usize,
                }
            }
        })?;
    // The root finder's cost may be negative, so read the last parameter
    // rather than the best one.
    let price = res
        .state()
        .get_param()
        .copied()
        .ok_or(SorError::NumericDivergence {
            solver: "common marginal price",
            iterations: config.split_max_iterations as usize,
        })?;

    let problem = CommonPriceProblem {
        curves,
        amount,
        max_inversion_iterations: config.path_inversion_max_iterations,
    };
    let mut amounts = problem.allocate(price)?;
    correct_residual(curves, &ceilings, &mut amounts, amount)?;
    check_price_spread(curves, &ceilings, &amounts, config.price_error_tolerance)?;
    Ok(PriceSplit { price, amounts })
}

fn max_price<C: MarginalPriceCurve>(curves: &[C], ceilings: &Array1<f64>) -> Result<Price> {
    let mut price = f64::NEG_INFINITY;
    for (curve, ceiling) in curves.iter().zip(ceilings.iter()) {
        price = price.max(curve.price_at(*ceiling)?);
    }
    Ok(price)
}

/// Spreads `amount - Σ amounts` over the curves that still have room, in
/// proportion to `1 / slope` so their marginal prices move together.
fn correct_residual<C: MarginalPriceCurve>(
    curves: &[C],
    ceilings: &Array1<f64>,
    amounts: &mut Array1<f64>,
    amount: Amount,
) -> Result<()> {
    for _ in 0..=curves.len() {
        let residual = amount - amounts.sum();
        if residual.abs() <= ALLOCATION_TOLERANCE * amount {
            return Ok(());
        }
        // Curves strictly inside (0, ceiling) sit at the common price; only
        // fall back to empty or full ones when none is left.
        let interior = |i: usize| amounts[i] > 0.0 && amounts[i] < ceilings[i];
        let any_interior = (0..curves.len()).any(interior);
        let mut weights = Array1::<f64>::zeros(curves.len());
        for (i, curve) in curves.iter().enumerate() {
            let has_room = if any_interior {
                interior(i)
            } else if residual > 0.0 {
                amounts[i] < ceilings[i]
            } else {
                amounts[i] > 0.0
            };
            if has_room {
                let slope = curve.slope_at(amounts[i])?;
                weights[i] = if slope > 0.0 { 1.0 / slope } else { ceilings[i] };
            }
        }
        let weight_total = weights.sum();
        if weight_total <= 0.0 {
            break;
        }
        *amounts += &(weights * (residual / weight_total));
        for (value, ceiling) in amounts.iter_mut().zip(ceilings.iter()) {
            *value = value.clamp(0.0, *ceiling);
        }
    }
    let residual = amount - amounts.sum();
    if residual.abs() <= ALLOCATION_TOLERANCE * amount {
        Ok(())
    } else {
        Err(SorError::NumericDivergence {
            solver: "allocation residual",
            iterations: curves.len() + 1,
        })
    }
}

/// Marginal prices of curves strictly inside `(0, ceiling)` must agree.
fn check_price_spread<C: MarginalPriceCurve>(
    curves: &[C],
    ceilings: &Array1<f64>,
    amounts: &Array1<f64>,
    tolerance: f64,
) -> Result<()> {
    let (mut lowest, mut highest) = (f64::INFINITY, f64::NEG_INFINITY);
    for ((curve, amount), ceiling) in curves.iter().zip(amounts.iter()).zip(ceilings.iter()) {
        if *amount <= 0.0 || *amount >= *ceiling {
            continue;
        }
        let price = curve.price_at(*amount)?;
        lowest = lowest.min(price);
        highest = highest.max(price);
    }
    if highest > lowest && (highest - lowest) > tolerance * lowest {
        tracing::debug!(lowest, highest, "marginal prices did not converge");
        return Err(SorError::NumericDivergence {
            solver: "marginal price split",
            iterations: curves.len(),
        });
    }
    Ok(())
}
