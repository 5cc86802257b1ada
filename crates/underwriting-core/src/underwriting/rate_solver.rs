//! Minimum interest rate for a target debt-service-coverage ratio.
//!
//! Samples are summed per UTC calendar month into NOI, averaged across the
//! distinct months (unweighted), and a bisection over the candidate annual
//! rate range finds where the amortising payment meets the target DSCR.
//! All arithmetic is `rust_decimal::Decimal` so every replica computes the
//! same digits.

use std::time::Instant;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cashflow::aggregation::{average_monthly_noi, monthly_noi, total_noi};
use crate::error::UnderwritingError;
use crate::time_value::{monthly_payment, term_coverage_ratio};
use crate::types::{with_metadata, CashFlowSample, ComputationOutput, Money, Rate};
use crate::UnderwritingResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_TERM_MONTHS: u32 = 24;
pub const DEFAULT_TARGET_DSCR: Decimal = dec!(1.25);
/// Lower candidate bound, annual percent.
pub const DEFAULT_MIN_RATE: Rate = dec!(1);
/// Upper candidate bound, annual percent.
pub const DEFAULT_MAX_RATE: Rate = dec!(10);

/// Bisection stops once the bracket is this narrow (rate fraction).
pub const RATE_TOLERANCE: Decimal = dec!(0.0001);

/// Decimal places of the returned percentage.
const RATE_DP: u32 = 6;

const PERCENT: Decimal = dec!(100);

fn default_term_months() -> u32 {
    DEFAULT_TERM_MONTHS
}

fn default_target_dscr() -> Decimal {
    DEFAULT_TARGET_DSCR
}

fn default_min_rate() -> Rate {
    DEFAULT_MIN_RATE
}

fn default_max_rate() -> Rate {
    DEFAULT_MAX_RATE
}

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSolverInput {
    pub samples: Vec<CashFlowSample>,
    pub principal: Money,
    #[serde(default = "default_term_months")]
    pub term_months: u32,
    #[serde(default = "default_target_dscr")]
    pub target_dscr: Decimal,
    /// Annual percent.
    #[serde(default = "default_min_rate")]
    pub min_rate: Rate,
    /// Annual percent.
    #[serde(default = "default_max_rate")]
    pub max_rate: Rate,
}

impl RateSolverInput {
    pub fn new(samples: Vec<CashFlowSample>, principal: Money) -> Self {
        Self {
            samples,
            principal,
            term_months: DEFAULT_TERM_MONTHS,
            target_dscr: DEFAULT_TARGET_DSCR,
            min_rate: DEFAULT_MIN_RATE,
            max_rate: DEFAULT_MAX_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveOutcome {
    Converged,
    /// No month had data; the lower bound is returned.
    NoData,
    /// Average NOI was zero or negative; the lower bound is returned.
    NonPositiveNoi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSolution {
    /// Annual percent, six decimal places.
    pub rate: Rate,
    pub outcome: SolveOutcome,
    pub months_observed: usize,
    pub total_noi: Money,
    pub average_monthly_noi: Money,
    pub iterations: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve for the rate at which the target DSCR is met.
///
/// The bracket moves its high end down whenever the midpoint's coverage is
/// below target and its low end up otherwise; the high end is returned once
/// the bracket is within [`RATE_TOLERANCE`].
pub fn solve_minimum_rate(input: &RateSolverInput) -> UnderwritingResult<RateSolution> {
    validate_input(input)?;

    let monthly = monthly_noi(&input.samples);
    let total = total_noi(&monthly);
    let Some(average) = average_monthly_noi(&monthly) else {
        return Ok(lower_bound_solution(input, SolveOutcome::NoData, 0, total, Decimal::ZERO));
    };
    if average <= Decimal::ZERO {
        return Ok(lower_bound_solution(
            input,
            SolveOutcome::NonPositiveNoi,
            monthly.len(),
            total,
            average,
        ));
    }

    let mut low = input.min_rate / PERCENT;
    let mut high = input.max_rate / PERCENT;
    let mut iterations = 0u32;

    while (high - low).abs() > RATE_TOLERANCE {
        let mid = (low + high) / dec!(2);
        let payment = monthly_payment(input.principal, mid, input.term_months)?;
        let dscr = term_coverage_ratio(average, payment, input.term_months);
        if dscr < input.target_dscr {
            high = mid;
        } else {
            low = mid;
        }
        iterations += 1;
    }

    let rate = round_rate(high * PERCENT);
    debug!(%rate, iterations, months = monthly.len(), "rate bisection converged");

    Ok(RateSolution {
        rate,
        outcome: SolveOutcome::Converged,
        months_observed: monthly.len(),
        total_noi: total,
        average_monthly_noi: average,
        iterations,
    })
}

/// [`solve_minimum_rate`] wrapped in the standard computation envelope.
pub fn calculate_rate(
    input: &RateSolverInput,
) -> UnderwritingResult<ComputationOutput<RateSolution>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let solution = solve_minimum_rate(input)?;
    match solution.outcome {
        SolveOutcome::NoData => {
            warnings.push("No cash-flow months supplied; returning the minimum rate bound".into())
        }
        SolveOutcome::NonPositiveNoi => warnings.push(
            "Average monthly NOI is not positive; returning the minimum rate bound".into(),
        ),
        SolveOutcome::Converged => {}
    }

    let assumptions = serde_json::json!({
        "term_months": input.term_months,
        "target_dscr": input.target_dscr.to_string(),
        "rate_bounds_pct": [input.min_rate.to_string(), input.max_rate.to_string()],
        "tolerance": RATE_TOLERANCE.to_string(),
        "noi_average": "unweighted mean of distinct months",
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DSCR-constrained rate bisection on amortising payment",
        &assumptions,
        warnings,
        elapsed,
        solution,
    ))
}

/// Round half-up to the solver's output precision.
pub fn round_rate(rate: Rate) -> Rate {
    rate.round_dp_with_strategy(RATE_DP, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn lower_bound_solution(
    input: &RateSolverInput,
    outcome: SolveOutcome,
    months_observed: usize,
    total_noi: Money,
    average_monthly_noi: Money,
) -> RateSolution {
    RateSolution {
        rate: round_rate(input.min_rate),
        outcome,
        months_observed,
        total_noi,
        average_monthly_noi,
        iterations: 0,
    }
}

fn validate_input(input: &RateSolverInput) -> UnderwritingResult<()> {
    if input.principal <= Decimal::ZERO {
        return Err(UnderwritingError::precondition(
            "principal",
            "Principal must be positive.",
        ));
    }
    if input.term_months == 0 {
        return Err(UnderwritingError::precondition(
            "term_months",
            "Term must be at least one month.",
        ));
    }
    if input.target_dscr <= Decimal::ZERO {
        return Err(UnderwritingError::precondition(
            "target_dscr",
            "Target DSCR must be positive.",
        ));
    }
    if input.min_rate < Decimal::ZERO {
        return Err(UnderwritingError::invalid(
            "min_rate",
            "Minimum rate cannot be negative.",
        ));
    }
    if input.max_rate <= input.min_rate {
        return Err(UnderwritingError::invalid(
            "max_rate",
            "Maximum rate must exceed the minimum rate.",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
