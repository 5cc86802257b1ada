use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use underwriting_core::types::{CashFlowSample, Money};
use underwriting_core::underwriting::hashing;
use underwriting_core::underwriting::rate_solver::{self, RateSolverInput};

use crate::input;

/// Arguments for the DSCR-constrained rate solver
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SolveRateArgs {
    /// Path to JSON input file ({"samples": [...], "principal": "10000", ...})
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Amortisation term in months
    #[arg(long)]
    pub term_months: Option<u32>,

    /// Target debt-service coverage ratio (e.g. 1.25)
    #[arg(long)]
    pub target_dscr: Option<Decimal>,

    /// Lower rate bound, annual percent
    #[arg(long)]
    pub min_rate: Option<Decimal>,

    /// Upper rate bound, annual percent
    #[arg(long)]
    pub max_rate: Option<Decimal>,
}

pub fn run_solve_rate(args: SolveRateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut solver_input: RateSolverInput =
        input::stdin::read_input(args.input.as_deref(), "Rate solver input")?;

    if let Some(v) = args.principal {
        solver_input.principal = v;
    }
    if let Some(v) = args.term_months {
        solver_input.term_months = v;
    }
    if let Some(v) = args.target_dscr {
        solver_input.target_dscr = v;
    }
    if let Some(v) = args.min_rate {
        solver_input.min_rate = v;
    }
    if let Some(v) = args.max_rate {
        solver_input.max_rate = v;
    }

    let result = rate_solver::calculate_rate(&solver_input)?;
    Ok(serde_json::to_value(result)?)
}

#[derive(Deserialize)]
struct HashInput {
    samples: Vec<CashFlowSample>,
    principal: Money,
}

/// Arguments for the evaluation input hash
#[derive(Args)]
pub struct InputHashArgs {
    /// Path to JSON input file ({"samples": [...], "principal": "10000"})
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_input_hash(args: InputHashArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let hash_input: HashInput = input::stdin::read_input(args.input.as_deref(), "Hash input")?;
    Ok(json!({
        "input_hash": hashing::input_hash(&hash_input.samples, hash_input.principal),
        "sample_count": hash_input.samples.len(),
    }))
}
