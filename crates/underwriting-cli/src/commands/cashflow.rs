use clap::{Args, ValueEnum};
use serde_json::Value;

use underwriting_core::cashflow::outliers::{self, OutlierFilterInput, OutlierMethod};
use underwriting_core::cashflow::twap::{self, TimeWeightedInput};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Mad,
    Iqr,
}

impl From<MethodArg> for OutlierMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Mad => OutlierMethod::Mad,
            MethodArg::Iqr => OutlierMethod::Iqr,
        }
    }
}

/// Arguments for per-month outlier filtering
#[derive(Args)]
pub struct FilterOutliersArgs {
    /// Path to JSON input file ({"samples": [...], "method": "mad"})
    #[arg(long)]
    pub input: Option<String>,

    /// Filter method (overrides the file's method)
    #[arg(long)]
    pub method: Option<MethodArg>,
}

pub fn run_filter_outliers(args: FilterOutliersArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut filter_input: OutlierFilterInput =
        input::stdin::read_input(args.input.as_deref(), "Cash-flow samples")?;
    if let Some(method) = args.method {
        filter_input.method = method.into();
    }
    let result = outliers::calculate_outlier_filter(&filter_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for the recency-weighted NOI average
#[derive(Args)]
pub struct TwapArgs {
    /// Path to JSON input file ({"monthly_noi": {"2024-01": "1000", ...}})
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_twap(args: TwapArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let twap_input: TimeWeightedInput =
        input::stdin::read_input(args.input.as_deref(), "Monthly NOI")?;
    let result = twap::calculate_time_weighted_average(&twap_input)?;
    Ok(serde_json::to_value(result)?)
}
