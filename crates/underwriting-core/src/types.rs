use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwritingError;
use crate::UnderwritingResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates. Loans and solver outputs carry annual percentages (6.5 = 6.5%);
/// the payment formula takes annual fractions (0.065).
pub type Rate = Decimal;

/// "YYYY-MM" calendar month in UTC.
pub type MonthKey = String;

pub type LoanId = String;
pub type BorrowerId = String;

/// A single signed cash-flow observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowSample {
    pub amount: Money,
    pub occurred_on: DateTime<Utc>,
}

impl CashFlowSample {
    pub fn new(amount: Money, occurred_on: DateTime<Utc>) -> Self {
        Self {
            amount,
            occurred_on,
        }
    }

    pub fn month_key(&self) -> MonthKey {
        month_key(&self.occurred_on)
    }
}

pub fn month_key(at: &DateTime<Utc>) -> MonthKey {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// Convert an f64 arriving from an untyped boundary into a Decimal,
/// rejecting NaN and infinities.
pub fn decimal_from_f64(field: &str, value: f64) -> UnderwritingResult<Decimal> {
    if !value.is_finite() {
        return Err(UnderwritingError::precondition(
            field,
            format!("must be a finite number, got {value}"),
        ));
    }
    Decimal::from_f64(value).ok_or_else(|| {
        UnderwritingError::precondition(field, format!("{value} is outside decimal range"))
    })
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
