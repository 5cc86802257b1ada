use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::UnderwritingError;
use crate::types::{Money, Rate};
use crate::UnderwritingResult;

const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Level monthly payment of a fully amortising loan.
///
/// `payment = P·r·(1+r)^n / ((1+r)^n − 1)` with `r = annual_rate / 12`,
/// falling back to `P / n` when the rate is zero. `annual_rate` is a
/// fraction (0.065 for 6.5%).
pub fn monthly_payment(
    principal: Money,
    annual_rate: Rate,
    term_months: u32,
) -> UnderwritingResult<Money> {
    if term_months == 0 {
        return Err(UnderwritingError::precondition(
            "term_months",
            "Number of periods must be > 0",
        ));
    }
    if annual_rate < Decimal::ZERO {
        return Err(UnderwritingError::invalid(
            "annual_rate",
            "Amortising payment requires a non-negative rate",
        ));
    }

    let n = Decimal::from(term_months);
    if annual_rate.is_zero() {
        return Ok(principal / n);
    }

    let r = annual_rate / MONTHS_PER_YEAR;
    let overflow = || {
        UnderwritingError::precondition(
            "term_months",
            format!("Compounding {term_months} periods at {annual_rate} exceeds decimal range"),
        )
    };
    let growth = (Decimal::ONE + r)
        .checked_powu(u64::from(term_months))
        .ok_or_else(overflow)?;
    let denominator = growth - Decimal::ONE;
    if denominator.is_zero() {
        return Err(UnderwritingError::DivisionByZero {
            context: "amortising payment annuity factor".into(),
        });
    }

    principal
        .checked_mul(r)
        .and_then(|v| v.checked_mul(growth))
        .and_then(|v| v.checked_div(denominator))
        .ok_or_else(overflow)
}

/// Coverage of debt service by income over the full term.
///
/// Both sides are scaled by `term_months`, so the ratio equals the per-month
/// ratio; zero debt service yields zero coverage.
pub fn term_coverage_ratio(average_noi: Money, payment: Money, term_months: u32) -> Decimal {
    if payment.is_zero() {
        return Decimal::ZERO;
    }
    let n = Decimal::from(term_months);
    match (average_noi.checked_mul(n), payment.checked_mul(n)) {
        (Some(total_noi), Some(total_payments)) if !total_payments.is_zero() => {
            total_noi / total_payments
        }
        // Totals past decimal range; the per-month ratio is the same value.
        _ => average_noi / payment,
    }
}
