use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::clock::Clock;
use super::config::{SettingsSource, UnderwritingConfig};
use super::hashing::input_hash;
use super::model::{
    CalculationId, ChangeId, Loan, LoanStatus, NewDscrCalculation, NewPendingRateChange,
};
use super::rate_solver::{solve_minimum_rate, RateSolverInput, DEFAULT_MAX_RATE, DEFAULT_MIN_RATE};
use super::store::{CashFlowRecord, UnderwritingStore};
use crate::cashflow::aggregation::{average_monthly_noi, monthly_noi, total_noi};
use crate::error::UnderwritingError;
use crate::time_value::monthly_payment;
use crate::types::{LoanId, Money, Rate};
use crate::UnderwritingResult;

const DSCR_DP: u32 = 6;
const MONEY_DP: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeRateRequest {
    pub loan_id: LoanId,
    #[serde(default)]
    pub target_dscr: Option<Decimal>,
    #[serde(default)]
    pub term_months: Option<u32>,
    pub requested_by: String,
}

impl ComputeRateRequest {
    pub fn new(loan_id: impl Into<LoanId>, requested_by: impl Into<String>) -> Self {
        Self {
            loan_id: loan_id.into(),
            target_dscr: None,
            term_months: None,
            requested_by: requested_by.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRateOutcome {
    pub loan_id: LoanId,
    pub dscr: Decimal,
    /// Annual percent.
    pub interest_rate: Rate,
    pub monthly_noi: Money,
    pub total_noi: Money,
    pub monthly_payment: Money,
    pub target_dscr: Decimal,
    pub meets_target: bool,
    pub loan_status: LoanStatus,
    pub input_hash: String,
    pub calculation_id: CalculationId,
    pub rate_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_change_id: Option<ChangeId>,
}

/// Runs the rate solver for a loan, records the audit trail and decides
/// whether the new rate is applied now or queued for sign-off.
pub struct UnderwritingService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsSource>,
}

impl<S> UnderwritingService<S>
where
    S: UnderwritingStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn config(&self) -> UnderwritingConfig {
        UnderwritingConfig::load(self.settings.as_ref())
    }

    pub fn compute_rate(
        &self,
        request: &ComputeRateRequest,
    ) -> UnderwritingResult<ComputeRateOutcome> {
        if request.requested_by.trim().is_empty() {
            return Err(UnderwritingError::invalid(
                "requested_by",
                "Requester identity is required.",
            ));
        }
        let config = self.config();
        let target_dscr = request.target_dscr.unwrap_or(config.default_target_dscr);

        let loan = self.load_loan(&request.loan_id)?;
        let samples = self
            .store
            .get_cash_flow_history(&loan.borrower_id, config.history_months)?;
        if samples.is_empty() {
            return Err(UnderwritingError::NoCashFlowData {
                loan_id: loan.id.clone(),
            });
        }

        let term_months = request.term_months.unwrap_or(loan.term_months);
        let solver_input = RateSolverInput {
            samples,
            principal: loan.principal,
            term_months,
            target_dscr,
            min_rate: DEFAULT_MIN_RATE,
            max_rate: DEFAULT_MAX_RATE,
        };
        let solution = solve_minimum_rate(&solver_input)?;
        let rate = solution.rate;

        let monthly = monthly_noi(&solver_input.samples);
        let total = total_noi(&monthly);
        let average = average_monthly_noi(&monthly).unwrap_or(Decimal::ZERO);
        let payment = monthly_payment(loan.principal, rate / Decimal::ONE_HUNDRED, term_months)?;
        let coverage = if payment.is_zero() {
            Decimal::ZERO
        } else {
            average / payment
        };
        // Target is checked against the unrounded ratio.
        let meets_target = coverage >= target_dscr;
        let dscr = round_half_up(coverage, DSCR_DP);
        let hash = input_hash(&solver_input.samples, loan.principal);

        let calculation_id = self.store.save_calculation_record(NewDscrCalculation {
            loan_id: loan.id.clone(),
            dscr_value: dscr,
            monthly_noi: average,
            monthly_debt_service: payment,
            computed_at: self.clock.now(),
            input_hash: hash.clone(),
        })?;

        let apply_now = !config.approval_required || loan.current_rate == Some(rate);
        let (loan_status, pending_change_id) = if apply_now {
            let status = if meets_target {
                LoanStatus::Approved
            } else {
                LoanStatus::Pending
            };
            self.store
                .update_loan_rate_and_status(&loan.id, rate, dscr, status)?;
            info!(loan_id = %loan.id, %rate, %dscr, status = status.label(), "rate applied");
            (status, None)
        } else {
            let change = self.store.create_pending_change(NewPendingRateChange {
                loan_id: loan.id.clone(),
                current_rate: loan.current_rate,
                proposed_rate: rate,
                dscr_value: dscr,
                reason: change_reason(loan.current_rate, rate, dscr, target_dscr),
                requested_by: request.requested_by.clone(),
                created_at: self.clock.now(),
            })?;
            let status = if meets_target {
                LoanStatus::AwaitingApproval
            } else {
                LoanStatus::Pending
            };
            self.store
                .update_loan_dscr_and_status(&loan.id, dscr, status)?;
            info!(
                loan_id = %loan.id,
                change_id = %change.id,
                proposed_rate = %rate,
                "rate change queued for approval"
            );
            (status, Some(change.id))
        };

        if !meets_target {
            warn!(loan_id = %loan.id, %dscr, %target_dscr, "target DSCR not met");
        }

        Ok(ComputeRateOutcome {
            loan_id: loan.id,
            dscr,
            interest_rate: rate,
            monthly_noi: round_half_up(average, MONEY_DP),
            total_noi: total,
            monthly_payment: round_half_up(payment, MONEY_DP),
            target_dscr,
            meets_target,
            loan_status,
            input_hash: hash,
            calculation_id,
            rate_pending: pending_change_id.is_some(),
            pending_change_id,
        })
    }

    /// Append one ingestion batch of cash-flow records for a borrower.
    pub fn ingest_cash_flows(
        &self,
        borrower_id: &str,
        records: Vec<CashFlowRecord>,
    ) -> UnderwritingResult<usize> {
        if borrower_id.trim().is_empty() {
            return Err(UnderwritingError::invalid(
                "borrower_id",
                "Borrower id is required.",
            ));
        }
        if records.is_empty() {
            return Err(UnderwritingError::invalid(
                "records",
                "Ingestion batch is empty.",
            ));
        }
        let limit = self.config().max_batch_size;
        if records.len() > limit {
            return Err(UnderwritingError::invalid(
                "records",
                format!("Batch of {} exceeds the limit of {limit}.", records.len()),
            ));
        }
        let appended = self.store.append_cash_flows(borrower_id, records)?;
        info!(borrower_id, appended, "cash flows ingested");
        Ok(appended)
    }

    fn load_loan(&self, loan_id: &str) -> UnderwritingResult<Loan> {
        self.store
            .get_loan(loan_id)?
            .ok_or_else(|| UnderwritingError::NotFound {
                entity: "loan".into(),
                id: loan_id.to_string(),
            })
    }
}

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn change_reason(current: Option<Rate>, proposed: Rate, dscr: Decimal, target: Decimal) -> String {
    let from = current.map_or_else(|| "unset".to_string(), |r| format!("{r}%"));
    let verdict = if dscr >= target { "meets" } else { "misses" };
    format!("Rate change {from} -> {proposed}%: DSCR {dscr} {verdict} target {target}")
}
