use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::approval::ApprovalWorkflow;
use super::clock::Clock;
use super::config::SettingsSource;
use super::model::{ChangeId, PendingRateChange};
use super::orchestrator::{ComputeRateOutcome, ComputeRateRequest, UnderwritingService};
use super::store::{CashFlowRecord, UnderwritingStore};
use crate::error::UnderwritingError;
use crate::UnderwritingResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResponse {
    pub success: bool,
    pub change: PendingRateChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingListing {
    pub changes: Vec<PendingRateChange>,
    pub count: usize,
    pub approval_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub borrower_id: String,
    pub appended: usize,
}

/// Request-facing surface: one method per inbound command, each processed
/// to completion before the next.
pub struct UnderwritingApi<S> {
    service: UnderwritingService<S>,
    approvals: ApprovalWorkflow<S>,
}

impl<S> UnderwritingApi<S>
where
    S: UnderwritingStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            service: UnderwritingService::new(store.clone(), clock.clone(), settings),
            approvals: ApprovalWorkflow::new(store, clock),
        }
    }

    pub fn compute_rate(
        &self,
        loan_id: &str,
        target_dscr: Option<Decimal>,
        term_months: Option<u32>,
        requested_by: &str,
    ) -> UnderwritingResult<ComputeRateOutcome> {
        let request = ComputeRateRequest {
            loan_id: loan_id.to_string(),
            target_dscr,
            term_months,
            requested_by: requested_by.to_string(),
        };
        self.service.compute_rate(&request)
    }

    pub fn approve_change(
        &self,
        change_id: ChangeId,
        approved_by: &str,
    ) -> UnderwritingResult<ResolutionResponse> {
        let success = self.approvals.approve(change_id, approved_by)?;
        self.resolution_response(change_id, success)
    }

    pub fn reject_change(
        &self,
        change_id: ChangeId,
        approved_by: &str,
    ) -> UnderwritingResult<ResolutionResponse> {
        let success = self.approvals.reject(change_id, approved_by)?;
        self.resolution_response(change_id, success)
    }

    pub fn list_pending(&self, loan_id: Option<&str>) -> UnderwritingResult<PendingListing> {
        let changes = self.approvals.list_pending(loan_id)?;
        Ok(PendingListing {
            count: changes.len(),
            changes,
            approval_required: self.service.config().approval_required,
        })
    }

    pub fn get_change(&self, change_id: ChangeId) -> UnderwritingResult<Option<PendingRateChange>> {
        self.approvals.get_change(change_id)
    }

    pub fn ingest(
        &self,
        borrower_id: &str,
        records: Vec<CashFlowRecord>,
    ) -> UnderwritingResult<IngestResponse> {
        let appended = self.service.ingest_cash_flows(borrower_id, records)?;
        Ok(IngestResponse {
            borrower_id: borrower_id.to_string(),
            appended,
        })
    }

    fn resolution_response(
        &self,
        change_id: ChangeId,
        success: bool,
    ) -> UnderwritingResult<ResolutionResponse> {
        let not_resolvable = || {
            UnderwritingError::Conflict(format!(
                "change {change_id} not found or already resolved"
            ))
        };
        if !success {
            return Err(not_resolvable());
        }
        let change = self
            .approvals
            .get_change(change_id)?
            .ok_or_else(not_resolvable)?;
        Ok(ResolutionResponse { success, change })
    }
}
