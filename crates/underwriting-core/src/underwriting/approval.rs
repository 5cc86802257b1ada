use std::sync::Arc;

use tracing::{info, warn};

use super::clock::Clock;
use super::model::{ChangeId, ChangeStatus, LoanStatus, PendingRateChange, Resolution};
use super::store::UnderwritingStore;
use crate::error::UnderwritingError;
use crate::UnderwritingResult;

/// Owns the pending → approved | rejected lifecycle of proposed rate
/// changes. It is the only writer of a change's status.
///
/// Resolution goes through [`UnderwritingStore::resolve_pending_change`],
/// which checks and writes the status in one step, so two approvers racing
/// on the same change see exactly one success.
pub struct ApprovalWorkflow<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> ApprovalWorkflow<S>
where
    S: UnderwritingStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Approve a pending change and move its proposed rate onto the loan.
    ///
    /// Returns `Ok(false)` if the change is unknown or already resolved, and
    /// `NotFound` without resolving anything if its loan is gone. A store
    /// failure between the status write and the loan write leaves the change
    /// approved with the loan unchanged; it is not retried.
    pub fn approve(&self, change_id: ChangeId, approved_by: &str) -> UnderwritingResult<bool> {
        let Some(change) = self.resolve(change_id, ChangeStatus::Approved, approved_by)? else {
            return Ok(false);
        };
        self.store.update_loan_rate_and_status(
            &change.loan_id,
            change.proposed_rate,
            change.dscr_value,
            LoanStatus::Approved,
        )?;
        info!(
            change_id = %change.id,
            loan_id = %change.loan_id,
            rate = %change.proposed_rate,
            approved_by,
            "rate change approved"
        );
        Ok(true)
    }

    /// Reject a pending change. The loan keeps its rate and returns to the
    /// neutral `pending` status.
    pub fn reject(&self, change_id: ChangeId, approved_by: &str) -> UnderwritingResult<bool> {
        let Some(change) = self.resolve(change_id, ChangeStatus::Rejected, approved_by)? else {
            return Ok(false);
        };
        self.store
            .update_loan_status(&change.loan_id, LoanStatus::Pending)?;
        info!(
            change_id = %change.id,
            loan_id = %change.loan_id,
            approved_by,
            "rate change rejected"
        );
        Ok(true)
    }

    pub fn list_pending(&self, loan_id: Option<&str>) -> UnderwritingResult<Vec<PendingRateChange>> {
        Ok(self.store.list_pending_changes(loan_id)?)
    }

    pub fn get_change(&self, change_id: ChangeId) -> UnderwritingResult<Option<PendingRateChange>> {
        Ok(self.store.get_pending_change(change_id)?)
    }

    fn resolve(
        &self,
        change_id: ChangeId,
        status: ChangeStatus,
        approved_by: &str,
    ) -> UnderwritingResult<Option<PendingRateChange>> {
        if approved_by.trim().is_empty() {
            return Err(UnderwritingError::invalid(
                "approved_by",
                "Reviewer identity is required.",
            ));
        }

        let existing = match self.store.get_pending_change(change_id)? {
            None => {
                warn!(%change_id, "rate change not found");
                return Ok(None);
            }
            Some(existing) if !existing.status.can_transition_to(status) => {
                warn!(
                    %change_id,
                    current = existing.status.label(),
                    requested = status.label(),
                    "rate change already resolved"
                );
                return Ok(None);
            }
            Some(existing) => existing,
        };

        // The loan update follows the terminal status write, so the loan must
        // exist before the change leaves `pending`.
        if self.store.get_loan(&existing.loan_id)?.is_none() {
            return Err(UnderwritingError::NotFound {
                entity: "loan".into(),
                id: existing.loan_id,
            });
        }

        let resolution = Resolution {
            status,
            approved_by: approved_by.to_string(),
            resolved_at: self.clock.now(),
        };
        let resolved = self.store.resolve_pending_change(change_id, resolution)?;
        if resolved.is_none() {
            warn!(%change_id, "rate change resolved concurrently");
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::underwriting::clock::FixedClock;
    use crate::underwriting::model::{Loan, NewPendingRateChange};
    use crate::underwriting::store::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn setup() -> (ApprovalWorkflow<InMemoryStore>, Arc<InMemoryStore>, ChangeId) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_loan(Loan {
                id: "L-1".into(),
                borrower_id: "B-1".into(),
                principal: dec!(10_000),
                term_months: 24,
                current_rate: Some(dec!(5.0)),
                dscr: Some(dec!(1.4)),
                status: LoanStatus::AwaitingApproval,
            })
            .unwrap();
        let change = store
            .create_pending_change(NewPendingRateChange {
                loan_id: "L-1".into(),
                current_rate: Some(dec!(5.0)),
                proposed_rate: dec!(6.5),
                dscr_value: dec!(1.4),
                reason: "test".into(),
                requested_by: "system".into(),
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
        (
            ApprovalWorkflow::new(store.clone(), Arc::new(clock)),
            store,
            change.id,
        )
    }

    #[test]
    fn test_approve_twice() {
        let (workflow, store, id) = setup();
        assert!(workflow.approve(id, "alice").unwrap());
        assert!(!workflow.approve(id, "bob").unwrap());

        let change = workflow.get_change(id).unwrap().unwrap();
        assert_eq!(change.status, ChangeStatus::Approved);
        assert_eq!(change.approved_by.as_deref(), Some("alice"));

        let loan = store.get_loan("L-1").unwrap().unwrap();
        assert_eq!(loan.current_rate, Some(dec!(6.5)));
        assert_eq!(loan.status, LoanStatus::Approved);
    }

    #[test]
    fn test_reject_twice() {
        let (workflow, store, id) = setup();
        assert!(workflow.reject(id, "alice").unwrap());
        assert!(!workflow.reject(id, "alice").unwrap());

        let loan = store.get_loan("L-1").unwrap().unwrap();
        assert_eq!(loan.current_rate, Some(dec!(5.0)));
        assert_eq!(loan.dscr, Some(dec!(1.4)));
        assert_eq!(loan.status, LoanStatus::Pending);
    }

    #[test]
    fn test_reject_after_approve_keeps_approval() {
        let (workflow, store, id) = setup();
        assert!(workflow.approve(id, "alice").unwrap());
        let loan_before = store.get_loan("L-1").unwrap().unwrap();
        assert!(!workflow.reject(id, "bob").unwrap());

        let change = workflow.get_change(id).unwrap().unwrap();
        assert_eq!(change.status, ChangeStatus::Approved);
        assert_eq!(store.get_loan("L-1").unwrap().unwrap(), loan_before);
    }

    #[test]
    fn test_unknown_change_reports_failure() {
        let (workflow, _, _) = setup();
        assert!(!workflow.approve(ChangeId(404), "alice").unwrap());
        assert!(workflow.get_change(ChangeId(404)).unwrap().is_none());
    }

    #[test]
    fn test_blank_reviewer_rejected() {
        let (workflow, _, id) = setup();
        let err = workflow.approve(id, "  ").unwrap_err();
        assert!(matches!(err, UnderwritingError::InvalidInput { .. }));
        assert_eq!(workflow.list_pending(None).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_loan_leaves_change_pending() {
        let (workflow, store, _) = setup();
        let orphan = store
            .create_pending_change(NewPendingRateChange {
                loan_id: "L-gone".into(),
                current_rate: None,
                proposed_rate: dec!(7.0),
                dscr_value: dec!(1.3),
                reason: "test".into(),
                requested_by: "system".into(),
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();

        match workflow.approve(orphan.id, "alice") {
            Err(UnderwritingError::NotFound { entity, id }) => {
                assert_eq!(entity, "loan");
                assert_eq!(id, "L-gone");
            }
            other => panic!("Expected NotFound, got {other:?}"),
        }
        assert!(workflow.reject(orphan.id, "alice").is_err());

        let change = workflow.get_change(orphan.id).unwrap().unwrap();
        assert_eq!(change.status, ChangeStatus::Pending);
        assert!(change.resolved_at.is_none());
    }

    #[test]
    fn test_list_pending_drops_resolved() {
        let (workflow, _, id) = setup();
        assert_eq!(workflow.list_pending(Some("L-1")).unwrap().len(), 1);
        workflow.approve(id, "alice").unwrap();
        assert!(workflow.list_pending(Some("L-1")).unwrap().is_empty());
    }
}
