use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwritingError;
use crate::types::{BorrowerId, LoanId, Money, Rate};
use crate::UnderwritingResult;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub u64);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = UnderwritingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(ChangeId)
            .map_err(|_| UnderwritingError::invalid("change_id", format!("'{s}' is not a change id")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculationId(pub u64);

impl fmt::Display for CalculationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Loan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Neutral state: no rate decision in force.
    Pending,
    /// Rate applied and the target DSCR was met (or a reviewer signed off).
    Approved,
    /// Target met, but the new rate waits on a reviewer.
    AwaitingApproval,
}

impl LoanStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::AwaitingApproval => "awaiting_approval",
        }
    }
}

/// Loan record owned by the persistence layer. The engine reads principal
/// and term and writes rate, DSCR and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: BorrowerId,
    pub principal: Money,
    pub term_months: u32,
    /// Annual percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dscr: Option<Decimal>,
    pub status: LoanStatus,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// Append-only record of one DSCR evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DscrCalculation {
    pub id: CalculationId,
    pub loan_id: LoanId,
    pub dscr_value: Decimal,
    pub monthly_noi: Money,
    pub monthly_debt_service: Money,
    pub computed_at: DateTime<Utc>,
    pub input_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDscrCalculation {
    pub loan_id: LoanId,
    pub dscr_value: Decimal,
    pub monthly_noi: Money,
    pub monthly_debt_service: Money,
    pub computed_at: DateTime<Utc>,
    pub input_hash: String,
}

impl NewDscrCalculation {
    pub fn into_record(self, id: CalculationId) -> DscrCalculation {
        DscrCalculation {
            id,
            loan_id: self.loan_id,
            dscr_value: self.dscr_value,
            monthly_noi: self.monthly_noi,
            monthly_debt_service: self.monthly_debt_service,
            computed_at: self.computed_at,
            input_hash: self.input_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Pending rate changes
// ---------------------------------------------------------------------------

/// pending → approved | pending → rejected. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChangeStatus::Pending)
    }

    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        matches!(
            (self, next),
            (ChangeStatus::Pending, ChangeStatus::Approved)
                | (ChangeStatus::Pending, ChangeStatus::Rejected)
        )
    }

    pub fn transition(self, next: ChangeStatus) -> UnderwritingResult<ChangeStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(UnderwritingError::Conflict(format!(
                "cannot move rate change from {} to {}",
                self.label(),
                next.label()
            )))
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRateChange {
    pub id: ChangeId,
    pub loan_id: LoanId,
    /// Loan rate at the time the change was proposed, if one was set.
    pub current_rate: Option<Rate>,
    pub proposed_rate: Rate,
    pub dscr_value: Decimal,
    pub reason: String,
    pub status: ChangeStatus,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Terminal decision applied to a pending change.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: ChangeStatus,
    pub approved_by: String,
    pub resolved_at: DateTime<Utc>,
}

impl PendingRateChange {
    /// Apply a resolution. Status, approver and `resolved_at` are written
    /// together or not at all.
    pub fn resolve(&mut self, resolution: Resolution) -> UnderwritingResult<()> {
        let next = self.status.transition(resolution.status)?;
        self.status = next;
        self.approved_by = Some(resolution.approved_by);
        self.resolved_at = Some(resolution.resolved_at);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingRateChange {
    pub loan_id: LoanId,
    pub current_rate: Option<Rate>,
    pub proposed_rate: Rate,
    pub dscr_value: Decimal,
    pub reason: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

impl NewPendingRateChange {
    pub fn into_change(self, id: ChangeId) -> PendingRateChange {
        PendingRateChange {
            id,
            loan_id: self.loan_id,
            current_rate: self.current_rate,
            proposed_rate: self.proposed_rate,
            dscr_value: self.dscr_value,
            reason: self.reason,
            status: ChangeStatus::Pending,
            requested_by: self.requested_by,
            approved_by: None,
            created_at: self.created_at,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn change() -> PendingRateChange {
        NewPendingRateChange {
            loan_id: "L-1".into(),
            current_rate: Some(dec!(5.0)),
            proposed_rate: dec!(6.5),
            dscr_value: dec!(1.4),
            reason: "test".into(),
            requested_by: "system".into(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
        .into_change(ChangeId(1))
    }

    fn resolution(status: ChangeStatus) -> Resolution {
        Resolution {
            status,
            approved_by: "alice".into(),
            resolved_at: Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_only_pending_transitions_allowed() {
        assert!(ChangeStatus::Pending.can_transition_to(ChangeStatus::Approved));
        assert!(ChangeStatus::Pending.can_transition_to(ChangeStatus::Rejected));
        assert!(!ChangeStatus::Pending.can_transition_to(ChangeStatus::Pending));
        assert!(!ChangeStatus::Approved.can_transition_to(ChangeStatus::Rejected));
        assert!(!ChangeStatus::Rejected.can_transition_to(ChangeStatus::Approved));
        assert!(ChangeStatus::Approved.is_terminal());
        assert!(!ChangeStatus::Pending.is_terminal());
    }

    #[test]
    fn test_resolve_sets_status_and_timestamp_together() {
        let mut c = change();
        c.resolve(resolution(ChangeStatus::Approved)).unwrap();
        assert_eq!(c.status, ChangeStatus::Approved);
        assert_eq!(c.approved_by.as_deref(), Some("alice"));
        assert!(c.resolved_at.is_some());
    }

    #[test]
    fn test_second_resolution_fails_and_preserves_first() {
        let mut c = change();
        c.resolve(resolution(ChangeStatus::Approved)).unwrap();
        let first = c.clone();
        let mut second = resolution(ChangeStatus::Rejected);
        second.approved_by = "bob".into();
        let err = c.resolve(second).unwrap_err();
        assert!(matches!(err, UnderwritingError::Conflict(_)));
        assert_eq!(c, first);
    }

    #[test]
    fn test_change_id_parse() {
        assert_eq!("42".parse::<ChangeId>().unwrap(), ChangeId(42));
        assert!("abc".parse::<ChangeId>().is_err());
    }
}
