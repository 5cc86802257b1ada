use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::{
    CalculationId, ChangeId, ChangeStatus, DscrCalculation, Loan, LoanStatus,
    NewDscrCalculation, NewPendingRateChange, PendingRateChange, Resolution,
};
use crate::error::UnderwritingError;
use crate::types::{BorrowerId, CashFlowSample, LoanId, Money, Rate};

/// Error enumeration for persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for UnderwritingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => UnderwritingError::Conflict(msg),
            StoreError::NotFound { entity, id } => UnderwritingError::NotFound {
                entity: entity.to_string(),
                id,
            },
            StoreError::Unavailable(msg) => UnderwritingError::Store(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored cash-flow entry. Unsettled entries are kept but never returned
/// as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowRecord {
    pub amount: Money,
    pub occurred_on: DateTime<Utc>,
    #[serde(default = "settled_by_default")]
    pub settled: bool,
}

fn settled_by_default() -> bool {
    true
}

impl CashFlowRecord {
    pub fn settled(amount: Money, occurred_on: DateTime<Utc>) -> Self {
        Self {
            amount,
            occurred_on,
            settled: true,
        }
    }

    pub fn sample(&self) -> CashFlowSample {
        CashFlowSample::new(self.amount, self.occurred_on)
    }
}

/// Storage abstraction injected into the orchestrator and approval workflow.
pub trait UnderwritingStore: Send + Sync {
    fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>>;

    /// Settled samples for the borrower, oldest first, covering the
    /// `months_back` calendar months that end at their latest settled month.
    fn get_cash_flow_history(
        &self,
        borrower_id: &str,
        months_back: u32,
    ) -> StoreResult<Vec<CashFlowSample>>;

    fn append_cash_flows(
        &self,
        borrower_id: &str,
        records: Vec<CashFlowRecord>,
    ) -> StoreResult<usize>;

    fn save_calculation_record(&self, record: NewDscrCalculation) -> StoreResult<CalculationId>;

    /// Persist a new change with status `pending`.
    fn create_pending_change(&self, change: NewPendingRateChange)
        -> StoreResult<PendingRateChange>;

    fn get_pending_change(&self, id: ChangeId) -> StoreResult<Option<PendingRateChange>>;

    /// Pending changes only, newest first.
    fn list_pending_changes(&self, loan_id: Option<&str>) -> StoreResult<Vec<PendingRateChange>>;

    /// Atomically move a change out of `pending`. Returns `None` when the
    /// change does not exist or was already resolved.
    fn resolve_pending_change(
        &self,
        id: ChangeId,
        resolution: Resolution,
    ) -> StoreResult<Option<PendingRateChange>>;

    fn update_loan_rate_and_status(
        &self,
        loan_id: &str,
        rate: Rate,
        dscr: Decimal,
        status: LoanStatus,
    ) -> StoreResult<()>;

    fn update_loan_dscr_and_status(
        &self,
        loan_id: &str,
        dscr: Decimal,
        status: LoanStatus,
    ) -> StoreResult<()>;

    fn update_loan_status(&self, loan_id: &str, status: LoanStatus) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Serializable state of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub loans: BTreeMap<LoanId, Loan>,
    #[serde(default)]
    pub cash_flows: BTreeMap<BorrowerId, Vec<CashFlowRecord>>,
    #[serde(default)]
    pub calculations: Vec<DscrCalculation>,
    #[serde(default)]
    pub rate_changes: Vec<PendingRateChange>,
    #[serde(default)]
    pub next_calculation_id: u64,
    #[serde(default)]
    pub next_change_id: u64,
}

/// Mutex-guarded store with sequential ids.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        Ok(self.lock()?.clone())
    }

    pub fn insert_loan(&self, loan: Loan) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.loans.contains_key(&loan.id) {
            return Err(StoreError::Conflict(format!("loan {}", loan.id)));
        }
        state.loans.insert(loan.id.clone(), loan);
        Ok(())
    }

    pub fn calculations_for(&self, loan_id: &str) -> StoreResult<Vec<DscrCalculation>> {
        Ok(self
            .lock()?
            .calculations
            .iter()
            .filter(|c| c.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreSnapshot>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
    }

    fn with_loan<F>(&self, loan_id: &str, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Loan),
    {
        let mut state = self.lock()?;
        let loan = state
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "loan",
                id: loan_id.to_string(),
            })?;
        apply(loan);
        Ok(())
    }
}

fn month_index(at: &DateTime<Utc>) -> i64 {
    i64::from(at.year()) * 12 + i64::from(at.month0())
}

impl UnderwritingStore for InMemoryStore {
    fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>> {
        Ok(self.lock()?.loans.get(id).cloned())
    }

    fn get_cash_flow_history(
        &self,
        borrower_id: &str,
        months_back: u32,
    ) -> StoreResult<Vec<CashFlowSample>> {
        let state = self.lock()?;
        let Some(records) = state.cash_flows.get(borrower_id) else {
            return Ok(Vec::new());
        };
        if months_back == 0 {
            return Ok(Vec::new());
        }

        let settled: Vec<&CashFlowRecord> = records.iter().filter(|r| r.settled).collect();
        let Some(latest) = settled.iter().map(|r| month_index(&r.occurred_on)).max() else {
            return Ok(Vec::new());
        };
        let earliest = latest - i64::from(months_back) + 1;

        let mut history: Vec<CashFlowSample> = settled
            .into_iter()
            .filter(|r| month_index(&r.occurred_on) >= earliest)
            .map(CashFlowRecord::sample)
            .collect();
        history.sort_by(|a, b| a.occurred_on.cmp(&b.occurred_on));
        Ok(history)
    }

    fn append_cash_flows(
        &self,
        borrower_id: &str,
        records: Vec<CashFlowRecord>,
    ) -> StoreResult<usize> {
        let count = records.len();
        self.lock()?
            .cash_flows
            .entry(borrower_id.to_string())
            .or_default()
            .extend(records);
        Ok(count)
    }

    fn save_calculation_record(&self, record: NewDscrCalculation) -> StoreResult<CalculationId> {
        let mut state = self.lock()?;
        state.next_calculation_id += 1;
        let id = CalculationId(state.next_calculation_id);
        state.calculations.push(record.into_record(id));
        Ok(id)
    }

    fn create_pending_change(
        &self,
        change: NewPendingRateChange,
    ) -> StoreResult<PendingRateChange> {
        let mut state = self.lock()?;
        state.next_change_id += 1;
        let id = ChangeId(state.next_change_id);
        if state.rate_changes.iter().any(|c| c.id == id) {
            return Err(StoreError::Conflict(format!("rate change {id}")));
        }
        let created = change.into_change(id);
        state.rate_changes.push(created.clone());
        Ok(created)
    }

    fn get_pending_change(&self, id: ChangeId) -> StoreResult<Option<PendingRateChange>> {
        Ok(self
            .lock()?
            .rate_changes
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn list_pending_changes(&self, loan_id: Option<&str>) -> StoreResult<Vec<PendingRateChange>> {
        let state = self.lock()?;
        let mut pending: Vec<PendingRateChange> = state
            .rate_changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Pending)
            .filter(|c| loan_id.map_or(true, |id| c.loan_id == id))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pending)
    }

    fn resolve_pending_change(
        &self,
        id: ChangeId,
        resolution: Resolution,
    ) -> StoreResult<Option<PendingRateChange>> {
        let mut state = self.lock()?;
        let Some(change) = state.rate_changes.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if change.resolve(resolution).is_err() {
            return Ok(None);
        }
        Ok(Some(change.clone()))
    }

    fn update_loan_rate_and_status(
        &self,
        loan_id: &str,
        rate: Rate,
        dscr: Decimal,
        status: LoanStatus,
    ) -> StoreResult<()> {
        self.with_loan(loan_id, |loan| {
            loan.current_rate = Some(rate);
            loan.dscr = Some(dscr);
            loan.status = status;
        })
    }

    fn update_loan_dscr_and_status(
        &self,
        loan_id: &str,
        dscr: Decimal,
        status: LoanStatus,
    ) -> StoreResult<()> {
        self.with_loan(loan_id, |loan| {
            loan.dscr = Some(dscr);
            loan.status = status;
        })
    }

    fn update_loan_status(&self, loan_id: &str, status: LoanStatus) -> StoreResult<()> {
        self.with_loan(loan_id, |loan| loan.status = status)
    }
}
