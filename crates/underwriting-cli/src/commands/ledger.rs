//! Commands that read and write the JSON ledger holding loans, cash flows,
//! calculations and rate changes.

use std::sync::Arc;

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use underwriting_core::underwriting::api::UnderwritingApi;
use underwriting_core::underwriting::clock::SystemClock;
use underwriting_core::underwriting::config::EnvSettings;
use underwriting_core::underwriting::model::{ChangeId, Loan, LoanStatus};
use underwriting_core::underwriting::store::{CashFlowRecord, InMemoryStore, StoreSnapshot};

use crate::input;
use crate::input::lock::LedgerLock;

const DEFAULT_LEDGER: &str = "underwriting-ledger.json";

#[derive(Args)]
pub struct LedgerArg {
    /// Path to the JSON ledger (created on first write)
    #[arg(long, env = "UNDERWRITING_LEDGER", default_value = DEFAULT_LEDGER)]
    pub ledger: String,
}

/// A loaded ledger. The sidecar lock is taken before the read and held
/// until this value is dropped, so concurrent `dscr` processes apply their
/// commands one at a time.
struct Ledger {
    path: String,
    store: Arc<InMemoryStore>,
    _lock: LedgerLock,
}

impl Ledger {
    fn open(arg: &LedgerArg) -> Result<Self, Box<dyn std::error::Error>> {
        let lock = LedgerLock::acquire(&arg.ledger)?;
        let snapshot: StoreSnapshot = input::file::read_json_or_default(&arg.ledger)?;
        debug!(
            path = %arg.ledger,
            loans = snapshot.loans.len(),
            changes = snapshot.rate_changes.len(),
            "ledger loaded"
        );
        Ok(Self {
            path: arg.ledger.clone(),
            store: Arc::new(InMemoryStore::from_snapshot(snapshot)),
            _lock: lock,
        })
    }

    fn api(&self) -> UnderwritingApi<InMemoryStore> {
        UnderwritingApi::new(
            self.store.clone(),
            Arc::new(SystemClock),
            Arc::new(EnvSettings),
        )
    }

    fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        input::file::write_json(&self.path, &self.store.snapshot()?)?;
        debug!(path = %self.path, "ledger saved");
        Ok(())
    }
}

/// Arguments for registering a loan
#[derive(Args)]
pub struct AddLoanArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    #[arg(long)]
    pub loan_id: String,

    #[arg(long)]
    pub borrower_id: String,

    #[arg(long)]
    pub principal: Decimal,

    /// Term in months
    #[arg(long, default_value_t = 24)]
    pub term_months: u32,

    /// Current annual rate in percent, if one is already set
    #[arg(long)]
    pub current_rate: Option<Decimal>,
}

pub fn run_add_loan(args: AddLoanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let loan = Loan {
        id: args.loan_id,
        borrower_id: args.borrower_id,
        principal: args.principal,
        term_months: args.term_months,
        current_rate: args.current_rate,
        dscr: None,
        status: LoanStatus::Pending,
    };
    ledger.store.insert_loan(loan.clone())?;
    ledger.save()?;
    Ok(serde_json::to_value(loan)?)
}

/// Arguments for appending a cash-flow batch
#[derive(Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    #[arg(long)]
    pub borrower_id: String,

    /// Path to a JSON array of {"amount", "occurred_on", "settled"} records
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_ingest(args: IngestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let records: Vec<CashFlowRecord> =
        input::stdin::read_input(args.input.as_deref(), "Cash-flow records")?;
    let ledger = Ledger::open(&args.ledger)?;
    let response = ledger.api().ingest(&args.borrower_id, records)?;
    ledger.save()?;
    Ok(serde_json::to_value(response)?)
}

/// Arguments for computing and applying (or proposing) a loan rate
#[derive(Args)]
pub struct ComputeRateArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    #[arg(long)]
    pub loan_id: String,

    /// Target DSCR (defaults to UNDERWRITING_DEFAULT_TARGET_DSCR)
    #[arg(long)]
    pub target_dscr: Option<Decimal>,

    /// Term override in months (defaults to the loan's term)
    #[arg(long)]
    pub term_months: Option<u32>,

    #[arg(long, default_value = "system")]
    pub requested_by: String,
}

pub fn run_compute_rate(args: ComputeRateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let outcome = ledger.api().compute_rate(
        &args.loan_id,
        args.target_dscr,
        args.term_months,
        &args.requested_by,
    )?;
    ledger.save()?;
    Ok(serde_json::to_value(outcome)?)
}

/// Arguments for resolving a pending rate change
#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    pub change_id: ChangeId,

    #[arg(long)]
    pub approved_by: String,
}

pub fn run_approve(args: ResolveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let response = ledger.api().approve_change(args.change_id, &args.approved_by)?;
    ledger.save()?;
    Ok(serde_json::to_value(response)?)
}

pub fn run_reject(args: ResolveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let response = ledger.api().reject_change(args.change_id, &args.approved_by)?;
    ledger.save()?;
    Ok(serde_json::to_value(response)?)
}

/// Arguments for listing unresolved rate changes
#[derive(Args)]
pub struct ListPendingArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    /// Only changes for this loan
    #[arg(long)]
    pub loan_id: Option<String>,
}

pub fn run_list_pending(args: ListPendingArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let listing = ledger.api().list_pending(args.loan_id.as_deref())?;
    Ok(serde_json::to_value(listing)?)
}

/// Arguments for showing a single rate change
#[derive(Args)]
pub struct ShowChangeArgs {
    #[command(flatten)]
    pub ledger: LedgerArg,

    pub change_id: ChangeId,
}

pub fn run_show_change(args: ShowChangeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let change = ledger
        .api()
        .get_change(args.change_id)?
        .ok_or_else(|| format!("Rate change {} not found", args.change_id))?;
    Ok(serde_json::to_value(change)?)
}
