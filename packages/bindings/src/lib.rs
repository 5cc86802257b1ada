use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::Deserialize;

use underwriting_core::types::{decimal_from_f64, CashFlowSample, Money};
use underwriting_core::underwriting::api::UnderwritingApi;
use underwriting_core::underwriting::clock::SystemClock;
use underwriting_core::underwriting::config::{EnvSettings, MapSettings, SettingsSource};
use underwriting_core::underwriting::model::{ChangeId, Loan};
use underwriting_core::underwriting::store::{CashFlowRecord, InMemoryStore, StoreSnapshot};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// JS numbers arrive as f64; NaN and infinities are rejected here.
fn number_to_decimal(field: &str, raw: Option<f64>) -> NapiResult<Option<Decimal>> {
    raw.map(|v| decimal_from_f64(field, v).map_err(to_napi_error))
        .transpose()
}

// ---------------------------------------------------------------------------
// Cash-flow cleaning
// ---------------------------------------------------------------------------

#[napi]
pub fn filter_outliers(input_json: String) -> NapiResult<String> {
    let input: underwriting_core::cashflow::outliers::OutlierFilterInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = underwriting_core::cashflow::outliers::calculate_outlier_filter(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn time_weighted_average(input_json: String) -> NapiResult<String> {
    let input: underwriting_core::cashflow::twap::TimeWeightedInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = underwriting_core::cashflow::twap::calculate_time_weighted_average(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Rate solving
// ---------------------------------------------------------------------------

#[napi]
pub fn solve_rate(input_json: String) -> NapiResult<String> {
    let input: underwriting_core::underwriting::rate_solver::RateSolverInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = underwriting_core::underwriting::rate_solver::calculate_rate(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct HashInput {
    samples: Vec<CashFlowSample>,
    principal: Money,
}

#[napi]
pub fn input_hash(input_json: String) -> NapiResult<String> {
    let input: HashInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    Ok(underwriting_core::underwriting::hashing::input_hash(
        &input.samples,
        input.principal,
    ))
}

// ---------------------------------------------------------------------------
// Stateful engine
// ---------------------------------------------------------------------------

/// In-process underwriting engine over an in-memory ledger. Every method
/// takes and returns JSON strings.
#[napi]
pub struct UnderwritingEngine {
    store: Arc<InMemoryStore>,
    api: UnderwritingApi<InMemoryStore>,
}

#[napi]
impl UnderwritingEngine {
    /// `snapshot_json` restores a previously exported ledger. `settings_json`
    /// is a flat string map of UNDERWRITING_* keys; without it the process
    /// environment is read.
    #[napi(constructor)]
    pub fn new(snapshot_json: Option<String>, settings_json: Option<String>) -> napi::Result<Self> {
        let snapshot: StoreSnapshot = match snapshot_json {
            Some(json) => serde_json::from_str(&json).map_err(to_napi_error)?,
            None => StoreSnapshot::default(),
        };
        let settings: Arc<dyn SettingsSource> = match settings_json {
            Some(json) => {
                let pairs: BTreeMap<String, String> =
                    serde_json::from_str(&json).map_err(to_napi_error)?;
                Arc::new(
                    pairs
                        .iter()
                        .fold(MapSettings::new(), |acc, (k, v)| acc.with(k, v.clone())),
                )
            }
            None => Arc::new(EnvSettings),
        };
        let store = Arc::new(InMemoryStore::from_snapshot(snapshot));
        let api = UnderwritingApi::new(store.clone(), Arc::new(SystemClock), settings);
        Ok(Self { store, api })
    }

    #[napi]
    pub fn add_loan(&self, loan_json: String) -> NapiResult<()> {
        let loan: Loan = serde_json::from_str(&loan_json).map_err(to_napi_error)?;
        self.store.insert_loan(loan).map_err(to_napi_error)
    }

    #[napi]
    pub fn ingest(&self, borrower_id: String, records_json: String) -> NapiResult<String> {
        let records: Vec<CashFlowRecord> =
            serde_json::from_str(&records_json).map_err(to_napi_error)?;
        let response = self
            .api
            .ingest(&borrower_id, records)
            .map_err(to_napi_error)?;
        serde_json::to_string(&response).map_err(to_napi_error)
    }

    #[napi]
    pub fn compute_rate(
        &self,
        loan_id: String,
        requested_by: String,
        target_dscr: Option<f64>,
        term_months: Option<u32>,
    ) -> NapiResult<String> {
        let target = number_to_decimal("target_dscr", target_dscr)?;
        let outcome = self
            .api
            .compute_rate(&loan_id, target, term_months, &requested_by)
            .map_err(to_napi_error)?;
        serde_json::to_string(&outcome).map_err(to_napi_error)
    }

    #[napi]
    pub fn approve_change(&self, change_id: String, approved_by: String) -> NapiResult<String> {
        let id = ChangeId::from_str(&change_id).map_err(to_napi_error)?;
        let response = self
            .api
            .approve_change(id, &approved_by)
            .map_err(to_napi_error)?;
        serde_json::to_string(&response).map_err(to_napi_error)
    }

    #[napi]
    pub fn reject_change(&self, change_id: String, approved_by: String) -> NapiResult<String> {
        let id = ChangeId::from_str(&change_id).map_err(to_napi_error)?;
        let response = self
            .api
            .reject_change(id, &approved_by)
            .map_err(to_napi_error)?;
        serde_json::to_string(&response).map_err(to_napi_error)
    }

    #[napi]
    pub fn list_pending(&self, loan_id: Option<String>) -> NapiResult<String> {
        let listing = self
            .api
            .list_pending(loan_id.as_deref())
            .map_err(to_napi_error)?;
        serde_json::to_string(&listing).map_err(to_napi_error)
    }

    /// Full ledger state, suitable for passing back to the constructor.
    #[napi]
    pub fn export_snapshot(&self) -> NapiResult<String> {
        let snapshot = self.store.snapshot().map_err(to_napi_error)?;
        serde_json::to_string(&snapshot).map_err(to_napi_error)
    }
}

