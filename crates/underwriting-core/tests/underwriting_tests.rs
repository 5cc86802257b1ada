use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use underwriting_core::underwriting::api::UnderwritingApi;
use underwriting_core::underwriting::clock::FixedClock;
use underwriting_core::underwriting::config::{MapSettings, APPROVAL_REQUIRED_KEY};
use underwriting_core::underwriting::hashing::input_hash;
use underwriting_core::underwriting::model::{ChangeId, ChangeStatus, Loan, LoanStatus};
use underwriting_core::underwriting::store::{
    CashFlowRecord, InMemoryStore, StoreSnapshot, UnderwritingStore,
};
use underwriting_core::{ErrorKind, Rate};

fn loan(current_rate: Option<Rate>) -> Loan {
    Loan {
        id: "loan-1".into(),
        borrower_id: "borrower-1".into(),
        principal: dec!(10_000),
        term_months: 24,
        current_rate,
        dscr: None,
        status: LoanStatus::Pending,
    }
}

fn desk(current_rate: Option<Rate>, settings: MapSettings) -> (UnderwritingApi<InMemoryStore>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    store.insert_loan(loan(current_rate)).unwrap();
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let api = UnderwritingApi::new(store.clone(), Arc::new(clock), Arc::new(settings));
    (api, store)
}

fn seed_history(api: &UnderwritingApi<InMemoryStore>) {
    let records = (1..=3)
        .map(|m| {
            CashFlowRecord::settled(dec!(1000), Utc.with_ymd_and_hms(2024, m, 28, 0, 0, 0).unwrap())
        })
        .collect();
    api.ingest("borrower-1", records).unwrap();
}

/// Computes a rate under gating with a 5.0% loan and returns the queued change.
fn queued_change(api: &UnderwritingApi<InMemoryStore>) -> ChangeId {
    seed_history(api);
    let outcome = api.compute_rate("loan-1", None, None, "underwriter").unwrap();
    assert!(outcome.rate_pending);
    outcome.pending_change_id.unwrap()
}

// ===========================================================================
// computeRate
// ===========================================================================

#[test]
fn test_compute_rate_three_months_of_1000() {
    let (api, _) = desk(None, MapSettings::new().with(APPROVAL_REQUIRED_KEY, "false"));
    seed_history(&api);
    let outcome = api
        .compute_rate("loan-1", Some(dec!(1.25)), Some(24), "underwriter")
        .unwrap();
    assert_eq!(outcome.monthly_noi, dec!(1000));
    assert!(outcome.interest_rate >= dec!(1) && outcome.interest_rate <= dec!(10));
    assert!(outcome.dscr >= dec!(1.0));
    assert!(outcome.meets_target);
    assert!(!outcome.rate_pending);
    assert_eq!(outcome.pending_change_id, None);
}

#[test]
fn test_compute_rate_without_cash_flow() {
    let (api, store) = desk(None, MapSettings::new());
    let err = api.compute_rate("loan-1", None, None, "underwriter").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("No cash-flow data"));
    assert_eq!(store.get_loan("loan-1").unwrap().unwrap(), loan(None));
}

#[test]
fn test_compute_rate_unknown_loan() {
    let (api, _) = desk(None, MapSettings::new());
    let err = api.compute_rate("ghost", None, None, "underwriter").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_gated_change_leaves_current_rate() {
    let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
    let id = queued_change(&api);

    let change = api.get_change(id).unwrap().unwrap();
    assert_eq!(change.status, ChangeStatus::Pending);
    assert_eq!(change.current_rate, Some(dec!(5.0)));
    assert_eq!(change.requested_by, "underwriter");

    let stored = store.get_loan("loan-1").unwrap().unwrap();
    assert_eq!(stored.current_rate, Some(dec!(5.0)));
    assert_eq!(stored.status, LoanStatus::AwaitingApproval);
    assert_eq!(api.list_pending(Some("loan-1")).unwrap().count, 1);
}

#[test]
fn test_repeated_computation_allows_several_pending_changes() {
    let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
    let first = queued_change(&api);
    let second = api
        .compute_rate("loan-1", None, None, "underwriter")
        .unwrap()
        .pending_change_id
        .unwrap();
    assert_ne!(first, second);
    let listing = api.list_pending(Some("loan-1")).unwrap();
    assert_eq!(listing.count, 2);
    assert!(listing.approval_required);
    assert_eq!(store.calculations_for("loan-1").unwrap().len(), 2);
}

// ===========================================================================
// approve / reject
// ===========================================================================

#[test]
fn test_approve_applies_proposed_rate() {
    let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
    let id = queued_change(&api);
    let proposed = api.get_change(id).unwrap().unwrap().proposed_rate;

    let response = api.approve_change(id, "credit-officer").unwrap();
    assert!(response.success);
    assert_eq!(response.change.status, ChangeStatus::Approved);
    assert_eq!(response.change.approved_by.as_deref(), Some("credit-officer"));
    assert!(response.change.resolved_at.is_some());

    let stored = store.get_loan("loan-1").unwrap().unwrap();
    assert_eq!(stored.current_rate, Some(proposed));
    assert_eq!(stored.status, LoanStatus::Approved);
}

#[test]
fn test_reject_after_approve_fails_and_changes_nothing() {
    let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
    let id = queued_change(&api);
    api.approve_change(id, "credit-officer").unwrap();
    let before = store.snapshot().unwrap();

    let err = api.reject_change(id, "second-reviewer").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(store.snapshot().unwrap(), before);
    assert_eq!(api.get_change(id).unwrap().unwrap().status, ChangeStatus::Approved);
}

#[test]
fn test_reject_keeps_rate_and_resets_status() {
    let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
    let id = queued_change(&api);
    let response = api.reject_change(id, "credit-officer").unwrap();
    assert_eq!(response.change.status, ChangeStatus::Rejected);

    let stored = store.get_loan("loan-1").unwrap().unwrap();
    assert_eq!(stored.current_rate, Some(dec!(5.0)));
    assert_eq!(stored.status, LoanStatus::Pending);
    assert!(stored.dscr.is_some());
    assert!(api.approve_change(id, "credit-officer").is_err());
}

// ===========================================================================
// Replay determinism
// ===========================================================================

#[test]
fn test_replicas_replaying_same_log_converge() {
    let replay = || {
        let (api, store) = desk(Some(dec!(5.0)), MapSettings::new());
        let id = queued_change(&api);
        api.approve_change(id, "credit-officer").unwrap();
        let _ = api.reject_change(id, "credit-officer");
        store.snapshot().unwrap()
    };
    let a: StoreSnapshot = replay();
    let b: StoreSnapshot = replay();
    assert_eq!(a, b);
}

#[test]
fn test_recorded_hash_matches_inputs() {
    let (api, store) = desk(None, MapSettings::new().with(APPROVAL_REQUIRED_KEY, "false"));
    seed_history(&api);
    let outcome = api.compute_rate("loan-1", None, None, "underwriter").unwrap();
    let samples = store.get_cash_flow_history("borrower-1", 12).unwrap();
    assert_eq!(outcome.input_hash, input_hash(&samples, dec!(10_000)));
    let records = store.calculations_for("loan-1").unwrap();
    assert_eq!(records[0].input_hash, outcome.input_hash);
    assert_eq!(records[0].dscr_value, outcome.dscr);
}
