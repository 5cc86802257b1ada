pub mod cashflow;
pub mod ledger;
pub mod rate;
