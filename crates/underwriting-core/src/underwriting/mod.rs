//! Rate solving, the underwriting decision and the rate-change approval
//! workflow, wired to persistence through the [`store::UnderwritingStore`]
//! seam.

pub mod api;
pub mod approval;
pub mod clock;
pub mod config;
pub mod hashing;
pub mod model;
pub mod orchestrator;
pub mod rate_solver;
pub mod store;
