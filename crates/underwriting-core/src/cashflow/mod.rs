//! Monthly cash-flow aggregation, outlier rejection and recency weighting.

pub mod aggregation;
pub mod outliers;
pub mod twap;
