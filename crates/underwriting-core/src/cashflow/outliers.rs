//! Per-month outlier rejection.
//!
//! Two independent strategies over samples grouped by UTC calendar month:
//! a median-absolute-deviation filter (with a ratio heuristic for months too
//! small for MAD to be stable) and an interquartile-range filter. Both are
//! pure, order-independent and return amounts sorted ascending per month.
//! Neither is applied by the rate solver; callers opt in explicitly.

use std::collections::BTreeMap;
use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::aggregation::group_by_month;
use crate::types::{with_metadata, CashFlowSample, ComputationOutput, Money, MonthKey};
use crate::UnderwritingResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Scales MAD to be consistent with the standard deviation of a normal.
const MODIFIED_Z_FACTOR: Decimal = dec!(0.6745);

/// Modified z-score above which a value is rejected.
const MODIFIED_Z_THRESHOLD: Decimal = dec!(3.5);

/// Largest tolerated ratio between values in a 2–3 sample month.
const SMALL_MONTH_MAX_RATIO: Decimal = dec!(10);

/// Minimum month size for the MAD / IQR statistics to apply.
const ROBUST_MIN_SAMPLES: usize = 4;

/// Tukey fence multiplier.
const IQR_FENCE: Decimal = dec!(1.5);

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    #[default]
    Mad,
    Iqr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierFilterInput {
    pub samples: Vec<CashFlowSample>,
    #[serde(default)]
    pub method: OutlierMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierFilterOutput {
    pub method: OutlierMethod,
    /// Retained amounts per "YYYY-MM" month, ascending.
    pub months: BTreeMap<MonthKey, Vec<Money>>,
    pub retained_count: usize,
    pub removed_count: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// MAD-based filter, month by month.
pub fn filter_outliers_mad(samples: &[CashFlowSample]) -> BTreeMap<MonthKey, Vec<Money>> {
    group_by_month(samples)
        .into_iter()
        .map(|(month, values)| (month, mad_filter_sorted(&values)))
        .collect()
}

/// IQR (Tukey fence) filter, month by month.
pub fn filter_outliers_iqr(samples: &[CashFlowSample]) -> BTreeMap<MonthKey, Vec<Money>> {
    group_by_month(samples)
        .into_iter()
        .map(|(month, values)| (month, iqr_filter_sorted(&values)))
        .collect()
}

pub fn filter_outliers(
    samples: &[CashFlowSample],
    method: OutlierMethod,
) -> BTreeMap<MonthKey, Vec<Money>> {
    match method {
        OutlierMethod::Mad => filter_outliers_mad(samples),
        OutlierMethod::Iqr => filter_outliers_iqr(samples),
    }
}

/// Run the selected filter and report what was kept.
pub fn calculate_outlier_filter(
    input: &OutlierFilterInput,
) -> UnderwritingResult<ComputationOutput<OutlierFilterOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let months = filter_outliers(&input.samples, input.method);
    let retained_count: usize = months.values().map(Vec::len).sum();
    let removed_count = input.samples.len() - retained_count;

    let thin_months = group_by_month(&input.samples)
        .values()
        .filter(|v| v.len() < ROBUST_MIN_SAMPLES)
        .count();
    if thin_months > 0 {
        warnings.push(format!(
            "{thin_months} month(s) had fewer than {ROBUST_MIN_SAMPLES} samples; robust statistics not applied"
        ));
    }

    let methodology = match input.method {
        OutlierMethod::Mad => "Median absolute deviation (modified z-score <= 3.5)",
        OutlierMethod::Iqr => "Interquartile range (Tukey fences, k = 1.5)",
    };
    let assumptions = serde_json::json!({
        "grouping": "UTC calendar month",
        "min_samples_for_robust_stats": ROBUST_MIN_SAMPLES,
    });

    let output = OutlierFilterOutput {
        method: input.method,
        months,
        retained_count,
        removed_count,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(methodology, &assumptions, warnings, elapsed, output))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// `sorted` must be ascending.
fn mad_filter_sorted(sorted: &[Money]) -> Vec<Money> {
    match sorted.len() {
        0 | 1 => sorted.to_vec(),
        2 | 3 => ratio_filter_sorted(sorted),
        _ => {
            let median = median_sorted(sorted);
            let mut deviations: Vec<Decimal> =
                sorted.iter().map(|v| (*v - median).abs()).collect();
            deviations.sort();
            let mad = median_sorted(&deviations);
            if mad.is_zero() {
                return sorted.to_vec();
            }
            sorted
                .iter()
                .copied()
                .filter(|v| modified_z_score(*v, median, mad) <= MODIFIED_Z_THRESHOLD)
                .collect()
        }
    }
}

/// Ratio heuristic for 2–3 sample months, where MAD is unstable.
fn ratio_filter_sorted(sorted: &[Money]) -> Vec<Money> {
    let n = sorted.len();
    let min = sorted[0];
    let max = sorted[n - 1];

    if min > Decimal::ZERO {
        if max / min <= SMALL_MONTH_MAX_RATIO {
            return sorted.to_vec();
        }
        if n == 2 {
            return vec![min];
        }
        let median = sorted[1];
        return sorted
            .iter()
            .copied()
            .filter(|v| *v / median <= SMALL_MONTH_MAX_RATIO)
            .collect();
    }

    if min < Decimal::ZERO && max > Decimal::ZERO {
        if min.abs() / max > SMALL_MONTH_MAX_RATIO {
            return sorted[1..].to_vec();
        }
        if max / min.abs() > SMALL_MONTH_MAX_RATIO {
            return sorted[..n - 1].to_vec();
        }
    }

    sorted.to_vec()
}

/// Nearest-rank quartiles: index = floor((n - 1) * p).
fn iqr_filter_sorted(sorted: &[Money]) -> Vec<Money> {
    let n = sorted.len();
    if n < ROBUST_MIN_SAMPLES {
        return sorted.to_vec();
    }
    let q1 = sorted[(n - 1) / 4];
    let q3 = sorted[(n - 1) * 3 / 4];
    let iqr = q3 - q1;
    let lower = q1 - IQR_FENCE * iqr;
    let upper = q3 + IQR_FENCE * iqr;
    sorted
        .iter()
        .copied()
        .filter(|v| *v >= lower && *v <= upper)
        .collect()
}

pub fn modified_z_score(value: Money, median: Decimal, mad: Decimal) -> Decimal {
    MODIFIED_Z_FACTOR * (value - median).abs() / mad
}

/// Compute the median of a sorted slice of Decimals.
pub fn median_sorted(sorted: &[Decimal]) -> Decimal {
    if sorted.is_empty() {
        return Decimal::ZERO;
    }
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / dec!(2)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn month_of(amounts: &[Decimal]) -> Vec<CashFlowSample> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                CashFlowSample::new(
                    *a,
                    Utc.with_ymd_and_hms(2024, 4, 1 + i as u32, 9, 0, 0).unwrap(),
                )
            })
            .collect()
    }

    fn retained(amounts: &[Decimal], method: OutlierMethod) -> Vec<Decimal> {
        filter_outliers(&month_of(amounts), method)
            .remove("2024-04")
            .unwrap_or_default()
    }

    #[test]
    fn test_mad_drops_single_spike() {
        let kept = retained(
            &[dec!(10), dec!(12), dec!(11), dec!(9), dec!(500)],
            OutlierMethod::Mad,
        );
        assert_eq!(kept, vec![dec!(9), dec!(10), dec!(11), dec!(12)]);
    }

    #[test]
    fn test_mad_keeps_close_pair() {
        let kept = retained(&[dec!(10), dec!(11)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(10), dec!(11)]);
    }

    #[test]
    fn test_mad_pair_with_large_ratio_keeps_smaller() {
        let kept = retained(&[dec!(5000), dec!(100)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(100)]);
    }

    #[test]
    fn test_mad_triple_ratio_to_median() {
        let kept = retained(&[dec!(100), dec!(110), dec!(5000)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(100), dec!(110)]);
    }

    #[test]
    fn test_mad_mixed_signs_drop_extreme_negative() {
        let kept = retained(&[dec!(-5000), dec!(100)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(100)]);
    }

    #[test]
    fn test_mad_mixed_signs_drop_extreme_positive() {
        let kept = retained(&[dec!(-10), dec!(20), dec!(500)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(-10), dec!(20)]);
    }

    #[test]
    fn test_mad_single_sample_kept() {
        let kept = retained(&[dec!(-42)], OutlierMethod::Mad);
        assert_eq!(kept, vec![dec!(-42)]);
    }

    #[test]
    fn test_mad_zero_spread_keeps_all() {
        // Median 10, deviations [0,0,0,990] → MAD 0
        let kept = retained(
            &[dec!(10), dec!(10), dec!(10), dec!(1000)],
            OutlierMethod::Mad,
        );
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn test_mad_output_subset_with_bounded_z() {
        let input = [
            dec!(120),
            dec!(95),
            dec!(130),
            dec!(101),
            dec!(99),
            dec!(-800),
            dec!(2400),
            dec!(110),
        ];
        let mut sorted = input.to_vec();
        sorted.sort();
        let median = median_sorted(&sorted);
        let mut deviations: Vec<Decimal> = sorted.iter().map(|v| (*v - median).abs()).collect();
        deviations.sort();
        let mad = median_sorted(&deviations);
        assert!(mad > Decimal::ZERO);

        let kept = retained(&input, OutlierMethod::Mad);
        assert!(kept.len() < input.len());
        for v in &kept {
            assert!(input.contains(v));
            assert!(modified_z_score(*v, median, mad) <= MODIFIED_Z_THRESHOLD);
        }
    }

    #[test]
    fn test_iqr_drops_obvious_outlier() {
        let kept = retained(
            &[dec!(100), dec!(105), dec!(98), dec!(102), dec!(5000)],
            OutlierMethod::Iqr,
        );
        assert_eq!(kept, vec![dec!(98), dec!(100), dec!(102), dec!(105)]);
    }

    #[test]
    fn test_mad_and_iqr_agree_on_obvious_outlier() {
        let data = [dec!(100), dec!(105), dec!(98), dec!(102), dec!(5000)];
        assert!(!retained(&data, OutlierMethod::Mad).contains(&dec!(5000)));
        assert!(!retained(&data, OutlierMethod::Iqr).contains(&dec!(5000)));
    }

    #[test]
    fn test_iqr_small_month_passthrough() {
        let kept = retained(&[dec!(1), dec!(1000), dec!(5)], OutlierMethod::Iqr);
        assert_eq!(kept, vec![dec!(1), dec!(5), dec!(1000)]);
    }

    #[test]
    fn test_filters_ignore_input_order() {
        let data = [dec!(7), dec!(300), dec!(8), dec!(9), dec!(6), dec!(10)];
        let mut reversed = data.to_vec();
        reversed.reverse();
        for method in [OutlierMethod::Mad, OutlierMethod::Iqr] {
            assert_eq!(retained(&data, method), retained(&reversed, method));
        }
    }

    #[test]
    fn test_months_filtered_independently() {
        let mut samples = month_of(&[dec!(10), dec!(12), dec!(11), dec!(9), dec!(500)]);
        samples.push(CashFlowSample::new(
            dec!(500),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
        ));
        let filtered = filter_outliers_mad(&samples);
        assert_eq!(filtered["2024-05"], vec![dec!(500)]);
        assert!(!filtered["2024-04"].contains(&dec!(500)));
    }

    #[test]
    fn test_calculate_reports_counts() {
        let input = OutlierFilterInput {
            samples: month_of(&[dec!(10), dec!(12), dec!(11), dec!(9), dec!(500)]),
            method: OutlierMethod::Mad,
        };
        let result = calculate_outlier_filter(&input).unwrap();
        assert_eq!(result.result.retained_count, 4);
        assert_eq!(result.result.removed_count, 1);
        assert!(result.warnings.is_empty());
        assert_eq!(result.metadata.precision, "rust_decimal_128bit");
    }
}
