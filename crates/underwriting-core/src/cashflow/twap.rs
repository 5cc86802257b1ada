use std::collections::BTreeMap;
use std::time::Instant;

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{with_metadata, ComputationOutput, Money, MonthKey};
use crate::UnderwritingResult;

/// Per-month decay applied counting back from the most recent month.
pub const RECENCY_DECAY: Decimal = dec!(0.9);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWeightedInput {
    /// Month key ("YYYY-MM") → NOI; `null` entries are skipped.
    pub monthly_noi: BTreeMap<MonthKey, Option<Money>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWeightedOutput {
    pub weighted_average: Money,
    pub months_used: usize,
    pub months_skipped: usize,
}

/// Recency-weighted mean of monthly NOI.
///
/// Keys are ordered lexicographically, which is chronological for "YYYY-MM".
/// The latest key has weight 1, the one before 0.9, then 0.81 and so on.
/// Missing entries keep their slot in the decay sequence but contribute
/// nothing. Returns zero when no month carries a value.
pub fn time_weighted_average(monthly: &BTreeMap<MonthKey, Option<Money>>) -> Money {
    let last = monthly.len().saturating_sub(1);
    let mut weighted_sum = Decimal::ZERO;
    let mut weight_total = Decimal::ZERO;

    for (index, value) in monthly.values().enumerate() {
        let Some(value) = value else {
            continue;
        };
        let months_ago = (last - index) as u64;
        let weight = RECENCY_DECAY.powu(months_ago);
        weighted_sum += *value * weight;
        weight_total += weight;
    }

    if weight_total.is_zero() {
        return Decimal::ZERO;
    }
    weighted_sum / weight_total
}

pub fn calculate_time_weighted_average(
    input: &TimeWeightedInput,
) -> UnderwritingResult<ComputationOutput<TimeWeightedOutput>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let months_used = input.monthly_noi.values().filter(|v| v.is_some()).count();
    let months_skipped = input.monthly_noi.len() - months_used;
    if months_used == 0 {
        warnings.push("No month carried a value; weighted average defaults to zero".to_string());
    }

    let output = TimeWeightedOutput {
        weighted_average: time_weighted_average(&input.monthly_noi),
        months_used,
        months_skipped,
    };

    let assumptions = serde_json::json!({
        "decay_per_month": RECENCY_DECAY.to_string(),
        "ordering": "lexicographic month key",
    });
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Exponentially recency-weighted monthly average",
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn months(entries: &[(&str, Option<Decimal>)]) -> BTreeMap<MonthKey, Option<Money>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_constant_series_returns_constant() {
        let input = months(&[
            ("2024-01", Some(dec!(1000))),
            ("2024-02", Some(dec!(1000))),
            ("2024-03", Some(dec!(1000))),
        ]);
        assert_eq!(time_weighted_average(&input), dec!(1000));
    }

    #[test]
    fn test_recent_month_weighs_most() {
        // (100*0.9 + 200*1) / 1.9
        let input = months(&[("2024-01", Some(dec!(100))), ("2024-02", Some(dec!(200)))]);
        let expected = (dec!(90) + dec!(200)) / dec!(1.9);
        assert_eq!(time_weighted_average(&input), expected);
    }

    #[test]
    fn test_keys_sorted_chronologically() {
        let input = months(&[("2024-12", Some(dec!(200))), ("2024-02", Some(dec!(100)))]);
        let expected = (dec!(90) + dec!(200)) / dec!(1.9);
        assert_eq!(time_weighted_average(&input), expected);
    }

    #[test]
    fn test_missing_months_skipped() {
        // Latest month is missing: 2024-02 sits one month back (0.9), 2024-01 two (0.81).
        let input = months(&[
            ("2024-01", Some(dec!(100))),
            ("2024-02", Some(dec!(100))),
            ("2024-03", None),
        ]);
        assert_eq!(time_weighted_average(&input), dec!(100));
    }

    #[test]
    fn test_empty_or_all_missing_is_zero() {
        assert_eq!(time_weighted_average(&BTreeMap::new()), Decimal::ZERO);
        let input = months(&[("2024-01", None)]);
        assert_eq!(time_weighted_average(&input), Decimal::ZERO);
    }

    #[test]
    fn test_envelope_counts() {
        let input = TimeWeightedInput {
            monthly_noi: months(&[("2024-01", Some(dec!(50))), ("2024-02", None)]),
        };
        let result = calculate_time_weighted_average(&input).unwrap();
        assert_eq!(result.result.months_used, 1);
        assert_eq!(result.result.months_skipped, 1);
        assert_eq!(result.result.weighted_average, dec!(50));
    }
}
