use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::types::{CashFlowSample, Money, MonthKey};

/// Group sample amounts by UTC calendar month.
///
/// Amounts within a month are sorted ascending so the result does not depend
/// on the order samples arrived in.
pub fn group_by_month(samples: &[CashFlowSample]) -> BTreeMap<MonthKey, Vec<Money>> {
    let mut grouped: BTreeMap<MonthKey, Vec<Money>> = BTreeMap::new();
    for sample in samples {
        grouped
            .entry(sample.month_key())
            .or_default()
            .push(sample.amount);
    }
    for amounts in grouped.values_mut() {
        amounts.sort();
    }
    grouped
}

/// Net operating income per month: the signed sum of that month's samples.
pub fn monthly_noi(samples: &[CashFlowSample]) -> BTreeMap<MonthKey, Money> {
    let mut totals: BTreeMap<MonthKey, Money> = BTreeMap::new();
    for sample in samples {
        *totals.entry(sample.month_key()).or_insert(Decimal::ZERO) += sample.amount;
    }
    totals
}

/// Sum of all monthly NOI values.
pub fn total_noi(monthly: &BTreeMap<MonthKey, Money>) -> Money {
    monthly.values().copied().sum()
}

/// Unweighted mean NOI across distinct months, `None` when there are none.
pub fn average_monthly_noi(monthly: &BTreeMap<MonthKey, Money>) -> Option<Money> {
    if monthly.is_empty() {
        return None;
    }
    Some(total_noi(monthly) / Decimal::from(monthly.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn sample(amount: Decimal, year: i32, month: u32, day: u32) -> CashFlowSample {
        CashFlowSample::new(
            amount,
            Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_monthly_noi_sums_signed_amounts() {
        let samples = vec![
            sample(dec!(1500), 2024, 1, 3),
            sample(dec!(-400), 2024, 1, 20),
            sample(dec!(900), 2024, 2, 1),
        ];
        let monthly = monthly_noi(&samples);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly["2024-01"], dec!(1100));
        assert_eq!(monthly["2024-02"], dec!(900));
        assert_eq!(total_noi(&monthly), dec!(2000));
        assert_eq!(average_monthly_noi(&monthly), Some(dec!(1000)));
    }

    #[test]
    fn test_group_by_month_is_order_independent() {
        let a = vec![
            sample(dec!(3), 2024, 5, 1),
            sample(dec!(1), 2024, 5, 2),
            sample(dec!(2), 2024, 6, 2),
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(group_by_month(&a), group_by_month(&b));
        assert_eq!(group_by_month(&a)["2024-05"], vec![dec!(1), dec!(3)]);
    }

    #[test]
    fn test_average_of_nothing_is_none() {
        assert_eq!(average_monthly_noi(&BTreeMap::new()), None);
    }
}
