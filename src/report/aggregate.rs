use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::MetricSample;

/// Revenue credited per conversion when computing ROI.
pub const CONVERSION_VALUE: Decimal = Decimal::ONE_HUNDRED;

/// A running total left the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{field} total exceeds the supported range")]
pub struct AggregateOverflow {
    pub field: &'static str,
}

/// Exact sums over a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub spend: Decimal,
}

fn add_count(total: u64, value: u64, field: &'static str) -> Result<u64, AggregateOverflow> {
    total.checked_add(value).ok_or(AggregateOverflow { field })
}

impl Totals {
    pub fn add_sample(&mut self, sample: &MetricSample) -> Result<(), AggregateOverflow> {
        *self = self.merge(Totals {
            impressions: sample.impressions,
            clicks: sample.clicks,
            conversions: sample.conversions,
            spend: sample.spend,
        })?;
        Ok(())
    }

    pub fn merge(self, other: Totals) -> Result<Totals, AggregateOverflow> {
        Ok(Totals {
            impressions: add_count(self.impressions, other.impressions, "impressions")?,
            clicks: add_count(self.clicks, other.clicks, "clicks")?,
            conversions: add_count(self.conversions, other.conversions, "conversions")?,
            spend: self
                .spend
                .checked_add(other.spend)
                .ok_or(AggregateOverflow { field: "spend" })?,
        })
    }

    pub fn from_samples<'a>(
        samples: impl IntoIterator<Item = &'a MetricSample>,
    ) -> Result<Totals, AggregateOverflow> {
        let mut totals = Totals::default();
        for sample in samples {
            totals.add_sample(sample)?;
        }
        Ok(totals)
    }
}

/// Totals plus derived ratios. Ratios are fractions (0.05 means 5%), except
/// the currency figures which are per-unit amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedMetrics {
    pub totals: Totals,
    pub ctr: Decimal,
    pub conversion_rate: Decimal,
    pub cost_per_click: Decimal,
    pub cost_per_conversion: Decimal,
    pub roi: Decimal,
}

impl AggregatedMetrics {
    pub fn from_totals(totals: Totals) -> Self {
        let impressions = Decimal::from(totals.impressions);
        let clicks = Decimal::from(totals.clicks);
        let conversions = Decimal::from(totals.conversions);
        // u64::MAX * 100 is far below Decimal::MAX
        let revenue = conversions * CONVERSION_VALUE;

        Self {
            totals,
            ctr: guarded_div(clicks, impressions),
            conversion_rate: guarded_div(conversions, clicks),
            cost_per_click: guarded_div(totals.spend, clicks),
            cost_per_conversion: guarded_div(totals.spend, conversions),
            roi: guarded_div(revenue - totals.spend, totals.spend),
        }
    }
}

/// Sum the given samples and derive the ratios. The caller decides which
/// samples belong to the reporting window.
pub fn aggregate<'a>(
    samples: impl IntoIterator<Item = &'a MetricSample>,
) -> Result<AggregatedMetrics, AggregateOverflow> {
    Totals::from_samples(samples).map(AggregatedMetrics::from_totals)
}

/// Division that yields zero for a zero denominator.
pub fn guarded_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(impressions: u64, clicks: u64, conversions: u64, spend: &str) -> MetricSample {
        MetricSample {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            impressions,
            clicks,
            conversions,
            spend: spend.parse().unwrap(),
        }
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn single_sample_derives_every_ratio() {
        let m = aggregate(&[sample(1000, 50, 5, "100.00")]).unwrap();
        assert_eq!(m.ctr, dec("0.05"));
        assert_eq!(m.conversion_rate, dec("0.1"));
        assert_eq!(m.cost_per_click, dec("2"));
        assert_eq!(m.cost_per_conversion, dec("20"));
        assert_eq!(m.roi, dec("4"));
    }

    #[test]
    fn empty_input_is_all_zero() {
        let m = aggregate(&[]).unwrap();
        assert_eq!(m, AggregatedMetrics::default());
    }

    #[test]
    fn each_ratio_guards_its_own_denominator() {
        let no_impressions = aggregate(&[sample(0, 0, 0, "0")]).unwrap();
        assert_eq!(no_impressions.ctr, Decimal::ZERO);

        let no_clicks = aggregate(&[sample(500, 0, 0, "25.00")]).unwrap();
        assert_eq!(no_clicks.conversion_rate, Decimal::ZERO);
        assert_eq!(no_clicks.cost_per_click, Decimal::ZERO);
        assert_eq!(no_clicks.cost_per_conversion, Decimal::ZERO);
        assert_eq!(no_clicks.roi, dec("-1"));

        // Free conversions: spend is zero, so ROI and cost per conversion are zero
        let no_spend = aggregate(&[sample(500, 20, 4, "0")]).unwrap();
        assert_eq!(no_spend.roi, Decimal::ZERO);
        assert_eq!(no_spend.cost_per_conversion, Decimal::ZERO);
        assert_eq!(no_spend.conversion_rate, dec("0.2"));
    }

    #[test]
    fn totals_are_exact_decimal_sums() {
        let m = aggregate(&[sample(1, 0, 0, "0.10"), sample(1, 0, 0, "0.20")]).unwrap();
        assert_eq!(m.totals.spend, dec("0.30"));
        assert_eq!(m.totals.impressions, 2);
    }

    #[test]
    fn order_does_not_matter() {
        let a = sample(1000, 50, 5, "100.00");
        let b = sample(300, 7, 0, "12.34");
        assert_eq!(aggregate(&[a.clone(), b.clone()]), aggregate(&[b, a]));
    }

    #[test]
    fn merging_halves_equals_aggregating_the_whole() {
        let samples = vec![
            sample(1000, 50, 5, "100.00"),
            sample(300, 7, 0, "12.34"),
            sample(0, 0, 0, "0"),
            sample(42, 3, 1, "9.99"),
        ];
        let (left, right) = samples.split_at(2);
        let merged = Totals::from_samples(left)
            .and_then(|l| l.merge(Totals::from_samples(right)?))
            .unwrap();
        assert_eq!(AggregatedMetrics::from_totals(merged), aggregate(&samples).unwrap());
    }

    #[test]
    fn spend_overflow_is_an_error_not_a_panic() {
        let huge = "50000000000000000000000000000";
        let err = aggregate(&[sample(0, 0, 0, huge), sample(0, 0, 0, huge)]).unwrap_err();
        assert_eq!(err, AggregateOverflow { field: "spend" });
    }

    #[test]
    fn count_overflow_is_an_error_not_a_wrap() {
        let big = i64::MAX as u64;
        let samples = [sample(big, 0, 0, "0"), sample(big, 0, 0, "0"), sample(big, 0, 0, "0")];
        let err = aggregate(&samples).unwrap_err();
        assert_eq!(err, AggregateOverflow { field: "impressions" });

        let err = Totals::from_samples(&[sample(0, big, 0, "0"), sample(0, big, 0, "0")])
            .unwrap()
            .merge(Totals { clicks: big, ..Totals::default() })
            .unwrap_err();
        assert_eq!(err.field, "clicks");
    }
}
