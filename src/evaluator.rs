//! Safe ratio evaluation.

use crate::aggregate::MetricTotals;
use crate::models::{NaReason, RatioResult};

/// Round to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    // Small negative values round to 0.0, never -0.0.
    (value * 100.0).round() / 100.0 + 0.0
}

/// Compute `numerator_sum / denominator_sum * multiplier`, rounded to two decimal places.
///
/// Every degenerate input maps to [RatioResult::NotAvailable]; this function never panics.
///
/// # Arguments
///
/// * `numerator_sum`: Summed numerator field
/// * `denominator_sum`: Signed sum of the denominator fields
/// * `multiplier`: Scale applied to the ratio
/// * `contributed`: Whether any row supplied the metric's fields
pub fn evaluate(
    numerator_sum: f64,
    denominator_sum: f64,
    multiplier: f64,
    contributed: bool,
) -> RatioResult {
    if !contributed {
        return RatioResult::NotAvailable(NaReason::NoData);
    }
    if numerator_sum.is_nan() || denominator_sum.is_nan() {
        return RatioResult::NotAvailable(NaReason::NotANumber);
    }
    if denominator_sum == 0.0 {
        return RatioResult::NotAvailable(NaReason::ZeroDenominator);
    }
    let ratio = round2(numerator_sum / denominator_sum * multiplier);
    if ratio.is_finite() {
        RatioResult::Value(ratio)
    } else {
        RatioResult::NotAvailable(NaReason::NotANumber)
    }
}

/// Evaluate a metric from its combined totals.
pub fn evaluate_totals(totals: &MetricTotals, multiplier: f64) -> RatioResult {
    evaluate(
        totals.numerator_sum,
        totals.denominator_sum,
        multiplier,
        totals.contributed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_value() {
        assert_eq!(RatioResult::Value(100.0), evaluate(35.0, 35.0, 100.0, true));
        assert_eq!(RatioResult::Value(33.33), evaluate(1.0, 3.0, 100.0, true));
        assert_eq!(RatioResult::Value(66.67), evaluate(2.0, 3.0, 100.0, true));
    }

    #[test]
    fn evaluate_negative_denominator() {
        assert_eq!(RatioResult::Value(-50.0), evaluate(5.0, -10.0, 100.0, true));
    }

    #[test]
    fn evaluate_zero_denominator() {
        for numerator in [0.0, 1.0, -7.5, 1e300] {
            assert_eq!(
                RatioResult::NotAvailable(NaReason::ZeroDenominator),
                evaluate(numerator, 0.0, 100.0, true)
            );
        }
        // Negative zero compares equal to zero.
        assert_eq!(
            RatioResult::NotAvailable(NaReason::ZeroDenominator),
            evaluate(1.0, -0.0, 100.0, true)
        );
    }

    #[test]
    fn evaluate_not_contributed() {
        assert_eq!(
            RatioResult::NotAvailable(NaReason::NoData),
            evaluate(10.0, 5.0, 100.0, false)
        );
        assert_eq!(
            RatioResult::NotAvailable(NaReason::NoData),
            evaluate(0.0, 0.0, 100.0, false)
        );
    }

    #[test]
    fn evaluate_nan() {
        assert_eq!(
            RatioResult::NotAvailable(NaReason::NotANumber),
            evaluate(f64::NAN, 5.0, 100.0, true)
        );
        assert_eq!(
            RatioResult::NotAvailable(NaReason::NotANumber),
            evaluate(5.0, f64::NAN, 100.0, true)
        );
    }

    #[test]
    fn evaluate_overflow() {
        assert_eq!(
            RatioResult::NotAvailable(NaReason::NotANumber),
            evaluate(f64::MAX, f64::MIN_POSITIVE, 100.0, true)
        );
    }

    #[test]
    fn round2_half_away_from_zero() {
        assert_eq!(0.13, round2(0.125));
        assert_eq!(-0.13, round2(-0.125));
        assert_eq!(2.5, round2(2.5));
        assert_eq!(1.0, round2(0.999));
        assert!(round2(-0.001).is_sign_positive());
    }

    #[test]
    fn evaluate_meta2a_multiplier() {
        // 10 / 8 * (1000 / 8) = 156.25
        assert_eq!(
            RatioResult::Value(156.25),
            evaluate(10.0, 8.0, 1000.0 / 8.0, true)
        );
    }
}
