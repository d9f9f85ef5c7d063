//! Presentation formatting for rendered reports.
//!
//! Amounts are rounded half-to-even to two places, counts get thousands
//! separators, and fractions are shown as percentages.

use rust_decimal::{Decimal, RoundingStrategy};

/// `1234567` → `"1,234,567"`.
pub fn count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// `1234.5` → `"$1,234.50"`; negatives as `"-$3.00"`.
pub fn currency(value: Decimal) -> String {
    let fixed = two_places(value);
    match fixed.strip_prefix('-') {
        Some(abs) => format!("-${abs}"),
        None => format!("${fixed}"),
    }
}

/// A fraction as a percentage: `0.05` → `"5.00%"`.
pub fn percent(fraction: Decimal) -> String {
    format!("{}%", two_places(fraction * Decimal::ONE_HUNDRED))
}

fn two_places(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }

    let text = rounded.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, "00"));
    format!("{sign}{}.{frac}", group_thousands(whole))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
