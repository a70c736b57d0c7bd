//! Fiat amount conversions.
//!
//! Fiat amounts travel as integer strings of millionths of a dollar
//! (`5.00` USD becomes `"5000000"`). Display strings coming from a 402
//! challenge are parsed leniently.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::Error;

/// Number of implied fractional digits in wire fiat amounts.
pub const FIAT_DECIMALS: u32 = 6;

/// Payments below this many dollars are flagged as small.
pub const SMALL_PAYMENT_THRESHOLD_USD: Decimal = Decimal::from_parts(2, 0, 0, false, 0);

/// Amount used when a challenge gives no parsable `amountFormatted`.
pub const DEFAULT_CHALLENGE_AMOUNT_USD: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.]").expect("valid pattern"));

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)").expect("valid pattern"));

/// Converts a dollar amount to an integer string of millionths.
///
/// Rounds half away from zero: `0.0000005` becomes `"1"`.
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] for negative amounts and for amounts too
/// large to express in millionths.
pub fn usd_to_millionths(amount: Decimal) -> Result<String, Error> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::InvalidAmount(format!("negative amount {amount}")));
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(FIAT_DECIMALS)))
        .ok_or_else(|| Error::InvalidAmount(format!("amount {amount} is out of range")))?;
    let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok(rounded.normalize().to_string())
}

/// Parses a display amount such as `"$5.00"` or `"5 USD"`.
///
/// Every character other than digits and `.` is dropped, then the leading
/// number is read: `"1.2.3"` gives `1.2`. Falls back to
/// [`DEFAULT_CHALLENGE_AMOUNT_USD`] when no number leads, when it does not fit
/// a [`Decimal`], or when the input is absent.
#[must_use]
pub fn parse_amount_formatted(formatted: Option<&str>) -> Decimal {
    formatted
        .map(|s| NON_NUMERIC.replace_all(s, ""))
        .and_then(|s| {
            LEADING_NUMBER
                .find(&s)
                .and_then(|m| Decimal::from_str(m.as_str()).ok())
        })
        .unwrap_or(DEFAULT_CHALLENGE_AMOUNT_USD)
}

/// Whether a payment falls below the small-payment threshold.
///
/// Fees may take a noticeable share of such payments.
#[must_use]
pub fn is_small_payment(amount_usd: Decimal) -> bool {
    amount_usd < SMALL_PAYMENT_THRESHOLD_USD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_whole_dollars() {
        assert_eq!(usd_to_millionths(d("5")).unwrap(), "5000000");
        assert_eq!(usd_to_millionths(d("0")).unwrap(), "0");
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(usd_to_millionths(d("0.0000005")).unwrap(), "1");
        assert_eq!(usd_to_millionths(d("1.2345674")).unwrap(), "1234567");
        assert_eq!(usd_to_millionths(d("12.34")).unwrap(), "12340000");
    }

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(
            usd_to_millionths(d("-1")),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_oversized_amount_rejected() {
        let amount = parse_amount_formatted(Some("$99999999999999999999999999"));
        assert_eq!(amount, d("99999999999999999999999999"));
        assert!(matches!(
            usd_to_millionths(amount),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            usd_to_millionths(Decimal::MAX),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_parse_formatted() {
        assert_eq!(parse_amount_formatted(Some("$12.50")), d("12.50"));
        assert_eq!(parse_amount_formatted(Some("3 USD")), d("3"));
        assert_eq!(parse_amount_formatted(Some("$.75")), d("0.75"));
        assert_eq!(parse_amount_formatted(Some("free")), d("5"));
        assert_eq!(parse_amount_formatted(Some("...")), d("5"));
        assert_eq!(parse_amount_formatted(None), d("5"));
    }

    #[test]
    fn test_parse_formatted_reads_leading_number() {
        assert_eq!(parse_amount_formatted(Some("1.2.3")), d("1.2"));
        assert_eq!(parse_amount_formatted(Some("$7. USD")), d("7"));
    }

    #[test]
    fn test_small_payment() {
        assert!(is_small_payment(d("1.99")));
        assert!(!is_small_payment(d("2")));
    }
}
