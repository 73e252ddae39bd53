use rust_decimal::{Decimal, RoundingStrategy};

/// Format an amount as Australian dollars, e.g. `$1,234.50` or `-$5.00`.
#[must_use]
pub fn format_aud(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn formats_small_amounts() {
        assert_eq!(format_aud(dec("5")), "$5.00");
        assert_eq!(format_aud(dec("0.5")), "$0.50");
        assert_eq!(format_aud(Decimal::ZERO), "$0.00");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(format_aud(dec("1234.5")), "$1,234.50");
        assert_eq!(format_aud(dec("1234567.891")), "$1,234,567.89");
        assert_eq!(format_aud(dec("100000")), "$100,000.00");
    }

    #[test]
    fn negative_amounts_carry_sign_before_symbol() {
        assert_eq!(format_aud(dec("-12.345")), "-$12.35");
    }
}
