use std::fmt;

use rust_decimal::Decimal;

/// Non-numeric residue after stripping currency formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNumberError(pub String);

impl fmt::Display for ParseNumberError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "not a number: '{}'", self.0)
    }
}

impl std::error::Error for ParseNumberError {}

/// Parses a money-bearing field, tolerating thousands separators and
/// currency glyphs (`,`, `$`, `€`, `£`, `¥`). Fixed-point decimal
/// throughout; binary floating point would drift across thousands of
/// transactions.
pub fn parse_decimal(raw: &str) -> Result<Decimal, ParseNumberError> {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥') && !c.is_whitespace())
        .collect();

    if stripped.is_empty() {
        return Err(ParseNumberError(raw.to_owned()));
    }

    Decimal::from_str_exact(&stripped).map_err(|_| ParseNumberError(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_decimal("42").unwrap(), dec!(42));
        assert_eq!(parse_decimal("0.00000001").unwrap(), dec!(0.00000001));
        assert_eq!(parse_decimal("-12.5").unwrap(), dec!(-12.5));
    }

    #[test]
    fn test_currency_formatting_stripped() {
        assert_eq!(parse_decimal("$1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal("€ 999,00"), Ok(dec!(99900)));
        assert_eq!(parse_decimal("£1,000").unwrap(), dec!(1000));
        assert_eq!(parse_decimal("¥5000").unwrap(), dec!(5000));
        assert_eq!(parse_decimal(" 1 234.5 ").unwrap(), dec!(1234.5));
    }

    #[test]
    fn test_non_numeric_residue() {
        assert!(parse_decimal("N/A").is_err());
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("$").is_err());
        assert!(parse_decimal("12.3.4").is_err());
    }
}
