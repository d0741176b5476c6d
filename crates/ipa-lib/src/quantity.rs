//! Kubernetes resource quantity parsing
//!
//! Quantities are normalised to milli-units so that `500m` and `0.5`, or
//! `1Gi` and `1073741824`, compare equal.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity `{0}`")]
    InvalidNumber(String),
    #[error("unknown suffix in quantity `{0}`")]
    UnknownSuffix(String),
    #[error("quantity `{0}` is out of range")]
    OutOfRange(String),
}

/// A parsed quantity in milli-units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    millis: i128,
}

impl Quantity {
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(raw.len());
        let (number, suffix) = raw.split_at(split);

        let (negative, digits) = match number.as_bytes().first() {
            Some(b'-') => (true, &number[1..]),
            Some(b'+') => (false, &number[1..]),
            _ => (false, number),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty())
            || !all_digits(whole)
            || !all_digits(fraction)
            || whole.len() + fraction.len() > 30
        {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }

        let mantissa: i128 = format!("{}{}", whole, fraction)
            .parse()
            .map_err(|_| QuantityError::InvalidNumber(raw.to_string()))?;
        let (num, den) = multiplier(suffix).ok_or_else(|| QuantityError::UnknownSuffix(raw.to_string()))?;

        let out_of_range = || QuantityError::OutOfRange(raw.to_string());
        let numerator = mantissa
            .checked_mul(num)
            .and_then(|v| v.checked_mul(1000))
            .ok_or_else(out_of_range)?;
        let denominator = 10i128
            .checked_pow(fraction.len() as u32)
            .and_then(|v| v.checked_mul(den))
            .ok_or_else(out_of_range)?;

        // Round up like the API server does for sub-milli precision
        let mut millis = numerator / denominator;
        if numerator % denominator != 0 {
            millis += 1;
        }

        Ok(Self {
            millis: if negative { -millis } else { millis },
        })
    }

    pub fn millis(&self) -> i128 {
        self.millis
    }
}

/// Returns (numerator, denominator) for a quantity suffix
fn multiplier(suffix: &str) -> Option<(i128, i128)> {
    let binary = |shift: u32| Some((1i128 << shift, 1));
    let decimal = |exp: u32| Some((10i128.pow(exp), 1));

    match suffix {
        "" => Some((1, 1)),
        "m" => Some((1, 1000)),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        s if s.len() > 1 && (s.starts_with('e') || s.starts_with('E')) => {
            let exp: i32 = s[1..].parse().ok()?;
            if exp.unsigned_abs() > 18 {
                return None;
            }
            if exp >= 0 {
                decimal(exp as u32)
            } else {
                Some((1, 10i128.pow(exp.unsigned_abs())))
            }
        }
        _ => None,
    }
}

/// Compare two optional quantities by value, falling back to text comparison
/// when either side does not parse.
pub fn same_quantity(live: Option<&str>, desired: &str) -> bool {
    match live {
        None => false,
        Some(live) => match (Quantity::parse(live), Quantity::parse(desired)) {
            (Ok(a), Ok(b)) => a == b,
            _ => live.trim() == desired.trim(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities_normalise() {
        assert_eq!(Quantity::parse("500m").unwrap(), Quantity::parse("0.5").unwrap());
        assert_eq!(Quantity::parse("2").unwrap().millis(), 2000);
        assert_eq!(Quantity::parse("1500m").unwrap(), Quantity::parse("1.5").unwrap());
    }

    #[test]
    fn test_memory_quantities_normalise() {
        assert_eq!(
            Quantity::parse("1Gi").unwrap(),
            Quantity::parse("1073741824").unwrap()
        );
        assert_eq!(Quantity::parse("128Mi").unwrap(), Quantity::parse("131072Ki").unwrap());
        assert_eq!(Quantity::parse("1k").unwrap(), Quantity::parse("1e3").unwrap());
        assert_ne!(Quantity::parse("1G").unwrap(), Quantity::parse("1Gi").unwrap());
    }

    #[test]
    fn test_sub_milli_rounds_up() {
        assert_eq!(Quantity::parse("0.0001").unwrap().millis(), 1);
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            Quantity::parse("abc"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            Quantity::parse("12parsecs"),
            Err(QuantityError::UnknownSuffix(_))
        ));
        assert!(matches!(
            Quantity::parse("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_same_quantity() {
        assert!(same_quantity(Some("0.5"), "500m"));
        assert!(!same_quantity(None, "500m"));
        assert!(!same_quantity(Some("250m"), "500m"));
        assert!(same_quantity(Some("weird"), "weird"));
    }
}
