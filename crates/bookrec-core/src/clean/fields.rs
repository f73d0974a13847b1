//! Scalar field coercion at the cleaning boundary.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::RawValue;

pub const MIN_YEAR: i32 = 1000;
pub const MAX_YEAR: i32 = 2100;
pub const MAX_RATING: f64 = 5.0;

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(1\d{3}|20\d{2}|2100)\b").expect("valid regex"));
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));
static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}(?:[,.\s]\d{3})+|\d+").expect("valid regex"));

/// Trim and collapse internal whitespace; `None` when nothing is left.
pub fn normalize_string(input: &str) -> Option<String> {
    let out = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if out.is_empty() { None } else { Some(out) }
}

/// Rating on the 0–5 scale.
pub fn parse_rating(raw: &RawValue) -> Option<f64> {
    let value = match raw {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => FLOAT_RE.find(s)?.as_str().parse::<f64>().ok()?,
    };
    (value.is_finite() && (0.0..=MAX_RATING).contains(&value)).then_some(value)
}

/// Non-negative count; tolerates thousands separators and trailing words.
pub fn parse_count(raw: &RawValue) -> Option<u64> {
    match raw {
        RawValue::Number(n) if n.is_finite() && *n >= 0.0 => Some(n.round() as u64),
        RawValue::Number(_) => None,
        RawValue::Text(s) => {
            let m = COUNT_RE.find(s)?;
            let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        }
    }
}

/// Publication year, or `None` when no plausible year is present.
pub fn parse_year(raw: &RawValue) -> Option<i32> {
    let year = match raw {
        RawValue::Number(n) if n.is_finite() && n.fract() == 0.0 => *n as i32,
        RawValue::Number(_) => return None,
        RawValue::Text(s) => YEAR_RE.find(s)?.as_str().parse::<i32>().ok()?,
    };
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_string() {
        assert_eq!(normalize_string("  The   Hobbit\n"), Some("The Hobbit".to_string()));
        assert_eq!(normalize_string("   "), None);
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(&RawValue::Number(4.3)), Some(4.3));
        assert_eq!(parse_rating(&"4.28 avg rating".into()), Some(4.28));
        assert_eq!(parse_rating(&"really liked it".into()), None);
        assert_eq!(parse_rating(&RawValue::Number(7.5)), None);
        assert_eq!(parse_rating(&RawValue::Number(f64::NAN)), None);
        assert_eq!(parse_rating(&"-4.0".into()), None);
        assert_eq!(parse_rating(&"rating: -1.5 stars".into()), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(&"1,234,567 ratings".into()), Some(1_234_567));
        assert_eq!(parse_count(&"312 ratings".into()), Some(312));
        assert_eq!(parse_count(&RawValue::Number(88.0)), Some(88));
        assert_eq!(parse_count(&RawValue::Number(-3.0)), None);
        assert_eq!(parse_count(&"no ratings".into()), None);
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(&RawValue::Number(1937.0)), Some(1937));
        assert_eq!(parse_year(&"September 21, 1937".into()), Some(1937));
        assert_eq!(parse_year(&"1937-09-21".into()), Some(1937));
        assert_eq!(parse_year(&"First published c. 1865".into()), Some(1865));
        assert_eq!(parse_year(&"unknown".into()), None);
        assert_eq!(parse_year(&RawValue::Number(1937.5)), None);
        assert_eq!(parse_year(&RawValue::Number(12.0)), None);
    }
}
