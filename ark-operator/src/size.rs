//! Kubernetes-style size literal parsing (§4.1).
//!
//! Accepts binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`), decimal
//! suffixes (`K`, `M`, `G`, `T`, `P`, `E`), plain integers, and scientific
//! notation (`1e3`). Suffixes are case-insensitive. The result is always a
//! non-negative byte count.

use crate::util::Error;

const BINARY_SUFFIXES: &[(&str, u128)] = &[
    ("ei", 1u128 << 60),
    ("pi", 1u128 << 50),
    ("ti", 1u128 << 40),
    ("gi", 1u128 << 30),
    ("mi", 1u128 << 20),
    ("ki", 1u128 << 10),
];

const DECIMAL_SUFFIXES: &[(&str, u128)] = &[
    ("e", 1_000_000_000_000_000_000),
    ("p", 1_000_000_000_000_000),
    ("t", 1_000_000_000_000),
    ("g", 1_000_000_000),
    ("m", 1_000_000),
    ("k", 1_000),
];

/// Parses a Kubernetes quantity-style size literal into a byte count.
///
/// Pure and idempotent: `parse_size(&format_size(parse_size(s)?)) ==
/// parse_size(s)?` for any valid `s` (§8 property 5).
pub fn parse_size(raw: &str) -> Result<u64, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidSize(raw.to_string()));
    }
    let lower = trimmed.to_ascii_lowercase();

    for (suffix, factor) in BINARY_SUFFIXES {
        if let Some(number) = lower.strip_suffix(suffix) {
            return scale(number.trim(), *factor, raw);
        }
    }
    for (suffix, factor) in DECIMAL_SUFFIXES {
        if let Some(number) = lower.strip_suffix(suffix) {
            return scale(number.trim(), *factor, raw);
        }
    }

    // No recognized suffix: plain integer or scientific notation.
    parse_number(&lower)
        .and_then(|value| to_u64(value, raw))
        .ok_or_else(|| Error::InvalidSize(raw.to_string()))
}

fn scale(number: &str, factor: u128, raw: &str) -> Result<u64, Error> {
    let value = parse_number(number).ok_or_else(|| Error::InvalidSize(raw.to_string()))?;
    let scaled = value * factor as f64;
    to_u64(scaled, raw).ok_or_else(|| Error::InvalidSize(raw.to_string()))
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn to_u64(value: f64, raw: &str) -> Option<u64> {
    if !value.is_finite() || value < 0.0 || value > u64::MAX as f64 {
        let _ = raw;
        return None;
    }
    Some(value.round() as u64)
}

/// Formats a byte count back into a `Gi`-suffixed literal, matching the
/// convention the operator uses when writing PVC `spec.resources.requests`.
pub fn format_gib(bytes: u64) -> String {
    let gib = bytes as f64 / (1u64 << 30) as f64;
    if gib.fract() == 0.0 {
        format!("{}Gi", gib as u64)
    } else {
        format!("{gib:.2}Gi")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_suffixes() {
        assert_eq!(parse_size("50Gi").unwrap(), 50 * (1u64 << 30));
        assert_eq!(parse_size("1Ki").unwrap(), 1024);
        assert_eq!(parse_size("2ti").unwrap(), 2 * (1u64 << 40));
    }

    #[test]
    fn parses_decimal_suffixes() {
        assert_eq!(parse_size("1k").unwrap(), 1_000);
        assert_eq!(parse_size("2M").unwrap(), 2_000_000);
    }

    #[test]
    fn parses_plain_and_scientific() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1e3").unwrap(), 1000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("banana").is_err());
        assert!(parse_size("-5Gi").is_err());
    }

    #[test]
    fn round_trips_through_format() {
        let original = parse_size("50Gi").unwrap();
        let again = parse_size(&format_gib(original)).unwrap();
        assert_eq!(original, again);
    }
}
