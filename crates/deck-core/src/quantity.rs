//! Storage quantity parsing (`5Gi`, `500M`, `1024`).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity `{0}`")]
    Invalid(String),

    #[error("quantity `{0}` overflows")]
    Overflow(String),
}

const SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
];

/// Parse a quantity into bytes. Binary suffixes are checked before decimal
/// ones so `Mi` never parses as `M`.
pub fn parse_quantity(s: &str) -> Result<u64, QuantityError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|d| (d, *mult)))
        .unwrap_or((s, 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| QuantityError::Invalid(s.to_string()))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| QuantityError::Overflow(s.to_string()))
}
