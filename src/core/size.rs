//! Human-readable sizes and probe thresholds.
//!
//! Decimal units (`kB`, `MB`, `GB`, `TB`) are powers of 1000; IEC units
//! (`KiB`, `MiB`, ...) and bare suffixes (`K`, `M`, `G`, `T`) are powers of
//! 1024. A value below 1 (or a percentage) is a ratio of the total.

use std::fmt;

use humansize::{BINARY, format_size};
use serde::{Deserialize, Serialize};

use crate::core::errors::{BodewellError, Result};

/// Threshold as written in configuration: a bare number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    /// Bare number: a ratio below 1, bytes otherwise.
    Number(f64),
    /// Size or percentage string (`"10GiB"`, `"5%"`).
    Text(String),
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl ThresholdSpec {
    /// Interpret as a plain float (load averages).
    pub fn as_float(&self) -> Result<f64> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().map_err(|err| invalid(self, err))?,
        };
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(invalid(self, "must be a positive number"))
        }
    }
}

/// A free-space threshold: absolute bytes or a fraction of the total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Absolute number of bytes.
    Bytes(u64),
    /// Fraction of the total, in `(0, 1)`.
    Ratio(f64),
}

impl Threshold {
    /// Interpret a configured threshold.
    pub fn parse(spec: &ThresholdSpec) -> Result<Self> {
        match spec {
            ThresholdSpec::Number(value) => from_number(spec, *value),
            ThresholdSpec::Text(text) => {
                let text = text.trim();
                if let Some(pct) = text.strip_suffix('%') {
                    let pct: f64 = pct.trim().parse().map_err(|err| invalid(spec, err))?;
                    if !(pct > 0.0 && pct < 100.0) {
                        return Err(invalid(spec, "percentage must be between 0 and 100"));
                    }
                    return Ok(Self::Ratio(pct / 100.0));
                }
                if let Ok(value) = text.parse::<f64>() {
                    return from_number(spec, value);
                }
                parse_size(text).map(Self::Bytes)
            }
        }
    }

    /// Whether `available` out of `total` is below this threshold.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn below(&self, available: u64, total: u64) -> bool {
        match *self {
            Self::Bytes(limit) => available < limit,
            Self::Ratio(ratio) => total == 0 || (available as f64 / total as f64) < ratio,
        }
    }

    /// Whether `available` exceeds this threshold raised by `factor`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn exceeded_by(&self, available: u64, total: u64, factor: f64) -> bool {
        match *self {
            Self::Bytes(limit) => available as f64 > limit as f64 * factor,
            Self::Ratio(ratio) => total > 0 && available as f64 / total as f64 > ratio * factor,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.write_str(&format_bytes(*bytes)),
            Self::Ratio(ratio) => write!(f, "{:.1}%", ratio * 100.0),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_number(spec: &ThresholdSpec, value: f64) -> Result<Threshold> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(spec, "must be a positive value"));
    }
    if value < 1.0 {
        Ok(Threshold::Ratio(value))
    } else {
        Ok(Threshold::Bytes(value.round() as u64))
    }
}

fn invalid(spec: &ThresholdSpec, details: impl fmt::Display) -> BodewellError {
    BodewellError::InvalidThreshold {
        value: spec.to_string(),
        details: details.to_string(),
    }
}

/// Parse a byte size such as `"10GiB"`, `"500 MB"` or `"1.5G"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_size(text: &str) -> Result<u64> {
    let fail = |details: &str| BodewellError::InvalidThreshold {
        value: text.to_string(),
        details: details.to_string(),
    };

    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number.parse().map_err(|_| fail("expected a number"))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        "k" | "kib" => 1 << 10,
        "m" | "mib" => 1 << 20,
        "g" | "gib" => 1 << 30,
        "t" | "tib" => 1 << 40,
        _ => return Err(fail("unknown size unit")),
    };

    #[allow(clippy::cast_precision_loss)]
    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(fail("size out of range"));
    }
    Ok(bytes.round() as u64)
}

/// Render bytes with an IEC unit, e.g. `1.50 GiB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Threshold, ThresholdSpec, format_bytes, parse_size};

    fn text(value: &str) -> ThresholdSpec {
        ThresholdSpec::Text(value.to_string())
    }

    #[test]
    fn parses_decimal_and_binary_units() {
        assert_eq!(parse_size("10GiB").expect("GiB"), 10 * (1 << 30));
        assert_eq!(parse_size("500MB").expect("MB"), 500_000_000);
        assert_eq!(parse_size("1.5G").expect("G"), 1_610_612_736);
        assert_eq!(parse_size("4096").expect("bare"), 4096);
        assert_eq!(parse_size(" 2 kib ").expect("spaced"), 2048);
    }

    #[test]
    fn rejects_unknown_units() {
        let err = parse_size("12 parsecs").expect_err("unknown unit");
        assert_eq!(err.code(), "BW-1004");
        assert!(parse_size("GB").is_err());
    }

    #[test]
    fn thresholds_distinguish_ratio_and_bytes() {
        assert_eq!(
            Threshold::parse(&ThresholdSpec::Number(0.1)).expect("ratio"),
            Threshold::Ratio(0.1)
        );
        assert_eq!(
            Threshold::parse(&text("15%")).expect("pct"),
            Threshold::Ratio(0.15)
        );
        assert_eq!(
            Threshold::parse(&text("0.25")).expect("text ratio"),
            Threshold::Ratio(0.25)
        );
        assert_eq!(
            Threshold::parse(&ThresholdSpec::Number(1024.0)).expect("bytes"),
            Threshold::Bytes(1024)
        );
        assert_eq!(
            Threshold::parse(&text("1KiB")).expect("unit"),
            Threshold::Bytes(1024)
        );
        assert!(Threshold::parse(&ThresholdSpec::Number(0.0)).is_err());
        assert!(Threshold::parse(&text("150%")).is_err());
    }

    #[test]
    fn below_compares_against_bytes_or_ratio() {
        let bytes = Threshold::Bytes(100);
        assert!(bytes.below(99, 1_000));
        assert!(!bytes.below(100, 1_000));

        let ratio = Threshold::Ratio(0.1);
        assert!(ratio.below(50, 1_000));
        assert!(!ratio.below(200, 1_000));
        assert!(ratio.below(0, 0));
    }

    #[test]
    fn exceeded_by_applies_margin() {
        let bytes = Threshold::Bytes(100);
        assert!(!bytes.exceeded_by(104, 0, 1.05));
        assert!(bytes.exceeded_by(106, 0, 1.05));

        let ratio = Threshold::Ratio(0.1);
        assert!(!ratio.exceeded_by(105, 1_000, 1.1));
        assert!(ratio.exceeded_by(115, 1_000, 1.1));
        assert!(!ratio.exceeded_by(10, 0, 1.0));
    }

    #[test]
    fn float_thresholds_for_load() {
        assert!((ThresholdSpec::Number(2.5).as_float().expect("num") - 2.5).abs() < f64::EPSILON);
        assert!((text("4").as_float().expect("text") - 4.0).abs() < f64::EPSILON);
        assert!(text("high").as_float().is_err());
        assert!(ThresholdSpec::Number(-1.0).as_float().is_err());
    }

    #[test]
    fn format_bytes_uses_iec_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(10 * (1 << 30)), "10 GiB");
        assert_eq!(format_bytes(1_000_000_000), "953.67 MiB");
    }

    proptest! {
        #[test]
        fn whole_mebibytes_round_trip(n in 1u64..1_000_000) {
            prop_assert_eq!(parse_size(&format!("{n}MiB")).unwrap(), n << 20);
        }
    }
}
