use std::{
    fmt::Display,
    ops::{Add, Sub},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::{helpers::normalize_digits, op, AmountParseError};

pub const MICRO_UNITS_PER_UNIT: i64 = 1_000_000;

/// An amount of the crypto settlement asset, with six decimal places of precision.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MicroUnits(i64);

op!(binary MicroUnits, Add, add);
op!(binary MicroUnits, Sub, sub);

impl From<i64> for MicroUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl MicroUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_units(units: i64) -> Self {
        Self(units * MICRO_UNITS_PER_UNIT)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for MicroUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let v = self.0.unsigned_abs();
        let units = v / MICRO_UNITS_PER_UNIT as u64;
        let frac = v % MICRO_UNITS_PER_UNIT as u64;
        write!(f, "{sign}{units}.{frac:06}")
    }
}

/// Parses decimal strings such as `119.5` or `0.000001`. More than six fractional digits is an error rather than a
/// silent truncation.
impl FromStr for MicroUnits {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_digits(s.trim());
        let (negative, body) = match normalized.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, normalized.as_str()),
        };
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) || fraction.len() > 6 {
            return Err(AmountParseError(s.to_string()));
        }
        let whole = whole.parse::<i64>().map_err(|e| AmountParseError(format!("{s}: {e}")))?;
        let fraction = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<6}").parse::<i64>().map_err(|e| AmountParseError(format!("{s}: {e}")))?
        };
        let value = whole
            .checked_mul(MICRO_UNITS_PER_UNIT)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(|| AmountParseError(format!("{s} is out of range")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_display() {
        let v = "119.5".parse::<MicroUnits>().unwrap();
        assert_eq!(v, MicroUnits::from(119_500_000));
        assert_eq!(v.to_string(), "119.500000");
        assert_eq!("0.000001".parse::<MicroUnits>().unwrap(), MicroUnits::from(1));
        assert_eq!("120".parse::<MicroUnits>().unwrap(), MicroUnits::from_units(120));
        assert!("1.0000001".parse::<MicroUnits>().is_err());
        assert!(".5".parse::<MicroUnits>().is_err());
        assert!("1e6".parse::<MicroUnits>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let v = MicroUnits::from(42);
        assert_eq!(serde_json::to_string(&v).unwrap(), "42");
    }
}
