use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::{helpers::normalize_digits, op};

pub const RIAL_CURRENCY_CODE: &str = "IRR";
pub const RIALS_PER_TOMAN: i64 = 10;

//--------------------------------------        Rial         ---------------------------------------------------------
/// An amount of the store currency in its minor unit. Balances, order totals and transaction amounts are all stored
/// as Rial; Toman only exists at the display boundary.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rial(i64);

op!(binary Rial, Add, add);
op!(binary Rial, Sub, sub);
op!(inplace Rial, AddAssign, add_assign);
op!(inplace Rial, SubAssign, sub_assign);
op!(unary Rial, Neg, neg);

impl Mul<i64> for Rial {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Rial {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Rial {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Rial {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_toman(toman: i64) -> Self {
        Self(toman * RIALS_PER_TOMAN)
    }

    /// The amount in Toman, truncated towards zero. Use [`Rial::is_whole_toman`] to check whether the conversion is
    /// exact.
    pub fn to_toman(&self) -> i64 {
        self.0 / RIALS_PER_TOMAN
    }

    pub fn is_whole_toman(&self) -> bool {
        self.0 % RIALS_PER_TOMAN == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

impl Display for Rial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{} IRR", group_thousands(self.0.unsigned_abs()))
    }
}

fn group_thousands(v: u64) -> String {
    let digits = v.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount: {0}")]
pub struct AmountParseError(pub String);

/// Parses amounts as banks print them: an optional sign, thousands separators (`,` `٬` or spaces), Persian digits, and
/// an optional all-zero fractional part (`1,000.00`).
impl FromStr for Rial {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_digits(s.trim());
        let (negative, body) = match normalized.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, normalized.strip_prefix('+').unwrap_or(&normalized)),
        };
        let (whole, fraction) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if !fraction.chars().all(|c| c == '0') {
            return Err(AmountParseError(format!("{s} has a fractional Rial component")));
        }
        let digits: String = whole.chars().filter(|c| !matches!(c, ',' | '\u{066C}' | ' ' | '_')).collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountParseError(s.to_string()));
        }
        let value = digits.parse::<i64>().map_err(|e| AmountParseError(format!("{s}: {e}")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}
